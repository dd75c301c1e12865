//! Smart HTTP handlers: ref advertisement and stateless-RPC passthrough.
//!
//! Both spawn the git toolchain and wire its standard streams to the HTTP
//! exchange; no protocol parsing happens here beyond the hand-framed
//! announcement packet. Subprocess stderr goes to the log, never the client.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::Request;
use axum::http::{StatusCode, header};
use axum::response::Response;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use metrics::{counter, histogram};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::OwnedSemaphorePermit;
use tokio_util::io::{ReaderStream, StreamReader};

use super::GitService;
use super::errors::GitHttpError;
use super::pkt;
use crate::state::GatewayState;

/// GET `.../info/refs?service=<svc>`: write the service announcement packet,
/// then stream the output of `git <svc> --stateless-rpc --advertise-refs`
/// verbatim.
pub async fn advertise_refs(
    state: &GatewayState,
    repo: &Path,
    service: GitService,
) -> Result<Response, GitHttpError> {
    let start = Instant::now();
    let permit = state.acquire_git_slot().await?;

    let mut child = spawn_service(state, service, repo, true, false)?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| GitHttpError::Internal("subprocess stdout not captured".into()))?;
    if let Some(stderr) = child.stderr.take() {
        drain_stderr(service, stderr);
    }
    reap(
        child,
        state.git_timeout(),
        permit,
        "git advertisement",
        "git_http.info_refs_ms",
        start,
    );

    let announcement = pkt::service_announcement(service);
    let stream = futures::stream::once(async move {
        Ok::<_, std::io::Error>(Bytes::from(announcement))
    })
    .chain(ReaderStream::new(stdout));

    counter!("git_http.info_refs", "service" => service.as_str()).increment(1);

    Ok(protocol_response(
        format!("application/x-{service}-advertisement"),
        Body::from_stream(stream),
    ))
}

/// POST `.../git-upload-pack` / `.../git-receive-pack`: request body becomes
/// the subprocess's stdin, its stdout becomes the response body, both as
/// unbuffered byte streams. The toolchain owns all RPC framing.
pub async fn service_rpc(
    state: &GatewayState,
    repo: &Path,
    service: GitService,
    req: Request,
) -> Result<Response, GitHttpError> {
    let start = Instant::now();
    let permit = state.acquire_git_slot().await?;

    let mut child = spawn_service(state, service, repo, false, true)?;
    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| GitHttpError::Internal("subprocess stdin not captured".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| GitHttpError::Internal("subprocess stdout not captured".into()))?;
    if let Some(stderr) = child.stderr.take() {
        drain_stderr(service, stderr);
    }
    reap(
        child,
        state.git_timeout(),
        permit,
        "git rpc",
        "git_http.rpc_ms",
        start,
    );

    let body_stream = req.into_body().into_data_stream().map_err(std::io::Error::other);
    tokio::spawn(async move {
        let mut reader = StreamReader::new(body_stream);
        if let Err(err) = tokio::io::copy(&mut reader, &mut stdin).await {
            tracing::debug!("request body relay ended early: {err}");
        }
        // dropping stdin signals EOF to the subprocess
    });

    counter!("git_http.rpc", "service" => service.as_str()).increment(1);

    Ok(protocol_response(
        format!("application/x-{service}-result"),
        Body::from_stream(ReaderStream::new(stdout)),
    ))
}

fn spawn_service(
    state: &GatewayState,
    service: GitService,
    repo: &Path,
    advertise: bool,
    with_stdin: bool,
) -> Result<Child, GitHttpError> {
    let mut cmd = Command::new(&state.config.git_binary);
    cmd.arg(service.subcommand()).arg("--stateless-rpc");
    if advertise {
        cmd.arg("--advertise-refs");
    }
    cmd.arg(repo);
    cmd.stdin(if with_stdin { Stdio::piped() } else { Stdio::null() });
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);
    cmd.spawn().map_err(|err| {
        GitHttpError::Upstream(format!("failed to spawn git {}: {err}", service.subcommand()))
    })
}

/// Forward subprocess stderr to the log, line by line.
fn drain_stderr(service: GitService, stderr: ChildStderr) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::warn!(service = service.as_str(), "git: {line}");
        }
    });
}

/// Own the subprocess until it exits; kill it if it outlives the timeout.
/// The concurrency permit is held for the subprocess's whole lifetime, and
/// the duration histogram is recorded at exit so it covers the full
/// exchange, not just permit acquisition and spawn.
fn reap(
    mut child: Child,
    timeout: Duration,
    permit: OwnedSemaphorePermit,
    what: &'static str,
    metric: &'static str,
    start: Instant,
) {
    tokio::spawn(async move {
        let _permit = permit;
        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => {
                histogram!(metric).record(start.elapsed().as_millis() as f64);
                if !status.success() {
                    tracing::warn!("{what} exited with {status}");
                }
            }
            Ok(Err(err)) => tracing::warn!("{what} wait failed: {err}"),
            Err(_) => {
                tracing::warn!("{what} timed out after {timeout:?}, killing");
                let _ = child.kill().await;
            }
        }
    });
}

fn protocol_response(content_type: String, body: Body) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::EXPIRES, "Fri, 01 Jan 1980 00:00:00 GMT")
        .header(header::PRAGMA, "no-cache")
        .header(header::CACHE_CONTROL, "no-cache, max-age=0, must-revalidate")
        .body(body)
        .expect("response build")
}
