//! Request dispatcher.
//!
//! Runs the path classifier on every request. Protocol matches go to the
//! smart or file handlers; everything else is checked out, published, and
//! rewritten to a ref-scoped path before being handed to the next stage.

use std::path::PathBuf;

use anyhow::{Context, Result};
use axum::extract::{Query, Request, State};
use axum::http::Uri;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::checkout::publish::publish;
use crate::git_http::errors::GitHttpError;
use crate::git_http::routes::{Classification, GitOp, classify};
use crate::git_http::{GitService, files, smart};
use crate::state::GatewayState;
use crate::validation::refname::validate_repo_prefix;

/// Ref override header consumed on pass-through requests.
pub const GIT_REF_HEADER: &str = "x-git-ref";

#[derive(Debug, Deserialize)]
struct ServiceQuery {
    service: Option<String>,
}

pub async fn dispatch(State(state): State<GatewayState>, req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    match classify(&method, &path) {
        Classification::MethodMismatch { op, allowed } => {
            tracing::debug!("{method} {path} matched {op:?} which requires {allowed}");
            GitHttpError::MethodNotAllowed.into_response()
        }
        Classification::Protocol {
            op,
            repo_prefix,
            matched,
        } => match handle_protocol(&state, op, &repo_prefix, &matched, req).await {
            Ok(resp) => resp,
            Err(err) => err.into_response(),
        },
        Classification::PassThrough => pass_through(state, req, next).await,
    }
}

async fn handle_protocol(
    state: &GatewayState,
    op: GitOp,
    repo_prefix: &str,
    matched: &str,
    req: Request,
) -> Result<Response, GitHttpError> {
    let repo = resolve_repository(state, repo_prefix)?;
    match op {
        GitOp::InfoRefs => {
            let service = query_service(req.uri())?.ok_or_else(|| {
                GitHttpError::BadRequest("missing service query parameter".into())
            })?;
            smart::advertise_refs(state, &repo, service).await
        }
        GitOp::UploadPack | GitOp::ReceivePack => {
            let from_path = if op == GitOp::UploadPack {
                GitService::UploadPack
            } else {
                GitService::ReceivePack
            };
            let service = query_service(req.uri())?.unwrap_or(from_path);
            smart::service_rpc(state, &repo, service, req).await
        }
        _ => files::serve_repo_file(op, &repo, matched).await,
    }
}

/// Repository resolution: a non-empty path prefix before the matched route
/// joins the app root, otherwise the configured default repository.
fn resolve_repository(state: &GatewayState, prefix: &str) -> Result<PathBuf, GitHttpError> {
    if prefix.is_empty() {
        return Ok(state.config.repository_dir());
    }
    validate_repo_prefix(prefix).map_err(|err| GitHttpError::BadRequest(err.to_string()))?;
    Ok(state.config.app_root.join(prefix.trim_start_matches('/')))
}

fn query_service(uri: &Uri) -> Result<Option<GitService>, GitHttpError> {
    let Query(q) = Query::<ServiceQuery>::try_from_uri(uri)
        .map_err(|err| GitHttpError::BadRequest(format!("invalid query string: {err}")))?;
    match q.service {
        None => Ok(None),
        Some(name) => GitService::parse(&name)
            .map(Some)
            .ok_or_else(|| GitHttpError::BadRequest(format!("unsupported service {name:?}"))),
    }
}

async fn pass_through(state: GatewayState, mut req: Request, next: Next) -> Response {
    let ref_name = match req.headers().get(GIT_REF_HEADER).map(|v| v.to_str()) {
        Some(Ok(value)) => value.to_string(),
        Some(Err(_)) => {
            return GitHttpError::BadRequest("x-git-ref header is not valid UTF-8".into())
                .into_response();
        }
        None => state.config.default_ref.clone(),
    };

    let repo = state.config.repository_dir();
    let checkout = match state.checkouts.ensure_checked_out(&repo, &ref_name).await {
        Ok(checkout) => checkout,
        Err(err) => {
            tracing::warn!("checkout of {ref_name} failed: {err:#}");
            return GitHttpError::Internal(format!("checkout of {ref_name} failed"))
                .into_response();
        }
    };
    if let Err(err) = publish(&state.config.app_root, &checkout, &ref_name).await {
        tracing::warn!("publication of {ref_name} failed: {err:#}");
        return GitHttpError::Internal(format!("publication of {ref_name} failed"))
            .into_response();
    }

    match prefix_uri(req.uri(), &ref_name) {
        Ok(uri) => *req.uri_mut() = uri,
        Err(err) => return GitHttpError::Internal(err.to_string()).into_response(),
    }
    tracing::debug!("pass-through rewritten to {}", req.uri());
    next.run(req).await
}

/// Prefix the request path with `/<ref>`, preserving the query string.
fn prefix_uri(uri: &Uri, ref_name: &str) -> Result<Uri> {
    let path = uri.path();
    let path_and_query = match uri.query() {
        Some(query) => format!("/{ref_name}{path}?{query}"),
        None => format!("/{ref_name}{path}"),
    };
    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(
        path_and_query
            .parse()
            .context("rewritten path is not a valid URI")?,
    );
    Uri::from_parts(parts).context("failed to rebuild rewritten URI")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_uri_prepends_ref() {
        let uri: Uri = "/index.html".parse().unwrap();
        assert_eq!(
            prefix_uri(&uri, "feature-x").unwrap().to_string(),
            "/feature-x/index.html"
        );
    }

    #[test]
    fn prefix_uri_keeps_query() {
        let uri: Uri = "/search?q=term".parse().unwrap();
        assert_eq!(
            prefix_uri(&uri, "master").unwrap().to_string(),
            "/master/search?q=term"
        );
    }

    #[test]
    fn prefix_uri_handles_slash_refs() {
        let uri: Uri = "/index.html".parse().unwrap();
        assert_eq!(
            prefix_uri(&uri, "feature/login").unwrap().to_string(),
            "/feature/login/index.html"
        );
    }
}
