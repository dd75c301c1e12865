//! Dumb-protocol file handlers.
//!
//! HEAD, alternates, pack listings, loose objects and pack/idx files are all
//! plain reads out of the repository directory; content types and cache
//! policy follow git-http-backend conventions. The matched route suffix is
//! the relative path inside the repository, so nothing here touches raw
//! client input.

use std::path::Path;

use axum::body::Body;
use axum::http::{StatusCode, header};
use axum::response::Response;
use metrics::counter;
use tokio_util::io::ReaderStream;

use super::errors::GitHttpError;
use super::routes::GitOp;

enum CachePolicy {
    /// Mutable files: HEAD, ref listings, alternates.
    Never,
    /// Content-addressed files: loose objects, packs, idx files.
    Forever,
}

/// Serve a repository file named by a matched protocol route.
pub async fn serve_repo_file(
    op: GitOp,
    repo: &Path,
    matched: &str,
) -> Result<Response, GitHttpError> {
    let (content_type, policy) = match op {
        GitOp::HeadFile => ("text/plain", CachePolicy::Never),
        GitOp::Alternates | GitOp::HttpAlternates => ("text/plain", CachePolicy::Never),
        GitOp::InfoPacks => ("text/plain; charset=utf-8", CachePolicy::Never),
        GitOp::LooseObject => ("application/x-git-loose-object", CachePolicy::Forever),
        GitOp::PackFile => ("application/x-git-packed-objects", CachePolicy::Forever),
        GitOp::IdxFile => ("application/x-git-packed-objects-toc", CachePolicy::Forever),
        GitOp::InfoRefs | GitOp::UploadPack | GitOp::ReceivePack => {
            return Err(GitHttpError::Internal(
                "smart route dispatched to file handler".into(),
            ));
        }
    };

    let file_path = repo.join(matched.trim_start_matches('/'));
    let file = match tokio::fs::File::open(&file_path).await {
        Ok(f) => f,
        Err(err) => {
            tracing::debug!("repo file {} not served: {err}", file_path.display());
            return Err(GitHttpError::NotFound);
        }
    };
    let metadata = file
        .metadata()
        .await
        .map_err(|err| GitHttpError::Internal(format!("stat failed: {err}")))?;
    if !metadata.is_file() {
        return Err(GitHttpError::NotFound);
    }

    counter!("git_http.file", "kind" => file_kind(op)).increment(1);

    let builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, metadata.len());
    let builder = match policy {
        CachePolicy::Never => builder
            .header(header::EXPIRES, "Fri, 01 Jan 1980 00:00:00 GMT")
            .header(header::PRAGMA, "no-cache")
            .header(header::CACHE_CONTROL, "no-cache, max-age=0, must-revalidate"),
        CachePolicy::Forever => builder
            .header(header::EXPIRES, "Fri, 01 Jan 2038 00:00:00 GMT")
            .header(header::CACHE_CONTROL, "public, max-age=31536000"),
    };

    Ok(builder
        .body(Body::from_stream(ReaderStream::new(file)))
        .expect("response build"))
}

fn file_kind(op: GitOp) -> &'static str {
    match op {
        GitOp::HeadFile => "head",
        GitOp::Alternates => "alternates",
        GitOp::HttpAlternates => "http-alternates",
        GitOp::InfoPacks => "info-packs",
        GitOp::LooseObject => "loose-object",
        GitOp::PackFile => "pack",
        GitOp::IdxFile => "idx",
        GitOp::InfoRefs | GitOp::UploadPack | GitOp::ReceivePack => "smart",
    }
}
