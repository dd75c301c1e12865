//! Demo static delegate.
//!
//! The production delegate (a reverse proxy or static file layer) is outside
//! the gateway; this one exists so the binary is runnable end to end. It
//! resolves the dispatcher's rewritten `/<ref>/<entry>/<rest>` paths against
//! the published symlink tree, which lives at `<app_root>/<entry>/<ref>`.
//!
//! Limitation: a ref name containing `/` is resolved as its first segment
//! only; embedders with such refs should supply their own delegate.

use axum::extract::{Request, State};
use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use tower::util::ServiceExt;
use tower_http::services::ServeDir;

use crate::state::GatewayState;

pub async fn serve_preview(State(state): State<GatewayState>, mut req: Request) -> Response {
    if let Some(rewritten) = swap_ref_and_entry(req.uri()) {
        match rewritten.parse::<Uri>() {
            Ok(uri) => *req.uri_mut() = uri,
            Err(err) => {
                tracing::debug!("preview path {rewritten:?} is not a valid URI: {err}");
                return StatusCode::NOT_FOUND.into_response();
            }
        }
    }

    match ServeDir::new(&state.config.app_root).oneshot(req).await {
        Ok(resp) => resp.into_response(),
        Err(err) => match err {},
    }
}

/// Turn `/<ref>/<entry>/<rest>` into `/<entry>/<ref>/<rest>` so the request
/// lands on the publication symlink. Paths with fewer than two segments are
/// served as-is.
fn swap_ref_and_entry(uri: &Uri) -> Option<String> {
    let path = uri.path();
    let (ref_name, rest) = path.trim_start_matches('/').split_once('/')?;
    if ref_name.is_empty() || rest.is_empty() {
        return None;
    }
    let swapped = match rest.split_once('/') {
        Some((entry, tail)) => format!("/{entry}/{ref_name}/{tail}"),
        None => format!("/{rest}/{ref_name}"),
    };
    match uri.query() {
        Some(query) => Some(format!("{swapped}?{query}")),
        None => Some(swapped),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swaps_first_two_segments() {
        let uri: Uri = "/feature-x/index.html".parse().unwrap();
        assert_eq!(
            swap_ref_and_entry(&uri).as_deref(),
            Some("/index.html/feature-x")
        );
    }

    #[test]
    fn keeps_tail_and_query() {
        let uri: Uri = "/master/assets/app.css?v=2".parse().unwrap();
        assert_eq!(
            swap_ref_and_entry(&uri).as_deref(),
            Some("/assets/master/app.css?v=2")
        );
    }

    #[test]
    fn short_paths_are_untouched() {
        for path in ["/", "/only-ref", "/ref/"] {
            let uri: Uri = path.parse().unwrap();
            assert_eq!(swap_ref_and_entry(&uri), None, "{path}");
        }
    }
}
