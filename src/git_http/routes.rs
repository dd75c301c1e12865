//! Path classification for protocol routes.
//!
//! An ordered table of (method, path-suffix pattern) entries, evaluated
//! first-match-wins against the raw request path. Everything the table does
//! not claim is a pass-through request for the checkout/preview pipeline.

use std::sync::LazyLock;

use axum::http::Method;
use regex::Regex;

/// Protocol operations the gateway understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitOp {
    /// `GET .../HEAD`: the repository's HEAD file.
    HeadFile,
    /// `GET .../info/refs`: smart advertisement.
    InfoRefs,
    /// `GET .../objects/info/alternates`
    Alternates,
    /// `GET .../objects/info/http-alternates`
    HttpAlternates,
    /// `GET .../objects/info/packs`
    InfoPacks,
    /// `GET .../objects/xx/x{38}`: loose object.
    LooseObject,
    /// `GET .../objects/pack/pack-x{40}.pack`
    PackFile,
    /// `GET .../objects/pack/pack-x{40}.idx`
    IdxFile,
    /// `POST .../git-upload-pack`: fetch RPC.
    UploadPack,
    /// `POST .../git-receive-pack`: push RPC.
    ReceivePack,
}

struct Route {
    method: Method,
    pattern: Regex,
    op: GitOp,
}

static ROUTE_TABLE: LazyLock<Vec<Route>> = LazyLock::new(|| {
    let route = |method: Method, pattern: &str, op: GitOp| Route {
        method,
        pattern: Regex::new(pattern).expect("route pattern"),
        op,
    };
    vec![
        route(Method::GET, r"/HEAD$", GitOp::HeadFile),
        route(Method::GET, r"/info/refs$", GitOp::InfoRefs),
        route(Method::GET, r"/objects/info/alternates$", GitOp::Alternates),
        route(Method::GET, r"/objects/info/http-alternates$", GitOp::HttpAlternates),
        route(Method::GET, r"/objects/info/packs$", GitOp::InfoPacks),
        route(Method::GET, r"/objects/[0-9a-f]{2}/[0-9a-f]{38}$", GitOp::LooseObject),
        route(Method::GET, r"/objects/pack/pack-[0-9a-f]{40}\.pack$", GitOp::PackFile),
        route(Method::GET, r"/objects/pack/pack-[0-9a-f]{40}\.idx$", GitOp::IdxFile),
        route(Method::POST, r"/git-upload-pack$", GitOp::UploadPack),
        route(Method::POST, r"/git-receive-pack$", GitOp::ReceivePack),
    ]
});

/// Outcome of classifying a (method, path) pair.
#[derive(Debug, PartialEq, Eq)]
pub enum Classification {
    /// A protocol route matched. `repo_prefix` is the path segment before
    /// the match start (possibly empty), `matched` the matched suffix.
    Protocol {
        op: GitOp,
        repo_prefix: String,
        matched: String,
    },
    /// A pattern matched but with the wrong method. This never falls
    /// through to pass-through handling.
    MethodMismatch { op: GitOp, allowed: Method },
    /// No protocol pattern matched; the request belongs to the
    /// checkout/preview pipeline.
    PassThrough,
}

/// Classify a request path against the route table, first match wins.
/// Method comparison is case-insensitive by construction (`Method` is
/// normalized by the HTTP layer).
pub fn classify(method: &Method, path: &str) -> Classification {
    for route in ROUTE_TABLE.iter() {
        if let Some(m) = route.pattern.find(path) {
            if *method != route.method {
                return Classification::MethodMismatch {
                    op: route.op,
                    allowed: route.method.clone(),
                };
            }
            return Classification::Protocol {
                op: route.op,
                repo_prefix: path[..m.start()].to_string(),
                matched: m.as_str().to_string(),
            };
        }
    }
    Classification::PassThrough
}
