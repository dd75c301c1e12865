//! Ref-scoped git smart HTTP gateway.
//!
//! Exposes git repositories over the smart HTTP transport (advertisement and
//! stateless-RPC exchanges delegated to the system git toolchain) and, for
//! non-protocol requests, materializes the requested ref into a checkout cache
//! and publishes it into the served hierarchy via relative symlinks.

pub mod checkout;
pub mod config;
pub mod dispatch;
pub mod git_http;
pub mod preview;
pub mod state;
pub mod validation;

pub mod test_helpers;

use axum::Router;
use axum::middleware;
use tower_http::trace::TraceLayer;

use crate::state::GatewayState;

/// Build the gateway router: the dispatcher middleware in front of the demo
/// static delegate that resolves rewritten paths against the symlink tree.
pub fn app(state: GatewayState) -> Router {
    Router::new()
        .fallback(preview::serve_preview)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            dispatch::dispatch,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
