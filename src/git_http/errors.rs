use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

pub enum GitHttpError {
    NotFound,
    MethodNotAllowed,
    BadRequest(String),
    /// The git subprocess failed to start or exited abnormally.
    Upstream(String),
    Internal(String),
}

impl IntoResponse for GitHttpError {
    fn into_response(self) -> Response {
        match self {
            GitHttpError::NotFound => (StatusCode::NOT_FOUND, "not found").into_response(),
            GitHttpError::MethodNotAllowed => {
                (StatusCode::METHOD_NOT_ALLOWED, "method not allowed").into_response()
            }
            GitHttpError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            GitHttpError::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg).into_response(),
            GitHttpError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, msg).into_response()
            }
        }
    }
}
