use crate::server::{
    json::Json, pages::PageError, procedures::ProcedureError, rate_limit::RateLimiter,
};
use axum::{
    Router,
    extract::{
        FromRef, Request,
        rejection::{JsonRejection, PathRejection},
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};
use axum_extra::typed_header::TypedHeaderRejection;
use chirp_common::error::{ErrorKind, RpcError};
use chirp_db::client::{DbError, Store};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

pub mod auth;
mod json;
pub mod pages;
pub mod prefetch;
pub mod procedures;
pub mod rate_limit;
mod routes;

pub type ServerRouter = Router<ServerState>;

#[derive(Clone, FromRef)]
pub struct ServerState {
    pub store: Arc<dyn Store>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl ServerState {
    pub fn new(store: Arc<dyn Store>, rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            store,
            rate_limiter,
        }
    }
}

/// Every route of the server, ready to be served.
pub fn app(state: ServerState) -> Router {
    routes::routes().fallback(fallback).with_state(state)
}

pub async fn fallback(request: Request) -> ServerError {
    ServerError::UnknownRoute(request.into_parts().0.uri)
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unknown route requested: {0}")]
    UnknownRoute(Uri),
    #[error("Path rejected: {0}")]
    PathRejection(#[from] PathRejection),
    #[error("Incoming JSON rejected: {0}")]
    JsonRejection(#[from] JsonRejection),
    #[error("JSON response could not be serialized: {0}")]
    JsonResponse(#[from] serde_json::Error),
    #[error("Authorization header was invalid: {0}")]
    InvalidAuthorizationHeader(TypedHeaderRejection),
    #[error("Provided session token was invalid")]
    InvalidToken,
    #[error(transparent)]
    Database(#[from] DbError),
    #[error(transparent)]
    Procedure(#[from] ProcedureError),
    #[error("Page could not be generated: {0}")]
    Page(#[from] PageError),
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::UnknownRoute(_) | ServerError::PathRejection(_) => StatusCode::NOT_FOUND,
            ServerError::JsonRejection(_) | ServerError::InvalidAuthorizationHeader(_) => {
                StatusCode::BAD_REQUEST
            }
            ServerError::InvalidToken => StatusCode::UNAUTHORIZED,
            ServerError::Procedure(err) => status_for(err.kind()),
            ServerError::JsonResponse(_) | ServerError::Database(_) | ServerError::Page(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// The error as the client sees it.
    pub fn to_rpc_error(&self) -> RpcError {
        match self {
            ServerError::Procedure(err) => err.to_rpc_error(),
            ServerError::UnknownRoute(_) | ServerError::PathRejection(_) => {
                RpcError::new(ErrorKind::NotFound, self.to_string())
            }
            ServerError::JsonRejection(_) | ServerError::InvalidAuthorizationHeader(_) => {
                RpcError::new(ErrorKind::Validation, self.to_string())
            }
            ServerError::InvalidToken => RpcError::new(ErrorKind::Auth, self.to_string()),
            ServerError::JsonResponse(_) | ServerError::Database(_) | ServerError::Page(_) => {
                RpcError::unknown("Internal server error")
            }
        }
    }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Auth => StatusCode::UNAUTHORIZED,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::RateLimit => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            error!(error = %self, %status, "Replying with error");
        } else {
            debug!(error = %self, %status, "Rejecting request");
        }

        (status, Json(self.to_rpc_error())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use crate::server::{ServerError, procedures::ProcedureError};
    use axum::http::StatusCode;
    use chirp_common::{error::ErrorKind, model::post::InvalidPostContentError};

    #[test]
    fn procedure_errors_keep_their_kind_and_status() {
        let error = ServerError::from(ProcedureError::from(InvalidPostContentError::TooLong {
            len: 300,
        }));

        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
        let rpc = error.to_rpc_error();
        assert_eq!(rpc.kind, ErrorKind::Validation);
        assert!(rpc.first_field_error("content").is_some());

        let error = ServerError::from(ProcedureError::Unauthenticated);
        assert_eq!(error.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(error.to_rpc_error().kind, ErrorKind::Auth);
    }

    #[test]
    fn internal_errors_do_not_leak_details() {
        let error = ServerError::from(serde_json::from_str::<u8>("nope").unwrap_err());

        assert_eq!(error.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.to_rpc_error().message, "Internal server error");
    }
}
