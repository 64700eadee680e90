use crate::server::ServerError;
use axum::{
    extract::FromRequest,
    response::{IntoResponse, Response},
};
use axum_extra::TypedHeader;
use headers::ContentType;
use serde::Serialize;

/// Procedure inputs and outputs. Bodies that fail to parse become [`ServerError`]s,
/// so the client gets an [`RpcError`](chirp_common::error::RpcError) body for them too.
#[derive(FromRequest, Debug, Clone, Copy, Default)]
#[from_request(via(axum::Json), rejection(ServerError))]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        serde_json::to_vec(&self.0).map_or_else(
            |err| ServerError::JsonResponse(err).into_response(),
            |body| (TypedHeader(ContentType::json()), body).into_response(),
        )
    }
}
