use crate::server::ServerError;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::TypedHeader;
use chirp_common::model::{session::SessionToken, user::Author};
use chirp_db::client::Store;
use headers::{Authorization, authorization::Bearer};
use std::sync::Arc;
use tracing::debug;

type AuthorizationHeader = TypedHeader<Authorization<Bearer>>;

/// The signed in author, if the request carries a bearer session token.
///
/// A missing header means an anonymous request. A token that resolves to no user
/// rejects the request instead of silently downgrading it.
#[derive(Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct Session(pub Option<Author>);

impl<S> FromRequestParts<S> for Session
where
    Arc<dyn Store>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let header = match AuthorizationHeader::from_request_parts(parts, state).await {
            Ok(header) => header,
            Err(rejection) if rejection.is_missing() => return Ok(Self(None)),
            Err(rejection) => return Err(ServerError::InvalidAuthorizationHeader(rejection)),
        };

        let token = SessionToken::new(header.token().to_owned());
        let author = Arc::<dyn Store>::from_ref(state)
            .fetch_session_user(&token)
            .await?
            .ok_or(ServerError::InvalidToken)?;

        debug!(user = %author.id, "Authenticated request");
        Ok(Self(Some(author)))
    }
}
