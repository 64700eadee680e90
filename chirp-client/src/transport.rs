use crate::pages::PageProps;
use async_trait::async_trait;
use chirp_common::{
    error::{ErrorKind, RpcError},
    model::session::SessionToken,
};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Carries one procedure call to the server and back.
///
/// Failures reported by the server come back as the server's [`RpcError`],
/// field errors included. Everything else is wrapped into one.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn call(&self, procedure: &str, input: Value) -> Result<Value, RpcError>;
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Server replied with status {status} and no error body")]
    Status { status: StatusCode },
    #[error("Response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<TransportError> for RpcError {
    fn from(value: TransportError) -> Self {
        let kind = match &value {
            TransportError::Status { status }
                if *status == StatusCode::UNAUTHORIZED || *status == StatusCode::FORBIDDEN =>
            {
                ErrorKind::Auth
            }
            TransportError::Status { status } if *status == StatusCode::TOO_MANY_REQUESTS => {
                ErrorKind::RateLimit
            }
            TransportError::Status { status } if *status == StatusCode::NOT_FOUND => {
                ErrorKind::NotFound
            }
            _ => ErrorKind::Unknown,
        };

        RpcError::new(kind, value.to_string())
    }
}

/// Calls procedures as `POST {base_url}/rpc/{procedure}` with a JSON body.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    http: Client,
    base_url: String,
    session: Option<SessionToken>,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_owned(),
            session: None,
        }
    }

    #[must_use]
    pub fn with_session(mut self, session: SessionToken) -> Self {
        self.session = Some(session);
        self
    }

    /// Loads the props of a server generated page, e.g. `/pages/profile/@alice`.
    pub async fn page_props<Params: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<PageProps<Params>, TransportError> {
        let response = self
            .http
            .get(format!("{}{path}", self.base_url))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status { status });
        }

        Ok(serde_json::from_slice(&response.bytes().await?)?)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(&self, procedure: &str, input: Value) -> Result<Value, RpcError> {
        let mut request = self
            .http
            .post(format!("{}/rpc/{procedure}", self.base_url))
            .json(&input);
        if let Some(session) = &self.session {
            request = request.bearer_auth(session.as_str());
        }

        let response = request.send().await.map_err(TransportError::from)?;
        let status = response.status();
        let body = response.bytes().await.map_err(TransportError::from)?;
        debug!(procedure, %status, "Procedure call returned");

        if status.is_success() {
            return serde_json::from_slice(&body).map_err(|err| TransportError::from(err).into());
        }

        Err(serde_json::from_slice::<RpcError>(&body)
            .unwrap_or_else(|_| TransportError::Status { status }.into()))
    }
}

#[cfg(test)]
mod tests {
    use crate::transport::TransportError;
    use chirp_common::error::{ErrorKind, RpcError};
    use reqwest::StatusCode;

    #[test]
    fn bare_statuses_map_to_error_kinds() {
        let kind = |status| RpcError::from(TransportError::Status { status }).kind;

        assert_eq!(kind(StatusCode::UNAUTHORIZED), ErrorKind::Auth);
        assert_eq!(kind(StatusCode::TOO_MANY_REQUESTS), ErrorKind::RateLimit);
        assert_eq!(kind(StatusCode::NOT_FOUND), ErrorKind::NotFound);
        assert_eq!(kind(StatusCode::BAD_GATEWAY), ErrorKind::Unknown);
    }
}
