//! The error shape shared by every procedure, on the wire and in the client cache.

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
};
use thiserror::Error;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// The input was rejected. Field level detail is in [`RpcError::field_errors`].
    Validation,
    /// The caller is not signed in, or not allowed to do this.
    Auth,
    RateLimit,
    NotFound,
    /// Anything else, including transport failures.
    Unknown,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Auth => "auth",
            ErrorKind::RateLimit => "rateLimit",
            ErrorKind::NotFound => "notFound",
            ErrorKind::Unknown => "unknown",
        })
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize, Error)]
#[serde(rename_all = "camelCase")]
#[error("{kind} error: {message}")]
pub struct RpcError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub field_errors: BTreeMap<String, Vec<String>>,
}

impl RpcError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            field_errors: BTreeMap::new(),
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }

    /// A validation error with a single field message, which also becomes the top level message.
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(ErrorKind::Validation, message.clone()).with_field_error(field, message)
    }

    #[must_use]
    pub fn with_field_error(mut self, field: impl Into<String>, message: impl Into<String>) -> Self {
        self.field_errors
            .entry(field.into())
            .or_default()
            .push(message.into());
        self
    }

    #[must_use]
    pub fn first_field_error(&self, field: &str) -> Option<&str> {
        self.field_errors
            .get(field)
            .and_then(|messages| messages.first())
            .map(String::as_str)
    }

    /// The first field message of any field, in field name order.
    #[must_use]
    pub fn any_field_error(&self) -> Option<(&str, &str)> {
        self.field_errors.iter().find_map(|(field, messages)| {
            messages
                .first()
                .map(|message| (field.as_str(), message.as_str()))
        })
    }
}
