use base64::{Engine, prelude::BASE64_URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter};

pub const SESSION_TOKEN_LEN: usize = 24;

/// Opaque bearer token handed out by the identity provider for a signed-in user.
#[derive(Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    #[must_use]
    pub fn generate_random() -> Self {
        let bytes: [u8; SESSION_TOKEN_LEN] = rand::random();
        Self(BASE64_URL_SAFE_NO_PAD.encode(bytes))
    }

    #[must_use]
    pub fn new(token: String) -> Self {
        Self(token)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Debug for SessionToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SessionToken").field(&"[redacted]").finish()
    }
}
