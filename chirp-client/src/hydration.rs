//! Moves settled cache entries from the server rendered page into the client cache.

use crate::cache::{CacheEntry, CacheSnapshot, QueryStatus};
use chirp_common::{error::RpcError, procedure::QueryKey};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use tracing::warn;

/// The serializable form of a [`CacheSnapshot`].
#[derive(Clone, Eq, PartialEq, Debug, Default, Serialize, Deserialize)]
pub struct DehydratedState {
    pub queries: Vec<DehydratedQuery>,
}

#[derive(Clone, Eq, PartialEq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DehydratedQuery {
    pub procedure: String,
    pub input: Value,
    pub status: QueryStatus,
    // A present `null` is data too, e.g. a user lookup that found nobody.
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    #[serde(
        default,
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<OffsetDateTime>,
}

impl DehydratedState {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

/// Only success and error entries are carried over; anything still loading is left behind.
#[must_use]
pub fn dehydrate(snapshot: &CacheSnapshot) -> DehydratedState {
    let queries = snapshot
        .iter()
        .filter(|entry| entry.status.is_settled())
        .filter_map(|entry| match entry.key.input_value() {
            Ok(input) => Some(DehydratedQuery {
                procedure: entry.key.procedure().to_owned(),
                input,
                status: entry.status,
                data: entry.data.clone(),
                error: entry.error.clone(),
                updated_at: entry.updated_at,
            }),
            Err(err) => {
                warn!(key = %entry.key, error = %err, "Skipping entry with a corrupt key");
                None
            }
        })
        .collect();

    DehydratedState { queries }
}

#[must_use]
pub fn hydrate(state: DehydratedState) -> CacheSnapshot {
    state
        .queries
        .into_iter()
        .filter(|query| query.status.is_settled())
        .map(|query| CacheEntry {
            key: QueryKey::new(query.procedure, &query.input),
            data: query.data,
            status: query.status,
            error: query.error,
            updated_at: query.updated_at,
        })
        .collect()
}
