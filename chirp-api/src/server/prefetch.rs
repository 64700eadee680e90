use crate::server::procedures::{Context, ServerProcedure};
use chirp_client::{
    cache::{CacheEntry, QueryCache},
    hydration::{self, DehydratedState},
};
use chirp_common::procedure::{ProcedureKind, QueryKey};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PrefetchError {
    #[error("Procedure {0} is a mutation and cannot be prefetched")]
    Mutation(&'static str),
    #[error("Prefetched value could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Runs queries in process before a page is rendered and collects their results.
///
/// Failed queries are kept as error entries, so the page renders the failure
/// instead of fetching again.
pub struct ServerPrefetchHelper {
    context: Context,
    cache: QueryCache,
}

impl ServerPrefetchHelper {
    pub fn new(context: Context) -> Self {
        Self {
            context,
            cache: QueryCache::new(),
        }
    }

    pub async fn prefetch<P: ServerProcedure>(&self, input: P::Input) -> Result<(), PrefetchError> {
        if P::KIND == ProcedureKind::Mutation {
            return Err(PrefetchError::Mutation(P::NAME));
        }

        let key = QueryKey::for_input::<P>(&input)?;
        let entry = match P::call(&self.context, input).await {
            Ok(output) => CacheEntry::success(key, serde_json::to_value(output)?),
            Err(err) => {
                debug!(%key, error = %err, "Prefetched query failed");
                CacheEntry::failure(key, err.to_rpc_error())
            }
        };

        self.cache.seed(entry);
        Ok(())
    }

    pub fn dehydrate(&self) -> DehydratedState {
        hydration::dehydrate(&self.cache.snapshot())
    }
}
