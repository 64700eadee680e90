use crate::{
    cache::{CacheEntry, FetchTicket, QueryCache, QueryStatus},
    hydration::{self, DehydratedState},
    transport::Transport,
};
use chirp_common::{
    error::RpcError,
    procedure::{Procedure, QueryKey},
};
use serde_json::Value;
use std::{marker::PhantomData, sync::Arc};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Typed access to the server procedures, backed by a [`QueryCache`].
///
/// Cloning is cheap and clones share the cache. Queries spawn their fetches onto the
/// current tokio runtime, so they must be issued from inside one.
#[derive(Clone)]
pub struct RemoteProcedureClient {
    cache: Arc<QueryCache>,
    transport: Arc<dyn Transport>,
}

impl RemoteProcedureClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_cache(transport, Arc::new(QueryCache::new()))
    }

    pub fn with_cache(transport: Arc<dyn Transport>, cache: Arc<QueryCache>) -> Self {
        Self { cache, transport }
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<QueryCache> {
        &self.cache
    }

    /// Restores state prefetched by the server so the first render needs no fetch.
    pub fn hydrate(&self, state: DehydratedState) {
        self.cache.restore(hydration::hydrate(state));
    }

    /// Observes the entry for `input`, fetching it if it is not cached yet.
    pub fn query<P: Procedure>(&self, input: P::Input) -> Query<P> {
        let key = match QueryKey::for_input::<P>(&input) {
            Ok(key) => key,
            Err(err) => {
                warn!(procedure = P::NAME, error = %err, "Query input did not serialize");
                return Query::detached(CacheEntry::failure(
                    QueryKey::new(P::NAME, &Value::Null),
                    RpcError::unknown(format!("Could not encode input: {err}")),
                ));
            }
        };

        let (receiver, ticket) = self.cache.subscribe(&key);
        if let Some(ticket) = ticket {
            self.spawn_fetch(ticket);
        }

        Query {
            receiver,
            procedure: PhantomData,
        }
    }

    /// Observes the entry for `input` until it settles.
    pub async fn fetch<P: Procedure>(&self, input: P::Input) -> CacheEntry<P::Output> {
        self.query::<P>(input).settled().await
    }

    /// Calls `P` once, bypassing the cache entirely.
    pub async fn mutate<P: Procedure>(&self, input: P::Input) -> Result<P::Output, RpcError> {
        let input = serde_json::to_value(&input)
            .map_err(|err| RpcError::unknown(format!("Could not encode input: {err}")))?;

        debug!(procedure = P::NAME, "Calling procedure");
        let output = self.transport.call(P::NAME, input).await?;

        serde_json::from_value(output)
            .map_err(|err| RpcError::unknown(format!("Could not decode response: {err}")))
    }

    /// Marks entries stale. Observed entries switch to loading and fetch again.
    pub fn invalidate(&self, procedure: &str, input: Option<&Value>) {
        for ticket in self.cache.invalidate(procedure, input) {
            self.spawn_fetch(ticket);
        }
    }

    pub fn invalidate_procedure<P: Procedure>(&self) {
        self.invalidate(P::NAME, None);
    }

    pub fn invalidate_query<P: Procedure>(&self, input: &P::Input) {
        match serde_json::to_value(input) {
            Ok(input) => self.invalidate(P::NAME, Some(&input)),
            Err(err) => {
                warn!(procedure = P::NAME, error = %err, "Invalidating every input instead");
                self.invalidate(P::NAME, None);
            }
        }
    }

    /// Fetches `input` again even though it is cached.
    pub fn refetch<P: Procedure>(&self, input: &P::Input) {
        self.invalidate_query::<P>(input);
    }

    fn spawn_fetch(&self, ticket: FetchTicket) {
        let cache = Arc::clone(&self.cache);
        let transport = Arc::clone(&self.transport);

        tokio::spawn(async move {
            let mut next = Some(ticket);
            while let Some(ticket) = next {
                let result = match ticket.key().input_value() {
                    Ok(input) => {
                        debug!(key = %ticket.key(), "Fetching query");
                        transport.call(ticket.key().procedure(), input).await
                    }
                    Err(err) => Err(RpcError::unknown(format!("Corrupt query key: {err}"))),
                };
                next = cache.complete(ticket, result);
            }
        });
    }
}

/// An observer of one cache entry. Dropping it unsubscribes.
#[derive(Debug)]
pub struct Query<P: Procedure> {
    receiver: watch::Receiver<CacheEntry<Value>>,
    procedure: PhantomData<fn() -> P>,
}

impl<P: Procedure> Query<P> {
    fn detached(entry: CacheEntry<Value>) -> Self {
        Self {
            receiver: watch::channel(entry).1,
            procedure: PhantomData,
        }
    }

    #[must_use]
    pub fn key(&self) -> QueryKey {
        self.receiver.borrow().key.clone()
    }

    #[must_use]
    pub fn status(&self) -> QueryStatus {
        self.receiver.borrow().status
    }

    #[must_use]
    pub fn entry(&self) -> CacheEntry<P::Output> {
        self.receiver.borrow().decode()
    }

    /// Waits for the next change of the entry and returns it.
    ///
    /// Returns the current state right away if the entry can no longer change.
    pub async fn changed(&mut self) -> CacheEntry<P::Output> {
        if self.receiver.changed().await.is_err() {
            debug!(procedure = P::NAME, "Query entry is gone");
        }
        self.receiver.borrow_and_update().decode()
    }

    /// Waits until the entry holds a success or an error.
    pub async fn settled(&mut self) -> CacheEntry<P::Output> {
        if let Ok(entry) = self
            .receiver
            .wait_for(|entry| entry.status.is_settled())
            .await
        {
            return entry.decode();
        }
        self.entry()
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        cache::QueryStatus,
        client::RemoteProcedureClient,
        testing::{FakeServer, settle},
    };
    use chirp_common::{
        error::ErrorKind,
        procedure::{CreatePost, CreatePostInput, GetAllPosts, GetPostById, PostByIdInput},
    };
    use std::sync::Arc;

    #[tokio::test]
    async fn concurrent_queries_share_one_request() {
        let server = Arc::new(FakeServer::with_posts(2));
        server.hold_responses();
        let client = RemoteProcedureClient::new(server.clone());

        let mut first = client.query::<GetAllPosts>(());
        let mut second = client.query::<GetAllPosts>(());
        settle().await;
        assert_eq!(server.calls("posts.getAll"), 1);
        assert_eq!(first.status(), QueryStatus::Loading);

        server.release(1);
        let (first, second) = tokio::join!(first.settled(), second.settled());

        assert_eq!(server.calls("posts.getAll"), 1);
        assert_eq!(first.status, QueryStatus::Success);
        assert_eq!(first.data, second.data);
        assert_eq!(first.data.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn cached_results_are_not_fetched_again() {
        let server = Arc::new(FakeServer::with_posts(1));
        let client = RemoteProcedureClient::new(server.clone());

        let first = client.fetch::<GetAllPosts>(()).await;
        let second = client.fetch::<GetAllPosts>(()).await;

        assert_eq!(server.calls("posts.getAll"), 1);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn errors_become_error_entries() {
        let server = Arc::new(FakeServer::with_posts(0));
        let client = RemoteProcedureClient::new(server);

        let entry = client
            .fetch::<GetPostById>(PostByIdInput { id: 404.into() })
            .await;

        assert_eq!(entry.status, QueryStatus::Error);
        assert_eq!(entry.error.unwrap().kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn invalidation_while_fetching_never_lands_stale_data() {
        let server = Arc::new(FakeServer::with_posts(1));
        server.hold_responses();
        let client = RemoteProcedureClient::new(server.clone());

        let mut feed = client.query::<GetAllPosts>(());
        settle().await;

        server.insert_post("sneaky");
        client.invalidate_procedure::<GetAllPosts>();
        settle().await;
        assert_eq!(server.calls("posts.getAll"), 1, "still single flight");

        server.release(1);
        settle().await;
        assert_eq!(feed.status(), QueryStatus::Loading, "stale response discarded");
        assert_eq!(server.calls("posts.getAll"), 2);

        server.release(1);
        let entry = feed.settled().await;
        assert_eq!(entry.data.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unmounted_query_leaves_the_cache_alone() {
        let server = Arc::new(FakeServer::with_posts(1));
        server.hold_responses();
        let client = RemoteProcedureClient::new(server.clone());

        let feed = client.query::<GetAllPosts>(());
        let key = feed.key();
        settle().await;
        drop(feed);

        server.release(1);
        settle().await;
        assert_eq!(server.responses(), 1);

        let entry = client.cache().entry(&key).unwrap();
        assert_eq!(entry.status, QueryStatus::Loading);
        assert_eq!(entry.data, None);
        assert!(client.cache().snapshot().is_empty());
    }

    #[tokio::test]
    async fn mutations_bypass_the_cache() {
        let server = Arc::new(FakeServer::with_posts(0));
        let client = RemoteProcedureClient::new(server.clone());

        let post = client
            .mutate::<CreatePost>(CreatePostInput {
                content: "hello".to_owned(),
            })
            .await
            .unwrap();

        assert_eq!(post.content.get(), "hello");
        assert!(client.cache().snapshot().is_empty());
        assert_eq!(server.calls("posts.create"), 1);
    }
}
