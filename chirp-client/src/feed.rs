use crate::{
    cache::{CacheEntry, QueryStatus},
    client::{Query, RemoteProcedureClient},
};
use chirp_common::{
    error::RpcError,
    model::{Id, post::PostWithAuthor, user::UserMarker},
    procedure::{GetAllPosts, GetPostsByUserId, UserPostsInput},
};

/// Which collection a feed shows.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum FeedSource {
    Global,
    Author(Id<UserMarker>),
}

#[derive(Clone, Eq, PartialEq, Debug)]
pub enum FeedState {
    Loading,
    Empty,
    Error(RpcError),
    /// Posts in the order the server returned them.
    Ready(Vec<PostWithAuthor>),
}

impl FeedState {
    fn from_entry(entry: CacheEntry<Vec<PostWithAuthor>>) -> Self {
        match entry.status {
            QueryStatus::Idle | QueryStatus::Loading => FeedState::Loading,
            QueryStatus::Error => FeedState::Error(
                entry
                    .error
                    .unwrap_or_else(|| RpcError::unknown("Failed to load posts")),
            ),
            QueryStatus::Success => match entry.data {
                Some(posts) if !posts.is_empty() => FeedState::Ready(posts),
                _ => FeedState::Empty,
            },
        }
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        matches!(self, FeedState::Loading)
    }
}

enum FeedQuery {
    Global(Query<GetAllPosts>),
    Author(Query<GetPostsByUserId>),
}

/// Renders one post collection. Dropping the controller unmounts it.
pub struct FeedController {
    source: FeedSource,
    query: FeedQuery,
}

impl FeedController {
    pub fn mount(client: &RemoteProcedureClient, source: FeedSource) -> Self {
        let query = match source {
            FeedSource::Global => FeedQuery::Global(client.query::<GetAllPosts>(())),
            FeedSource::Author(user_id) => {
                FeedQuery::Author(client.query::<GetPostsByUserId>(UserPostsInput { user_id }))
            }
        };

        Self { source, query }
    }

    #[must_use]
    pub fn source(&self) -> FeedSource {
        self.source
    }

    #[must_use]
    pub fn state(&self) -> FeedState {
        FeedState::from_entry(match &self.query {
            FeedQuery::Global(query) => query.entry(),
            FeedQuery::Author(query) => query.entry(),
        })
    }

    /// Waits for the underlying entry to change and returns the new state.
    pub async fn next_state(&mut self) -> FeedState {
        FeedState::from_entry(match &mut self.query {
            FeedQuery::Global(query) => query.changed().await,
            FeedQuery::Author(query) => query.changed().await,
        })
    }

    /// Waits until the feed is no longer loading.
    pub async fn settled(&mut self) -> FeedState {
        FeedState::from_entry(match &mut self.query {
            FeedQuery::Global(query) => query.settled().await,
            FeedQuery::Author(query) => query.settled().await,
        })
    }
}
