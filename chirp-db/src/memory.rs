use crate::client::{DbError, Result, Store};
use async_trait::async_trait;
use chirp_common::{
    model::{
        ChirpSnowflakeGenerator, Id,
        post::{Post, PostContent, PostMarker},
        session::SessionToken,
        user::{Author, CreateUser, UserMarker, Username},
    },
    snowflake::WorkerId,
};
use std::{
    collections::{BTreeMap, HashMap},
    sync::{Mutex, MutexGuard, PoisonError},
};
use time::OffsetDateTime;
use tracing::debug;

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<Id<UserMarker>, Author>,
    sessions: HashMap<SessionToken, Id<UserMarker>>,
    // Keyed by id, so iterating in reverse is newest first.
    posts: BTreeMap<Id<PostMarker>, Post>,
}

/// A [`Store`] that keeps everything in process memory.
#[derive(Debug)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    snowflake_generator: Mutex<ChirpSnowflakeGenerator>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(worker_id: WorkerId) -> Self {
        Self {
            tables: Mutex::default(),
            snowflake_generator: Mutex::new(ChirpSnowflakeGenerator::new(worker_id)),
        }
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn generate_at(&self, time: OffsetDateTime) -> Result<u64> {
        let snowflake = self
            .snowflake_generator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generate_at(time.to_utc())?;

        Ok(snowflake.get())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(WorkerId::default())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn fetch_recent_posts(&self, limit: usize) -> Result<Vec<Post>> {
        Ok(self.tables().posts.values().rev().take(limit).cloned().collect())
    }

    async fn fetch_user_posts(&self, user_id: Id<UserMarker>, limit: usize) -> Result<Vec<Post>> {
        Ok(self
            .tables()
            .posts
            .values()
            .rev()
            .filter(|post| post.author_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        Ok(self.tables().posts.get(&post_id).cloned())
    }

    async fn create_post(&self, author: Id<UserMarker>, content: &PostContent) -> Result<Post> {
        let created_at = OffsetDateTime::now_utc();
        let post = Post {
            id: self.generate_at(created_at)?.into(),
            content: content.clone(),
            created_at,
            author_id: author,
        };

        let mut tables = self.tables();
        if !tables.users.contains_key(&author) {
            return Err(DbError::UnknownUser(author));
        }
        tables.posts.insert(post.id, post.clone());

        debug!(post_id = %post.id, author_id = %author, "Stored post");
        Ok(post)
    }

    async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<Author>> {
        Ok(self.tables().users.get(&user_id).cloned())
    }

    async fn fetch_users(&self, user_ids: &[Id<UserMarker>]) -> Result<Vec<Author>> {
        let tables = self.tables();
        Ok(user_ids
            .iter()
            .filter_map(|id| tables.users.get(id))
            .cloned()
            .collect())
    }

    async fn fetch_user_by_username(&self, username: &Username) -> Result<Option<Author>> {
        Ok(self
            .tables()
            .users
            .values()
            .find(|user| &user.username == username)
            .cloned())
    }

    async fn create_user(&self, user: &CreateUser) -> Result<Author> {
        let id = self.generate_at(OffsetDateTime::now_utc())?.into();

        let mut tables = self.tables();
        if tables
            .users
            .values()
            .any(|existing| existing.username == user.username)
        {
            return Err(DbError::UsernameTaken(user.username.clone()));
        }

        let author = Author {
            id,
            username: user.username.clone(),
            profile_image_url: user.profile_image_url.clone(),
        };
        tables.users.insert(id, author.clone());

        Ok(author)
    }

    async fn create_session(&self, user_id: Id<UserMarker>) -> Result<SessionToken> {
        let mut tables = self.tables();
        if !tables.users.contains_key(&user_id) {
            return Err(DbError::UnknownUser(user_id));
        }

        let token = SessionToken::generate_random();
        tables.sessions.insert(token.clone(), user_id);

        Ok(token)
    }

    async fn fetch_session_user(&self, token: &SessionToken) -> Result<Option<Author>> {
        let tables = self.tables();
        Ok(tables
            .sessions
            .get(token)
            .and_then(|user_id| tables.users.get(user_id))
            .cloned())
    }
}
