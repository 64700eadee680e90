use async_trait::async_trait;
use chirp_common::{
    model::{
        Id, ModelValidationError,
        post::{Post, PostContent, PostMarker},
        session::SessionToken,
        user::{Author, CreateUser, UserMarker, Username},
    },
    snowflake::SnowflakeTimestampError,
};
use thiserror::Error;

pub type Result<T, E = DbError> = std::result::Result<T, E>;

/// The most posts any feed query returns.
pub const FEED_LIMIT: usize = 100;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("An object in the database was invalid: {0}")]
    Data(#[from] ModelValidationError),
    #[error("Could not generate an id: {0}")]
    Snowflake(#[from] SnowflakeTimestampError),
    #[error("Username {} is already taken", .0.get())]
    UsernameTaken(Username),
    #[error("User with id {0} does not exist")]
    UnknownUser(Id<UserMarker>),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Persistence for posts, users and sessions.
///
/// Post lists come back newest first and hold at most `limit` posts. Posts carry
/// only their author id; joining authors on is left to the caller.
#[async_trait]
pub trait Store: Send + Sync {
    async fn fetch_recent_posts(&self, limit: usize) -> Result<Vec<Post>>;

    async fn fetch_user_posts(&self, user_id: Id<UserMarker>, limit: usize) -> Result<Vec<Post>>;

    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>>;

    async fn create_post(&self, author: Id<UserMarker>, content: &PostContent) -> Result<Post>;

    async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<Author>>;

    /// Fetches every user in `user_ids` that exists, in no particular order.
    async fn fetch_users(&self, user_ids: &[Id<UserMarker>]) -> Result<Vec<Author>>;

    async fn fetch_user_by_username(&self, username: &Username) -> Result<Option<Author>>;

    async fn create_user(&self, user: &CreateUser) -> Result<Author>;

    async fn create_session(&self, user_id: Id<UserMarker>) -> Result<SessionToken>;

    async fn fetch_session_user(&self, token: &SessionToken) -> Result<Option<Author>>;
}
