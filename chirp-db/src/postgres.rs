use crate::{
    client::{DbError, Result, Store},
    record::{PostRecord, UserRecord},
};
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
use sqlx::{PgPool, postgres::PgPoolOptions, query, query_as};
use std::sync::{Mutex, PoisonError};
use time::OffsetDateTime;
use tracing::{debug, info};

pub struct PgStore {
    pool: PgPool,
    snowflake_generator: Mutex<ChirpSnowflakeGenerator>,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool, worker_id: WorkerId) -> Self {
        Self {
            pool,
            snowflake_generator: Mutex::new(ChirpSnowflakeGenerator::new(worker_id)),
        }
    }

    /// Connects to `database_url` and brings the schema up to date.
    pub async fn connect(database_url: &str, worker_id: WorkerId) -> Result<Self> {
        let pool = PgPoolOptions::new().connect(database_url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Connected to postgres and applied migrations");

        Ok(Self::new(pool, worker_id))
    }

    fn generate_at(&self, time: OffsetDateTime) -> Result<i64> {
        let snowflake = self
            .snowflake_generator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .generate_at(time.to_utc())?;

        Ok(snowflake.get().cast_signed())
    }
}

fn snowflake_param<Marker>(id: Id<Marker>) -> i64 {
    id.snowflake().get().cast_signed()
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

#[async_trait]
impl Store for PgStore {
    async fn fetch_recent_posts(&self, limit: usize) -> Result<Vec<Post>> {
        let records = query_as::<_, PostRecord>(
            "
            SELECT post_snowflake, content, created_at, user_snowflake
            FROM posts.posts
            ORDER BY created_at DESC, post_snowflake DESC
            LIMIT $1
            ",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        let posts = records
            .into_iter()
            .map(Post::try_from)
            .collect::<Result<_, _>>()?;
        Ok(posts)
    }

    async fn fetch_user_posts(&self, user_id: Id<UserMarker>, limit: usize) -> Result<Vec<Post>> {
        let records = query_as::<_, PostRecord>(
            "
            SELECT post_snowflake, content, created_at, user_snowflake
            FROM posts.posts
            WHERE user_snowflake = $1
            ORDER BY created_at DESC, post_snowflake DESC
            LIMIT $2
            ",
        )
        .bind(snowflake_param(user_id))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        let posts = records
            .into_iter()
            .map(Post::try_from)
            .collect::<Result<_, _>>()?;
        Ok(posts)
    }

    async fn fetch_post(&self, post_id: Id<PostMarker>) -> Result<Option<Post>> {
        let record = query_as::<_, PostRecord>(
            "
            SELECT post_snowflake, content, created_at, user_snowflake
            FROM posts.posts
            WHERE post_snowflake = $1
            ",
        )
        .bind(snowflake_param(post_id))
        .fetch_optional(&self.pool)
        .await?;

        let post = record.map(Post::try_from).transpose()?;
        Ok(post)
    }

    async fn create_post(&self, author: Id<UserMarker>, content: &PostContent) -> Result<Post> {
        let created_at = OffsetDateTime::now_utc();
        let post_snowflake = self.generate_at(created_at)?;

        let record = query_as::<_, PostRecord>(
            "
            INSERT INTO posts.posts (post_snowflake, content, created_at, user_snowflake)
            VALUES ($1, $2, $3, $4)
            RETURNING post_snowflake, content, created_at, user_snowflake
            ",
        )
        .bind(post_snowflake)
        .bind(content.get())
        .bind(created_at)
        .bind(snowflake_param(author))
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            if is_foreign_key_violation(&err) {
                DbError::UnknownUser(author)
            } else {
                err.into()
            }
        })?;

        debug!(post_snowflake, author_id = %author, "Stored post");
        Ok(Post::try_from(record)?)
    }

    async fn fetch_user(&self, user_id: Id<UserMarker>) -> Result<Option<Author>> {
        let record = query_as::<_, UserRecord>(
            "
            SELECT user_snowflake, username, profile_image_url
            FROM users.users
            WHERE user_snowflake = $1
            ",
        )
        .bind(snowflake_param(user_id))
        .fetch_optional(&self.pool)
        .await?;

        let user = record.map(Author::try_from).transpose()?;
        Ok(user)
    }

    async fn fetch_users(&self, user_ids: &[Id<UserMarker>]) -> Result<Vec<Author>> {
        let snowflakes: Vec<i64> = user_ids.iter().copied().map(snowflake_param).collect();

        let records = query_as::<_, UserRecord>(
            "
            SELECT user_snowflake, username, profile_image_url
            FROM users.users
            WHERE user_snowflake = ANY($1)
            ",
        )
        .bind(snowflakes)
        .fetch_all(&self.pool)
        .await?;

        let users = records
            .into_iter()
            .map(Author::try_from)
            .collect::<Result<_, _>>()?;
        Ok(users)
    }

    async fn fetch_user_by_username(&self, username: &Username) -> Result<Option<Author>> {
        let record = query_as::<_, UserRecord>(
            "
            SELECT user_snowflake, username, profile_image_url
            FROM users.users
            WHERE username = $1
            ",
        )
        .bind(username.get())
        .fetch_optional(&self.pool)
        .await?;

        let user = record.map(Author::try_from).transpose()?;
        Ok(user)
    }

    async fn create_user(&self, user: &CreateUser) -> Result<Author> {
        let user_snowflake = self.generate_at(OffsetDateTime::now_utc())?;

        let record = query_as::<_, UserRecord>(
            "
            INSERT INTO users.users (user_snowflake, username, profile_image_url)
            VALUES ($1, $2, $3)
            RETURNING user_snowflake, username, profile_image_url
            ",
        )
        .bind(user_snowflake)
        .bind(user.username.get())
        .bind(&user.profile_image_url)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                DbError::UsernameTaken(user.username.clone())
            } else {
                err.into()
            }
        })?;

        Ok(Author::try_from(record)?)
    }

    async fn create_session(&self, user_id: Id<UserMarker>) -> Result<SessionToken> {
        let token = SessionToken::generate_random();

        query(
            "
            INSERT INTO users.sessions (token, user_snowflake)
            VALUES ($1, $2)
            ",
        )
        .bind(token.as_str())
        .bind(snowflake_param(user_id))
        .execute(&self.pool)
        .await
        .map_err(|err| {
            if is_foreign_key_violation(&err) {
                DbError::UnknownUser(user_id)
            } else {
                err.into()
            }
        })?;

        Ok(token)
    }

    async fn fetch_session_user(&self, token: &SessionToken) -> Result<Option<Author>> {
        let record = query_as::<_, UserRecord>(
            "
            SELECT users.user_snowflake, users.username, users.profile_image_url
            FROM users.sessions NATURAL JOIN users.users
            WHERE sessions.token = $1
            ",
        )
        .bind(token.as_str())
        .fetch_optional(&self.pool)
        .await?;

        let user = record.map(Author::try_from).transpose()?;
        Ok(user)
    }
}
