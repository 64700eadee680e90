//! Server side implementations of the procedure catalogue.
//!
//! The HTTP routes and the page prefetcher both go through
//! [`ServerProcedure::call`], so a prefetched page holds exactly what a later
//! client fetch would return.

use crate::server::rate_limit::RateLimiter;
use chirp_common::{
    error::{ErrorKind, RpcError},
    model::{
        Id,
        post::{
            InvalidPostContentError, MismatchedAuthorError, Post, PostContent, PostMarker,
            PostWithAuthor,
        },
        user::{Author, UserMarker},
    },
    procedure::{
        CreatePost, CreatePostInput, GetAllPosts, GetPostById, GetPostsByUserId,
        GetUserByUsername, PostByIdInput, Procedure, UserPostsInput, UsernameInput,
    },
};
use chirp_db::client::{DbError, FEED_LIMIT, Store};
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;
use tracing::{debug, error};

/// What a procedure runs with.
#[derive(Clone)]
pub struct Context {
    pub store: Arc<dyn Store>,
    pub rate_limiter: Arc<RateLimiter>,
    pub session: Option<Author>,
}

impl Context {
    /// A context without a signed in user, as used for prefetching.
    pub fn anonymous(store: Arc<dyn Store>, rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            store,
            rate_limiter,
            session: None,
        }
    }

    fn signed_in(&self) -> Result<&Author, ProcedureError> {
        self.session.as_ref().ok_or(ProcedureError::Unauthenticated)
    }
}

#[derive(Debug, Error)]
pub enum ProcedureError {
    #[error("Post content is invalid: {0}")]
    InvalidContent(#[from] InvalidPostContentError),
    #[error("You need to be signed in to do this")]
    Unauthenticated,
    #[error("User {0} posted too often")]
    RateLimited(Id<UserMarker>),
    #[error("Post with id {0} was not found")]
    PostNotFound(Id<PostMarker>),
    #[error("Author {author} of post {post} was not found")]
    AuthorNotFound {
        post: Id<PostMarker>,
        author: Id<UserMarker>,
    },
    #[error(transparent)]
    MismatchedAuthor(#[from] MismatchedAuthorError),
    #[error(transparent)]
    Database(#[from] DbError),
}

impl ProcedureError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProcedureError::InvalidContent(_) => ErrorKind::Validation,
            ProcedureError::Unauthenticated => ErrorKind::Auth,
            ProcedureError::RateLimited(_) => ErrorKind::RateLimit,
            ProcedureError::PostNotFound(_) => ErrorKind::NotFound,
            ProcedureError::AuthorNotFound { .. }
            | ProcedureError::MismatchedAuthor(_)
            | ProcedureError::Database(_) => ErrorKind::Unknown,
        }
    }

    pub fn to_rpc_error(&self) -> RpcError {
        match self {
            ProcedureError::InvalidContent(err) => {
                RpcError::invalid_field("content", err.to_string())
            }
            ProcedureError::Database(_) => RpcError::unknown("Internal server error"),
            _ => RpcError::new(self.kind(), self.to_string()),
        }
    }
}

pub trait ServerProcedure: Procedure {
    fn call(
        ctx: &Context,
        input: Self::Input,
    ) -> impl Future<Output = Result<Self::Output, ProcedureError>> + Send;
}

/// Joins every post with its author, keeping the order of `posts`.
async fn with_authors(
    store: &dyn Store,
    posts: Vec<Post>,
) -> Result<Vec<PostWithAuthor>, ProcedureError> {
    let mut author_ids: Vec<_> = posts.iter().map(|post| post.author_id).collect();
    author_ids.sort_unstable();
    author_ids.dedup();

    let authors: HashMap<_, _> = store
        .fetch_users(&author_ids)
        .await?
        .into_iter()
        .map(|author| (author.id, author))
        .collect();

    posts
        .into_iter()
        .map(|post| {
            let Some(author) = authors.get(&post.author_id).cloned() else {
                error!(post = %post.id, author = %post.author_id, "Post author is missing");
                return Err(ProcedureError::AuthorNotFound {
                    post: post.id,
                    author: post.author_id,
                });
            };
            Ok(PostWithAuthor::new(post, author)?)
        })
        .collect()
}

impl ServerProcedure for GetAllPosts {
    async fn call(ctx: &Context, (): ()) -> Result<Vec<PostWithAuthor>, ProcedureError> {
        let posts = ctx.store.fetch_recent_posts(FEED_LIMIT).await?;
        with_authors(ctx.store.as_ref(), posts).await
    }
}

impl ServerProcedure for GetPostsByUserId {
    async fn call(
        ctx: &Context,
        UserPostsInput { user_id }: UserPostsInput,
    ) -> Result<Vec<PostWithAuthor>, ProcedureError> {
        let posts = ctx.store.fetch_user_posts(user_id, FEED_LIMIT).await?;
        with_authors(ctx.store.as_ref(), posts).await
    }
}

impl ServerProcedure for GetPostById {
    async fn call(
        ctx: &Context,
        PostByIdInput { id }: PostByIdInput,
    ) -> Result<PostWithAuthor, ProcedureError> {
        let post = ctx
            .store
            .fetch_post(id)
            .await?
            .ok_or(ProcedureError::PostNotFound(id))?;

        let mut joined = with_authors(ctx.store.as_ref(), vec![post]).await?;
        joined.pop().ok_or(ProcedureError::PostNotFound(id))
    }
}

impl ServerProcedure for CreatePost {
    async fn call(
        ctx: &Context,
        CreatePostInput { content }: CreatePostInput,
    ) -> Result<Post, ProcedureError> {
        let author = ctx.signed_in()?;
        let content = PostContent::new(content)?;

        // Sessions can outlive their user.
        ctx.store
            .fetch_user(author.id)
            .await?
            .ok_or(ProcedureError::Unauthenticated)?;
        if !ctx.rate_limiter.check(author.id) {
            return Err(ProcedureError::RateLimited(author.id));
        }

        let post = ctx.store.create_post(author.id, &content).await?;
        debug!(post = %post.id, author = %author.id, "Created post");
        Ok(post)
    }
}

impl ServerProcedure for GetUserByUsername {
    async fn call(
        ctx: &Context,
        UsernameInput { username }: UsernameInput,
    ) -> Result<Option<Author>, ProcedureError> {
        Ok(ctx.store.fetch_user_by_username(&username).await?)
    }
}
