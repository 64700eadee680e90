use crate::client::RemoteProcedureClient;
use chirp_common::{
    error::{ErrorKind, RpcError},
    model::{post::Post, user::Author},
    procedure::{CreatePost, CreatePostInput, GetAllPosts, GetPostsByUserId, UserPostsInput},
};
use std::sync::{
    Mutex, MutexGuard, PoisonError,
    atomic::{AtomicBool, Ordering},
};
use tracing::{debug, warn};

pub const DENIED_MESSAGE: &str = "You need to sign in to post.";
pub const RATE_LIMITED_MESSAGE: &str = "Too many posts! Please try again later.";
pub const FAILED_MESSAGE: &str = "Failed to post! Please try again later.";

#[derive(Clone, Eq, PartialEq, Debug)]
pub enum SubmitOutcome {
    Posted(Post),
    Skipped(SkipReason),
    Failed(SubmitFailure),
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum SkipReason {
    EmptyInput,
    AlreadyPosting,
}

/// What the composer tells the user when a post is rejected.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub enum SubmitFailure {
    Field { field: String, message: String },
    Denied,
    RateLimited,
    Failed,
}

impl SubmitFailure {
    fn from_error(error: &RpcError) -> Self {
        if let Some((field, message)) = error.any_field_error() {
            return SubmitFailure::Field {
                field: field.to_owned(),
                message: message.to_owned(),
            };
        }

        match error.kind {
            ErrorKind::Auth => SubmitFailure::Denied,
            ErrorKind::RateLimit => SubmitFailure::RateLimited,
            ErrorKind::Validation | ErrorKind::NotFound | ErrorKind::Unknown => {
                SubmitFailure::Failed
            }
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            SubmitFailure::Field { message, .. } => message,
            SubmitFailure::Denied => DENIED_MESSAGE,
            SubmitFailure::RateLimited => RATE_LIMITED_MESSAGE,
            SubmitFailure::Failed => FAILED_MESSAGE,
        }
    }
}

/// The post composer of a signed in author.
pub struct MutationController {
    client: RemoteProcedureClient,
    author: Author,
    input: Mutex<String>,
    posting: AtomicBool,
}

struct PostingGuard<'a>(&'a AtomicBool);

impl Drop for PostingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl MutationController {
    #[must_use]
    pub fn new(client: RemoteProcedureClient, author: Author) -> Self {
        Self {
            client,
            author,
            input: Mutex::new(String::new()),
            posting: AtomicBool::new(false),
        }
    }

    fn buffer(&self) -> MutexGuard<'_, String> {
        self.input.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn author(&self) -> &Author {
        &self.author
    }

    pub fn set_input(&self, input: impl Into<String>) {
        *self.buffer() = input.into();
    }

    #[must_use]
    pub fn input(&self) -> String {
        self.buffer().clone()
    }

    #[must_use]
    pub fn is_posting(&self) -> bool {
        self.posting.load(Ordering::Acquire)
    }

    /// Posts the current input.
    ///
    /// On success the input is cleared and both the global feed and the author's
    /// feed are invalidated before this returns. On failure the input is kept.
    pub async fn submit(&self) -> SubmitOutcome {
        let content = self.input();
        if content.is_empty() {
            return SubmitOutcome::Skipped(SkipReason::EmptyInput);
        }
        if self.posting.swap(true, Ordering::AcqRel) {
            debug!("Ignoring submit while a post is in flight");
            return SubmitOutcome::Skipped(SkipReason::AlreadyPosting);
        }
        let _guard = PostingGuard(&self.posting);

        match self
            .client
            .mutate::<CreatePost>(CreatePostInput { content })
            .await
        {
            Ok(post) => {
                self.buffer().clear();
                self.client.invalidate_procedure::<GetAllPosts>();
                self.client.invalidate_query::<GetPostsByUserId>(&UserPostsInput {
                    user_id: self.author.id,
                });
                debug!(post = %post.id, "Posted");
                SubmitOutcome::Posted(post)
            }
            Err(error) => {
                warn!(%error, "Post was rejected");
                SubmitOutcome::Failed(SubmitFailure::from_error(&error))
            }
        }
    }
}
