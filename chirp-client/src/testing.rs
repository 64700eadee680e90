//! An in-memory stand-in for the server, used by the tests of this crate.

use crate::transport::Transport;
use async_trait::async_trait;
use chirp_common::{
    error::{ErrorKind, RpcError},
    model::{
        Id,
        post::{Post, PostContent, PostWithAuthor},
        user::{Author, Username},
    },
    procedure::{
        CreatePost, CreatePostInput, GetAllPosts, GetPostById, GetPostsByUserId,
        GetUserByUsername, PostByIdInput, Procedure, UserPostsInput, UsernameInput,
    },
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::sync::{
    Mutex, MutexGuard,
    atomic::{AtomicBool, Ordering},
};
use time::OffsetDateTime;
use tokio::sync::Semaphore;

pub const AUTHOR_ID: u64 = 1;

pub fn author() -> Author {
    Author {
        id: AUTHOR_ID.into(),
        username: Username::new("alice".to_owned()).unwrap(),
        profile_image_url: "https://img.example/alice.png".to_owned(),
    }
}

/// Lets every spawned fetch that can make progress do so.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

#[derive(Default)]
struct State {
    // Newest first.
    posts: Vec<PostWithAuthor>,
    next_id: u64,
    calls: Vec<String>,
    responses: usize,
    failure: Option<RpcError>,
}

pub struct FakeServer {
    state: Mutex<State>,
    held: AtomicBool,
    gate: Semaphore,
}

impl FakeServer {
    pub fn with_posts(count: u64) -> Self {
        let server = Self {
            state: Mutex::new(State {
                next_id: 100,
                ..State::default()
            }),
            held: AtomicBool::new(false),
            gate: Semaphore::new(0),
        };
        for i in 0..count {
            server.insert_post(&format!("post number {i}"));
        }
        server
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn insert_post(&self, content: &str) -> Post {
        let mut state = self.state();
        let post = Post {
            id: state.next_id.into(),
            content: PostContent::new(content.to_owned()).unwrap(),
            created_at: OffsetDateTime::now_utc(),
            author_id: AUTHOR_ID.into(),
        };
        state.next_id += 1;
        state
            .posts
            .insert(0, PostWithAuthor::new(post.clone(), author()).unwrap());
        post
    }

    pub fn post_count(&self) -> usize {
        self.state().posts.len()
    }

    /// Makes every call wait for a [`FakeServer::release`] before answering.
    pub fn hold_responses(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    pub fn release(&self, responses: usize) {
        self.gate.add_permits(responses);
    }

    pub fn fail_calls(&self, error: RpcError) {
        self.state().failure = Some(error);
    }

    pub fn recover(&self) {
        self.state().failure = None;
    }

    pub fn calls(&self, procedure: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| *call == procedure)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.state().calls.len()
    }

    pub fn responses(&self) -> usize {
        self.state().responses
    }

    fn answer(&self, procedure: &str, input: Value) -> Result<Value, RpcError> {
        let mut state = self.state();
        state.responses += 1;
        if let Some(failure) = &state.failure {
            return Err(failure.clone());
        }

        match procedure {
            GetAllPosts::NAME => encode(&state.posts),
            GetPostsByUserId::NAME => {
                let UserPostsInput { user_id } = decode(input)?;
                let posts: Vec<_> = state
                    .posts
                    .iter()
                    .filter(|post| post.post().author_id == user_id)
                    .collect();
                encode(&posts)
            }
            GetPostById::NAME => {
                let PostByIdInput { id } = decode(input)?;
                let post = state
                    .posts
                    .iter()
                    .find(|post| post.post().id == id)
                    .ok_or_else(|| RpcError::new(ErrorKind::NotFound, "Post not found"))?;
                encode(post)
            }
            GetUserByUsername::NAME => {
                let UsernameInput { username } = decode(input)?;
                let author = author();
                encode(&(author.username == username).then_some(author))
            }
            CreatePost::NAME => {
                let CreatePostInput { content } = decode(input)?;
                let content = PostContent::new(content)
                    .map_err(|err| RpcError::invalid_field("content", err.to_string()))?;
                drop(state);
                encode(&self.insert_post(content.get()))
            }
            _ => Err(RpcError::new(ErrorKind::NotFound, "No such procedure")),
        }
    }
}

#[async_trait]
impl Transport for FakeServer {
    async fn call(&self, procedure: &str, input: Value) -> Result<Value, RpcError> {
        self.state().calls.push(procedure.to_owned());
        if self.held.load(Ordering::SeqCst) {
            self.gate.acquire().await.unwrap().forget();
        }
        self.answer(procedure, input)
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|err| RpcError::unknown(err.to_string()))
}

fn decode<T: DeserializeOwned>(input: Value) -> Result<T, RpcError> {
    serde_json::from_value(input)
        .map_err(|err| RpcError::new(ErrorKind::Validation, err.to_string()))
}
