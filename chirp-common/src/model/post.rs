use crate::model::{
    Id,
    user::{Author, UserMarker},
};
use serde::{
    Deserialize, Deserializer, Serialize,
    de::{Error as _, Unexpected},
};
use thiserror::Error;
use time::OffsetDateTime;

pub const POST_CONTENT_MAX_LEN: usize = 280;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct PostMarker;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Id<PostMarker>,
    pub content: PostContent,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub author_id: Id<UserMarker>,
}

/// A post joined with its author. Every feed procedure returns these.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
#[serde(try_from = "UncheckedPostWithAuthor")]
pub struct PostWithAuthor {
    post: Post,
    author: Author,
}

#[derive(Deserialize)]
struct UncheckedPostWithAuthor {
    post: Post,
    author: Author,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Error)]
#[error("Post {post} was written by {expected}, but author {actual} was attached")]
pub struct MismatchedAuthorError {
    pub post: Id<PostMarker>,
    pub expected: Id<UserMarker>,
    pub actual: Id<UserMarker>,
}

impl PostWithAuthor {
    pub fn new(post: Post, author: Author) -> Result<Self, MismatchedAuthorError> {
        if post.author_id == author.id {
            Ok(Self { post, author })
        } else {
            Err(MismatchedAuthorError {
                post: post.id,
                expected: post.author_id,
                actual: author.id,
            })
        }
    }

    #[must_use]
    pub fn post(&self) -> &Post {
        &self.post
    }

    #[must_use]
    pub fn author(&self) -> &Author {
        &self.author
    }

    #[must_use]
    pub fn into_parts(self) -> (Post, Author) {
        (self.post, self.author)
    }
}

impl TryFrom<UncheckedPostWithAuthor> for PostWithAuthor {
    type Error = MismatchedAuthorError;

    fn try_from(value: UncheckedPostWithAuthor) -> Result<Self, Self::Error> {
        Self::new(value.post, value.author)
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
pub enum InvalidPostContentError {
    #[error("Post content must not be empty")]
    Empty,
    #[error("Post content must be at most {POST_CONTENT_MAX_LEN} characters, got {len}")]
    TooLong { len: usize },
}

#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize)]
#[serde(transparent)]
pub struct PostContent(String);

impl PostContent {
    pub fn new(content: String) -> Result<Self, InvalidPostContentError> {
        match content.chars().count() {
            0 => Err(InvalidPostContentError::Empty),
            len if len > POST_CONTENT_MAX_LEN => Err(InvalidPostContentError::TooLong { len }),
            _ => Ok(Self(content)),
        }
    }

    #[must_use]
    pub fn get(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl<'de> Deserialize<'de> for PostContent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        PostContent::new(inner.clone())
            .map_err(|_| D::Error::invalid_value(Unexpected::Str(&inner), &"PostContent"))
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{
        Id,
        post::{InvalidPostContentError, POST_CONTENT_MAX_LEN, Post, PostContent, PostWithAuthor},
        user::{Author, Username},
    };
    use time::macros::datetime;

    fn author(id: u64) -> Author {
        Author {
            id: Id::from(id),
            username: Username::new(format!("user{id}")).unwrap(),
            profile_image_url: format!("https://img.example/{id}.png"),
        }
    }

    fn post(author_id: u64) -> Post {
        Post {
            id: Id::from(100),
            content: PostContent::new("hello".to_owned()).unwrap(),
            created_at: datetime!(2025-03-01 12:00 UTC),
            author_id: Id::from(author_id),
        }
    }

    #[test]
    fn content_length_is_counted_in_chars() {
        assert_eq!(
            PostContent::new(String::new()),
            Err(InvalidPostContentError::Empty)
        );
        assert!(PostContent::new("🦀".repeat(POST_CONTENT_MAX_LEN)).is_ok());
        assert_eq!(
            PostContent::new("🦀".repeat(POST_CONTENT_MAX_LEN + 1)),
            Err(InvalidPostContentError::TooLong {
                len: POST_CONTENT_MAX_LEN + 1
            })
        );
    }

    #[test]
    fn author_must_match_post() {
        assert!(PostWithAuthor::new(post(1), author(1)).is_ok());

        let err = PostWithAuthor::new(post(1), author(2)).unwrap_err();
        assert_eq!(err.expected, Id::from(1));
        assert_eq!(err.actual, Id::from(2));
    }

    #[test]
    fn mismatched_author_is_rejected_when_deserializing() {
        let valid = PostWithAuthor::new(post(1), author(1)).unwrap();
        let mut json = serde_json::to_value(&valid).unwrap();
        assert_eq!(json["post"]["authorId"], "1");
        assert_eq!(json["post"]["createdAt"], "2025-03-01T12:00:00Z");

        assert_eq!(
            serde_json::from_value::<PostWithAuthor>(json.clone()).unwrap(),
            valid
        );

        json["author"]["id"] = "2".into();
        assert!(serde_json::from_value::<PostWithAuthor>(json).is_err());
    }
}
