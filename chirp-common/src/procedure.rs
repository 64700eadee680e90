//! The procedure catalogue shared by server and client.
//!
//! Each procedure is a zero sized type naming its wire name, its input and its
//! output. Both the HTTP client and the in-process prefetcher derive cache keys
//! from the same [`QueryKey::for_input`], so a prefetched entry is found again
//! by the client after hydration.

use crate::model::{
    Id,
    post::{Post, PostMarker, PostWithAuthor},
    user::{Author, UserMarker, Username},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::fmt::{Display, Formatter};

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub enum ProcedureKind {
    Query,
    Mutation,
}

pub trait Procedure: Send + Sync + 'static {
    const NAME: &'static str;
    const KIND: ProcedureKind;

    type Input: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;
    type Output: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;
}

/// Identifies one cache entry: a procedure name plus its input in canonical JSON.
///
/// `serde_json` keeps object keys sorted, so equal inputs always produce equal keys.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Serialize, Deserialize)]
pub struct QueryKey {
    procedure: String,
    input: String,
}

impl QueryKey {
    pub fn new(procedure: impl Into<String>, input: &Value) -> Self {
        Self {
            procedure: procedure.into(),
            input: input.to_string(),
        }
    }

    pub fn for_input<P: Procedure>(input: &P::Input) -> Result<Self, serde_json::Error> {
        Ok(Self::new(P::NAME, &serde_json::to_value(input)?))
    }

    #[must_use]
    pub fn procedure(&self) -> &str {
        &self.procedure
    }

    #[must_use]
    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn input_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_str(&self.input)
    }

    /// Whether this key belongs to `procedure` and, if given, has exactly this input.
    #[must_use]
    pub fn matches(&self, procedure: &str, input: Option<&Value>) -> bool {
        self.procedure == procedure && input.is_none_or(|input| self.input == input.to_string())
    }
}

impl Display for QueryKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.procedure, self.input)
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct GetAllPosts;

impl Procedure for GetAllPosts {
    const NAME: &'static str = "posts.getAll";
    const KIND: ProcedureKind = ProcedureKind::Query;

    type Input = ();
    type Output = Vec<PostWithAuthor>;
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct GetPostsByUserId;

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPostsInput {
    pub user_id: Id<UserMarker>,
}

impl Procedure for GetPostsByUserId {
    const NAME: &'static str = "posts.getPostsByUserId";
    const KIND: ProcedureKind = ProcedureKind::Query;

    type Input = UserPostsInput;
    type Output = Vec<PostWithAuthor>;
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct GetPostById;

#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
pub struct PostByIdInput {
    pub id: Id<PostMarker>,
}

impl Procedure for GetPostById {
    const NAME: &'static str = "posts.getById";
    const KIND: ProcedureKind = ProcedureKind::Query;

    type Input = PostByIdInput;
    type Output = PostWithAuthor;
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct CreatePost;

/// Raw content, validated on the server so it can report field level errors.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
pub struct CreatePostInput {
    pub content: String,
}

impl Procedure for CreatePost {
    const NAME: &'static str = "posts.create";
    const KIND: ProcedureKind = ProcedureKind::Mutation;

    type Input = CreatePostInput;
    type Output = Post;
}

#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct GetUserByUsername;

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize, Deserialize)]
pub struct UsernameInput {
    pub username: Username,
}

impl Procedure for GetUserByUsername {
    const NAME: &'static str = "profile.getUserByUsername";
    const KIND: ProcedureKind = ProcedureKind::Query;

    type Input = UsernameInput;
    type Output = Option<Author>;
}

#[cfg(test)]
mod tests {
    use crate::{
        model::Id,
        procedure::{GetAllPosts, GetPostsByUserId, QueryKey, UserPostsInput},
    };
    use serde_json::json;

    #[test]
    fn keys_are_derived_from_name_and_input() {
        let global = QueryKey::for_input::<GetAllPosts>(&()).unwrap();
        assert_eq!(global.procedure(), "posts.getAll");
        assert_eq!(global.input(), "null");

        let by_user = QueryKey::for_input::<GetPostsByUserId>(&UserPostsInput {
            user_id: Id::from(5),
        })
        .unwrap();
        assert_eq!(by_user, QueryKey::new("posts.getPostsByUserId", &json!({ "userId": "5" })));
        assert_eq!(by_user.to_string(), r#"posts.getPostsByUserId({"userId":"5"})"#);
    }

    #[test]
    fn key_derivation_ignores_field_order() {
        let first = QueryKey::new("p", &json!({ "a": 1, "b": 2 }));
        let second = QueryKey::new("p", &serde_json::from_str(r#"{"b":2,"a":1}"#).unwrap());

        assert_eq!(first, second);
    }

    #[test]
    fn keys_match_procedure_and_optional_input() {
        let key = QueryKey::new("posts.getPostsByUserId", &json!({ "userId": "5" }));

        assert!(key.matches("posts.getPostsByUserId", None));
        assert!(key.matches("posts.getPostsByUserId", Some(&json!({ "userId": "5" }))));
        assert!(!key.matches("posts.getPostsByUserId", Some(&json!({ "userId": "6" }))));
        assert!(!key.matches("posts.getAll", None));
    }
}
