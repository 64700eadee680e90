use chirp_common::model::{
    ModelValidationError,
    post::{Post, PostContent},
    user::{Author, Username},
};
use sqlx::FromRow;
use time::OffsetDateTime;

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct UserRecord {
    pub user_snowflake: i64,
    pub username: String,
    pub profile_image_url: String,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, FromRow)]
pub(crate) struct PostRecord {
    pub post_snowflake: i64,
    pub content: String,
    pub created_at: OffsetDateTime,
    pub user_snowflake: i64,
}

impl TryFrom<UserRecord> for Author {
    type Error = ModelValidationError;

    fn try_from(value: UserRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.user_snowflake.cast_unsigned().into(),
            username: Username::new(value.username)?,
            profile_image_url: value.profile_image_url,
        })
    }
}

impl TryFrom<PostRecord> for Post {
    type Error = ModelValidationError;

    fn try_from(value: PostRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: value.post_snowflake.cast_unsigned().into(),
            content: PostContent::new(value.content)?,
            created_at: value.created_at,
            author_id: value.user_snowflake.cast_unsigned().into(),
        })
    }
}
