pub mod post;
pub mod session;
pub mod user;

use crate::{
    model::{
        post::{InvalidPostContentError, MismatchedAuthorError},
        user::InvalidUsernameError,
    },
    snowflake::{Epoch, Snowflake, SnowflakeGenerator},
};
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{Error, Unexpected},
};
use std::{fmt::Display, marker::PhantomData, num::ParseIntError, str::FromStr};
use thiserror::Error;
use time::{UtcDateTime, macros::utc_datetime};

#[derive(Clone, Eq, PartialEq, Debug, Hash, Error)]
pub enum ModelValidationError {
    #[error(transparent)]
    Username(#[from] InvalidUsernameError),
    #[error(transparent)]
    PostContent(#[from] InvalidPostContentError),
    #[error(transparent)]
    MismatchedAuthor(#[from] MismatchedAuthorError),
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct ChirpEpoch;
impl Epoch for ChirpEpoch {
    const EPOCH_TIME: UtcDateTime = utc_datetime!(2025-01-01 00:00);
}

pub type ChirpSnowflake = Snowflake<ChirpEpoch>;
pub type ChirpSnowflakeGenerator = SnowflakeGenerator<ChirpEpoch>;

/// A snowflake id tagged with the kind of object it identifies.
///
/// On the wire ids are decimal strings, so clients never have to care about
/// integer precision.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct Id<Marker>(ChirpSnowflake, PhantomData<Marker>);

#[derive(Clone, Eq, PartialEq, Debug, Error)]
#[error("Invalid id: {0}")]
pub struct InvalidIdError(#[from] ParseIntError);

impl<Marker> Id<Marker> {
    #[must_use]
    pub fn new(snowflake: ChirpSnowflake) -> Self {
        Self(snowflake, PhantomData)
    }

    #[must_use]
    pub fn snowflake(self) -> ChirpSnowflake {
        self.0
    }

    #[must_use]
    pub fn created_at(self) -> UtcDateTime {
        self.0.timestamp()
    }
}

impl<Marker> Display for Id<Marker> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<Marker> FromStr for Id<Marker> {
    type Err = InvalidIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s.parse()?))
    }
}

impl<Marker> Serialize for Id<Marker> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&self.0)
    }
}

impl<'de, Marker> Deserialize<'de> for Id<Marker> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let inner = String::deserialize(deserializer)?;
        inner
            .parse()
            .map_err(|_| Error::invalid_value(Unexpected::Str(&inner), &"a decimal id string"))
    }
}

impl<Marker> From<ChirpSnowflake> for Id<Marker> {
    fn from(value: ChirpSnowflake) -> Self {
        Self::new(value)
    }
}

impl<Marker> From<u64> for Id<Marker> {
    fn from(value: u64) -> Self {
        Id::new(ChirpSnowflake::new(value))
    }
}

impl<Marker> From<Id<Marker>> for u64 {
    fn from(value: Id<Marker>) -> Self {
        value.snowflake().get()
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{Id, post::PostMarker};

    #[test]
    fn id_serializes_as_string() {
        let id = Id::<PostMarker>::from(42);

        assert_eq!(serde_json::to_string(&id).unwrap(), r#""42""#);
        assert_eq!(serde_json::from_str::<Id<PostMarker>>(r#""42""#).unwrap(), id);
        assert!(serde_json::from_str::<Id<PostMarker>>("42").is_err());
        assert!(serde_json::from_str::<Id<PostMarker>>(r#""forty-two""#).is_err());
    }

    #[test]
    fn id_parses_route_parameters() {
        assert_eq!("7".parse::<Id<PostMarker>>(), Ok(Id::from(7)));
        assert!("".parse::<Id<PostMarker>>().is_err());
        assert!("-1".parse::<Id<PostMarker>>().is_err());
    }
}
