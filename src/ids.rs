use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::SystemTime;

/// Identifier of one probe run, backed by ULID.
///
/// Sorts by creation time, so report files named after it list in run order.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct RunId(ulid::Ulid);

impl RunId {
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    /// Wall-clock time the id was minted.
    pub fn created_at(&self) -> SystemTime {
        self.0.datetime()
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RunId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RunId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(RunId(ulid::Ulid::from_string(s)?))
    }
}

impl Serialize for RunId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for RunId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse::<RunId>()
            .map_err(|_| serde::de::Error::custom("invalid run id"))
    }
}
