//! Serialization helper type - byte counts with optional SI suffixes
// (c) 2024 sendplz contributors

use std::{fmt, ops::Deref, str::FromStr};

use anyhow::Context as _;
use human_repr::HumanCount as _;
use humanize_rs::bytes::Bytes;
use serde::{
    de::{self, Visitor},
    Serialize,
};

/// A byte count which may also be expressed using engineering prefixes (k, M, G, etc).
/// For example, `1k` and `1000` are the same.
///
/// In a configuration file this may be given as an integer or as a string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(into = "u64")]
pub struct ByteCount(u64);

impl ByteCount {
    /// standard constructor
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }
}

impl Deref for ByteCount {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<ByteCount> for u64 {
    fn from(value: ByteCount) -> Self {
        value.0
    }
}

impl From<u64> for ByteCount {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl FromStr for ByteCount {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = Bytes::from_str(s)
            .with_context(|| format!("`{s}` is not a byte count (try e.g. 8388608 or 8M)"))?;
        Ok(Self::new(bytes.size()))
    }
}

impl fmt::Display for ByteCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.human_count_bytes())
    }
}

struct ByteCountVisitor;

impl Visitor<'_> for ByteCountVisitor {
    type Value = ByteCount;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a byte count, as an integer or a string like \"8M\"")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<ByteCount, E> {
        ByteCount::from_str(value).map_err(de::Error::custom)
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<ByteCount, E> {
        Ok(value.into())
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<ByteCount, E> {
        u64::try_from(value)
            .map(ByteCount::new)
            .map_err(de::Error::custom)
    }
}

impl<'de> serde::Deserialize<'de> for ByteCount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_any(ByteCountVisitor)
    }
}
