//! Aggregate stream identification and versioning.
//!
//! Every aggregate instance owns one event stream. `StreamId` names that
//! stream and `Version` counts the events ever appended to it. Both are
//! newtypes so they cannot be confused with plain strings or integers in
//! signatures.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Error type for [`StreamId`] parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid stream id: {0}")]
pub struct ParseStreamIdError(String);

/// Unique identifier for an aggregate instance and its event stream.
///
/// Identifiers are opaque strings; factory functions mint them with
/// [`StreamId::random`] (a UUIDv4), while rehydration and queries carry
/// them through unchanged:
///
/// ```
/// use grange_core::stream::StreamId;
///
/// let id = StreamId::random();
/// let same: StreamId = id.as_str().parse().unwrap();
/// assert_eq!(id, same);
/// ```
///
/// # Validation
///
/// - `FromStr::from_str()` rejects empty strings (use for external input)
/// - `new()` / `From` perform no validation (application-controlled data)
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StreamId(String);

impl StreamId {
    /// Create a `StreamId` from a trusted string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh random identifier (UUIDv4).
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the identifier, returning the inner `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for StreamId {
    type Err = ParseStreamIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ParseStreamIdError("stream id cannot be empty".to_string()));
        }
        Ok(Self(s.to_string()))
    }
}

impl From<String> for StreamId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for StreamId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for StreamId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Number of events appended to a stream.
///
/// A new stream is at [`Version::INITIAL`] (zero). Appending `n` events
/// moves the stream to `version + n`; versions are never decremented.
///
/// ```
/// use grange_core::stream::Version;
///
/// let v = Version::INITIAL;
/// assert_eq!(v.next(), Version::new(1));
/// assert_eq!(Version::new(4) + 3, Version::new(7));
/// ```
#[derive(
    Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Version(u64);

impl Version {
    /// The version of a stream with no events (0).
    pub const INITIAL: Self = Self(0);

    /// Create a `Version` with the given value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The raw version number.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// The next version (current + 1).
    ///
    /// Overflow at `u64::MAX` events is not a realistic concern for any
    /// event stream.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Whether this is the initial version (0), i.e. the stream is empty.
    #[must_use]
    pub const fn is_initial(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Version> for u64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

impl std::ops::Add<u64> for Version {
    type Output = Self;

    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod stream_id {
        use super::*;

        #[test]
        fn random_ids_are_distinct() {
            assert_ne!(StreamId::random(), StreamId::random());
        }

        #[test]
        #[allow(clippy::expect_used)] // Panics: test fails if parse fails
        fn parse_round_trips() {
            let id = StreamId::random();
            let parsed: StreamId = id.as_str().parse().expect("parse should succeed");
            assert_eq!(parsed, id);
        }

        #[test]
        fn parse_empty_string_fails() {
            assert!("".parse::<StreamId>().is_err());
        }

        #[test]
        fn display_matches_inner() {
            let id = StreamId::new("farm-7");
            assert_eq!(format!("{id}"), "farm-7");
            assert_eq!(id.into_inner(), "farm-7");
        }
    }

    mod version {
        use super::*;

        #[test]
        fn initial_is_zero_and_default() {
            assert_eq!(Version::INITIAL, Version::new(0));
            assert_eq!(Version::default(), Version::INITIAL);
            assert!(Version::INITIAL.is_initial());
        }

        #[test]
        fn next_and_add() {
            assert_eq!(Version::INITIAL.next(), Version::new(1));
            assert_eq!(Version::new(5) + 2, Version::new(7));
        }

        #[test]
        fn ordering() {
            assert!(Version::new(1) < Version::new(2));
            assert!(!Version::new(3).is_initial());
        }

        #[test]
        fn u64_conversions() {
            let v = Version::from(9_u64);
            let raw: u64 = v.into();
            assert_eq!(raw, 9);
            assert_eq!(v.value(), 9);
        }
    }
}
