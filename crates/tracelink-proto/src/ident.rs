//! Short fixed-width identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ShortIdError;

/// A four-byte, zero-padded identifier (application id, context id, ECU id).
///
/// The all-zero value means "absent" and doubles as the wildcard in filter
/// predicates. Comparison is plain byte equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct ShortId([u8; 4]);

impl ShortId {
    /// The absent/wildcard identifier.
    pub const EMPTY: Self = Self([0; 4]);

    /// Build an identifier from its raw wire bytes.
    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    /// Raw wire bytes, trailing zero padding included.
    pub const fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// True for the all-zero identifier.
    pub fn is_empty(&self) -> bool {
        self.0 == [0; 4]
    }

    /// Identifier text with the zero padding stripped.
    ///
    /// Non-ASCII bytes (rare, but nothing on the wire prevents them) are
    /// replaced, so this is for display and filtering by well-formed ids.
    pub fn text(&self) -> String {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(4);
        String::from_utf8_lossy(&self.0[..end]).into_owned()
    }
}

impl FromStr for ShortId {
    type Err = ShortIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() > 4 {
            return Err(ShortIdError(s.to_owned()));
        }
        let mut bytes = [0u8; 4];
        bytes[..s.len()].copy_from_slice(s.as_bytes());
        Ok(Self(bytes))
    }
}

impl fmt::Display for ShortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}
