//! Newtype identifier for catalog entries.

use std::borrow::Borrow;

use serde::{Deserialize, Serialize};

/// Identifier of a house or add-on module (e.g. `"xsa"`).
///
/// Wraps the string key used both by the catalog data and by the selection
/// tool schema, so catalog keys can't be mixed up with arbitrary strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HouseId(String);

impl HouseId {
    /// Create a new ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the underlying string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ::core::fmt::Display for HouseId {
    fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HouseId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for HouseId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<HouseId> for String {
    fn from(id: HouseId) -> Self {
        id.0
    }
}

impl Borrow<str> for HouseId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for HouseId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
