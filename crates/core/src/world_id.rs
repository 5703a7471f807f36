//! World identifiers.
//!
//! Regions, mines and block access are all scoped by the world they live in.
//! A server may host several worlds, so every operation threads one through.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable name of a hosted world (e.g. `"mines"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorldId(String);

impl WorldId {
    /// Create a world id from its name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Canonical string key used in configs, file names and logs.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File-system safe variant of the name.
    pub fn file_stem(&self) -> String {
        self.0
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }
}

impl fmt::Display for WorldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorldId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
