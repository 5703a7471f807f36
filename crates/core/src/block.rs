//! Block type names.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the empty block.
pub const AIR: &str = "AIR";

/// Block used when a mine palette would otherwise be empty.
pub const DEFAULT_MINE_BLOCK: &str = "STONE";

/// Upper-case block type name such as `STONE` or `DIAMOND_ORE`.
///
/// Names are trimmed and upper-cased on construction, so `"stone"` and
/// `" STONE "` compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct BlockType(String);

impl BlockType {
    /// Normalise and wrap a block name.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().trim().to_ascii_uppercase())
    }

    /// The empty block.
    pub fn air() -> Self {
        Self(AIR.to_string())
    }

    /// Fallback palette entry for mines.
    pub fn default_mine_block() -> Self {
        Self(DEFAULT_MINE_BLOCK.to_string())
    }

    /// Whether this is air (or an empty name, which is treated as air).
    pub fn is_air(&self) -> bool {
        self.0.is_empty() || self.0 == AIR
    }

    /// Canonical name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for BlockType {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for BlockType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<BlockType> for String {
    fn from(value: BlockType) -> Self {
        value.0
    }
}
