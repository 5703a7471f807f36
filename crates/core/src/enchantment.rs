//! Tool enchantments that trigger bulk block removal.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Bulk-removal enchantments a pickaxe can carry.
///
/// The set is closed: activation dispatches on the variant, never on a name lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EnchantKind {
    /// Clears the horizontal layer through the broken block.
    Jackhammer,
    /// Clears the vertical X/Y slab through the broken block.
    Laser,
    /// Clears the vertical Z/Y slab through the broken block.
    Tremor,
}

/// Plane swept by an activated enchant, always bounded by the enclosing region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SweepAxis {
    /// Every X/Z cell at the block's Y.
    Horizontal,
    /// Every X/Y cell at the block's Z.
    VerticalX,
    /// Every Z/Y cell at the block's X.
    VerticalZ,
}

/// Error returned when parsing an unknown enchant name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown enchant: {0}")]
pub struct UnknownEnchant(pub String);

impl EnchantKind {
    /// Every enchant kind, in a stable order.
    pub const ALL: [EnchantKind; 3] = [
        EnchantKind::Jackhammer,
        EnchantKind::Laser,
        EnchantKind::Tremor,
    ];

    /// Get the maximum level for this enchantment
    pub fn max_level(&self) -> u8 {
        match self {
            EnchantKind::Jackhammer => 5,
            EnchantKind::Laser => 3,
            EnchantKind::Tremor => 3,
        }
    }

    /// Plane cleared when this enchant fires.
    pub fn sweep(&self) -> SweepAxis {
        match self {
            EnchantKind::Jackhammer => SweepAxis::Horizontal,
            EnchantKind::Laser => SweepAxis::VerticalX,
            EnchantKind::Tremor => SweepAxis::VerticalZ,
        }
    }

    /// Canonical lower-case key used in configs and logs.
    pub const fn as_str(&self) -> &'static str {
        match self {
            EnchantKind::Jackhammer => "jackhammer",
            EnchantKind::Laser => "laser",
            EnchantKind::Tremor => "tremor",
        }
    }
}

impl fmt::Display for EnchantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnchantKind {
    type Err = UnknownEnchant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        EnchantKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == key)
            .ok_or_else(|| UnknownEnchant(s.to_string()))
    }
}

/// An enchantment with a specific level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Enchant {
    /// The type of enchantment
    pub kind: EnchantKind,
    /// The level of the enchantment (1 to max_level)
    pub level: u8,
}

impl Enchant {
    /// Create a new enchantment, clamping the level into `1..=max_level`.
    pub fn new(kind: EnchantKind, level: u8) -> Self {
        let level = level.clamp(1, kind.max_level());
        Self { kind, level }
    }

    /// Probability that this enchant fires on a single break.
    pub fn activation_chance(&self, chance_per_level: f64) -> f64 {
        (f64::from(self.level) * chance_per_level).clamp(0.0, 1.0)
    }
}
