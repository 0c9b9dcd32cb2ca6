//! Renesas RZ SoCs that boot into SCIF download mode.
//!
//! The model only selects log text and defaults; every listed part speaks the
//! same Flash Writer dialect.

use crate::port::{DEFAULT_BAUD, HIGH_SPEED_BAUD};
use std::fmt;

/// Known RZ SoC models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum SocModel {
    /// RZ/G2L.
    RzG2L,
    /// RZ/G2LC.
    RzG2LC,
    /// RZ/G2UL.
    RzG2UL,
    /// RZ/V2L.
    RzV2L,
    /// RZ/A3UL.
    RzA3UL,
    /// RZ/Five.
    RzFive,
    /// RZ/G3S.
    RzG3S,
    /// Unlisted RZ part.
    #[default]
    Generic,
}

impl SocModel {
    /// Every listed model, `Generic` excluded.
    pub const ALL: &'static [Self] = &[
        Self::RzG2L,
        Self::RzG2LC,
        Self::RzG2UL,
        Self::RzV2L,
        Self::RzA3UL,
        Self::RzFive,
        Self::RzG3S,
    ];

    /// Parse a model name. Case, `/`, `-` and `_` are ignored.
    pub fn from_name(name: &str) -> Option<Self> {
        let key: String = name
            .chars()
            .filter(|c| !matches!(c, '/' | '-' | '_' | ' '))
            .collect::<String>()
            .to_lowercase();
        match key.as_str() {
            "rzg2l" => Some(Self::RzG2L),
            "rzg2lc" => Some(Self::RzG2LC),
            "rzg2ul" => Some(Self::RzG2UL),
            "rzv2l" => Some(Self::RzV2L),
            "rza3ul" => Some(Self::RzA3UL),
            "rzfive" => Some(Self::RzFive),
            "rzg3s" => Some(Self::RzG3S),
            "generic" | "auto" => Some(Self::Generic),
            _ => None,
        }
    }

    /// Rate the boot ROM starts at.
    #[must_use]
    pub fn default_baud(&self) -> u32 {
        DEFAULT_BAUD
    }

    /// Rate Flash Writer switches to on `SUP`.
    #[must_use]
    pub fn high_speed_baud(&self) -> u32 {
        HIGH_SPEED_BAUD
    }
}

impl fmt::Display for SocModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RzG2L => write!(f, "RZ/G2L"),
            Self::RzG2LC => write!(f, "RZ/G2LC"),
            Self::RzG2UL => write!(f, "RZ/G2UL"),
            Self::RzV2L => write!(f, "RZ/V2L"),
            Self::RzA3UL => write!(f, "RZ/A3UL"),
            Self::RzFive => write!(f, "RZ/Five"),
            Self::RzG3S => write!(f, "RZ/G3S"),
            Self::Generic => write!(f, "RZ (generic)"),
        }
    }
}
