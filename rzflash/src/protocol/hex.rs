//! Outbound numeric encoding.
//!
//! Flash Writer reads addresses and sizes as bare uppercase hex digits. Values
//! come from configuration either as integers or as strings with or without a
//! `0x` prefix; all of them normalize to the same token.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Uppercase hex digits with no prefix, ready to send.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct HexToken(String);

impl HexToken {
    /// Encode an integer.
    pub fn from_u64(value: u64) -> Self {
        Self(format!("{value:X}"))
    }

    /// Parse a hex string, accepting an optional `0x`/`0X` prefix and `_` separators.
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let digits: String = digits.chars().filter(|c| *c != '_').collect();

        if digits.is_empty() {
            return Err(Error::Config(format!("empty hex value {text:?}")));
        }
        let value = u64::from_str_radix(&digits, 16)
            .map_err(|e| Error::Config(format!("invalid hex value {text:?}: {e}")))?;
        Ok(Self::from_u64(value))
    }

    /// Token text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric value.
    pub fn value(&self) -> u64 {
        // Always built from a parsed or formatted u64.
        u64::from_str_radix(&self.0, 16).unwrap_or_default()
    }
}

impl From<u32> for HexToken {
    fn from(value: u32) -> Self {
        Self::from_u64(u64::from(value))
    }
}

impl From<u64> for HexToken {
    fn from(value: u64) -> Self {
        Self::from_u64(value)
    }
}

impl From<usize> for HexToken {
    fn from(value: usize) -> Self {
        Self::from_u64(value as u64)
    }
}

impl FromStr for HexToken {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for HexToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_and_prefixed_string_agree() {
        let from_int = HexToken::from(0x11E00u32);
        let from_str = HexToken::parse("0x11E00").unwrap();
        assert_eq!(from_int, from_str);
        assert_eq!(from_int.as_str(), "11E00");
    }

    #[test]
    fn test_lowercase_and_unprefixed() {
        assert_eq!(HexToken::parse("11e00").unwrap().as_str(), "11E00");
        assert_eq!(HexToken::parse("0X1_1E00").unwrap().as_str(), "11E00");
    }

    #[test]
    fn test_leading_zeros_are_dropped() {
        assert_eq!(HexToken::parse("0x00000").unwrap().as_str(), "0");
        assert_eq!(HexToken::from(0u32).as_str(), "0");
    }

    #[test]
    fn test_size_of_4096_bytes() {
        assert_eq!(HexToken::from(4096usize).to_string(), "1000");
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(HexToken::parse("0x"), Err(Error::Config(_))));
        assert!(matches!(HexToken::parse("12G4"), Err(Error::Config(_))));
        assert!(matches!(HexToken::parse(""), Err(Error::Config(_))));
    }

    #[test]
    fn test_value_round_trips() {
        assert_eq!(HexToken::parse("0x11E00").unwrap().value(), 0x11E00);
    }
}
