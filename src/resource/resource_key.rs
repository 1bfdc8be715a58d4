//! Composite identifier of a resource inside a package.
//! Also known as a TGI: type, group, instance.

use lazy_regex::regex_captures;
use std::fmt;
use std::fmt::{Debug, Formatter};
use std::hash::Hash;
use std::str::FromStr;
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
#[cfg(feature = "serde")]
use serde_hex::{SerHex, StrictPfx};

#[derive(Error, Debug)]
pub enum ResourceKeyError {
    #[error("Cannot parse {} to a resource key", _0)]
    ParseError(String),
}

/// Identifies a resource by type, group and instance.
///
/// Keys order lexicographically by type, then group, then instance.
#[derive(Default, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ResourceKey {
    #[cfg_attr(feature = "serde", serde(with = "SerHex::<StrictPfx>"))]
    pub resource_type: u32,
    #[cfg_attr(feature = "serde", serde(with = "SerHex::<StrictPfx>"))]
    pub resource_group: u32,
    #[cfg_attr(feature = "serde", serde(with = "SerHex::<StrictPfx>"))]
    pub instance: u64,
}

impl ResourceKey {
    pub const fn new(resource_type: u32, resource_group: u32, instance: u64) -> Self {
        Self {
            resource_type,
            resource_group,
            instance,
        }
    }

    pub fn to_hex_string(&self) -> String {
        format!(
            "T=0x{:08X},G=0x{:08X},I=0x{:016X}",
            self.resource_type, self.resource_group, self.instance
        )
    }

    /// Parses the form produced by [ResourceKey::to_hex_string].
    /// The `0x` prefixes are optional and hex digits are case-insensitive.
    pub fn from_hex_string(hex_string: &str) -> Result<Self, ResourceKeyError> {
        let parse_error = || ResourceKeyError::ParseError(hex_string.to_string());

        let (_, t, g, i) = regex_captures!(
            r"^\s*T=(?:0x)?([0-9a-fA-F]{1,8})\s*,\s*G=(?:0x)?([0-9a-fA-F]{1,8})\s*,\s*I=(?:0x)?([0-9a-fA-F]{1,16})\s*$",
            hex_string
        )
        .ok_or_else(parse_error)?;

        Ok(Self {
            resource_type: u32::from_str_radix(t, 16).map_err(|_| parse_error())?,
            resource_group: u32::from_str_radix(g, 16).map_err(|_| parse_error())?,
            instance: u64::from_str_radix(i, 16).map_err(|_| parse_error())?,
        })
    }
}

impl FromStr for ResourceKey {
    type Err = ResourceKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex_string(s)
    }
}

impl From<(u32, u32, u64)> for ResourceKey {
    fn from((resource_type, resource_group, instance): (u32, u32, u64)) -> Self {
        Self::new(resource_type, resource_group, instance)
    }
}

impl Debug for ResourceKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex_string())
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.to_hex_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;

    #[test]
    fn test_key_hex_string() {
        let key = ResourceKey::new(0x034AEECB, 0x80000001, 0x00B2D882BEEF);
        assert_eq!(
            key.to_hex_string(),
            "T=0x034AEECB,G=0x80000001,I=0x000000B2D882BEEF"
        );
        assert_eq!(key.to_string(), key.to_hex_string());
    }

    #[test]
    fn test_key_parsing() {
        let key = ResourceKey::new(0x034AEECB, 0x80000001, 0x00B2D882BEEF);
        assert_eq!(
            ResourceKey::from_str(&key.to_hex_string()).unwrap(),
            key
        );
        assert_eq!(
            "T=34aeecb, G=80000001, I=b2d882beef".parse::<ResourceKey>().unwrap(),
            key
        );
        assert!("T=0x1,G=0x2".parse::<ResourceKey>().is_err());
        assert!("T=0x123456789,G=0x2,I=0x3".parse::<ResourceKey>().is_err());
    }

    #[test]
    fn test_key_ordering_is_type_group_instance() {
        let keys = vec![
            ResourceKey::new(2, 0, 0),
            ResourceKey::new(1, 1, 0),
            ResourceKey::new(1, 0, 5),
            ResourceKey::new(1, 0, 3),
        ];
        let sorted = keys.into_iter().sorted().collect::<Vec<_>>();
        assert_eq!(
            sorted,
            vec![
                ResourceKey::new(1, 0, 3),
                ResourceKey::new(1, 0, 5),
                ResourceKey::new(1, 1, 0),
                ResourceKey::new(2, 0, 0),
            ]
        );
    }

    #[test]
    fn test_key_equality_uses_all_fields() {
        let key = ResourceKey::new(1, 2, 3);
        assert_eq!(key, ResourceKey::from((1, 2, 3)));
        assert_ne!(key, ResourceKey::new(1, 2, 4));
        assert_ne!(key, ResourceKey::new(1, 3, 3));
        assert_ne!(key, ResourceKey::new(0, 2, 3));
    }
}
