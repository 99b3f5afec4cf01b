// SPDX-License-Identifier: Apache-2.0

//! Numeric ceilings with a reserved "unlimited" sentinel.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Finite values at or above this are how the backend spells "unlimited".
pub const UNLIMITED_THRESHOLD: i64 = 999_999;

/// Wire value written for [`Quota::Unlimited`].
pub const UNLIMITED_WIRE: i64 = -1;

/// A per-tier ceiling on a resource.
///
/// `Unlimited` orders above every finite value and never takes part in
/// arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Quota {
    Limited(u32),
    Unlimited,
}

impl Quota {
    pub const fn limited(value: u32) -> Self {
        Quota::Limited(value)
    }

    pub const fn is_unlimited(self) -> bool {
        matches!(self, Quota::Unlimited)
    }

    /// Finite ceiling, or `None` for unlimited.
    pub const fn limit(self) -> Option<u32> {
        match self {
            Quota::Limited(value) => Some(value),
            Quota::Unlimited => None,
        }
    }

    /// True if at least one unit can ever be consumed.
    pub const fn is_positive(self) -> bool {
        match self {
            Quota::Limited(value) => value > 0,
            Quota::Unlimited => true,
        }
    }

    /// True if consuming one more unit on top of `used` stays within the quota.
    pub const fn allows(self, used: u32) -> bool {
        match self {
            Quota::Limited(value) => used < value,
            Quota::Unlimited => true,
        }
    }

    pub const fn to_wire(self) -> i64 {
        match self {
            Quota::Limited(value) => value as i64,
            Quota::Unlimited => UNLIMITED_WIRE,
        }
    }

    /// Decodes the integer encoding used by the subscription API.
    pub fn from_wire(value: i64) -> Result<Self, crate::CoreError> {
        if value == UNLIMITED_WIRE || value >= UNLIMITED_THRESHOLD {
            return Ok(Quota::Unlimited);
        }
        u32::try_from(value)
            .map(Quota::Limited)
            .map_err(|_| crate::CoreError::InvalidQuota(value.to_string()))
    }
}

impl fmt::Display for Quota {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quota::Limited(value) => write!(f, "{}", value),
            Quota::Unlimited => f.write_str("Unlimited"),
        }
    }
}

impl Serialize for Quota {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(self.to_wire())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawQuota {
    Number(i64),
    Text(String),
}

impl<'de> Deserialize<'de> for Quota {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match RawQuota::deserialize(deserializer)? {
            RawQuota::Number(value) => Quota::from_wire(value).map_err(serde::de::Error::custom),
            RawQuota::Text(text) if text.eq_ignore_ascii_case("unlimited") => Ok(Quota::Unlimited),
            RawQuota::Text(text) => text
                .trim()
                .parse::<i64>()
                .map_err(|_| crate::CoreError::InvalidQuota(text.clone()))
                .and_then(Quota::from_wire)
                .map_err(serde::de::Error::custom),
        }
    }
}
