// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Subscription tier determines quotas and which features are available.
///
/// Ordering always goes through [`Tier::order`]; the wire names are never
/// compared as strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Basic,
    Premium,
    PremiumPlus,
}

impl Tier {
    /// Every tier, lowest first.
    pub const ALL: [Tier; 3] = [Tier::Basic, Tier::Premium, Tier::PremiumPlus];

    /// Position in the tier progression (`basic = 0`).
    pub const fn order(self) -> u8 {
        match self {
            Tier::Basic => 0,
            Tier::Premium => 1,
            Tier::PremiumPlus => 2,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Tier::Basic => "basic",
            Tier::Premium => "premium",
            Tier::PremiumPlus => "premium_plus",
        }
    }

    pub const fn display_name(self) -> &'static str {
        match self {
            Tier::Basic => "Basic",
            Tier::Premium => "Premium",
            Tier::PremiumPlus => "Premium Plus",
        }
    }

    /// Returns true if this tier includes the given tier's entitlements.
    pub fn includes(self, required: Tier) -> bool {
        self.order() >= required.order()
    }

    /// Upgrades only go strictly up the progression.
    pub fn can_upgrade_to(self, target: Tier) -> bool {
        target.order() > self.order()
    }
}

impl Default for Tier {
    fn default() -> Self {
        Tier::Basic
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Tier {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "basic" => Ok(Tier::Basic),
            "premium" => Ok(Tier::Premium),
            "premium_plus" => Ok(Tier::PremiumPlus),
            other => Err(CoreError::UnknownTier(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_hierarchy() {
        assert_eq!(Tier::Basic.order(), 0);
        assert_eq!(Tier::Premium.order(), 1);
        assert_eq!(Tier::PremiumPlus.order(), 2);

        assert!(Tier::PremiumPlus.includes(Tier::Basic));
        assert!(Tier::PremiumPlus.includes(Tier::Premium));
        assert!(Tier::Premium.includes(Tier::Premium));
        assert!(!Tier::Premium.includes(Tier::PremiumPlus));
        assert!(!Tier::Basic.includes(Tier::Premium));
    }

    #[test]
    fn all_is_ascending() {
        for pair in Tier::ALL.windows(2) {
            assert!(pair[0].order() < pair[1].order());
        }
    }

    #[test]
    fn upgrade_validation() {
        assert!(Tier::Basic.can_upgrade_to(Tier::Premium));
        assert!(Tier::Basic.can_upgrade_to(Tier::PremiumPlus));
        assert!(Tier::Premium.can_upgrade_to(Tier::PremiumPlus));

        // Same tier is not an upgrade
        assert!(!Tier::Premium.can_upgrade_to(Tier::Premium));
        // Downgrades
        assert!(!Tier::PremiumPlus.can_upgrade_to(Tier::Premium));
        assert!(!Tier::Premium.can_upgrade_to(Tier::Basic));
    }

    #[test]
    fn parsing_and_names() {
        assert_eq!("premium_plus".parse::<Tier>().unwrap(), Tier::PremiumPlus);
        assert_eq!(" basic ".parse::<Tier>().unwrap(), Tier::Basic);
        assert!(matches!(
            "gold".parse::<Tier>(),
            Err(CoreError::UnknownTier(name)) if name == "gold"
        ));
        assert_eq!(Tier::PremiumPlus.to_string(), "Premium Plus");
        assert_eq!(Tier::default(), Tier::Basic);
    }

    #[test]
    fn serialization() {
        let json = serde_json::to_string(&Tier::PremiumPlus).unwrap();
        assert_eq!(json, "\"premium_plus\"");
        let back: Tier = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Tier::PremiumPlus);
    }
}
