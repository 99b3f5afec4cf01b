// SPDX-License-Identifier: Apache-2.0

//! Capability queries.
//!
//! Everything here is a pure function of the account tier, an optional
//! status snapshot and the current time. Server data wins over the catalog;
//! the catalog is only consulted before the first fetch or when no fetch has
//! ever succeeded.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vsentry_core::{Feature, Quota, Tier, TierCatalog};

use super::status::{Freshness, SubscriptionStatus};

/// What quota-gated actions do when the engine cannot confirm usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Allow anything the tier could allow. Server enforcement still applies.
    #[default]
    Optimistic,
    /// Deny unless the latest refresh succeeded.
    FailClosed,
}

impl FallbackPolicy {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "optimistic" => Some(Self::Optimistic),
            "fail_closed" => Some(Self::FailClosed),
            _ => None,
        }
    }

    fn permits(self, freshness: Freshness) -> bool {
        match self {
            FallbackPolicy::Optimistic => true,
            FallbackPolicy::FailClosed => freshness == Freshness::Authoritative,
        }
    }
}

/// Server snapshot to trust, if any.
fn server_status(status: Option<&SubscriptionStatus>) -> Option<&SubscriptionStatus> {
    status.filter(|s| s.freshness.is_server_data())
}

/// Tier whose entitlements currently apply, with trial expiry applied.
pub fn effective_tier(tier: Tier, status: Option<&SubscriptionStatus>, now: DateTime<Utc>) -> Tier {
    match status {
        Some(status) => status.effective_tier(now),
        None => tier,
    }
}

pub fn check_feature(
    tier: Tier,
    status: Option<&SubscriptionStatus>,
    feature: Feature,
    now: DateTime<Utc>,
) -> bool {
    match server_status(status) {
        Some(s) if s.trial_lapsed(now) => TierCatalog::limits_for(Tier::Basic).has(feature),
        Some(s) => s.limits.has(feature),
        None => TierCatalog::limits_for(effective_tier(tier, status, now)).has(feature),
    }
}

/// Lookup by wire name. Unknown names are never granted.
pub fn check_feature_named(
    tier: Tier,
    status: Option<&SubscriptionStatus>,
    name: &str,
    now: DateTime<Utc>,
) -> bool {
    Feature::from_str(name)
        .map(|feature| check_feature(tier, status, feature, now))
        .unwrap_or(false)
}

pub fn can_add_repository(
    tier: Tier,
    status: Option<&SubscriptionStatus>,
    now: DateTime<Utc>,
    policy: FallbackPolicy,
) -> bool {
    match server_status(status) {
        Some(s) if !policy.permits(s.freshness) => false,
        Some(s) if s.trial_lapsed(now) => TierCatalog::limits_for(Tier::Basic)
            .max_repositories
            .allows(s.repositories_used),
        Some(s) => s.can_add_repository,
        None => {
            policy == FallbackPolicy::Optimistic
                && TierCatalog::limits_for(effective_tier(tier, status, now))
                    .max_repositories
                    .is_positive()
        }
    }
}

pub fn can_run_scan(
    tier: Tier,
    status: Option<&SubscriptionStatus>,
    now: DateTime<Utc>,
    policy: FallbackPolicy,
) -> bool {
    match server_status(status) {
        Some(s) if !policy.permits(s.freshness) => false,
        Some(s) if s.trial_lapsed(now) => {
            let basic = TierCatalog::limits_for(Tier::Basic);
            basic.scans_per_week.allows(s.scans_this_week)
                && basic.max_scans_per_day.allows(s.scans_today)
        }
        Some(s) => s.can_run_scan,
        None => {
            let limits = TierCatalog::limits_for(effective_tier(tier, status, now));
            policy == FallbackPolicy::Optimistic
                && limits.scans_per_week.is_positive()
                && limits.max_scans_per_day.is_positive()
        }
    }
}

/// Share of `quota` consumed, in `0..=100`.
///
/// Unlimited is always 0. A zero quota is 100 once anything is used.
pub fn usage_percent(used: u32, quota: Quota) -> u8 {
    match quota {
        Quota::Unlimited => 0,
        Quota::Limited(0) => {
            if used > 0 {
                100
            } else {
                0
            }
        }
        Quota::Limited(limit) => {
            let (used, limit) = (u64::from(used), u64::from(limit));
            // round half up
            let percent = (200 * used + limit) / (2 * limit);
            percent.min(100) as u8
        }
    }
}

/// Headline usage: the larger of repository and weekly scan usage.
pub fn usage_percentage(status: &SubscriptionStatus) -> u8 {
    usage_percent(status.repositories_used, status.limits.max_repositories).max(usage_percent(
        status.scans_this_week,
        status.limits.scans_per_week,
    ))
}
