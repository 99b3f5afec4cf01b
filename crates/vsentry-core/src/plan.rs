// SPDX-License-Identifier: Apache-2.0

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::catalog::TierLimits;
use crate::feature::FeatureSet;
use crate::quota::Quota;
use crate::tier::Tier;

/// Price card for one plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanPrice {
    pub monthly: Decimal,
    pub yearly: Decimal,
    pub currency: String,
    pub label: String,
}

impl PlanPrice {
    pub fn usd(monthly: i64, yearly: i64, label: &str) -> Self {
        Self {
            monthly: Decimal::from(monthly),
            yearly: Decimal::from(yearly),
            currency: "USD".to_string(),
            label: label.to_string(),
        }
    }
}

/// Quota echo shown on plan cards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanLimits {
    pub max_repositories: Quota,
    pub scans_per_week: Quota,
    pub max_scans_per_day: Quota,
    pub history_retention_days: Quota,
}

impl From<&TierLimits> for PlanLimits {
    fn from(limits: &TierLimits) -> Self {
        Self {
            max_repositories: limits.max_repositories,
            scans_per_week: limits.scans_per_week,
            max_scans_per_day: limits.max_scans_per_day,
            history_retention_days: limits.history_retention_days,
        }
    }
}

/// Display and billing metadata for a plan. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanInfo {
    pub id: String,
    pub name: String,
    pub tier: Tier,
    pub price: PlanPrice,
    pub limits: PlanLimits,
    #[serde(default)]
    pub features: FeatureSet,
}

impl PlanInfo {
    /// Full limits for this plan, quotas and features together.
    pub fn tier_limits(&self) -> TierLimits {
        TierLimits {
            max_repositories: self.limits.max_repositories,
            scans_per_week: self.limits.scans_per_week,
            max_scans_per_day: self.limits.max_scans_per_day,
            history_retention_days: self.limits.history_retention_days,
            features: self.features,
        }
    }
}
