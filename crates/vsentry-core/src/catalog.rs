// SPDX-License-Identifier: Apache-2.0

//! Static tier catalog: the single local source of truth for per-tier quotas
//! and feature flags.
//!
//! Higher tiers must dominate lower ones: every quota is at least as large and
//! every enabled feature stays enabled. The tables below are written so that
//! each tier is built on top of the previous one's feature set.

use serde::{Deserialize, Serialize};

use crate::feature::{Feature, FeatureSet};
use crate::plan::{PlanInfo, PlanLimits, PlanPrice};
use crate::quota::Quota;
use crate::tier::Tier;

/// Quotas and features granted by one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLimits {
    pub max_repositories: Quota,
    pub scans_per_week: Quota,
    pub max_scans_per_day: Quota,
    pub history_retention_days: Quota,
    pub features: FeatureSet,
}

impl TierLimits {
    pub const fn has(&self, feature: Feature) -> bool {
        self.features.contains(feature)
    }

    /// The four numeric quotas in a fixed order.
    pub const fn quotas(&self) -> [Quota; 4] {
        [
            self.max_repositories,
            self.scans_per_week,
            self.max_scans_per_day,
            self.history_retention_days,
        ]
    }

    /// True if `self` grants at least everything `lower` grants.
    pub fn dominates(&self, lower: &TierLimits) -> bool {
        self.features.is_superset_of(lower.features)
            && self
                .quotas()
                .iter()
                .zip(lower.quotas().iter())
                .all(|(mine, theirs)| mine >= theirs)
    }
}

const BASIC_FEATURES: FeatureSet = FeatureSet::EMPTY.with(Feature::EntropyAnalysis);

const PREMIUM_FEATURES: FeatureSet = BASIC_FEATURES
    .with(Feature::SlackIntegration)
    .with(Feature::GithubAppIntegration)
    .with(Feature::MlRiskScoring)
    .with(Feature::CustomPatterns)
    .with(Feature::ApiAccess)
    .with(Feature::WebhookNotifications)
    .with(Feature::ScheduledScans)
    .with(Feature::ExportReports)
    .with(Feature::AuditLogs)
    .with(Feature::DeepScan)
    .with(Feature::PrScanning)
    .with(Feature::RealtimeAlerts);

const PREMIUM_PLUS_FEATURES: FeatureSet = FeatureSet::all();

static BASIC: TierLimits = TierLimits {
    max_repositories: Quota::limited(1),
    scans_per_week: Quota::limited(1),
    max_scans_per_day: Quota::limited(1),
    history_retention_days: Quota::limited(7),
    features: BASIC_FEATURES,
};

static PREMIUM: TierLimits = TierLimits {
    max_repositories: Quota::limited(10),
    scans_per_week: Quota::limited(50),
    max_scans_per_day: Quota::limited(10),
    history_retention_days: Quota::limited(30),
    features: PREMIUM_FEATURES,
};

static PREMIUM_PLUS: TierLimits = TierLimits {
    max_repositories: Quota::Unlimited,
    scans_per_week: Quota::Unlimited,
    max_scans_per_day: Quota::Unlimited,
    history_retention_days: Quota::limited(365),
    features: PREMIUM_PLUS_FEATURES,
};

/// Read-only access to the built-in tier table.
pub struct TierCatalog;

impl TierCatalog {
    pub fn limits_for(tier: Tier) -> &'static TierLimits {
        match tier {
            Tier::Basic => &BASIC,
            Tier::Premium => &PREMIUM,
            Tier::PremiumPlus => &PREMIUM_PLUS,
        }
    }

    pub fn order_of(tier: Tier) -> u8 {
        tier.order()
    }

    pub fn price_for(tier: Tier) -> PlanPrice {
        match tier {
            Tier::Basic => PlanPrice::usd(0, 0, "Free"),
            Tier::Premium => PlanPrice::usd(29, 290, "$29/month"),
            Tier::PremiumPlus => PlanPrice::usd(99, 990, "$99/month"),
        }
    }

    /// Display metadata for one tier, built from the local table.
    pub fn plan_for(tier: Tier) -> PlanInfo {
        let limits = Self::limits_for(tier);
        PlanInfo {
            id: tier.as_str().to_string(),
            name: tier.display_name().to_string(),
            tier,
            price: Self::price_for(tier),
            limits: PlanLimits::from(limits),
            features: limits.features,
        }
    }

    /// Every plan in tier order. Used when the plan list cannot be fetched.
    pub fn default_plans() -> Vec<PlanInfo> {
        Tier::ALL.into_iter().map(Self::plan_for).collect()
    }
}
