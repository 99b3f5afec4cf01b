// SPDX-License-Identifier: Apache-2.0

//! Entitlement state as seen by the client.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use vsentry_core::{PlanInfo, Tier, TierCatalog, TierLimits};

use super::resolver;
use super::trial::TrialState;
use crate::backend::StatusResponse;

/// How much a [`SubscriptionStatus`] can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    /// Fetched from the backend by the latest refresh.
    Authoritative,
    /// Last-known-good backend data; the latest refresh failed.
    Stale,
    /// Computed locally from the tier catalog. No backend data exists.
    Fallback,
}

impl Freshness {
    /// Backend data, current or last-known-good.
    pub fn is_server_data(self) -> bool {
        !matches!(self, Freshness::Fallback)
    }
}

impl fmt::Display for Freshness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Freshness::Authoritative => "authoritative",
            Freshness::Stale => "stale",
            Freshness::Fallback => "fallback",
        })
    }
}

/// Identity record supplied by the auth collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub user_id: String,
    pub email: String,
    pub subscription_tier: Tier,
    #[serde(default)]
    pub is_trial: bool,
    #[serde(default)]
    pub trial_ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub subscription_started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub subscription_expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scans_this_week: u32,
    #[serde(default)]
    pub scans_today: u32,
}

impl Account {
    pub fn new(user_id: impl Into<String>, email: impl Into<String>, tier: Tier) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
            subscription_tier: tier,
            is_trial: false,
            trial_ends_at: None,
            subscription_started_at: None,
            subscription_expires_at: None,
            scans_this_week: 0,
            scans_today: 0,
        }
    }

    pub fn trial_state(&self, now: DateTime<Utc>) -> TrialState {
        TrialState::evaluate(self.is_trial, self.trial_ends_at, now)
    }

    /// The permanent plan, ignoring any trial elevation.
    pub fn base_tier(&self) -> Tier {
        if self.is_trial {
            Tier::Basic
        } else {
            self.subscription_tier
        }
    }

    /// Tier to apply when no server snapshot exists.
    pub fn effective_tier(&self, now: DateTime<Utc>) -> Tier {
        effective_tier(self.subscription_tier, self.is_trial, self.trial_ends_at, now)
    }
}

fn effective_tier(
    tier: Tier,
    is_trial: bool,
    trial_ends_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Tier {
    if is_trial && !TrialState::evaluate(is_trial, trial_ends_at, now).is_active() {
        Tier::Basic
    } else {
        tier
    }
}

/// One account's entitlement state. Replaced as a whole, never patched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionStatus {
    pub tier: Tier,
    pub tier_display_name: String,
    pub is_trial: bool,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub subscription_started_at: Option<DateTime<Utc>>,
    pub subscription_expires_at: Option<DateTime<Utc>>,

    pub repositories_used: u32,
    pub scans_this_week: u32,
    pub scans_today: u32,
    pub limits: TierLimits,

    pub can_add_repository: bool,
    pub can_run_scan: bool,
    pub usage_percentage: u8,

    pub freshness: Freshness,
    pub fetched_at: DateTime<Utc>,
}

impl SubscriptionStatus {
    /// Converts a backend response. Features and history retention come
    /// from the response when sent, else from the matching plan, else from
    /// the catalog.
    pub fn from_response(resp: StatusResponse, plans: &[PlanInfo], now: DateTime<Utc>) -> Self {
        let base = plans
            .iter()
            .find(|plan| plan.tier == resp.tier)
            .map(PlanInfo::tier_limits)
            .unwrap_or(*TierCatalog::limits_for(resp.tier));

        let limits = TierLimits {
            max_repositories: resp.repositories_limit,
            scans_per_week: resp.scans_week_limit,
            max_scans_per_day: resp.scans_day_limit,
            history_retention_days: base.history_retention_days,
            features: resp.features.unwrap_or(base.features),
        };

        let mut status = Self {
            tier: resp.tier,
            tier_display_name: resp
                .tier_display_name
                .unwrap_or_else(|| resp.tier.display_name().to_string()),
            is_trial: resp.is_trial,
            trial_ends_at: resp.trial_ends_at,
            subscription_started_at: resp.subscription_started_at,
            subscription_expires_at: resp.subscription_expires_at,
            repositories_used: resp.repositories_used,
            scans_this_week: resp.scans_this_week,
            scans_today: resp.scans_today,
            limits,
            can_add_repository: resp.can_add_repository,
            can_run_scan: resp.can_run_scan,
            usage_percentage: 0,
            freshness: Freshness::Authoritative,
            fetched_at: now,
        };
        status.usage_percentage = resolver::usage_percentage(&status);
        status
    }

    /// Best-effort status from the catalog. Usage counters are unknown and
    /// reported as zero.
    pub fn fallback(account: &Account, now: DateTime<Utc>) -> Self {
        let tier = account.effective_tier(now);
        let limits = *TierCatalog::limits_for(tier);
        let trial_active = account.trial_state(now).is_active();

        Self {
            tier,
            tier_display_name: tier.display_name().to_string(),
            is_trial: account.is_trial && trial_active,
            trial_ends_at: account.trial_ends_at,
            subscription_started_at: account.subscription_started_at,
            subscription_expires_at: account.subscription_expires_at,
            repositories_used: 0,
            scans_this_week: 0,
            scans_today: 0,
            limits,
            can_add_repository: limits.max_repositories.is_positive(),
            can_run_scan: limits.scans_per_week.is_positive()
                && limits.max_scans_per_day.is_positive(),
            usage_percentage: 0,
            freshness: Freshness::Fallback,
            fetched_at: now,
        }
    }

    /// Same data, demoted after a failed refresh.
    pub fn marked_stale(&self) -> Self {
        Self {
            freshness: Freshness::Stale,
            ..self.clone()
        }
    }

    pub fn trial_state(&self, now: DateTime<Utc>) -> TrialState {
        TrialState::evaluate(self.is_trial, self.trial_ends_at, now)
    }

    /// The server still reports a trial but its end has passed.
    pub fn trial_lapsed(&self, now: DateTime<Utc>) -> bool {
        self.is_trial && !self.trial_state(now).is_active()
    }

    pub fn effective_tier(&self, now: DateTime<Utc>) -> Tier {
        effective_tier(self.tier, self.is_trial, self.trial_ends_at, now)
    }

    /// The permanent plan. A trial elevation is not a plan, so an account
    /// on trial is still on Basic.
    pub fn base_tier(&self) -> Tier {
        if self.is_trial {
            Tier::Basic
        } else {
            self.tier
        }
    }

    pub fn is_authoritative(&self) -> bool {
        self.freshness == Freshness::Authoritative
    }
}

/// The single shared value published to readers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntitlementSnapshot {
    pub status: Option<SubscriptionStatus>,
    pub plans: Vec<PlanInfo>,
    /// Bumped on every replacement.
    pub revision: u64,
}

impl EntitlementSnapshot {
    /// Before the first refresh: no status, catalog plans.
    pub fn initial() -> Self {
        Self {
            status: None,
            plans: TierCatalog::default_plans(),
            revision: 0,
        }
    }

    pub fn freshness(&self) -> Option<Freshness> {
        self.status.as_ref().map(|status| status.freshness)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use vsentry_core::{Feature, FeatureSet, Quota};

    fn now() -> DateTime<Utc> {
        "2026-05-01T12:00:00Z".parse().unwrap()
    }

    fn response(tier: Tier) -> StatusResponse {
        let limits = TierCatalog::limits_for(tier);
        StatusResponse {
            tier,
            tier_display_name: None,
            is_trial: false,
            trial_ends_at: None,
            subscription_started_at: None,
            subscription_expires_at: None,
            repositories_used: 4,
            repositories_limit: limits.max_repositories,
            scans_this_week: 10,
            scans_week_limit: limits.scans_per_week,
            scans_today: 1,
            scans_day_limit: limits.max_scans_per_day,
            can_add_repository: true,
            can_run_scan: true,
            usage_percentage: 40.0,
            features: None,
        }
    }

    #[test]
    fn response_conversion_uses_plan_features() {
        let mut plans = TierCatalog::default_plans();
        plans[1].features = FeatureSet::EMPTY.with(Feature::JiraIntegration);

        let status = SubscriptionStatus::from_response(response(Tier::Premium), &plans, now());
        assert_eq!(status.freshness, Freshness::Authoritative);
        assert_eq!(status.tier_display_name, "Premium");
        assert_eq!(status.limits.max_repositories, Quota::Limited(10));
        assert!(status.limits.has(Feature::JiraIntegration));
        assert!(!status.limits.has(Feature::SlackIntegration));
        assert_eq!(status.usage_percentage, 40);
    }

    #[test]
    fn response_features_win_over_plans() {
        let mut resp = response(Tier::Premium);
        resp.features = Some(FeatureSet::EMPTY.with(Feature::SsoEnabled));

        let status = SubscriptionStatus::from_response(resp, &[], now());
        assert!(status.limits.has(Feature::SsoEnabled));
        assert_eq!(status.limits.history_retention_days, Quota::Limited(30));
    }

    #[test]
    fn fallback_reflects_account_tier_with_zero_usage() {
        let account = Account::new("u1", "dev@example.com", Tier::Basic);
        let status = SubscriptionStatus::fallback(&account, now());
        assert_eq!(status.freshness, Freshness::Fallback);
        assert_eq!(status.repositories_used, 0);
        assert!(status.can_add_repository);
        assert!(status.can_run_scan);
        assert_eq!(status.limits, *TierCatalog::limits_for(Tier::Basic));
    }

    #[test]
    fn fallback_for_lapsed_trial_is_basic() {
        let mut account = Account::new("u1", "dev@example.com", Tier::PremiumPlus);
        account.is_trial = true;
        account.trial_ends_at = Some(now() - Duration::minutes(1));

        let status = SubscriptionStatus::fallback(&account, now());
        assert_eq!(status.tier, Tier::Basic);
        assert!(!status.is_trial);
    }

    #[test]
    fn trial_is_not_the_base_tier() {
        let mut resp = response(Tier::PremiumPlus);
        resp.is_trial = true;
        resp.trial_ends_at = Some(now() + Duration::days(3));
        let status = SubscriptionStatus::from_response(resp, &[], now());

        assert_eq!(status.base_tier(), Tier::Basic);
        assert_eq!(status.effective_tier(now()), Tier::PremiumPlus);
        assert_eq!(status.effective_tier(now() + Duration::days(3)), Tier::Basic);
    }

    #[test]
    fn stale_keeps_values() {
        let status = SubscriptionStatus::from_response(response(Tier::Premium), &[], now());
        let stale = status.marked_stale();
        assert_eq!(stale.freshness, Freshness::Stale);
        assert!(stale.freshness.is_server_data());
        assert_eq!(stale.repositories_used, status.repositories_used);
    }
}
