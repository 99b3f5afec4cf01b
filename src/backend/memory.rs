// SPDX-License-Identifier: Apache-2.0

//! In-process subscription API that applies the same rules as the hosted
//! backend. Used for demo mode and for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use vsentry_core::{PlanInfo, Quota, Tier, TierCatalog};

use super::wire::{ActionResponse, StatusResponse};
use super::{BackendError, BackendResult, SubscriptionBackend};
use crate::clock::Clock;
use crate::entitlement::status::Account;
use crate::entitlement::trial::TRIAL_DAYS;

const SUBSCRIPTION_DAYS: i64 = 30;

/// Server-side account row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    pub tier: Tier,
    pub is_trial: bool,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub subscription_started_at: Option<DateTime<Utc>>,
    pub subscription_expires_at: Option<DateTime<Utc>>,
    pub repositories_used: u32,
    pub scans_this_week: u32,
    pub scans_today: u32,
    pub last_daily_reset: Option<DateTime<Utc>>,
    pub last_weekly_reset: Option<DateTime<Utc>>,
}

impl AccountRecord {
    pub fn new(tier: Tier) -> Self {
        Self {
            tier,
            is_trial: false,
            trial_ends_at: None,
            subscription_started_at: None,
            subscription_expires_at: None,
            repositories_used: 0,
            scans_this_week: 0,
            scans_today: 0,
            last_daily_reset: None,
            last_weekly_reset: None,
        }
    }

    pub fn from_account(account: &Account) -> Self {
        Self {
            tier: account.subscription_tier,
            is_trial: account.is_trial,
            trial_ends_at: account.trial_ends_at,
            subscription_started_at: account.subscription_started_at,
            subscription_expires_at: account.subscription_expires_at,
            scans_this_week: account.scans_this_week,
            scans_today: account.scans_today,
            ..Self::new(account.subscription_tier)
        }
    }

    fn reset_counters(&mut self, now: DateTime<Utc>) {
        if self
            .last_daily_reset
            .map_or(true, |last| last.date_naive() < now.date_naive())
        {
            self.scans_today = 0;
            self.last_daily_reset = Some(now);
        }

        match self.last_weekly_reset {
            Some(last) if (now - last).num_days() < 7 => {}
            _ => {
                self.scans_this_week = 0;
                self.last_weekly_reset = Some(now);
            }
        }
    }

    /// Ends an elapsed trial. The end date stays so the trial counts as used.
    fn expire_trial(&mut self, now: DateTime<Utc>) {
        if self.is_trial && self.trial_ends_at.map_or(true, |end| now >= end) {
            self.is_trial = false;
            self.tier = Tier::Basic;
        }
    }

    fn status(&self) -> StatusResponse {
        let limits = TierCatalog::limits_for(self.tier);

        let repo_usage = ratio(self.repositories_used, limits.max_repositories);
        let scan_usage = ratio(self.scans_this_week, limits.scans_per_week);

        StatusResponse {
            tier: self.tier,
            tier_display_name: Some(self.tier.display_name().to_string()),
            is_trial: self.is_trial,
            trial_ends_at: self.trial_ends_at,
            subscription_started_at: self.subscription_started_at,
            subscription_expires_at: self.subscription_expires_at,
            repositories_used: self.repositories_used,
            repositories_limit: limits.max_repositories,
            scans_this_week: self.scans_this_week,
            scans_week_limit: limits.scans_per_week,
            scans_today: self.scans_today,
            scans_day_limit: limits.max_scans_per_day,
            can_add_repository: limits.max_repositories.allows(self.repositories_used),
            can_run_scan: limits.max_scans_per_day.allows(self.scans_today)
                && limits.scans_per_week.allows(self.scans_this_week),
            usage_percentage: repo_usage.max(scan_usage).min(100.0),
            features: None,
        }
    }
}

fn ratio(used: u32, quota: Quota) -> f64 {
    match quota.limit() {
        Some(0) | None => 0.0,
        Some(limit) => f64::from(used) / f64::from(limit) * 100.0,
    }
}

/// Per-endpoint request counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub status: usize,
    pub plans: usize,
    pub upgrade: usize,
    pub start_trial: usize,
}

#[derive(Default)]
struct Counters {
    status: AtomicUsize,
    plans: AtomicUsize,
    upgrade: AtomicUsize,
    start_trial: AtomicUsize,
}

pub struct InMemoryBackend {
    record: Mutex<AccountRecord>,
    clock: Arc<dyn Clock>,
    latency: Duration,
    failure: Mutex<Option<BackendError>>,
    status_failure: Mutex<Option<BackendError>>,
    counters: Counters,
}

impl InMemoryBackend {
    pub fn new(record: AccountRecord, clock: Arc<dyn Clock>) -> Self {
        Self {
            record: Mutex::new(record),
            clock,
            latency: Duration::ZERO,
            failure: Mutex::new(None),
            status_failure: Mutex::new(None),
            counters: Counters::default(),
        }
    }

    /// Demo data seeded from the signed-in account.
    pub fn demo(account: &Account, clock: Arc<dyn Clock>) -> Self {
        let mut record = AccountRecord::from_account(account);
        record.repositories_used = 1;
        Self::new(record, clock)
    }

    /// Every request waits this long before answering.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail every request with `error` until cleared with `None`.
    pub fn set_failure(&self, error: Option<BackendError>) {
        *self.failure.lock() = error;
    }

    /// Fail only `GET /status` with `error`. Transitions still go through.
    pub fn set_status_failure(&self, error: Option<BackendError>) {
        *self.status_failure.lock() = error;
    }

    pub fn calls(&self) -> CallCounts {
        CallCounts {
            status: self.counters.status.load(Ordering::SeqCst),
            plans: self.counters.plans.load(Ordering::SeqCst),
            upgrade: self.counters.upgrade.load(Ordering::SeqCst),
            start_trial: self.counters.start_trial.load(Ordering::SeqCst),
        }
    }

    pub fn record(&self) -> AccountRecord {
        self.record.lock().clone()
    }

    pub fn set_repositories_used(&self, used: u32) {
        self.record.lock().repositories_used = used;
    }

    /// Server-side usage accounting for one scan.
    pub fn record_scan(&self) {
        let now = self.clock.now();
        let mut record = self.record.lock();
        record.reset_counters(now);
        record.scans_today += 1;
        record.scans_this_week += 1;
    }

    async fn begin(&self, counter: &AtomicUsize) -> BackendResult<DateTime<Utc>> {
        counter.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if let Some(err) = self.failure.lock().clone() {
            return Err(err);
        }
        Ok(self.clock.now())
    }
}

#[async_trait]
impl SubscriptionBackend for InMemoryBackend {
    fn backend_id(&self) -> &'static str {
        "memory"
    }

    async fn fetch_status(&self) -> BackendResult<StatusResponse> {
        let now = self.begin(&self.counters.status).await?;
        if let Some(err) = self.status_failure.lock().clone() {
            return Err(err);
        }
        let mut record = self.record.lock();
        record.expire_trial(now);
        record.reset_counters(now);
        Ok(record.status())
    }

    async fn fetch_plans(&self) -> BackendResult<Vec<PlanInfo>> {
        self.begin(&self.counters.plans).await?;
        Ok(TierCatalog::default_plans())
    }

    async fn upgrade(&self, tier: Tier) -> BackendResult<ActionResponse> {
        let now = self.begin(&self.counters.upgrade).await?;
        let mut record = self.record.lock();
        record.expire_trial(now);

        if !record.tier.can_upgrade_to(tier) {
            return Err(BackendError::http(
                400,
                "Can only upgrade to a higher tier. Use /downgrade for downgrades.",
            ));
        }

        record.tier = tier;
        record.subscription_started_at = Some(now);
        record.subscription_expires_at = Some(now + ChronoDuration::days(SUBSCRIPTION_DAYS));
        record.is_trial = false;
        record.trial_ends_at = None;

        Ok(ActionResponse {
            success: true,
            message: Some(format!("Successfully upgraded to {}", tier.display_name())),
            tier: Some(tier),
        })
    }

    async fn start_trial(&self) -> BackendResult<ActionResponse> {
        let now = self.begin(&self.counters.start_trial).await?;
        let mut record = self.record.lock();
        record.expire_trial(now);

        if record.is_trial {
            return Err(BackendError::http(400, "You already have an active trial"));
        }
        if record.tier != Tier::Basic {
            return Err(BackendError::http(
                400,
                "Trial is only available for Basic tier users",
            ));
        }
        if record.trial_ends_at.is_some() {
            return Err(BackendError::http(400, "You have already used your free trial"));
        }

        record.tier = Tier::PremiumPlus;
        record.is_trial = true;
        record.trial_ends_at = Some(now + ChronoDuration::days(TRIAL_DAYS));
        record.subscription_started_at = Some(now);

        Ok(ActionResponse {
            success: true,
            message: Some(format!(
                "Your {}-day Premium Plus trial has started!",
                TRIAL_DAYS
            )),
            tier: Some(Tier::PremiumPlus),
        })
    }
}
