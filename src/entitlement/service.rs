// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use tokio::sync::watch;
use vsentry_core::{Feature, PlanInfo, Tier};

use super::error::TransitionError;
use super::resolver::{self, FallbackPolicy};
use super::status::{Account, EntitlementSnapshot, Freshness, SubscriptionStatus};
use super::sync::{RemoteSync, SyncResult};
use super::trial::{TrialManager, TrialState};
use super::upgrade::{TransitionReceipt, UpgradeTransition};
use crate::backend::SubscriptionBackend;
use crate::clock::Clock;

/// Observable entitlement state for one session.
///
/// Queries are synchronous reads of the current snapshot. Without a
/// signed-in account every capability query answers `false`.
#[derive(Clone)]
pub struct EntitlementService {
    sync: RemoteSync,
    policy: FallbackPolicy,
}

impl EntitlementService {
    pub fn new(
        backend: Arc<dyn SubscriptionBackend>,
        clock: Arc<dyn Clock>,
        account: Option<Account>,
        policy: FallbackPolicy,
    ) -> Self {
        Self {
            sync: RemoteSync::new(backend, clock, account),
            policy,
        }
    }

    pub fn sync(&self) -> &RemoteSync {
        &self.sync
    }

    pub fn policy(&self) -> FallbackPolicy {
        self.policy
    }

    pub fn snapshot(&self) -> Arc<EntitlementSnapshot> {
        self.sync.snapshot()
    }

    pub fn status(&self) -> Option<SubscriptionStatus> {
        self.snapshot().status.clone()
    }

    pub fn plans(&self) -> Vec<PlanInfo> {
        self.snapshot().plans.clone()
    }

    pub fn freshness(&self) -> Option<Freshness> {
        self.snapshot().freshness()
    }

    pub fn last_error(&self) -> Option<String> {
        self.sync.last_error()
    }

    pub fn account(&self) -> Option<Account> {
        self.sync.account()
    }

    /// Evaluates `query` against the account's tier and the current status.
    fn with_state<T>(
        &self,
        signed_out: T,
        query: impl FnOnce(Tier, Option<&SubscriptionStatus>) -> T,
    ) -> T {
        let Some(account) = self.sync.account() else {
            return signed_out;
        };
        let snapshot = self.snapshot();
        let tier = account.effective_tier(self.sync.now());
        query(tier, snapshot.status.as_ref())
    }

    /// Tier whose entitlements apply right now.
    pub fn effective_tier(&self) -> Option<Tier> {
        let now = self.sync.now();
        self.with_state(None, |tier, status| {
            Some(resolver::effective_tier(tier, status, now))
        })
    }

    /// Tier the backend has stored, used for upgrade decisions. Premium Plus
    /// while a trial runs.
    pub fn current_tier(&self) -> Option<Tier> {
        self.sync.current_tier()
    }

    pub fn check_feature(&self, feature: Feature) -> bool {
        let now = self.sync.now();
        self.with_state(false, |tier, status| {
            resolver::check_feature(tier, status, feature, now)
        })
    }

    pub fn check_feature_named(&self, name: &str) -> bool {
        let now = self.sync.now();
        self.with_state(false, |tier, status| {
            resolver::check_feature_named(tier, status, name, now)
        })
    }

    pub fn can_add_repository(&self) -> bool {
        let now = self.sync.now();
        self.with_state(false, |tier, status| {
            resolver::can_add_repository(tier, status, now, self.policy)
        })
    }

    pub fn can_run_scan(&self) -> bool {
        let now = self.sync.now();
        self.with_state(false, |tier, status| {
            resolver::can_run_scan(tier, status, now, self.policy)
        })
    }

    pub fn usage_percentage(&self) -> u8 {
        self.with_state(0, |_, status| {
            status.map(resolver::usage_percentage).unwrap_or(0)
        })
    }

    pub fn can_upgrade_to(&self, target: Tier) -> bool {
        self.current_tier()
            .is_some_and(|current| current.can_upgrade_to(target))
    }

    pub fn trial_state(&self) -> Option<TrialState> {
        TrialManager::new(&self.sync).state()
    }

    pub async fn refresh_status(&self) -> SyncResult {
        self.sync.refresh_status().await
    }

    pub async fn upgrade_tier(&self, target: Tier) -> Result<TransitionReceipt, TransitionError> {
        UpgradeTransition::new(&self.sync).execute(target).await
    }

    pub async fn start_trial(&self) -> Result<TransitionReceipt, TransitionError> {
        TrialManager::new(&self.sync).start().await
    }

    pub fn sign_in(&self, account: Account) {
        self.sync.sign_in(account);
    }

    pub fn logout(&self) {
        self.sync.logout();
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sync.subscribe(),
        }
    }
}

/// Receives every snapshot replacement. Dropping it unsubscribes.
pub struct Subscription {
    receiver: watch::Receiver<Arc<EntitlementSnapshot>>,
}

impl Subscription {
    pub fn current(&self) -> Arc<EntitlementSnapshot> {
        self.receiver.borrow().clone()
    }

    /// Waits for the next replacement. `None` once the service is gone.
    pub async fn changed(&mut self) -> Option<Arc<EntitlementSnapshot>> {
        self.receiver.changed().await.ok()?;
        Some(self.receiver.borrow_and_update().clone())
    }

    pub fn unsubscribe(self) {}
}
