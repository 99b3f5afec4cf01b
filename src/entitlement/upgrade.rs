// SPDX-License-Identifier: Apache-2.0

//! Tier upgrades. Pessimistic: the snapshot only changes through a refresh
//! after the backend confirms.

use std::sync::Arc;

use tracing::{info, instrument, warn};
use vsentry_core::Tier;

use super::error::{RejectReason, TransitionError};
use super::status::EntitlementSnapshot;
use super::sync::RemoteSync;
use crate::metrics;

/// Outcome of a confirmed transition.
#[derive(Debug, Clone)]
pub struct TransitionReceipt {
    /// User-facing confirmation from the backend.
    pub message: String,
    /// Snapshot after the follow-up refresh.
    pub snapshot: Arc<EntitlementSnapshot>,
    /// False if the follow-up refresh failed; `snapshot` is then the
    /// pre-transition data.
    pub refreshed: bool,
}

/// Only strictly higher tiers are upgrades. There is no downgrade path here.
pub fn validate(current: Tier, target: Tier) -> Result<(), RejectReason> {
    if current.can_upgrade_to(target) {
        Ok(())
    } else if current == target {
        Err(RejectReason::AlreadyOnPlan(current))
    } else {
        Err(RejectReason::UseDowngradeFlow { current, target })
    }
}

pub struct UpgradeTransition<'a> {
    sync: &'a RemoteSync,
}

impl<'a> UpgradeTransition<'a> {
    pub fn new(sync: &'a RemoteSync) -> Self {
        Self { sync }
    }

    #[instrument(skip(self), fields(target = target.as_str()))]
    pub async fn execute(&self, target: Tier) -> Result<TransitionReceipt, TransitionError> {
        let checked = match self.sync.current_tier() {
            Some(current) => validate(current, target),
            None => Err(RejectReason::SignedOut),
        };
        if let Err(reason) = checked {
            metrics::record_local_rejection();
            info!(%reason, "Upgrade rejected");
            return Err(reason.into());
        }

        let ack = match self.sync.backend().upgrade(target).await {
            Ok(ack) => ack,
            Err(err) => {
                metrics::record_upgrade(false);
                warn!(error = %err, "Upgrade failed");
                self.sync.record_error(&err);
                return Err(err.into());
            }
        };
        metrics::record_upgrade(true);

        let tier = ack.tier.unwrap_or(target);
        self.sync.apply_confirmed(|account| {
            account.subscription_tier = tier;
            account.is_trial = false;
            account.trial_ends_at = None;
        });

        let message = ack
            .message
            .unwrap_or_else(|| format!("Successfully upgraded to {}", target.display_name()));
        info!(%message, "Upgrade confirmed");
        Ok(self.sync.reconcile_after_mutation(message).await)
    }
}
