// SPDX-License-Identifier: Apache-2.0

//! Trial lifecycle. The backend owns trial state; the client evaluates
//! expiry lazily whenever entitlements are read.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};
use vsentry_core::Tier;

use super::error::{RejectReason, TransitionError};
use super::sync::RemoteSync;
use super::upgrade::TransitionReceipt;
use crate::metrics;

pub const TRIAL_DAYS: i64 = 14;

/// Tier granted while a trial is active.
pub const TRIAL_TIER: Tier = Tier::PremiumPlus;

pub fn trial_length() -> Duration {
    Duration::days(TRIAL_DAYS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TrialState {
    NoTrial,
    TrialActive { ends_at: DateTime<Utc> },
    /// Ran out, or was replaced by a permanent plan. Either way it is used.
    TrialExpired,
}

impl TrialState {
    pub fn evaluate(
        is_trial: bool,
        trial_ends_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        match (is_trial, trial_ends_at) {
            (true, Some(ends_at)) if now < ends_at => TrialState::TrialActive { ends_at },
            (true, _) => TrialState::TrialExpired,
            (false, Some(_)) => TrialState::TrialExpired,
            (false, None) => TrialState::NoTrial,
        }
    }

    pub fn is_active(self) -> bool {
        matches!(self, TrialState::TrialActive { .. })
    }
}

/// Checked in the same order as the backend.
pub fn validate_start(base_tier: Tier, state: TrialState) -> Result<(), RejectReason> {
    if state.is_active() {
        return Err(RejectReason::TrialActive);
    }
    if base_tier != Tier::Basic {
        return Err(RejectReason::TrialUnavailable(base_tier));
    }
    if state == TrialState::TrialExpired {
        return Err(RejectReason::TrialAlreadyUsed);
    }
    Ok(())
}

pub struct TrialManager<'a> {
    sync: &'a RemoteSync,
}

impl<'a> TrialManager<'a> {
    pub fn new(sync: &'a RemoteSync) -> Self {
        Self { sync }
    }

    /// Trial state from the current snapshot, or from the account record
    /// before the first refresh.
    pub fn state(&self) -> Option<TrialState> {
        let now = self.sync.now();
        match self.sync.snapshot().status.as_ref() {
            Some(status) => Some(status.trial_state(now)),
            None => self.sync.account().map(|account| account.trial_state(now)),
        }
    }

    #[instrument(skip(self), fields(backend = self.sync.backend_id()))]
    pub async fn start(&self) -> Result<TransitionReceipt, TransitionError> {
        let checked = match (self.state(), self.sync.base_tier()) {
            (Some(state), Some(base_tier)) => validate_start(base_tier, state),
            _ => Err(RejectReason::SignedOut),
        };
        if let Err(reason) = checked {
            metrics::record_local_rejection();
            info!(%reason, "Trial start rejected");
            return Err(reason.into());
        }

        let ack = match self.sync.backend().start_trial().await {
            Ok(ack) => ack,
            Err(err) => {
                metrics::record_trial(false);
                warn!(error = %err, "Trial start failed");
                self.sync.record_error(&err);
                return Err(err.into());
            }
        };
        metrics::record_trial(true);

        let ends_at = self.sync.now() + trial_length();
        self.sync.apply_confirmed(|account| {
            account.subscription_tier = TRIAL_TIER;
            account.is_trial = true;
            account.trial_ends_at = Some(ends_at);
        });

        let message = ack.message.unwrap_or_else(|| {
            format!(
                "Your {}-day {} trial has started!",
                TRIAL_DAYS,
                TRIAL_TIER.display_name()
            )
        });
        info!(%message, "Trial started");
        Ok(self.sync.reconcile_after_mutation(message).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        "2026-01-05T10:00:00Z".parse().unwrap()
    }

    #[test]
    fn evaluate_states() {
        let ends = t0() + trial_length();
        assert_eq!(TrialState::evaluate(false, None, t0()), TrialState::NoTrial);
        assert_eq!(
            TrialState::evaluate(true, Some(ends), t0()),
            TrialState::TrialActive { ends_at: ends }
        );
        let almost = t0() + Duration::days(13) + Duration::hours(23) + Duration::minutes(59);
        assert!(TrialState::evaluate(true, Some(ends), almost).is_active());
        assert_eq!(TrialState::evaluate(true, Some(ends), ends), TrialState::TrialExpired);
        assert_eq!(TrialState::evaluate(true, None, t0()), TrialState::TrialExpired);
        assert_eq!(TrialState::evaluate(false, Some(ends), t0()), TrialState::TrialExpired);
    }

    #[test]
    fn start_validation() {
        let active = TrialState::TrialActive { ends_at: t0() };
        assert_eq!(validate_start(Tier::Basic, TrialState::NoTrial), Ok(()));
        assert_eq!(
            validate_start(Tier::Premium, TrialState::NoTrial),
            Err(RejectReason::TrialUnavailable(Tier::Premium))
        );
        assert_eq!(validate_start(Tier::Basic, active), Err(RejectReason::TrialActive));
        assert_eq!(
            validate_start(Tier::Basic, TrialState::TrialExpired),
            Err(RejectReason::TrialAlreadyUsed)
        );
    }

    #[test]
    fn state_serializes_with_tag() {
        let json = serde_json::to_value(TrialState::TrialActive { ends_at: t0() }).unwrap();
        assert_eq!(json["state"], "trial_active");
    }
}
