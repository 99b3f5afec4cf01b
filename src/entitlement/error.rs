// SPDX-License-Identifier: Apache-2.0

use serde::Serialize;
use thiserror::Error;
use vsentry_core::Tier;

use crate::backend::BackendError;

/// Failure of a status refresh. `Clone` because coalesced callers share it.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum SyncError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("Not signed in")]
    SignedOut,
}

/// A transition refused locally, before any request was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
pub enum RejectReason {
    #[error("You are already on the {0} plan")]
    AlreadyOnPlan(Tier),

    #[error("Cannot move from {current} to {target} here. Use the downgrade flow instead")]
    UseDowngradeFlow { current: Tier, target: Tier },

    #[error("You are already on the {0} plan. Trials are only available for Basic")]
    TrialUnavailable(Tier),

    #[error("You already have an active trial")]
    TrialActive,

    #[error("You have already used your free trial")]
    TrialAlreadyUsed,

    #[error("Sign in to change your plan")]
    SignedOut,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum TransitionError {
    #[error("{0}")]
    Rejected(RejectReason),

    #[error(transparent)]
    Backend(BackendError),
}

impl TransitionError {
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

impl From<RejectReason> for TransitionError {
    fn from(reason: RejectReason) -> Self {
        Self::Rejected(reason)
    }
}

impl From<BackendError> for TransitionError {
    fn from(err: BackendError) -> Self {
        Self::Backend(err)
    }
}
