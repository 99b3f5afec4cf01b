// SPDX-License-Identifier: Apache-2.0

//! Entitlement engine: what an account may do right now.
//!
//! [`EntitlementService`] is the entry point. It owns a [`RemoteSync`] that
//! keeps one shared [`EntitlementSnapshot`], answers capability queries
//! through the pure functions in [`resolver`], and runs upgrades and trial
//! starts against the backend.

pub mod error;
pub mod resolver;
pub mod service;
pub mod status;
pub mod sync;
pub mod trial;
pub mod upgrade;

pub use error::{RejectReason, SyncError, TransitionError};
pub use resolver::FallbackPolicy;
pub use service::{EntitlementService, Subscription};
pub use status::{Account, EntitlementSnapshot, Freshness, SubscriptionStatus};
pub use sync::{RemoteSync, SyncResult};
pub use trial::{TrialManager, TrialState, TRIAL_DAYS, TRIAL_TIER};
pub use upgrade::{TransitionReceipt, UpgradeTransition};
