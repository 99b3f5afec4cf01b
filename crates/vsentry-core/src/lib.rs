// SPDX-License-Identifier: Apache-2.0

//! Vault Sentry core domain: subscription tiers, quotas, feature flags, and the
//! static tier catalog. No I/O lives here.

pub mod catalog;
pub mod error;
pub mod feature;
pub mod plan;
pub mod quota;
pub mod tier;

pub use catalog::{TierCatalog, TierLimits};
pub use error::CoreError;
pub use feature::{Feature, FeatureSet};
pub use plan::{PlanInfo, PlanLimits, PlanPrice};
pub use quota::Quota;
pub use tier::Tier;
