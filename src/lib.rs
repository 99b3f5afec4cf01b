// SPDX-License-Identifier: Apache-2.0

// Vault Sentry - subscription entitlement and usage-quota engine
// Core library

pub mod backend;
pub mod clock;
pub mod config;
pub mod entitlement;
pub mod metrics;
pub mod observability;

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use backend::{BackendError, HttpBackend, InMemoryBackend, SubscriptionBackend};
use clock::{Clock, SystemClock};
use config::{BackendMode, ConfigError, EntitlementConfig};
use entitlement::{Account, EntitlementService};
use observability::Sensitive;

pub use vsentry_core::{Feature, PlanInfo, Quota, Tier, TierCatalog, TierLimits};

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to create subscription client: {0}")]
    Backend(#[from] BackendError),
}

/// Builds the entitlement service for `account` from `config`.
///
/// Live mode talks to the subscription API with `session_cookie`. Demo mode
/// runs against an in-process simulation seeded from the account.
pub fn connect(
    config: &EntitlementConfig,
    account: Account,
    session_cookie: Option<Sensitive<String>>,
) -> Result<EntitlementService, ConnectError> {
    connect_with_clock(config, account, session_cookie, Arc::new(SystemClock))
}

pub fn connect_with_clock(
    config: &EntitlementConfig,
    account: Account,
    session_cookie: Option<Sensitive<String>>,
    clock: Arc<dyn Clock>,
) -> Result<EntitlementService, ConnectError> {
    let backend: Arc<dyn SubscriptionBackend> = match config.mode {
        BackendMode::Live => {
            let base_url = config.base_url()?;
            Arc::new(HttpBackend::new(
                &base_url,
                config.request_timeout(),
                session_cookie,
            )?)
        }
        BackendMode::Demo => Arc::new(InMemoryBackend::demo(&account, Arc::clone(&clock))),
    };

    info!(
        backend = backend.backend_id(),
        policy = ?config.fallback_policy,
        "Entitlement service created"
    );
    Ok(EntitlementService::new(
        backend,
        clock,
        Some(account),
        config.fallback_policy,
    ))
}
