// SPDX-License-Identifier: Apache-2.0

//! Subscription API collaborator.
//!
//! The entitlement engine never computes authoritative usage itself. It asks
//! a [`SubscriptionBackend`] for the current status and plan list and asks it
//! to perform upgrades and trial starts.

pub mod http;
pub mod memory;
pub mod wire;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vsentry_core::{PlanInfo, Tier};

pub use http::HttpBackend;
pub use memory::InMemoryBackend;
pub use wire::{ActionResponse, StatusResponse};

/// Failures talking to the subscription API.
///
/// `Clone` so a single failed refresh can be handed to every coalesced caller.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum BackendError {
    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Session is not authenticated")]
    Unauthorized,

    #[error("{detail}")]
    Http { status: u16, detail: String },

    #[error("Invalid response: {message}")]
    Decode { message: String },
}

impl BackendError {
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network { message: msg.into() }
    }

    pub fn http(status: u16, detail: impl Into<String>) -> Self {
        Self::Http {
            status,
            detail: detail.into(),
        }
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode { message: msg.into() }
    }

    /// HTTP status code, when the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Unauthorized => Some(401),
            _ => None,
        }
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

#[async_trait]
pub trait SubscriptionBackend: Send + Sync {
    fn backend_id(&self) -> &'static str;

    /// `GET /api/v1/subscription/status`
    async fn fetch_status(&self) -> BackendResult<StatusResponse>;

    /// `GET /api/v1/subscription/plans`
    async fn fetch_plans(&self) -> BackendResult<Vec<PlanInfo>>;

    /// `POST /api/v1/subscription/upgrade`
    async fn upgrade(&self, tier: Tier) -> BackendResult<ActionResponse>;

    /// `POST /api/v1/subscription/start-trial`
    async fn start_trial(&self) -> BackendResult<ActionResponse>;
}
