// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// Parse errors for the closed catalog vocabularies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("Unknown subscription tier: {0}")]
    UnknownTier(String),

    #[error("Unknown feature: {0}")]
    UnknownFeature(String),

    #[error("Invalid quota value: {0}")]
    InvalidQuota(String),
}
