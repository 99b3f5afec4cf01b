// SPDX-License-Identifier: Apache-2.0

//! JSON bodies exchanged with the subscription API.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use vsentry_core::{FeatureSet, Quota, Tier};

/// Body of `GET /status`. Limits use `-1` for unlimited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub tier: Tier,
    #[serde(default)]
    pub tier_display_name: Option<String>,
    pub is_trial: bool,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub trial_ends_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub subscription_started_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_datetime")]
    pub subscription_expires_at: Option<DateTime<Utc>>,

    pub repositories_used: u32,
    pub repositories_limit: Quota,
    pub scans_this_week: u32,
    pub scans_week_limit: Quota,
    pub scans_today: u32,
    pub scans_day_limit: Quota,

    pub can_add_repository: bool,
    pub can_run_scan: bool,
    #[serde(default)]
    pub usage_percentage: f64,

    /// Not sent by every server version; plan features are used otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub features: Option<FeatureSet>,
}

/// Body of a successful `POST /upgrade` or `POST /start-trial`.
/// A `204` with no body decodes to the default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub tier: Option<Tier>,
}

impl Default for ActionResponse {
    fn default() -> Self {
        Self {
            success: true,
            message: None,
            tier: None,
        }
    }
}

fn default_success() -> bool {
    true
}

/// Error body in the FastAPI shape: `{ "detail": "..." }`.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

/// Extract a user-facing message from an error response body.
pub fn extract_detail(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    match parsed.detail {
        serde_json::Value::String(message) => Some(message),
        // Validation errors come back as a list of { msg, loc, ... }
        serde_json::Value::Array(items) => {
            let messages: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                .collect();
            if messages.is_empty() {
                None
            } else {
                Some(messages.join("; "))
            }
        }
        _ => None,
    }
}

/// Accepts RFC 3339 timestamps and the offset-less ISO timestamps the
/// backend writes for UTC values.
fn lenient_datetime<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(parsed.with_timezone(&Utc)));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Some(naive.and_utc()))
        .map_err(serde::de::Error::custom)
}
