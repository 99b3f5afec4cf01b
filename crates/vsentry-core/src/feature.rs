// SPDX-License-Identifier: Apache-2.0

//! Feature flags gated by subscription tier.

use std::fmt;
use std::str::FromStr;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CoreError;

/// Feature identifiers for gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    SlackIntegration,
    JiraIntegration,
    GithubAppIntegration,
    AwsIntegration,
    AutoRotation,
    MlRiskScoring,
    CustomPatterns,
    ApiAccess,
    WebhookNotifications,
    ScheduledScans,
    TeamManagement,
    PrioritySupport,
    ExportReports,
    AuditLogs,
    SsoEnabled,
    CustomBranding,
    DeepScan,
    EntropyAnalysis,
    PrScanning,
    RealtimeAlerts,
}

impl Feature {
    pub const ALL: [Feature; 20] = [
        Feature::SlackIntegration,
        Feature::JiraIntegration,
        Feature::GithubAppIntegration,
        Feature::AwsIntegration,
        Feature::AutoRotation,
        Feature::MlRiskScoring,
        Feature::CustomPatterns,
        Feature::ApiAccess,
        Feature::WebhookNotifications,
        Feature::ScheduledScans,
        Feature::TeamManagement,
        Feature::PrioritySupport,
        Feature::ExportReports,
        Feature::AuditLogs,
        Feature::SsoEnabled,
        Feature::CustomBranding,
        Feature::DeepScan,
        Feature::EntropyAnalysis,
        Feature::PrScanning,
        Feature::RealtimeAlerts,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Feature::SlackIntegration => "slack_integration",
            Feature::JiraIntegration => "jira_integration",
            Feature::GithubAppIntegration => "github_app_integration",
            Feature::AwsIntegration => "aws_integration",
            Feature::AutoRotation => "auto_rotation",
            Feature::MlRiskScoring => "ml_risk_scoring",
            Feature::CustomPatterns => "custom_patterns",
            Feature::ApiAccess => "api_access",
            Feature::WebhookNotifications => "webhook_notifications",
            Feature::ScheduledScans => "scheduled_scans",
            Feature::TeamManagement => "team_management",
            Feature::PrioritySupport => "priority_support",
            Feature::ExportReports => "export_reports",
            Feature::AuditLogs => "audit_logs",
            Feature::SsoEnabled => "sso_enabled",
            Feature::CustomBranding => "custom_branding",
            Feature::DeepScan => "deep_scan",
            Feature::EntropyAnalysis => "entropy_analysis",
            Feature::PrScanning => "pr_scanning",
            Feature::RealtimeAlerts => "realtime_alerts",
        }
    }

    const fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Feature {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Feature::ALL
            .iter()
            .copied()
            .find(|feature| feature.as_str() == s)
            .ok_or_else(|| CoreError::UnknownFeature(s.to_string()))
    }
}

/// A fixed set of enabled features.
///
/// Serialized as a `{ name: bool }` map covering every feature, which is the
/// shape the subscription API uses for plan features.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FeatureSet(u32);

impl FeatureSet {
    pub const EMPTY: FeatureSet = FeatureSet(0);

    pub const fn all() -> Self {
        let mut set = FeatureSet::EMPTY;
        let mut i = 0;
        while i < Feature::ALL.len() {
            set = set.with(Feature::ALL[i]);
            i += 1;
        }
        set
    }

    pub const fn with(self, feature: Feature) -> Self {
        FeatureSet(self.0 | feature.bit())
    }

    pub const fn contains(self, feature: Feature) -> bool {
        self.0 & feature.bit() != 0
    }

    /// True if every feature enabled in `other` is enabled here too.
    pub const fn is_superset_of(self, other: FeatureSet) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, feature: Feature) {
        self.0 |= feature.bit();
    }

    pub fn iter(self) -> impl Iterator<Item = Feature> {
        Feature::ALL.into_iter().filter(move |f| self.contains(*f))
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl FromIterator<Feature> for FeatureSet {
    fn from_iter<I: IntoIterator<Item = Feature>>(iter: I) -> Self {
        let mut set = FeatureSet::EMPTY;
        for feature in iter {
            set.insert(feature);
        }
        set
    }
}

impl fmt::Debug for FeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter().map(Feature::as_str)).finish()
    }
}

impl Serialize for FeatureSet {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(Feature::ALL.len()))?;
        for feature in Feature::ALL {
            map.serialize_entry(feature.as_str(), &self.contains(feature))?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FeatureSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct FeatureMapVisitor;

        impl<'de> Visitor<'de> for FeatureMapVisitor {
            type Value = FeatureSet;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of feature name to bool")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut set = FeatureSet::EMPTY;
                while let Some((name, enabled)) = access.next_entry::<String, bool>()? {
                    // Flags this build does not know about are ignored
                    if let (Ok(feature), true) = (name.parse::<Feature>(), enabled) {
                        set.insert(feature);
                    }
                }
                Ok(set)
            }
        }

        deserializer.deserialize_map(FeatureMapVisitor)
    }
}
