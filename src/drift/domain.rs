//! Baselines, drift reports and the knobs that shape them.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::error::{GovError, GovResult};
use crate::registry::domain::Version;

/// Bucket collecting categories outside a feature's top-k.
pub const OTHER_BUCKET: &str = "__other__";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    /// Equal-frequency bins per numeric feature.
    pub bins: usize,
    /// Minimum reference rows for a baseline.
    pub min_rows: usize,
    pub warn_threshold: f64,
    pub alert_threshold: f64,
    /// Stand-in for empty proportions.
    pub epsilon: f64,
    /// Absolute missing-rate change that raises a feature to at least warn.
    pub missing_rate_delta: f64,
    /// Categories kept per categorical feature before `__other__`.
    pub top_k: usize,
    pub retention_days: u32,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            bins: 10,
            min_rows: 100,
            warn_threshold: 0.10,
            alert_threshold: 0.25,
            epsilon: 1e-6,
            missing_rate_delta: 0.10,
            top_k: 10,
            retention_days: 90,
        }
    }
}

impl DriftConfig {
    pub fn validate(&self) -> GovResult<()> {
        let fail = |msg: String| Err(GovError::Config(format!("drift: {msg}")));
        if self.bins < 2 {
            return fail(format!("bins must be at least 2, got {}", self.bins));
        }
        if self.min_rows == 0 {
            return fail("min_rows must be positive".into());
        }
        if !(self.warn_threshold.is_finite() && self.alert_threshold.is_finite())
            || self.warn_threshold < 0.0
            || self.warn_threshold > self.alert_threshold
        {
            return fail(format!(
                "thresholds must satisfy 0 <= warn ({}) <= alert ({})",
                self.warn_threshold, self.alert_threshold
            ));
        }
        if !(self.epsilon > 0.0 && self.epsilon < 0.01) {
            return fail(format!("epsilon {} outside (0, 0.01)", self.epsilon));
        }
        if !(0.0..=1.0).contains(&self.missing_rate_delta) {
            return fail(format!("missing_rate_delta {} outside [0, 1]", self.missing_rate_delta));
        }
        if self.top_k == 0 {
            return fail("top_k must be positive".into());
        }
        Ok(())
    }

    /// Map a statistic onto a severity.
    pub fn classify(&self, statistic: f64) -> DriftStatus {
        if statistic < self.warn_threshold {
            DriftStatus::Ok
        } else if statistic <= self.alert_threshold {
            DriftStatus::Warn
        } else {
            DriftStatus::Alert
        }
    }
}

/// Reference distribution of one feature (or the score).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Profile {
    /// Bins `(-inf, e1], (e1, e2], ..., (ek, +inf)` with their proportions.
    Numeric {
        edges: Vec<f64>,
        proportions: Vec<f64>,
        min: f64,
        max: f64,
        mean: f64,
    },
    /// Every reference value was identical.
    Constant { value: f64 },
    /// Top-k categories; `proportions` has one extra trailing entry for `__other__`.
    Categorical {
        categories: Vec<String>,
        proportions: Vec<f64>,
    },
}

impl Profile {
    pub fn kind(&self) -> &'static str {
        match self {
            Profile::Numeric { .. } => "numeric",
            Profile::Constant { .. } => "constant",
            Profile::Categorical { .. } => "categorical",
        }
    }

    /// Human-readable bucket labels in proportion order.
    pub fn bucket_labels(&self) -> Vec<String> {
        match self {
            Profile::Numeric { edges, .. } => {
                let mut labels = Vec::with_capacity(edges.len() + 1);
                let mut lower = "-inf".to_string();
                for edge in edges {
                    labels.push(format!("({lower}, {edge}]"));
                    lower = edge.to_string();
                }
                labels.push(format!("({lower}, +inf)"));
                labels
            }
            Profile::Constant { value } => vec![format!("= {value}"), format!("!= {value}")],
            Profile::Categorical { categories, .. } => categories
                .iter()
                .cloned()
                .chain(std::iter::once(OTHER_BUCKET.to_string()))
                .collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureBaseline {
    pub name: String,
    pub missing_rate: f64,
    /// Non-missing reference values.
    pub observed: usize,
    pub profile: Profile,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreBaseline {
    pub observed: usize,
    pub mean: f64,
    pub profile: Profile,
}

/// Frozen reference distribution bound to one model version.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub version: Version,
    pub created_at: DateTime<Utc>,
    pub rows: usize,
    pub features: Vec<FeatureBaseline>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<ScoreBaseline>,
}

impl Baseline {
    pub fn feature(&self, name: &str) -> Option<&FeatureBaseline> {
        self.features.iter().find(|f| f.name == name)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftStatus {
    Ok,
    Warn,
    Alert,
    /// Expected data absent from the current sample.
    Missing,
}

impl DriftStatus {
    /// Ordering used for the global status; missing data ranks with alert.
    pub fn severity(self) -> u8 {
        match self {
            DriftStatus::Ok => 0,
            DriftStatus::Warn => 1,
            DriftStatus::Alert | DriftStatus::Missing => 2,
        }
    }

    /// The more severe of two statuses, keeping `self` on ties.
    pub fn max(self, other: DriftStatus) -> DriftStatus {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DriftStatus::Ok => "ok",
            DriftStatus::Warn => "warn",
            DriftStatus::Alert => "alert",
            DriftStatus::Missing => "missing",
        }
    }
}

impl fmt::Display for DriftStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureDrift {
    pub feature: String,
    pub kind: String,
    /// Absent when the feature is missing from the current sample.
    pub statistic: Option<f64>,
    pub status: DriftStatus,
    pub baseline_missing_rate: f64,
    pub current_missing_rate: Option<f64>,
    pub missing_rate_delta: Option<f64>,
    pub missing_rate_flagged: bool,
    pub buckets: Vec<String>,
    pub reference: Vec<f64>,
    pub current: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoreDrift {
    pub statistic: Option<f64>,
    pub status: DriftStatus,
    pub baseline_mean: f64,
    pub current_mean: Option<f64>,
}

impl ScoreDrift {
    pub fn delta_mean(&self) -> Option<f64> {
        self.current_mean.map(|m| m - self.baseline_mean)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub ok: usize,
    pub warn: usize,
    pub alert: usize,
    pub missing: usize,
}

impl StatusCounts {
    pub fn add(&mut self, status: DriftStatus) {
        match status {
            DriftStatus::Ok => self.ok += 1,
            DriftStatus::Warn => self.warn += 1,
            DriftStatus::Alert => self.alert += 1,
            DriftStatus::Missing => self.missing += 1,
        }
    }
}

/// Thresholds a report was computed with.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThresholdsUsed {
    pub warn: f64,
    pub alert: f64,
    pub missing_rate_delta: f64,
    pub epsilon: f64,
}

impl From<&DriftConfig> for ThresholdsUsed {
    fn from(cfg: &DriftConfig) -> Self {
        Self {
            warn: cfg.warn_threshold,
            alert: cfg.alert_threshold,
            missing_rate_delta: cfg.missing_rate_delta,
            epsilon: cfg.epsilon,
        }
    }
}

/// Immutable result of one drift run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub version: Version,
    pub baseline_created_at: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
    pub rows: usize,
    /// Worst status over features and score; never `missing`.
    pub global_status: DriftStatus,
    pub features: Vec<FeatureDrift>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<ScoreDrift>,
    /// Present in the current sample but not in the baseline.
    #[serde(default)]
    pub unexpected_features: Vec<String>,
    /// Feature statuses only; the score's status lives in `score`.
    pub summary: StatusCounts,
    pub thresholds: ThresholdsUsed,
}

/// Write-once storage of baselines, newest wins.
pub trait BaselineStore: Send + Sync {
    fn save(&self, baseline: &Baseline) -> GovResult<PathBuf>;
    fn latest(&self, version: &Version) -> GovResult<Baseline>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::ErrorKind;

    #[test]
    fn classification_boundaries() {
        let cfg = DriftConfig::default();
        assert_eq!(cfg.classify(0.0), DriftStatus::Ok);
        assert_eq!(cfg.classify(0.0999), DriftStatus::Ok);
        assert_eq!(cfg.classify(0.10), DriftStatus::Warn);
        assert_eq!(cfg.classify(0.25), DriftStatus::Warn);
        assert_eq!(cfg.classify(0.2501), DriftStatus::Alert);
    }

    #[test]
    fn missing_ranks_with_alert() {
        assert_eq!(DriftStatus::Warn.max(DriftStatus::Missing), DriftStatus::Missing);
        assert_eq!(DriftStatus::Alert.max(DriftStatus::Missing), DriftStatus::Alert);
        assert_eq!(DriftStatus::Ok.max(DriftStatus::Warn), DriftStatus::Warn);
    }

    #[test]
    fn config_validation() {
        assert!(DriftConfig::default().validate().is_ok());
        let bad = [
            DriftConfig { bins: 1, ..DriftConfig::default() },
            DriftConfig { warn_threshold: 0.3, ..DriftConfig::default() },
            DriftConfig { epsilon: 0.0, ..DriftConfig::default() },
            DriftConfig { missing_rate_delta: 1.5, ..DriftConfig::default() },
            DriftConfig { top_k: 0, ..DriftConfig::default() },
        ];
        for cfg in bad {
            assert_eq!(cfg.validate().unwrap_err().kind(), ErrorKind::Config, "{cfg:?}");
        }
    }

    #[test]
    fn bucket_labels_cover_every_proportion() {
        let numeric = Profile::Numeric {
            edges: vec![1.0, 2.5],
            proportions: vec![0.3, 0.3, 0.4],
            min: 0.0,
            max: 4.0,
            mean: 2.0,
        };
        assert_eq!(numeric.bucket_labels(), vec!["(-inf, 1]", "(1, 2.5]", "(2.5, +inf)"]);

        let cat = Profile::Categorical {
            categories: vec!["north".into()],
            proportions: vec![0.9, 0.1],
        };
        assert_eq!(cat.bucket_labels(), vec!["north", OTHER_BUCKET]);
    }

    #[test]
    fn profile_json_is_tagged() {
        let value = serde_json::to_value(Profile::Constant { value: 3.0 }).unwrap();
        assert_eq!(value, serde_json::json!({"kind": "constant", "value": 3.0}));
    }
}
