//! Guardrail policy and verdict types.
//!
//! A policy is loaded as a plain [`GuardrailConfig`] and converted into a
//! [`GuardrailPolicy`] once, so every policy in circulation has already been
//! validated.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::common::error::{GovError, GovResult};

pub const DEFAULT_MIN_VALIDATION_SAMPLES: u64 = 500;
pub const SAMPLE_COUNT_METRIC: &str = "n_validation_samples";

/// Float noise absorbed when comparing a degradation to its limit.
pub const TOLERANCE: f64 = 1e-9;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    HigherIsBetter,
    LowerIsBetter,
}

impl Direction {
    /// How much worse `challenger` is than `champion`; negative means better.
    pub fn degradation(self, champion: f64, challenger: f64) -> f64 {
        let delta = challenger - champion;
        match self {
            Direction::HigherIsBetter => -delta,
            Direction::LowerIsBetter => delta,
        }
    }
}

/// One metric that may not degrade by `max_degradation` or more.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Guardrail {
    pub metric: String,
    pub direction: Direction,
    pub max_degradation: f64,
}

impl Guardrail {
    pub fn new(metric: impl Into<String>, direction: Direction, max_degradation: f64) -> Self {
        Self {
            metric: metric.into(),
            direction,
            max_degradation,
        }
    }
}

/// Policy as written in configuration files.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardrailConfig {
    pub rules: Vec<Guardrail>,
    pub min_validation_samples: u64,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            rules: vec![
                Guardrail::new("recall", Direction::HigherIsBetter, 0.02),
                Guardrail::new("precision", Direction::HigherIsBetter, 0.05),
                Guardrail::new("brier", Direction::LowerIsBetter, 0.02),
                Guardrail::new("auc", Direction::HigherIsBetter, 0.0),
            ],
            min_validation_samples: DEFAULT_MIN_VALIDATION_SAMPLES,
        }
    }
}

/// Validated guardrail policy.
#[derive(Clone, Debug, PartialEq)]
pub struct GuardrailPolicy {
    rules: Vec<Guardrail>,
    min_validation_samples: u64,
}

impl GuardrailPolicy {
    pub fn rules(&self) -> &[Guardrail] {
        &self.rules
    }

    pub fn min_validation_samples(&self) -> u64 {
        self.min_validation_samples
    }

    pub fn rule(&self, metric: &str) -> Option<&Guardrail> {
        self.rules.iter().find(|r| r.metric == metric)
    }
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        let cfg = GuardrailConfig::default();
        Self {
            rules: cfg.rules,
            min_validation_samples: cfg.min_validation_samples,
        }
    }
}

impl TryFrom<GuardrailConfig> for GuardrailPolicy {
    type Error = GovError;

    fn try_from(cfg: GuardrailConfig) -> GovResult<Self> {
        let mut seen = BTreeSet::new();
        for rule in &cfg.rules {
            if rule.metric.trim().is_empty() {
                return Err(GovError::Config("guardrail with empty metric name".into()));
            }
            if !seen.insert(rule.metric.as_str()) {
                return Err(GovError::Config(format!(
                    "guardrail for `{}` declared twice",
                    rule.metric
                )));
            }
            if !rule.max_degradation.is_finite() || rule.max_degradation < 0.0 {
                return Err(GovError::Config(format!(
                    "guardrail `{}` has invalid max_degradation {}",
                    rule.metric, rule.max_degradation
                )));
            }
        }
        Ok(Self {
            rules: cfg.rules,
            min_validation_samples: cfg.min_validation_samples,
        })
    }
}

impl From<&GuardrailPolicy> for GuardrailConfig {
    fn from(policy: &GuardrailPolicy) -> Self {
        Self {
            rules: policy.rules.clone(),
            min_validation_samples: policy.min_validation_samples,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Metric worsened by at least its limit.
    Degradation,
    /// Metric absent (or not finite) on either side.
    MissingMetric,
    /// Challenger validated on too few samples.
    InsufficientSamples,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub metric: String,
    /// `challenger - champion`; absent when a side lacks the metric.
    pub delta: Option<f64>,
    pub limit: f64,
    pub kind: ViolationKind,
}

/// Outcome of comparing a challenger to the champion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub accepted: bool,
    pub violations: Vec<Violation>,
}

impl Verdict {
    pub fn from_violations(violations: Vec<Violation>) -> Self {
        Self {
            accepted: violations.is_empty(),
            violations,
        }
    }

    /// One-line explanation, suitable as a history reason.
    pub fn summary(&self) -> String {
        if self.accepted {
            return "all guardrails passed".to_string();
        }
        let parts: Vec<String> = self
            .violations
            .iter()
            .map(|v| match (v.kind, v.delta) {
                (ViolationKind::MissingMetric, _) => format!("{}: metric missing", v.metric),
                (ViolationKind::InsufficientSamples, Some(d)) => {
                    format!("{}: {} short of {}", v.metric, -d, v.limit)
                }
                (_, Some(d)) => format!("{}: delta {d:+.4} hits limit {}", v.metric, v.limit),
                (_, None) => format!("{}: limit {}", v.metric, v.limit),
            })
            .collect();
        format!("guardrails violated: {}", parts.join("; "))
    }
}
