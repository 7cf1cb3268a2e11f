//! Classification metrics from labelled outcomes, and performance floors for
//! monitoring a champion once labels arrive.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::common::error::{GovError, GovResult};
use crate::registry::domain::Metrics;

pub const DEFAULT_THRESHOLD: f64 = 0.5;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub recall: f64,
    pub precision: f64,
    pub f1: f64,
    /// Undefined when only one class is present.
    pub auc: Option<f64>,
    pub brier: f64,
    pub n: usize,
}

impl ClassificationMetrics {
    /// Metric map in the shape bundles report.
    pub fn to_metrics(&self) -> Metrics {
        let mut out = Metrics::new();
        out.insert("recall", self.recall);
        out.insert("precision", self.precision);
        out.insert("f1", self.f1);
        if let Some(auc) = self.auc {
            out.insert("auc", auc);
        }
        out.insert("brier", self.brier);
        out.insert("n_validation_samples", self.n as f64);
        out
    }
}

/// Compute metrics for probability `scores` against binary `labels`,
/// predicting positive at `score >= threshold`.
pub fn classification_metrics(labels: &[bool], scores: &[f64], threshold: f64) -> GovResult<ClassificationMetrics> {
    if labels.len() != scores.len() {
        return Err(GovError::invalid(format!(
            "{} labels but {} scores",
            labels.len(),
            scores.len()
        )));
    }
    if labels.is_empty() {
        return Err(GovError::insufficient(0, 1));
    }
    if let Some(bad) = scores.iter().find(|s| !(0.0..=1.0).contains(*s)) {
        return Err(GovError::invalid(format!("score {bad} is not a probability")));
    }

    let (mut tp, mut fp, mut fneg) = (0usize, 0usize, 0usize);
    let mut brier = 0.0;
    for (&label, &score) in labels.iter().zip(scores) {
        let predicted = score >= threshold;
        match (predicted, label) {
            (true, true) => tp += 1,
            (true, false) => fp += 1,
            (false, true) => fneg += 1,
            (false, false) => {}
        }
        let target = if label { 1.0 } else { 0.0 };
        brier += (score - target).powi(2);
    }

    let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
    let recall = ratio(tp, tp + fneg);
    let precision = ratio(tp, tp + fp);
    let f1 = if recall + precision == 0.0 {
        0.0
    } else {
        2.0 * recall * precision / (recall + precision)
    };

    Ok(ClassificationMetrics {
        recall,
        precision,
        f1,
        auc: roc_auc(labels, scores),
        brier: brier / labels.len() as f64,
        n: labels.len(),
    })
}

/// ROC-AUC as the Mann-Whitney rank statistic, ties sharing their mean rank.
fn roc_auc(labels: &[bool], scores: &[f64]) -> Option<f64> {
    let positives = labels.iter().filter(|l| **l).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut positive_rank_sum = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // Ranks are 1-based; the tie group spans ranks i+1..=j+1.
        let mean_rank = (i + j) as f64 / 2.0 + 1.0;
        positive_rank_sum += mean_rank * order[i..=j].iter().filter(|&&k| labels[k]).count() as f64;
        i = j + 1;
    }

    let p = positives as f64;
    Some((positive_rank_sum - p * (p + 1.0) / 2.0) / (p * negatives as f64))
}

/// Minimum acceptable live performance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceFloors {
    pub recall: f64,
    pub precision: f64,
    pub auc: f64,
    /// Labelled rows needed before a verdict is given.
    pub min_samples: usize,
}

impl Default for PerformanceFloors {
    fn default() -> Self {
        Self {
            recall: 0.70,
            precision: 0.30,
            auc: 0.75,
            min_samples: 50,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FloorBreach {
    pub metric: String,
    pub value: f64,
    pub floor: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PerformanceCheck {
    pub metrics: ClassificationMetrics,
    pub breaches: Vec<FloorBreach>,
}

impl PerformanceCheck {
    pub fn healthy(&self) -> bool {
        self.breaches.is_empty()
    }
}

/// Compare live metrics with `floors`; refuses a verdict on too few rows.
pub fn check_performance(metrics: ClassificationMetrics, floors: &PerformanceFloors) -> GovResult<PerformanceCheck> {
    if metrics.n < floors.min_samples {
        return Err(GovError::insufficient(metrics.n, floors.min_samples));
    }

    let mut breaches = Vec::new();
    let mut check = |name: &str, value: Option<f64>, floor: f64| {
        if let Some(value) = value {
            if value < floor {
                warn!(metric = name, value, floor, "performance below floor");
                breaches.push(FloorBreach {
                    metric: name.to_string(),
                    value,
                    floor,
                });
            }
        }
    };
    check("recall", Some(metrics.recall), floors.recall);
    check("precision", Some(metrics.precision), floors.precision);
    check("auc", metrics.auc, floors.auc);

    Ok(PerformanceCheck { metrics, breaches })
}
