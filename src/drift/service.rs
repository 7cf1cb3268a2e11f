//! Baseline construction and drift computation.
//!
//! Numeric features are cut into equal-frequency bins over the reference
//! sample; categorical features keep their top-k categories plus an
//! `__other__` bucket. Current data is rebinned with the stored buckets and
//! compared with
//!
//! ```text
//! stat = sum_i (p_cur_i - p_ref_i) * ln(p_cur_i / p_ref_i)
//! ```
//!
//! where empty proportions are replaced by `epsilon`.

use std::collections::BTreeMap;

use tracing::{debug, info};

use crate::common::error::{GovError, GovResult};
use crate::common::time;
use crate::data::domain::{Column, Sample};
use crate::registry::domain::Version;

use super::domain::{
    Baseline, DriftConfig, DriftReport, DriftStatus, FeatureBaseline, FeatureDrift, Profile,
    ScoreBaseline, ScoreDrift, StatusCounts, ThresholdsUsed,
};

/// Non-missing values of a column.
enum Observed {
    Numeric(Vec<f64>),
    Categorical(Vec<String>),
}

impl Observed {
    fn len(&self) -> usize {
        match self {
            Observed::Numeric(v) => v.len(),
            Observed::Categorical(v) => v.len(),
        }
    }
}

fn observe(column: &Column) -> Observed {
    match column {
        Column::Numeric(values) => {
            Observed::Numeric(values.iter().flatten().copied().filter(|v| v.is_finite()).collect())
        }
        Column::Categorical(values) => Observed::Categorical(values.iter().flatten().cloned().collect()),
    }
}

/// Numeric view of a column; unparseable categories count as missing.
fn numeric_values(column: &Column) -> Vec<f64> {
    match observe(column) {
        Observed::Numeric(values) => values,
        Observed::Categorical(values) => values
            .iter()
            .filter_map(|s| s.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .collect(),
    }
}

fn categorical_values(column: &Column) -> Vec<String> {
    match observe(column) {
        Observed::Categorical(values) => values,
        Observed::Numeric(values) => values.iter().map(|v| v.to_string()).collect(),
    }
}

/// Interior edges of `bins` equal-frequency bins over sorted values,
/// deduplicated so the bins stay well defined under ties.
fn equal_frequency_edges(sorted: &[f64], bins: usize) -> Vec<f64> {
    let n = sorted.len();
    let mut edges: Vec<f64> = Vec::with_capacity(bins.saturating_sub(1));
    for i in 1..bins {
        let rank = i * n / bins;
        if rank == 0 {
            continue;
        }
        let edge = sorted[rank - 1];
        if edges.last().map_or(true, |last| edge > *last) {
            edges.push(edge);
        }
    }
    edges
}

fn bin_index(edges: &[f64], value: f64) -> usize {
    edges.partition_point(|e| *e < value)
}

fn proportions(counts: &[usize], total: usize) -> Vec<f64> {
    if total == 0 {
        return vec![0.0; counts.len()];
    }
    counts.iter().map(|c| *c as f64 / total as f64).collect()
}

/// Drift statistic between two proportion vectors of equal length.
pub fn drift_statistic(reference: &[f64], current: &[f64], epsilon: f64) -> f64 {
    let floor = |p: f64| if p > 0.0 { p } else { epsilon };
    reference
        .iter()
        .zip(current)
        .map(|(&r, &c)| {
            let (r, c) = (floor(r), floor(c));
            (c - r) * (c / r).ln()
        })
        .sum()
}

fn numeric_profile(mut values: Vec<f64>, bins: usize) -> Profile {
    values.sort_by(f64::total_cmp);
    let min = values[0];
    let max = values[values.len() - 1];
    if min == max {
        return Profile::Constant { value: min };
    }
    let edges = equal_frequency_edges(&values, bins);
    let mut counts = vec![0usize; edges.len() + 1];
    for v in &values {
        counts[bin_index(&edges, *v)] += 1;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    Profile::Numeric {
        proportions: proportions(&counts, values.len()),
        edges,
        min,
        max,
        mean,
    }
}

fn categorical_profile(values: &[String], top_k: usize) -> Profile {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for v in values {
        *counts.entry(v.as_str()).or_default() += 1;
    }
    let mut ranked: Vec<(&str, usize)> = counts.into_iter().collect();
    // Most frequent first; ties by name keep the choice deterministic.
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let kept = ranked.len().min(top_k);
    let other: usize = ranked[kept..].iter().map(|(_, c)| c).sum();
    let mut bucket_counts: Vec<usize> = ranked[..kept].iter().map(|(_, c)| *c).collect();
    bucket_counts.push(other);
    Profile::Categorical {
        categories: ranked[..kept].iter().map(|(name, _)| name.to_string()).collect(),
        proportions: proportions(&bucket_counts, values.len()),
    }
}

/// Current-sample proportions over the buckets of `profile`.
fn rebin(profile: &Profile, column: &Column) -> (Vec<f64>, usize) {
    match profile {
        Profile::Numeric { edges, .. } => {
            let values = numeric_values(column);
            let mut counts = vec![0usize; edges.len() + 1];
            for v in &values {
                counts[bin_index(edges, *v)] += 1;
            }
            (proportions(&counts, values.len()), values.len())
        }
        Profile::Constant { value } => {
            let values = numeric_values(column);
            let same = values.iter().filter(|v| **v == *value).count();
            (proportions(&[same, values.len() - same], values.len()), values.len())
        }
        Profile::Categorical { categories, .. } => {
            let values = categorical_values(column);
            let mut counts = vec![0usize; categories.len() + 1];
            for v in &values {
                let idx = categories.iter().position(|c| c == v).unwrap_or(categories.len());
                counts[idx] += 1;
            }
            (proportions(&counts, values.len()), values.len())
        }
    }
}

fn reference_proportions(profile: &Profile) -> Vec<f64> {
    match profile {
        Profile::Numeric { proportions, .. } | Profile::Categorical { proportions, .. } => {
            proportions.clone()
        }
        Profile::Constant { .. } => vec![1.0, 0.0],
    }
}

/// Statistic and status for current proportions against a profile.
fn score_against(profile: &Profile, current: &[f64], cfg: &DriftConfig) -> (f64, DriftStatus) {
    let reference = reference_proportions(profile);
    let stat = drift_statistic(&reference, current, cfg.epsilon);
    let status = match profile {
        // Any departure from a constant is an alert, however small.
        Profile::Constant { .. } if current.get(1).is_some_and(|p| *p > 0.0) => DriftStatus::Alert,
        _ => cfg.classify(stat),
    };
    (stat, status)
}

/// Build the frozen reference distribution for `version`.
pub fn build_baseline<S: AsRef<str>>(
    version: Version,
    reference: &Sample,
    features: &[S],
    cfg: &DriftConfig,
) -> GovResult<Baseline> {
    if reference.rows() < cfg.min_rows {
        return Err(GovError::insufficient(reference.rows(), cfg.min_rows));
    }

    let mut baselines = Vec::with_capacity(features.len());
    for feature in features {
        let name: &str = feature.as_ref();
        let no_values = || GovError::InsufficientData {
            rows: 0,
            required: 1,
            feature: Some(name.to_string()),
        };
        let column = reference.column(name).ok_or_else(no_values)?;
        let observed = observe(column);
        if observed.len() == 0 {
            return Err(no_values());
        }
        let count = observed.len();
        let profile = match observed {
            Observed::Numeric(values) => numeric_profile(values, cfg.bins),
            Observed::Categorical(values) => categorical_profile(&values, cfg.top_k),
        };
        debug!(feature = name, kind = profile.kind(), observed = count, "profiled feature");
        baselines.push(FeatureBaseline {
            name: name.to_string(),
            missing_rate: column.missing_rate(),
            observed: count,
            profile,
        });
    }

    let score = reference.scores().and_then(|scores| {
        let values: Vec<f64> = scores.iter().flatten().copied().filter(|v| v.is_finite()).collect();
        if values.is_empty() {
            return None;
        }
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        Some(ScoreBaseline {
            observed: values.len(),
            mean,
            profile: numeric_profile(values, cfg.bins),
        })
    });

    info!(
        version = %version,
        rows = reference.rows(),
        features = baselines.len(),
        has_score = score.is_some(),
        "built baseline"
    );
    Ok(Baseline {
        version,
        created_at: time::now(),
        rows: reference.rows(),
        features: baselines,
        score,
    })
}

fn feature_drift(feature: &FeatureBaseline, current: &Sample, cfg: &DriftConfig) -> FeatureDrift {
    let buckets = feature.profile.bucket_labels();
    let reference = reference_proportions(&feature.profile);
    let mut drift = FeatureDrift {
        feature: feature.name.clone(),
        kind: feature.profile.kind().to_string(),
        statistic: None,
        status: DriftStatus::Missing,
        baseline_missing_rate: feature.missing_rate,
        current_missing_rate: None,
        missing_rate_delta: None,
        missing_rate_flagged: false,
        buckets,
        reference,
        current: Vec::new(),
    };

    let Some(column) = current.column(&feature.name) else {
        return drift;
    };
    let (proportions, observed) = rebin(&feature.profile, column);
    let current_missing = 1.0 - observed as f64 / current.rows() as f64;
    let delta = current_missing - feature.missing_rate;
    drift.current_missing_rate = Some(current_missing);
    drift.missing_rate_delta = Some(delta);
    drift.missing_rate_flagged = delta.abs() > cfg.missing_rate_delta;
    if observed == 0 {
        return drift;
    }

    let (stat, mut status) = score_against(&feature.profile, &proportions, cfg);
    if drift.missing_rate_flagged {
        status = status.max(DriftStatus::Warn);
    }
    drift.statistic = Some(stat);
    drift.status = status;
    drift.current = proportions;
    drift
}

fn score_drift(baseline: &ScoreBaseline, current: &Sample, cfg: &DriftConfig) -> ScoreDrift {
    let values: Vec<f64> = current
        .scores()
        .map(|s| s.iter().flatten().copied().filter(|v| v.is_finite()).collect())
        .unwrap_or_default();
    if values.is_empty() {
        return ScoreDrift {
            statistic: None,
            status: DriftStatus::Missing,
            baseline_mean: baseline.mean,
            current_mean: None,
        };
    }

    let column = Column::Numeric(values.iter().copied().map(Some).collect());
    let (proportions, _) = rebin(&baseline.profile, &column);
    let (stat, status) = score_against(&baseline.profile, &proportions, cfg);
    ScoreDrift {
        statistic: Some(stat),
        status,
        baseline_mean: baseline.mean,
        current_mean: Some(values.iter().sum::<f64>() / values.len() as f64),
    }
}

/// Compare a current sample against a baseline.
pub fn compute_drift(current: &Sample, baseline: &Baseline, cfg: &DriftConfig) -> GovResult<DriftReport> {
    if current.is_empty() {
        return Err(GovError::insufficient(0, 1));
    }

    let features: Vec<FeatureDrift> = baseline
        .features
        .iter()
        .map(|f| feature_drift(f, current, cfg))
        .collect();
    let score = baseline.score.as_ref().map(|s| score_drift(s, current, cfg));

    let mut summary = StatusCounts::default();
    let mut global = DriftStatus::Ok;
    for status in features.iter().map(|f| f.status).chain(score.iter().map(|s| s.status)) {
        global = global.max(status);
    }
    for f in &features {
        summary.add(f.status);
    }
    if global == DriftStatus::Missing {
        global = DriftStatus::Alert;
    }

    let unexpected_features: Vec<String> = current
        .feature_names()
        .filter(|name| baseline.feature(name).is_none())
        .map(str::to_string)
        .collect();

    info!(
        version = %baseline.version,
        rows = current.rows(),
        global_status = %global,
        alerts = summary.alert,
        missing = summary.missing,
        "computed drift"
    );
    Ok(DriftReport {
        version: baseline.version,
        baseline_created_at: baseline.created_at,
        generated_at: time::now(),
        rows: current.rows(),
        global_status: global,
        features,
        score,
        unexpected_features,
        summary,
        thresholds: ThresholdsUsed::from(cfg),
    })
}

/// Whether a report warrants training a challenger.
pub fn needs_retraining(report: &DriftReport) -> bool {
    report.global_status == DriftStatus::Alert
}
