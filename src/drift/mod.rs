//! Drift detection: frozen baselines, drift reports and their storage.

pub mod domain;
pub mod repo_fs;
pub mod service;

pub use domain::{Baseline, BaselineStore, DriftConfig, DriftReport, DriftStatus, Profile};
pub use repo_fs::{render_markdown, FsBaselineStore, FsReportStore, ReportPaths};
pub use service::{build_baseline, compute_drift, needs_retraining};
