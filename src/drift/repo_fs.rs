//! Write-once storage of baselines and drift reports.
//!
//! Documents are named by a sortable UTC stamp so the newest one for a version
//! is simply the greatest file stem. Nothing here ever rewrites a document;
//! a new baseline supersedes the old one by sorting after it.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::common::config::AppCfg;
use crate::common::error::{GovError, GovResult};
use crate::common::json::{read_json, write_bytes_new, write_json_new};
use crate::common::time;
use crate::registry::domain::Version;

use super::domain::{Baseline, BaselineStore, DriftReport, DriftStatus};

const REPORT_PREFIX: &str = "drift-";

/// Suffixes appended when two documents land on the same millisecond.
const MAX_SAME_STAMP: usize = 100;

fn already_exists(err: &GovError) -> bool {
    matches!(err, GovError::Io { source, .. } if source.kind() == io::ErrorKind::AlreadyExists)
}

/// Create `<dir>/<prefix><stamp>[-NN].<ext>` exclusively, trying suffixes on collision.
fn create_stamped(
    dir: &Path,
    prefix: &str,
    at: DateTime<Utc>,
    ext: &str,
    write: impl Fn(&Path) -> GovResult<()>,
) -> GovResult<PathBuf> {
    let stamp = time::file_stamp(at);
    for attempt in 0..MAX_SAME_STAMP {
        let stem = if attempt == 0 {
            format!("{prefix}{stamp}")
        } else {
            format!("{prefix}{stamp}-{attempt:02}")
        };
        let path = dir.join(format!("{stem}.{ext}"));
        match write(&path) {
            Ok(()) => return Ok(path),
            Err(err) if already_exists(&err) => continue,
            Err(err) => return Err(err),
        }
    }
    Err(GovError::io(
        "create_stamped",
        dir,
        io::Error::new(io::ErrorKind::AlreadyExists, format!("{MAX_SAME_STAMP} documents share stamp {stamp}")),
    ))
}

/// Stamp encoded in a stem such as `drift-20260102T030405000Z-01`.
fn stem_stamp(stem: &str, prefix: &str) -> Option<DateTime<Utc>> {
    let rest = stem.strip_prefix(prefix)?;
    let stamp = rest.split('-').next()?;
    time::parse_stamp(stamp)
}

/// Files in `dir` with extension `ext` whose stem starts with `prefix`, oldest first.
fn stamped_files(dir: &Path, prefix: &str, ext: &str) -> GovResult<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(GovError::io("read_dir", dir, e)),
    };
    let mut files = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| GovError::io("read_dir", dir, e))?.path();
        let matches = path.extension().and_then(|e| e.to_str()) == Some(ext)
            && path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| stem_stamp(s, prefix))
                .is_some();
        if matches {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_stem().cmp(&b.file_stem()));
    Ok(files)
}

/// Baselines under `cfg.data_root/baselines/<version>/<stamp>.json`.
pub struct FsBaselineStore {
    root: PathBuf,
}

impl FsBaselineStore {
    pub fn new(cfg: &AppCfg) -> Self {
        Self::at(cfg.baselines_root())
    }

    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn version_dir(&self, version: &Version) -> PathBuf {
        self.root.join(version.to_string())
    }

    /// Every stored baseline for `version`, oldest first.
    pub fn list(&self, version: &Version) -> GovResult<Vec<PathBuf>> {
        stamped_files(&self.version_dir(version), "", "json")
    }
}

impl BaselineStore for FsBaselineStore {
    fn save(&self, baseline: &Baseline) -> GovResult<PathBuf> {
        let dir = self.version_dir(&baseline.version);
        let path = create_stamped(&dir, "", baseline.created_at, "json", |p| write_json_new(p, baseline))?;
        info!(version = %baseline.version, path = %path.display(), "saved baseline");
        Ok(path)
    }

    fn latest(&self, version: &Version) -> GovResult<Baseline> {
        let newest = self.list(version)?.pop().ok_or_else(|| GovError::NotFound {
            what: "baseline",
            id: version.to_string(),
        })?;
        debug!(version = %version, path = %newest.display(), "loading latest baseline");
        read_json(&newest)
    }
}

/// Paths of one persisted report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportPaths {
    pub json: PathBuf,
    pub markdown: PathBuf,
}

/// Reports under `cfg.data_root/reports/<version>/drift-<stamp>.{json,md}`.
pub struct FsReportStore {
    root: PathBuf,
    retention_days: u32,
}

impl FsReportStore {
    pub fn new(cfg: &AppCfg) -> Self {
        Self::at(cfg.reports_root(), cfg.drift.retention_days)
    }

    pub fn at(root: impl Into<PathBuf>, retention_days: u32) -> Self {
        Self {
            root: root.into(),
            retention_days,
        }
    }

    pub fn save(&self, report: &DriftReport) -> GovResult<ReportPaths> {
        let dir = self.root.join(report.version.to_string());
        let json = create_stamped(&dir, REPORT_PREFIX, report.generated_at, "json", |p| {
            write_json_new(p, report)
        })?;
        let markdown = json.with_extension("md");
        if let Err(err) = write_bytes_new(&markdown, render_markdown(report).as_bytes()) {
            // A report is only kept together with its rendering.
            if let Err(cleanup) = fs::remove_file(&json) {
                warn!(path = %json.display(), error = %cleanup, "could not remove unrendered report");
            }
            return Err(err);
        }
        info!(
            version = %report.version,
            global_status = %report.global_status,
            path = %json.display(),
            "saved drift report"
        );
        Ok(ReportPaths { json, markdown })
    }

    pub fn list(&self, version: &Version) -> GovResult<Vec<PathBuf>> {
        stamped_files(&self.root.join(version.to_string()), REPORT_PREFIX, "json")
    }

    pub fn latest(&self, version: &Version) -> GovResult<DriftReport> {
        let newest = self.list(version)?.pop().ok_or_else(|| GovError::NotFound {
            what: "drift report",
            id: version.to_string(),
        })?;
        read_json(&newest)
    }

    /// Remove reports past the configured retention window.
    pub fn prune(&self, now: DateTime<Utc>) -> GovResult<Vec<PathBuf>> {
        self.prune_older_than(self.retention_days, now)
    }

    /// Remove report files stamped more than `days` before `now`. Files that
    /// do not carry a report stamp are left alone.
    pub fn prune_older_than(&self, days: u32, now: DateTime<Utc>) -> GovResult<Vec<PathBuf>> {
        let cutoff = time::days_before(now, days);
        let versions = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(GovError::io("read_dir", &self.root, e)),
        };

        let mut removed = Vec::new();
        for version_dir in versions {
            let version_dir = version_dir.map_err(|e| GovError::io("read_dir", &self.root, e))?.path();
            if !version_dir.is_dir() {
                continue;
            }
            for ext in ["json", "md"] {
                for path in stamped_files(&version_dir, REPORT_PREFIX, ext)? {
                    let stamp = path
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .and_then(|s| stem_stamp(s, REPORT_PREFIX));
                    if stamp.is_some_and(|at| at < cutoff) {
                        fs::remove_file(&path).map_err(|e| GovError::io("prune", &path, e))?;
                        removed.push(path);
                    }
                }
            }
        }
        removed.sort();
        info!(removed = removed.len(), retention_days = days, "pruned drift reports");
        Ok(removed)
    }
}

fn fmt_opt(value: Option<f64>, precision: usize) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.precision$}"))
}

/// Markdown rendering of a report for humans.
pub fn render_markdown(report: &DriftReport) -> String {
    let mut lines = vec![
        format!("# Drift report: {}", report.version),
        String::new(),
        format!("- Generated: {}", report.generated_at.to_rfc3339()),
        format!("- Baseline built: {}", report.baseline_created_at.to_rfc3339()),
        format!("- Rows analysed: {}", report.rows),
        format!("- Global status: **{}**", report.global_status.as_str().to_uppercase()),
        format!(
            "- Features: {} ok, {} warn, {} alert, {} missing",
            report.summary.ok, report.summary.warn, report.summary.alert, report.summary.missing
        ),
        format!(
            "- Score: {}",
            report.score.as_ref().map_or("not monitored", |s| s.status.as_str())
        ),
        String::new(),
        "## Features".to_string(),
        String::new(),
        "| Feature | Kind | Statistic | Status | Missing rate (baseline -> current) |".to_string(),
        "|---|---|---:|---|---|".to_string(),
    ];

    let mut features: Vec<_> = report.features.iter().collect();
    // Missing features first, then by statistic descending.
    features.sort_by(|a, b| {
        let key = |s: Option<f64>| s.unwrap_or(f64::INFINITY);
        key(b.statistic).total_cmp(&key(a.statistic))
    });
    for f in features {
        let flag = if f.missing_rate_flagged { " (flagged)" } else { "" };
        lines.push(format!(
            "| {} | {} | {} | {} | {:.3} -> {}{} |",
            f.feature,
            f.kind,
            fmt_opt(f.statistic, 4),
            f.status,
            f.baseline_missing_rate,
            fmt_opt(f.current_missing_rate, 3),
            flag
        ));
    }

    if let Some(score) = &report.score {
        lines.extend([
            String::new(),
            "## Score".to_string(),
            String::new(),
            format!("- Statistic: {}", fmt_opt(score.statistic, 4)),
            format!("- Status: {}", score.status),
            format!("- Mean: {:.4} -> {}", score.baseline_mean, fmt_opt(score.current_mean, 4)),
        ]);
    }

    if !report.unexpected_features.is_empty() {
        lines.extend([
            String::new(),
            "## Unexpected features".to_string(),
            String::new(),
            report.unexpected_features.join(", "),
        ]);
    }

    let t = &report.thresholds;
    lines.extend([
        String::new(),
        "## Thresholds".to_string(),
        String::new(),
        format!(
            "warn at >= {}, alert above {}, missing-rate delta above {}, epsilon {:e}",
            t.warn, t.alert, t.missing_rate_delta, t.epsilon
        ),
        String::new(),
        "## Recommendations".to_string(),
        String::new(),
    ]);
    let advice: &[&str] = match report.global_status {
        DriftStatus::Alert | DriftStatus::Missing => &[
            "Investigate the alerting features and any missing inputs now.",
            "Check upstream data pipelines for schema or source changes.",
            "Consider rolling back if live performance degrades.",
            "Schedule retraining on recent data.",
        ],
        DriftStatus::Warn => &[
            "Watch how the warning features evolve over the next runs.",
            "Check whether the shift is seasonal or persistent.",
            "Prepare a retraining run.",
        ],
        DriftStatus::Ok => &["No action needed; keep monitoring."],
    };
    lines.extend(advice.iter().map(|a| format!("- {a}")));
    lines.push(String::new());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::ErrorKind;
    use crate::data::domain::Sample;
    use crate::drift::domain::DriftConfig;
    use crate::drift::service::{build_baseline, compute_drift};
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn baseline() -> Baseline {
        let mut sample = Sample::new(200);
        sample.insert_numeric("x", (0..200).map(f64::from).collect()).unwrap();
        build_baseline(Version::new(1, 0, 0), &sample, &["x"], &DriftConfig::default()).unwrap()
    }

    fn report(b: &Baseline, values: Vec<f64>) -> DriftReport {
        let mut sample = Sample::new(values.len());
        sample.insert_numeric("x", values).unwrap();
        compute_drift(&sample, b, &DriftConfig::default()).unwrap()
    }

    #[test]
    fn baselines_are_write_once_and_latest_wins() {
        let dir = TempDir::new().unwrap();
        let store = FsBaselineStore::at(dir.path());
        let v = Version::new(1, 0, 0);
        assert_eq!(store.latest(&v).unwrap_err().kind(), ErrorKind::NotFound);

        let first = baseline();
        let mut second = first.clone();
        second.rows = 999;
        // Same stamp on purpose: the second document must not overwrite the first.
        second.created_at = first.created_at;

        let p1 = store.save(&first).unwrap();
        let p2 = store.save(&second).unwrap();
        assert_ne!(p1, p2);
        assert_eq!(store.list(&v).unwrap(), vec![p1.clone(), p2]);
        assert_eq!(store.latest(&v).unwrap().rows, 999);
        assert_eq!(read_json::<Baseline>(&p1).unwrap(), first);
    }

    #[test]
    fn reports_persist_with_markdown() {
        let dir = TempDir::new().unwrap();
        let store = FsReportStore::at(dir.path(), 90);
        let b = baseline();
        let r = report(&b, (0..100).map(|i| f64::from(i) + 500.0).collect());

        let paths = store.save(&r).unwrap();
        assert!(paths.json.file_name().unwrap().to_str().unwrap().starts_with("drift-"));
        let md = fs::read_to_string(&paths.markdown).unwrap();
        assert!(md.contains("Global status: **ALERT**"), "{md}");
        assert!(md.contains("| x | numeric |"), "{md}");
        assert!(md.contains("Schedule retraining"), "{md}");
        assert_eq!(store.latest(&b.version).unwrap(), r);
    }

    #[test]
    fn prune_removes_only_expired_reports() {
        let dir = TempDir::new().unwrap();
        let store = FsReportStore::at(dir.path(), 30);
        let b = baseline();
        let now = Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap();

        let mut old = report(&b, (0..100).map(f64::from).collect());
        old.generated_at = now - Duration::days(45);
        let mut recent = old.clone();
        recent.generated_at = now - Duration::days(5);
        let old_paths = store.save(&old).unwrap();
        let recent_paths = store.save(&recent).unwrap();
        fs::write(dir.path().join("v1.0.0").join("notes.txt"), "keep").unwrap();

        let removed = store.prune(now).unwrap();
        let mut expected = vec![old_paths.json.clone(), old_paths.markdown.clone()];
        expected.sort();
        assert_eq!(removed, expected);
        assert!(!old_paths.json.exists());
        assert!(recent_paths.json.exists() && recent_paths.markdown.exists());
        assert!(dir.path().join("v1.0.0/notes.txt").exists());
    }

    #[test]
    fn unwritable_rendering_leaves_no_report() {
        let dir = TempDir::new().unwrap();
        let store = FsReportStore::at(dir.path(), 90);
        let b = baseline();
        let r = report(&b, (0..100).map(f64::from).collect());

        // Occupy the Markdown path so only the JSON document can be created.
        let stem = format!("{REPORT_PREFIX}{}", time::file_stamp(r.generated_at));
        let version_dir = dir.path().join(b.version.to_string());
        fs::create_dir_all(version_dir.join(format!("{stem}.md"))).unwrap();

        assert_eq!(store.save(&r).unwrap_err().kind(), ErrorKind::Io);
        assert!(!version_dir.join(format!("{stem}.json")).exists());
        assert!(store.list(&b.version).unwrap().is_empty());
        assert_eq!(store.latest(&b.version).unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn score_status_is_part_of_the_summary() {
        let dir = TempDir::new().unwrap();
        let store = FsReportStore::at(dir.path(), 90);

        let b = baseline();
        let unscored = report(&b, (0..100).map(f64::from).collect());
        assert!(render_markdown(&unscored).contains("- Score: not monitored"));

        let mut reference = Sample::new(200);
        reference
            .insert_numeric("x", (0..200).map(f64::from).collect())
            .unwrap()
            .set_scores((0..200).map(|i| Some(f64::from(i) / 200.0)).collect())
            .unwrap();
        let scored = build_baseline(Version::new(1, 0, 0), &reference, &["x"], &DriftConfig::default()).unwrap();
        let r = report(&scored, (0..200).map(f64::from).collect());
        assert_eq!(r.summary.missing, 0);
        let paths = store.save(&r).unwrap();
        let md = fs::read_to_string(&paths.markdown).unwrap();
        assert!(md.contains("- Score: missing"), "{md}");
        assert!(md.contains("Global status: **ALERT**"), "{md}");
    }

    #[test]
    fn stems_parse_with_collision_suffix() {
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let stem = format!("drift-{}-03", time::file_stamp(at));
        assert_eq!(stem_stamp(&stem, REPORT_PREFIX), Some(at));
        assert_eq!(stem_stamp("drift-garbage", REPORT_PREFIX), None);
        assert_eq!(stem_stamp("baseline", REPORT_PREFIX), None);
    }
}
