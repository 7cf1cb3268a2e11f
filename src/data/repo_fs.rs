//! Filesystem-backed sample streams stored as JSON lines.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::common::config::AppCfg;
use crate::common::error::{GovError, GovResult};

use super::domain::{Record, Sample, SampleRepo};

/// Sample streams rooted at `cfg.data_root/samples`, one `<stream>.jsonl` each.
pub struct FsSampleRepo {
    root: PathBuf,
}

impl FsSampleRepo {
    pub fn new(cfg: &AppCfg) -> Self {
        Self::at(cfg.data_root.join("samples"))
    }

    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn stream_path(&self, stream: &str) -> GovResult<PathBuf> {
        let valid = !stream.is_empty()
            && stream
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            && !stream.starts_with('.');
        if !valid {
            return Err(GovError::invalid(format!("invalid sample stream name `{stream}`")));
        }
        Ok(self.root.join(format!("{stream}.jsonl")))
    }
}

/// Read every record of a JSON-lines file. Blank lines are skipped.
pub fn read_jsonl(path: &Path) -> GovResult<Vec<Record>> {
    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => GovError::NotFound {
            what: "sample file",
            id: path.display().to_string(),
        },
        _ => GovError::io("open", path, e),
    })?;

    let mut records = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| GovError::io("read_line", path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        let record: Record = serde_json::from_str(&line).map_err(|e| {
            GovError::invalid(format!("{}:{}: malformed record: {e}", path.display(), idx + 1))
        })?;
        records.push(record);
    }
    Ok(records)
}

/// Load a JSON-lines file straight into a columnar sample.
pub fn load_sample(path: &Path) -> GovResult<Sample> {
    Ok(Sample::from_records(&read_jsonl(path)?))
}

impl SampleRepo for FsSampleRepo {
    fn append(&self, stream: &str, records: &[Record]) -> GovResult<()> {
        let path = self.stream_path(stream)?;
        fs::create_dir_all(&self.root).map_err(|e| GovError::io("create_dir", &self.root, e))?;

        let mut buf = Vec::new();
        for record in records {
            serde_json::to_writer(&mut buf, record).map_err(|e| GovError::serde(&path, e))?;
            buf.push(b'\n');
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| GovError::io("open_append", &path, e))?;
        file.write_all(&buf)
            .map_err(|e| GovError::io("append", &path, e))?;
        debug!(stream, records = records.len(), "appended sample records");
        Ok(())
    }

    fn load(&self, stream: &str, since: Option<DateTime<Utc>>) -> GovResult<Sample> {
        let path = self.stream_path(stream)?;
        let mut records = read_jsonl(&path)?;
        if let Some(since) = since {
            records.retain(|r| r.timestamp.map_or(true, |ts| ts >= since));
        }
        debug!(stream, rows = records.len(), "loaded sample stream");
        Ok(Sample::from_records(&records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::ErrorKind;
    use crate::data::domain::Column;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn rec(ts: Option<DateTime<Utc>>, x: f64) -> Record {
        let mut record = Record {
            timestamp: ts,
            score: Some(x / 10.0),
            ..Record::default()
        };
        record.features.insert("x".into(), serde_json::json!(x));
        record
    }

    #[test]
    fn append_then_load_with_window() {
        let dir = TempDir::new().unwrap();
        let repo = FsSampleRepo::at(dir.path());
        let old = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let new = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();

        repo.append("live", &[rec(Some(old), 1.0), rec(Some(new), 2.0)]).unwrap();
        repo.append("live", &[rec(None, 3.0)]).unwrap();

        let all = repo.load("live", None).unwrap();
        assert_eq!(all.rows(), 3);

        let recent = repo
            .load("live", Some(Utc.with_ymd_and_hms(2026, 1, 15, 0, 0, 0).unwrap()))
            .unwrap();
        assert_eq!(recent.rows(), 2);
        assert_eq!(
            recent.column("x"),
            Some(&Column::Numeric(vec![Some(2.0), Some(3.0)]))
        );
    }

    #[test]
    fn malformed_line_reports_its_position() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.jsonl");
        fs::write(&path, "{\"features\":{}}\n\nnot-json\n").unwrap();
        let err = read_jsonl(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains(":3:"), "{err}");
    }

    #[test]
    fn missing_stream_and_bad_names() {
        let dir = TempDir::new().unwrap();
        let repo = FsSampleRepo::at(dir.path());
        assert_eq!(repo.load("nothing", None).unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(
            repo.append("../escape", &[]).unwrap_err().kind(),
            ErrorKind::Validation
        );
    }
}
