//! Columnar samples used as drift reference and live windows.
//!
//! A sample is a fixed number of rows, a set of named feature columns and an
//! optional model score column. Missing values are `None` and count toward a
//! feature's missing rate.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::error::{GovError, GovResult};

/// One feature column.
#[derive(Clone, Debug, PartialEq)]
pub enum Column {
    Numeric(Vec<Option<f64>>),
    Categorical(Vec<Option<String>>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn missing_count(&self) -> usize {
        match self {
            Column::Numeric(v) => v.iter().filter(|x| x.is_none()).count(),
            Column::Categorical(v) => v.iter().filter(|x| x.is_none()).count(),
        }
    }

    /// Fraction of rows with no value; zero for an empty column.
    pub fn missing_rate(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        self.missing_count() as f64 / self.len() as f64
    }
}

/// Rows of features plus an optional score column.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Sample {
    rows: usize,
    columns: BTreeMap<String, Column>,
    scores: Option<Vec<Option<f64>>>,
}

impl Sample {
    pub fn new(rows: usize) -> Self {
        Self {
            rows,
            columns: BTreeMap::new(),
            scores: None,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    pub fn feature_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn scores(&self) -> Option<&[Option<f64>]> {
        self.scores.as_deref()
    }

    /// Add or replace a column; its length must equal the row count.
    pub fn insert(&mut self, name: impl Into<String>, column: Column) -> GovResult<&mut Self> {
        let name = name.into();
        if column.len() != self.rows {
            return Err(GovError::invalid(format!(
                "column `{name}` has {} values, sample has {} rows",
                column.len(),
                self.rows
            )));
        }
        self.columns.insert(name, column);
        Ok(self)
    }

    pub fn insert_numeric(&mut self, name: impl Into<String>, values: Vec<f64>) -> GovResult<&mut Self> {
        self.insert(name, Column::Numeric(values.into_iter().map(Some).collect()))
    }

    pub fn insert_categorical<S: Into<String>>(
        &mut self,
        name: impl Into<String>,
        values: Vec<S>,
    ) -> GovResult<&mut Self> {
        self.insert(
            name,
            Column::Categorical(values.into_iter().map(|v| Some(v.into())).collect()),
        )
    }

    pub fn set_scores(&mut self, scores: Vec<Option<f64>>) -> GovResult<&mut Self> {
        if scores.len() != self.rows {
            return Err(GovError::invalid(format!(
                "score column has {} values, sample has {} rows",
                scores.len(),
                self.rows
            )));
        }
        self.scores = Some(scores);
        Ok(self)
    }

    /// Build a columnar sample from row records.
    ///
    /// A feature becomes categorical as soon as one of its observed values is
    /// not a number; nulls and absent keys are missing values.
    pub fn from_records(records: &[Record]) -> Self {
        let rows = records.len();
        let mut names: BTreeMap<&str, bool> = BTreeMap::new();
        for record in records {
            for (name, value) in &record.features {
                let categorical = names.entry(name.as_str()).or_insert(false);
                if !value.is_null() && !value.is_number() {
                    *categorical = true;
                }
            }
        }

        let mut columns = BTreeMap::new();
        for (name, categorical) in names {
            let column = if categorical {
                Column::Categorical(
                    records
                        .iter()
                        .map(|r| r.features.get(name).and_then(category_of))
                        .collect(),
                )
            } else {
                Column::Numeric(
                    records
                        .iter()
                        .map(|r| r.features.get(name).and_then(serde_json::Value::as_f64))
                        .collect(),
                )
            };
            columns.insert(name.to_string(), column);
        }

        let scores = if records.iter().any(|r| r.score.is_some()) {
            Some(records.iter().map(|r| r.score).collect())
        } else {
            None
        };

        Self {
            rows,
            columns,
            scores,
        }
    }
}

fn category_of(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// One scored observation, as stored line by line in sample files.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub features: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// Repository contract for sample streams.
pub trait SampleRepo {
    fn append(&self, stream: &str, records: &[Record]) -> GovResult<()>;
    /// Load a stream, keeping only records at or after `since` when given.
    /// Records without a timestamp are always kept.
    fn load(&self, stream: &str, since: Option<DateTime<Utc>>) -> GovResult<Sample>;
}
