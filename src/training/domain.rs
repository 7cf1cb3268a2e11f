//! Domain types for challenger training and retraining outcomes.

use std::path::PathBuf;

use serde::Serialize;

use crate::common::error::GovResult;
use crate::data::domain::Sample;
use crate::evaluation::domain::Verdict;
use crate::registry::domain::{ArtifactBundle, Version};

/// A freshly trained candidate and the reference data its baseline is built from.
#[derive(Clone, Debug)]
pub struct Challenger {
    pub bundle: ArtifactBundle,
    pub reference: Sample,
}

/// Interface for components that can produce a challenger.
///
/// The learning algorithm is opaque; only the bundle it yields is governed.
pub trait Trainer {
    fn train(&self, version: &Version) -> GovResult<Challenger>;
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Became champion.
    Promoted,
    /// Kept out; the champion is unchanged.
    Rejected,
    /// The challenger already is the champion; nothing recorded.
    Unchanged,
}

/// What a retraining run did, or would have done in a dry run.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RetrainOutcome {
    pub version: Version,
    pub previous_champion: Option<Version>,
    pub decision: Decision,
    /// Absent when there was no champion to compare against.
    pub verdict: Option<Verdict>,
    pub reason: String,
    pub dry_run: bool,
    pub baseline_path: Option<PathBuf>,
}

impl RetrainOutcome {
    pub fn promoted(&self) -> bool {
        self.decision == Decision::Promoted
    }
}
