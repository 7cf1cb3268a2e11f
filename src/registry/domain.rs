//! Domain types for versioned model bundles and the registry index.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::error::{GovError, GovResult};
use crate::common::ids::{sha256_hex, ContentHasher};
use crate::common::time;

/// Declared files of a bundle. Nothing else is looked up, under any name.
pub const MODEL_FILE: &str = "model.bin";
pub const SIGNATURE_FILE: &str = "signature.json";
pub const METRICS_FILE: &str = "metrics.json";
pub const METADATA_FILE: &str = "metadata.json";

/// Metrics every bundle has to report.
pub const REQUIRED_METRICS: [&str; 5] = ["recall", "precision", "auc", "brier", "n_validation_samples"];

/// Semantic version `MAJOR.MINOR.PATCH`, written canonically as `vMAJOR.MINOR.PATCH`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    major: u64,
    minor: u64,
    patch: u64,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self { major, minor, patch }
    }

    pub fn parse(raw: &str) -> GovResult<Self> {
        let trimmed = raw.trim();
        let body = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);
        let parts: Vec<&str> = body.split('.').collect();
        if parts.len() != 3 {
            return Err(GovError::invalid(format!(
                "version `{raw}` is not MAJOR.MINOR.PATCH"
            )));
        }
        let mut nums = [0u64; 3];
        for (slot, part) in nums.iter_mut().zip(&parts) {
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                return Err(GovError::invalid(format!(
                    "version `{raw}` has a non-numeric component `{part}`"
                )));
            }
            *slot = part
                .parse()
                .map_err(|_| GovError::invalid(format!("version component `{part}` is too large")))?;
        }
        Ok(Self::new(nums[0], nums[1], nums[2]))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = GovError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = GovError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Version> for String {
    fn from(value: Version) -> Self {
        value.to_string()
    }
}

/// Declared type and range of one input feature.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeatureKind {
    Numeric {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
    Categorical {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        values: Vec<String>,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    #[serde(flatten)]
    pub kind: FeatureKind,
}

impl FeatureSpec {
    pub fn numeric(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FeatureKind::Numeric { min: None, max: None },
        }
    }

    pub fn categorical(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FeatureKind::Categorical { values: Vec::new() },
        }
    }

    pub fn is_categorical(&self) -> bool {
        matches!(self.kind, FeatureKind::Categorical { .. })
    }
}

/// Ordered input features the model expects.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(Vec<FeatureSpec>);

impl Signature {
    pub fn new(features: Vec<FeatureSpec>) -> Self {
        Self(features)
    }

    pub fn features(&self) -> &[FeatureSpec] {
        &self.0
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|f| f.name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn validate(&self) -> GovResult<()> {
        if self.0.is_empty() {
            return Err(GovError::invalid("signature declares no features"));
        }
        let mut seen = std::collections::BTreeSet::new();
        for feature in &self.0 {
            if feature.name.trim().is_empty() {
                return Err(GovError::invalid("signature contains an unnamed feature"));
            }
            if !seen.insert(feature.name.as_str()) {
                return Err(GovError::invalid(format!(
                    "signature declares `{}` twice",
                    feature.name
                )));
            }
            if let FeatureKind::Numeric { min: Some(lo), max: Some(hi) } = feature.kind {
                if lo > hi {
                    return Err(GovError::invalid(format!(
                        "feature `{}` has min {lo} above max {hi}",
                        feature.name
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Metric name to value.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metrics(BTreeMap<String, f64>);

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) -> Option<f64> {
        self.0.insert(name.into(), value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Required keys present and every value finite.
    pub fn validate(&self) -> GovResult<()> {
        let missing: Vec<&str> = REQUIRED_METRICS
            .iter()
            .copied()
            .filter(|name| !self.0.contains_key(*name))
            .collect();
        if !missing.is_empty() {
            return Err(GovError::invalid(format!(
                "metrics missing required keys: {}",
                missing.join(", ")
            )));
        }
        if let Some((name, value)) = self.0.iter().find(|(_, v)| !v.is_finite()) {
            return Err(GovError::invalid(format!("metric `{name}` is not finite ({value})")));
        }
        if self.0["n_validation_samples"] < 0.0 {
            return Err(GovError::invalid("n_validation_samples is negative"));
        }
        Ok(())
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for Metrics {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Per-file SHA-256 of a bundle, keyed by declared file name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest(BTreeMap<String, String>);

impl Manifest {
    pub fn files(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn get(&self, file: &str) -> Option<&str> {
        self.0.get(file).map(String::as_str)
    }

    /// Content hash over all manifest entries, in file-name order.
    pub fn content_hash(&self) -> String {
        let mut hasher = ContentHasher::new();
        for (name, digest) in &self.0 {
            hasher.entry(name, digest);
        }
        hasher.finish_hex()
    }
}

/// Exact bytes written for each declared file.
pub struct BundleFiles {
    pub signature: Vec<u8>,
    pub metrics: Vec<u8>,
}

/// Immutable unit of registration.
#[derive(Clone, Debug, PartialEq)]
pub struct ArtifactBundle {
    pub version: Version,
    pub model_blob: Vec<u8>,
    pub signature: Signature,
    pub metrics: Metrics,
    pub created_at: DateTime<Utc>,
    /// Hash claimed by the producer; verified against the content on register.
    pub content_hash: Option<String>,
}

impl ArtifactBundle {
    pub fn new(version: Version, model_blob: Vec<u8>, signature: Signature, metrics: Metrics) -> Self {
        Self {
            version,
            model_blob,
            signature,
            metrics,
            created_at: time::now(),
            content_hash: None,
        }
    }

    /// Assemble a bundle from a directory holding exactly the declared files.
    pub fn from_dir(version: Version, dir: &Path) -> GovResult<Self> {
        let missing: Vec<&str> = [MODEL_FILE, SIGNATURE_FILE, METRICS_FILE]
            .into_iter()
            .filter(|name| !dir.join(name).is_file())
            .collect();
        if !missing.is_empty() {
            return Err(GovError::invalid(format!(
                "bundle directory {} is missing {}",
                dir.display(),
                missing.join(", ")
            )));
        }

        let model_path = dir.join(MODEL_FILE);
        let model_blob = fs::read(&model_path).map_err(|e| GovError::io("read", &model_path, e))?;
        let signature = crate::common::json::read_json(&dir.join(SIGNATURE_FILE))?;
        let metrics = crate::common::json::read_json(&dir.join(METRICS_FILE))?;
        Ok(Self::new(version, model_blob, signature, metrics))
    }

    pub fn validate(&self) -> GovResult<()> {
        self.signature
            .validate()
            .and_then(|_| self.metrics.validate())
            .map_err(|e| GovError::invalid(format!("bundle {}: {e}", self.version)))
    }

    /// Canonical encodings of the JSON members.
    pub fn files(&self) -> GovResult<BundleFiles> {
        let encode = |name: &str, value: Result<Vec<u8>, serde_json::Error>| {
            value.map_err(|e| GovError::serde(Path::new(name), e))
        };
        Ok(BundleFiles {
            signature: encode(SIGNATURE_FILE, serde_json::to_vec_pretty(&self.signature))?,
            metrics: encode(METRICS_FILE, serde_json::to_vec_pretty(&self.metrics))?,
        })
    }

    pub fn manifest(&self) -> GovResult<Manifest> {
        let files = self.files()?;
        Ok(manifest_of(&self.model_blob, &files))
    }

    /// Content hash, checked against the declared one if present.
    pub fn verified_hash(&self) -> GovResult<String> {
        let actual = self.manifest()?.content_hash();
        match &self.content_hash {
            Some(declared) if !declared.eq_ignore_ascii_case(&actual) => Err(GovError::invalid(format!(
                "bundle {} declares hash {declared} but its content hashes to {actual}",
                self.version
            ))),
            _ => Ok(actual),
        }
    }
}

pub(crate) fn manifest_of(model_blob: &[u8], files: &BundleFiles) -> Manifest {
    let mut entries = BTreeMap::new();
    entries.insert(MODEL_FILE.to_string(), sha256_hex(model_blob));
    entries.insert(SIGNATURE_FILE.to_string(), sha256_hex(&files.signature));
    entries.insert(METRICS_FILE.to_string(), sha256_hex(&files.metrics));
    Manifest(entries)
}

/// `metadata.json` stored alongside each registered version.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BundleMetadata {
    pub version: Version,
    pub created_at: DateTime<Utc>,
    pub content_hash: String,
    pub signature: Signature,
    pub metrics: Metrics,
    pub manifest: Manifest,
}

/// Index entry for a registered version.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VersionEntry {
    /// Registration order, starting at 1.
    pub seq: u64,
    pub version: Version,
    /// Location relative to the registry root.
    pub location: PathBuf,
    pub content_hash: String,
    pub manifest: Manifest,
    pub metrics: Metrics,
    pub created_at: DateTime<Utc>,
    pub registered_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Register,
    Promote,
    Rollback,
    Reject,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Register => "register",
            EventType::Promote => "promote",
            EventType::Rollback => "rollback",
            EventType::Reject => "reject",
        }
    }
}

/// One lifecycle event of the append-only history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    pub version: Version,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_champion: Option<Version>,
    pub reason: String,
}

pub const INDEX_FORMAT_VERSION: u32 = 1;

/// Durable registry state: versions, champion pointer, history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegistryIndex {
    pub format_version: u32,
    pub next_seq: u64,
    pub champion: Option<Version>,
    /// Keyed by canonical version string.
    pub versions: BTreeMap<String, VersionEntry>,
    pub history: Vec<HistoryEvent>,
}

impl Default for RegistryIndex {
    fn default() -> Self {
        Self {
            format_version: INDEX_FORMAT_VERSION,
            next_seq: 1,
            champion: None,
            versions: BTreeMap::new(),
            history: Vec::new(),
        }
    }
}

impl RegistryIndex {
    pub fn entry(&self, version: &Version) -> Option<&VersionEntry> {
        self.versions.get(&version.to_string())
    }

    pub fn champion_entry(&self) -> Option<&VersionEntry> {
        self.champion.as_ref().and_then(|v| self.entry(v))
    }

    /// Structural invariants that must hold for every persisted index.
    pub fn check(&self) -> GovResult<()> {
        if let Some(champion) = &self.champion {
            if self.entry(champion).is_none() {
                return Err(GovError::invalid(format!(
                    "index champion {champion} is not a registered version"
                )));
            }
        }
        for (key, entry) in &self.versions {
            if *key != entry.version.to_string() {
                return Err(GovError::invalid(format!(
                    "index key {key} does not match entry {}",
                    entry.version
                )));
            }
            if entry.seq >= self.next_seq {
                return Err(GovError::invalid(format!(
                    "entry {key} has sequence {} beyond next {}",
                    entry.seq, self.next_seq
                )));
            }
        }
        Ok(())
    }
}

/// What `get_champion` hands to the serving layer.
#[derive(Clone, Debug, PartialEq)]
pub struct ChampionRef {
    pub version: Version,
    /// Absolute directory of the bundle.
    pub location: PathBuf,
    pub content_hash: String,
    pub metrics: Metrics,
    pub promoted_at: Option<DateTime<Utc>>,
}

/// Row of `list_versions`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct VersionSummary {
    pub version: Version,
    pub seq: u64,
    pub content_hash: String,
    pub metrics: Metrics,
    pub created_at: DateTime<Utc>,
    pub is_champion: bool,
    pub history: Vec<HistoryEvent>,
}

/// Result of a successful `register`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RegisterOutcome {
    Registered { seq: u64 },
    /// Same version, same content: nothing written.
    AlreadyRegistered { seq: u64 },
}

/// Files staged for a version, not yet visible in the registry.
pub struct StagedBundle {
    pub version: Version,
    pub metadata: BundleMetadata,
    pub dir: tempfile::TempDir,
}

/// Repository contract for bundle files and the index document.
pub trait BundleRepo: Send + Sync {
    /// Write a bundle into a private staging area.
    fn stage(&self, bundle: &ArtifactBundle, content_hash: &str) -> GovResult<StagedBundle>;
    /// Move staged files into their final location; returns that location
    /// relative to the registry root.
    fn publish(&self, staged: StagedBundle) -> GovResult<PathBuf>;
    /// Remove a published version directory. Only used to undo a publish whose
    /// index update failed.
    fn unpublish(&self, version: &Version) -> GovResult<()>;
    fn load(&self, entry: &VersionEntry) -> GovResult<ArtifactBundle>;
    fn read_index(&self) -> GovResult<Option<RegistryIndex>>;
    fn write_index(&self, index: &RegistryIndex) -> GovResult<()>;
    /// Drop staging leftovers and published directories the index does not
    /// know about. Returns how many entries were removed.
    fn recover(&self, index: &RegistryIndex) -> GovResult<usize>;
    fn root(&self) -> &Path;
}
