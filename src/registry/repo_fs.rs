//! Filesystem repository for registered bundles and the registry index.
//!
//! ```text
//! registry/
//!   index.json                 versions, champion pointer, history
//!   versions/<version>/        model.bin signature.json metrics.json metadata.json
//!   .staging/stage-*/          bundles being written, invisible to readers
//! ```
//!
//! A version directory only appears under `versions/` through a single rename
//! of a fully written and fsynced staging directory. The index is replaced
//! atomically after that rename, so the index never names a partial bundle.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::common::config::AppCfg;
use crate::common::error::{GovError, GovResult};
use crate::common::ids::sha256_file;
use crate::common::json::{read_json, sync_dir, write_bytes_new, write_json_atomic, write_json_new};

use super::domain::{
    ArtifactBundle, BundleMetadata, BundleRepo, RegistryIndex, StagedBundle, Version,
    VersionEntry, INDEX_FORMAT_VERSION, METADATA_FILE, METRICS_FILE, MODEL_FILE, SIGNATURE_FILE,
};

const INDEX_FILE: &str = "index.json";
const VERSIONS_DIR: &str = "versions";
const STAGING_DIR: &str = ".staging";

/// Persist bundles and the index below one registry root.
pub struct FsBundleRepo {
    root: PathBuf,
}

impl FsBundleRepo {
    pub fn new(cfg: &AppCfg) -> Self {
        Self::at(cfg.registry_root())
    }

    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn versions_dir(&self) -> PathBuf {
        self.root.join(VERSIONS_DIR)
    }

    fn staging_dir(&self) -> PathBuf {
        self.root.join(STAGING_DIR)
    }

    fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    fn relative_location(version: &Version) -> PathBuf {
        PathBuf::from(VERSIONS_DIR).join(version.to_string())
    }

    fn ensure_dirs(&self) -> GovResult<()> {
        for dir in [self.versions_dir(), self.staging_dir()] {
            fs::create_dir_all(&dir).map_err(|e| GovError::io("create_dir", &dir, e))?;
        }
        Ok(())
    }

    fn read_member(dir: &Path, name: &str, expected: Option<&str>) -> GovResult<Vec<u8>> {
        let path = dir.join(name);
        let digest = sha256_file(&path)?;
        if let Some(expected) = expected {
            if digest != expected {
                return Err(GovError::invalid(format!(
                    "{} is corrupt: sha256 {digest}, manifest says {expected}",
                    path.display()
                )));
            }
        }
        fs::read(&path).map_err(|e| GovError::io("read", &path, e))
    }
}

impl BundleRepo for FsBundleRepo {
    fn stage(&self, bundle: &ArtifactBundle, content_hash: &str) -> GovResult<StagedBundle> {
        self.ensure_dirs()?;
        let staging = self.staging_dir();
        let dir = tempfile::Builder::new()
            .prefix("stage-")
            .tempdir_in(&staging)
            .map_err(|e| GovError::io("create_staging", &staging, e))?;

        let files = bundle.files()?;
        let metadata = BundleMetadata {
            version: bundle.version,
            created_at: bundle.created_at,
            content_hash: content_hash.to_string(),
            signature: bundle.signature.clone(),
            metrics: bundle.metrics.clone(),
            manifest: super::domain::manifest_of(&bundle.model_blob, &files),
        };

        write_bytes_new(&dir.path().join(MODEL_FILE), &bundle.model_blob)?;
        write_bytes_new(&dir.path().join(SIGNATURE_FILE), &files.signature)?;
        write_bytes_new(&dir.path().join(METRICS_FILE), &files.metrics)?;
        write_json_new(&dir.path().join(METADATA_FILE), &metadata)?;
        sync_dir(dir.path())?;

        debug!(version = %bundle.version, staging = %dir.path().display(), "staged bundle");
        Ok(StagedBundle {
            version: bundle.version,
            metadata,
            dir,
        })
    }

    fn publish(&self, staged: StagedBundle) -> GovResult<PathBuf> {
        let versions = self.versions_dir();
        let target = versions.join(staged.version.to_string());
        if target.exists() {
            return Err(GovError::io(
                "publish",
                &target,
                io::Error::new(io::ErrorKind::AlreadyExists, "version directory already exists"),
            ));
        }
        fs::rename(staged.dir.path(), &target).map_err(|e| GovError::io("publish", &target, e))?;
        sync_dir(&versions)?;
        // The staging handle now points at a moved directory; dropping it is a no-op.
        drop(staged.dir);
        Ok(Self::relative_location(&staged.version))
    }

    fn unpublish(&self, version: &Version) -> GovResult<()> {
        let target = self.versions_dir().join(version.to_string());
        match fs::remove_dir_all(&target) {
            Ok(()) => sync_dir(&self.versions_dir()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(GovError::io("unpublish", &target, e)),
        }
    }

    fn load(&self, entry: &VersionEntry) -> GovResult<ArtifactBundle> {
        let dir = self.root.join(&entry.location);
        if !dir.is_dir() {
            return Err(GovError::NotFound {
                what: "bundle directory",
                id: dir.display().to_string(),
            });
        }
        let metadata: BundleMetadata = read_json(&dir.join(METADATA_FILE))?;
        let model_blob = Self::read_member(&dir, MODEL_FILE, entry.manifest.get(MODEL_FILE))?;
        let signature_raw = Self::read_member(&dir, SIGNATURE_FILE, entry.manifest.get(SIGNATURE_FILE))?;
        let metrics_raw = Self::read_member(&dir, METRICS_FILE, entry.manifest.get(METRICS_FILE))?;

        let bundle = ArtifactBundle {
            version: entry.version,
            model_blob,
            signature: serde_json::from_slice(&signature_raw)
                .map_err(|e| GovError::serde(&dir.join(SIGNATURE_FILE), e))?,
            metrics: serde_json::from_slice(&metrics_raw)
                .map_err(|e| GovError::serde(&dir.join(METRICS_FILE), e))?,
            created_at: metadata.created_at,
            content_hash: Some(entry.content_hash.clone()),
        };
        bundle.verified_hash()?;
        Ok(bundle)
    }

    fn read_index(&self) -> GovResult<Option<RegistryIndex>> {
        let path = self.index_path();
        if !path.exists() {
            return Ok(None);
        }
        let index: RegistryIndex = read_json(&path)?;
        if index.format_version != INDEX_FORMAT_VERSION {
            return Err(GovError::invalid(format!(
                "{} has format version {}, expected {INDEX_FORMAT_VERSION}",
                path.display(),
                index.format_version
            )));
        }
        index.check()?;
        Ok(Some(index))
    }

    fn write_index(&self, index: &RegistryIndex) -> GovResult<()> {
        index.check()?;
        write_json_atomic(&self.index_path(), index)
    }

    fn recover(&self, index: &RegistryIndex) -> GovResult<usize> {
        self.ensure_dirs()?;
        let mut removed = 0;

        let staging = self.staging_dir();
        for item in fs::read_dir(&staging).map_err(|e| GovError::io("read_dir", &staging, e))? {
            let path = item.map_err(|e| GovError::io("read_dir", &staging, e))?.path();
            warn!(path = %path.display(), "removing abandoned staging area");
            let outcome = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            outcome.map_err(|e| GovError::io("remove_staging", &path, e))?;
            removed += 1;
        }

        let versions = self.versions_dir();
        for item in fs::read_dir(&versions).map_err(|e| GovError::io("read_dir", &versions, e))? {
            let item = item.map_err(|e| GovError::io("read_dir", &versions, e))?;
            let name = item.file_name().to_string_lossy().into_owned();
            if index.versions.contains_key(&name) {
                continue;
            }
            // Published but never indexed: the process died between rename and index write.
            let path = item.path();
            warn!(path = %path.display(), "removing version directory missing from index");
            fs::remove_dir_all(&path).map_err(|e| GovError::io("remove_orphan", &path, e))?;
            removed += 1;
        }
        if removed > 0 {
            sync_dir(&versions)?;
        }

        for entry in index.versions.values() {
            let dir = self.root.join(&entry.location);
            if !dir.is_dir() {
                return Err(GovError::invalid(format!(
                    "index lists {} but {} is missing",
                    entry.version,
                    dir.display()
                )));
            }
        }
        Ok(removed)
    }

    fn root(&self) -> &Path {
        &self.root
    }
}
