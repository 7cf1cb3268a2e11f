//! Model registry: register, promote, rollback and reject bundles.
//!
//! Mutations are serialized by one writer lock per registry instance and
//! become visible by swapping in a new immutable index snapshot after the
//! index document has been durably replaced. Readers load the current
//! snapshot and never block on writers. One registry instance should own a
//! given root; separate processes sharing a root are not coordinated.

use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::common::config::AppCfg;
use crate::common::error::{GovError, GovResult};
use crate::common::time;

use super::domain::{
    ArtifactBundle, BundleRepo, ChampionRef, EventType, HistoryEvent, RegisterOutcome,
    RegistryIndex, Version, VersionEntry, VersionSummary,
};
use super::repo_fs::FsBundleRepo;

pub struct ModelRegistry {
    repo: Box<dyn BundleRepo>,
    snapshot: ArcSwap<RegistryIndex>,
    writer: Mutex<()>,
}

impl ModelRegistry {
    /// Open the registry under `cfg.data_root/registry`.
    pub fn open(cfg: &AppCfg) -> GovResult<Self> {
        Self::with_repo(Box::new(FsBundleRepo::new(cfg)))
    }

    pub fn open_at(root: impl AsRef<Path>) -> GovResult<Self> {
        Self::with_repo(Box::new(FsBundleRepo::at(root.as_ref())))
    }

    /// Load the index (creating an empty one on first use) and clean up after
    /// any registration interrupted by a crash.
    pub fn with_repo(repo: Box<dyn BundleRepo>) -> GovResult<Self> {
        let (index, fresh) = match repo.read_index()? {
            Some(index) => (index, false),
            None => (RegistryIndex::default(), true),
        };
        let recovered = repo.recover(&index)?;
        if fresh {
            repo.write_index(&index)?;
        }
        info!(
            root = %repo.root().display(),
            versions = index.versions.len(),
            champion = ?index.champion.map(|v| v.to_string()),
            recovered,
            "opened model registry"
        );
        Ok(Self {
            repo,
            snapshot: ArcSwap::from_pointee(index),
            writer: Mutex::new(()),
        })
    }

    /// Current immutable view of the index.
    pub fn snapshot(&self) -> Arc<RegistryIndex> {
        self.snapshot.load_full()
    }

    pub fn root(&self) -> &Path {
        self.repo.root()
    }

    /// Persist `next` and publish it to readers. Caller holds the writer lock.
    ///
    /// On failure readers are moved to whatever index is on disk: the
    /// replacement may have landed before a later step (dir fsync) failed.
    fn commit(&self, next: RegistryIndex) -> GovResult<()> {
        let Err(err) = self.repo.write_index(&next) else {
            self.snapshot.store(Arc::new(next));
            return Ok(());
        };
        match self.repo.read_index() {
            Ok(Some(persisted)) => self.snapshot.store(Arc::new(persisted)),
            Ok(None) => {}
            Err(reread) => error!(error = %reread, "could not re-read index after failed write"),
        }
        Err(err)
    }

    /// Undo a publish whose index update failed, unless the persisted index
    /// names the version after all.
    fn undo_publish(&self, version: &Version) {
        match self.repo.read_index() {
            Ok(Some(persisted)) if persisted.entry(version).is_some() => {
                warn!(version = %version, "index write reported failure but lists the version; keeping it");
            }
            Ok(_) => {
                if let Err(undo) = self.repo.unpublish(version) {
                    error!(version = %version, error = %undo, "could not remove unindexed version");
                }
            }
            Err(err) => {
                error!(version = %version, error = %err, "index unreadable; leaving version directory for recovery");
            }
        }
    }

    fn existing(index: &RegistryIndex, version: &Version, hash: &str) -> GovResult<Option<RegisterOutcome>> {
        match index.entry(version) {
            None => Ok(None),
            Some(entry) if entry.content_hash == hash => {
                Ok(Some(RegisterOutcome::AlreadyRegistered { seq: entry.seq }))
            }
            Some(entry) => Err(GovError::DuplicateVersion {
                version: version.to_string(),
                existing: entry.content_hash.clone(),
                incoming: hash.to_string(),
            }),
        }
    }

    /// Register an immutable bundle.
    ///
    /// Re-registering identical content is a no-op; different content under a
    /// known version is a [`GovError::DuplicateVersion`].
    pub fn register(&self, bundle: &ArtifactBundle) -> GovResult<RegisterOutcome> {
        bundle.validate()?;
        let hash = bundle.verified_hash()?;
        if let Some(outcome) = Self::existing(&self.snapshot(), &bundle.version, &hash)? {
            return Ok(outcome);
        }

        // Files are written outside the lock; only publish and index update are serialized.
        let staged = self.repo.stage(bundle, &hash)?;
        let manifest = staged.metadata.manifest.clone();

        let _guard = self.writer.lock();
        let current = self.snapshot();
        if let Some(outcome) = Self::existing(&current, &bundle.version, &hash)? {
            return Ok(outcome);
        }

        let location = self.repo.publish(staged)?;
        let now = time::now();
        let mut next = (*current).clone();
        let seq = next.next_seq;
        next.next_seq += 1;
        next.versions.insert(
            bundle.version.to_string(),
            VersionEntry {
                seq,
                version: bundle.version,
                location,
                content_hash: hash.clone(),
                manifest,
                metrics: bundle.metrics.clone(),
                created_at: bundle.created_at,
                registered_at: now,
            },
        );
        next.history.push(HistoryEvent {
            timestamp: now,
            event_type: EventType::Register,
            version: bundle.version,
            previous_champion: next.champion,
            reason: "registered".to_string(),
        });

        if let Err(err) = self.commit(next) {
            self.undo_publish(&bundle.version);
            return Err(err);
        }
        info!(version = %bundle.version, seq, content_hash = %hash, event = "register", "registered bundle");
        Ok(RegisterOutcome::Registered { seq })
    }

    /// Make `version` the champion.
    pub fn promote(&self, version: &str, reason: &str) -> GovResult<HistoryEvent> {
        self.move_champion(version, reason, EventType::Promote)
    }

    /// Move the champion back to `version`, which must not be newer than the
    /// current champion.
    pub fn rollback(&self, version: &str, reason: &str) -> GovResult<HistoryEvent> {
        self.move_champion(version, reason, EventType::Rollback)
    }

    fn move_champion(&self, version: &str, reason: &str, event_type: EventType) -> GovResult<HistoryEvent> {
        let version = Version::parse(version)?;
        let _guard = self.writer.lock();
        let current = self.snapshot();
        let target = current
            .entry(&version)
            .ok_or_else(|| GovError::version_not_found(version.to_string()))?;

        if event_type == EventType::Rollback {
            let champion = current.champion_entry().ok_or(GovError::NoChampion)?;
            if target.seq > champion.seq {
                return Err(GovError::invalid(format!(
                    "cannot roll back to {version} (registered #{}): newer than champion {} (registered #{})",
                    target.seq, champion.version, champion.seq
                )));
            }
        }

        let event = HistoryEvent {
            timestamp: time::now(),
            event_type,
            version,
            previous_champion: current.champion,
            reason: reason.to_string(),
        };
        let mut next = (*current).clone();
        next.champion = Some(version);
        next.history.push(event.clone());
        self.commit(next)?;

        info!(
            version = %version,
            previous = ?event.previous_champion.map(|v| v.to_string()),
            event = event_type.as_str(),
            reason,
            "champion updated"
        );
        Ok(event)
    }

    /// Record that a registered challenger was turned down.
    pub fn reject(&self, version: &str, reason: &str) -> GovResult<HistoryEvent> {
        let version = Version::parse(version)?;
        let _guard = self.writer.lock();
        let current = self.snapshot();
        if current.entry(&version).is_none() {
            return Err(GovError::version_not_found(version.to_string()));
        }

        let event = HistoryEvent {
            timestamp: time::now(),
            event_type: EventType::Reject,
            version,
            previous_champion: current.champion,
            reason: reason.to_string(),
        };
        let mut next = (*current).clone();
        next.history.push(event.clone());
        self.commit(next)?;

        info!(version = %version, event = "reject", reason, "challenger rejected");
        Ok(event)
    }

    pub fn get_champion(&self) -> GovResult<ChampionRef> {
        let index = self.snapshot();
        let entry = index.champion_entry().ok_or(GovError::NoChampion)?;
        let promoted_at = index
            .history
            .iter()
            .rev()
            .find(|e| {
                e.version == entry.version
                    && matches!(e.event_type, EventType::Promote | EventType::Rollback)
            })
            .map(|e| e.timestamp);
        Ok(ChampionRef {
            version: entry.version,
            location: self.repo.root().join(&entry.location),
            content_hash: entry.content_hash.clone(),
            metrics: entry.metrics.clone(),
            promoted_at,
        })
    }

    /// All versions, newest registration first.
    pub fn list_versions(&self) -> Vec<VersionSummary> {
        let index = self.snapshot();
        let mut entries: Vec<&VersionEntry> = index.versions.values().collect();
        entries.sort_by(|a, b| b.seq.cmp(&a.seq));
        entries
            .into_iter()
            .map(|entry| VersionSummary {
                version: entry.version,
                seq: entry.seq,
                content_hash: entry.content_hash.clone(),
                metrics: entry.metrics.clone(),
                created_at: entry.created_at,
                is_champion: index.champion == Some(entry.version),
                history: index
                    .history
                    .iter()
                    .filter(|e| e.version == entry.version)
                    .cloned()
                    .collect(),
            })
            .collect()
    }

    pub fn history(&self) -> Vec<HistoryEvent> {
        self.snapshot().history.clone()
    }

    /// Read a registered bundle back, verifying every file against its manifest.
    pub fn load_bundle(&self, version: &str) -> GovResult<ArtifactBundle> {
        let version = Version::parse(version)?;
        let index = self.snapshot();
        let entry = index
            .entry(&version)
            .ok_or_else(|| GovError::version_not_found(version.to_string()))?;
        self.repo.load(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::ErrorKind;
    use crate::registry::domain::{FeatureSpec, Metrics, Signature, StagedBundle};
    use std::fs;
    use std::io;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    fn metrics(recall: f64) -> Metrics {
        [
            ("recall", recall),
            ("precision", 0.4),
            ("auc", 0.8),
            ("brier", 0.1),
            ("n_validation_samples", 800.0),
        ]
        .into_iter()
        .collect()
    }

    fn bundle(version: &str, blob: &[u8]) -> ArtifactBundle {
        ArtifactBundle::new(
            Version::parse(version).unwrap(),
            blob.to_vec(),
            Signature::new(vec![FeatureSpec::numeric("age"), FeatureSpec::categorical("school")]),
            metrics(0.75),
        )
    }

    #[test]
    fn promote_sets_champion_until_next_change() {
        let dir = TempDir::new().unwrap();
        let reg = ModelRegistry::open_at(dir.path()).unwrap();
        assert_eq!(reg.get_champion().unwrap_err().kind(), ErrorKind::NoChampion);

        assert_eq!(
            reg.register(&bundle("v1.0.0", b"one")).unwrap(),
            RegisterOutcome::Registered { seq: 1 }
        );
        reg.register(&bundle("v1.1.0", b"two")).unwrap();
        let event = reg.promote("v1.0.0", "first").unwrap();
        assert_eq!(event.previous_champion, None);

        let champion = reg.get_champion().unwrap();
        assert_eq!(champion.version, Version::new(1, 0, 0));
        assert!(champion.location.join("model.bin").is_file());
        assert!(champion.promoted_at.is_some());

        reg.register(&bundle("v1.2.0", b"three")).unwrap();
        assert_eq!(reg.get_champion().unwrap().version, Version::new(1, 0, 0));

        let event = reg.promote("1.1.0", "better").unwrap();
        assert_eq!(event.previous_champion, Some(Version::new(1, 0, 0)));
        assert_eq!(reg.get_champion().unwrap().version, Version::new(1, 1, 0));
    }

    #[test]
    fn register_is_idempotent_for_identical_content() {
        let dir = TempDir::new().unwrap();
        let reg = ModelRegistry::open_at(dir.path()).unwrap();
        let b = bundle("v1.0.0", b"same");
        reg.register(&b).unwrap();
        let history_len = reg.history().len();

        let mut again = b.clone();
        again.created_at = again.created_at + chrono::Duration::minutes(5);
        assert_eq!(
            reg.register(&again).unwrap(),
            RegisterOutcome::AlreadyRegistered { seq: 1 }
        );
        assert_eq!(reg.history().len(), history_len);

        let err = reg.register(&bundle("v1.0.0", b"different")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateVersion);
        assert_eq!(reg.list_versions().len(), 1);
    }

    #[test]
    fn invalid_bundles_are_refused_before_any_write() {
        let dir = TempDir::new().unwrap();
        let reg = ModelRegistry::open_at(dir.path()).unwrap();
        let mut b = bundle("v1.0.0", b"x");
        b.signature = Signature::default();
        assert_eq!(reg.register(&b).unwrap_err().kind(), ErrorKind::Validation);
        assert!(reg.list_versions().is_empty());
        assert_eq!(fs::read_dir(dir.path().join("versions")).unwrap().count(), 0);
    }

    #[test]
    fn promoting_unknown_version_changes_nothing() {
        let dir = TempDir::new().unwrap();
        let reg = ModelRegistry::open_at(dir.path()).unwrap();
        let err = reg.promote("v9.9.9", "nope").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(reg.snapshot().champion.is_none());
        assert!(reg.history().is_empty());
        assert_eq!(reg.reject("v9.9.9", "x").unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn rollback_rules() {
        let dir = TempDir::new().unwrap();
        let reg = ModelRegistry::open_at(dir.path()).unwrap();
        reg.register(&bundle("v1.0.0", b"a")).unwrap();
        reg.register(&bundle("v2.0.0", b"b")).unwrap();

        assert_eq!(reg.rollback("v1.0.0", "r").unwrap_err().kind(), ErrorKind::NoChampion);
        assert_eq!(reg.rollback("v3.0.0", "r").unwrap_err().kind(), ErrorKind::NotFound);

        reg.promote("v2.0.0", "go").unwrap();
        let event = reg.rollback("v1.0.0", "regression in prod").unwrap();
        assert_eq!(event.event_type, EventType::Rollback);
        assert_eq!(event.previous_champion, Some(Version::new(2, 0, 0)));
        assert_eq!(reg.get_champion().unwrap().version, Version::new(1, 0, 0));

        // v2.0.0 registered after the current champion.
        let err = reg.rollback("v2.0.0", "undo").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(reg.get_champion().unwrap().version, Version::new(1, 0, 0));

        let last = reg.history().pop().unwrap();
        assert_eq!(last.event_type, EventType::Rollback);
        assert_eq!(last.reason, "regression in prod");
    }

    #[test]
    fn list_is_newest_first_with_history() {
        let dir = TempDir::new().unwrap();
        let reg = ModelRegistry::open_at(dir.path()).unwrap();
        reg.register(&bundle("v1.0.0", b"a")).unwrap();
        reg.register(&bundle("v1.1.0", b"b")).unwrap();
        reg.promote("v1.0.0", "first").unwrap();
        reg.reject("v1.1.0", "precision dropped").unwrap();

        let list = reg.list_versions();
        assert_eq!(list[0].version, Version::new(1, 1, 0));
        assert!(!list[0].is_champion);
        assert_eq!(
            list[0].history.iter().map(|e| e.event_type).collect::<Vec<_>>(),
            vec![EventType::Register, EventType::Reject]
        );
        assert!(list[1].is_champion);
        assert_eq!(reg.get_champion().unwrap().version, Version::new(1, 0, 0));
    }

    #[test]
    fn state_survives_reopen_and_bundles_load_back() {
        let dir = TempDir::new().unwrap();
        {
            let reg = ModelRegistry::open_at(dir.path()).unwrap();
            reg.register(&bundle("v1.0.0", b"weights")).unwrap();
            reg.promote("v1.0.0", "first").unwrap();
        }
        let reg = ModelRegistry::open_at(dir.path()).unwrap();
        assert_eq!(reg.get_champion().unwrap().version, Version::new(1, 0, 0));
        assert_eq!(reg.history().len(), 2);

        let loaded = reg.load_bundle("v1.0.0").unwrap();
        assert_eq!(loaded.model_blob, b"weights");
        assert_eq!(reg.load_bundle("v2.0.0").unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[test]
    fn reopen_discards_unindexed_versions() {
        let dir = TempDir::new().unwrap();
        {
            let reg = ModelRegistry::open_at(dir.path()).unwrap();
            reg.register(&bundle("v1.0.0", b"a")).unwrap();
        }
        // Simulate a crash between publish and index write.
        fs::create_dir_all(dir.path().join("versions/v7.0.0")).unwrap();
        fs::write(dir.path().join("versions/v7.0.0/model.bin"), b"partial").unwrap();

        let reg = ModelRegistry::open_at(dir.path()).unwrap();
        assert!(!dir.path().join("versions/v7.0.0").exists());
        assert_eq!(reg.list_versions().len(), 1);
        reg.register(&bundle("v7.0.0", b"real")).unwrap();
    }

    #[test]
    fn concurrent_registers_of_distinct_versions() {
        let dir = TempDir::new().unwrap();
        let reg = ModelRegistry::open_at(dir.path()).unwrap();

        std::thread::scope(|s| {
            for minor in 0..8u64 {
                let reg = &reg;
                s.spawn(move || {
                    let version = format!("v1.{minor}.0");
                    reg.register(&bundle(&version, version.as_bytes())).unwrap();
                });
            }
        });

        let list = reg.list_versions();
        assert_eq!(list.len(), 8);
        let mut seqs: Vec<u64> = list.iter().map(|v| v.seq).collect();
        seqs.sort_unstable();
        assert_eq!(seqs, (1..=8).collect::<Vec<_>>());
        assert_eq!(fs::read_dir(dir.path().join(".staging")).unwrap().count(), 0);
    }

    #[test]
    fn concurrent_registers_of_one_version() {
        let dir = TempDir::new().unwrap();
        let reg = ModelRegistry::open_at(dir.path()).unwrap();

        let same = bundle("v1.0.0", b"identical");
        let outcomes: Vec<RegisterOutcome> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let (reg, b) = (&reg, same.clone());
                    s.spawn(move || reg.register(&b))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap().unwrap()).collect()
        });
        assert!(outcomes.contains(&RegisterOutcome::Registered { seq: 1 }));
        assert!(outcomes.contains(&RegisterOutcome::AlreadyRegistered { seq: 1 }));

        let rivals = [bundle("v2.0.0", b"left"), bundle("v2.0.0", b"right")];
        let results: Vec<GovResult<RegisterOutcome>> = std::thread::scope(|s| {
            let handles: Vec<_> = rivals
                .iter()
                .map(|b| {
                    let reg = &reg;
                    s.spawn(move || reg.register(b))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        let registered = results
            .iter()
            .filter(|r| matches!(r, Ok(RegisterOutcome::Registered { .. })))
            .count();
        let duplicates = results
            .iter()
            .filter(|r| matches!(r, Err(e) if e.kind() == ErrorKind::DuplicateVersion))
            .count();
        assert_eq!((registered, duplicates), (1, 1));

        let list = reg.list_versions();
        assert_eq!(list.len(), 2);
        let register_events = reg
            .history()
            .iter()
            .filter(|e| e.event_type == EventType::Register)
            .count();
        assert_eq!(register_events, 2);
        assert_eq!(fs::read_dir(dir.path().join(".staging")).unwrap().count(), 0);
    }

    #[test]
    fn concurrent_champion_moves_form_one_chain() {
        let dir = TempDir::new().unwrap();
        let reg = ModelRegistry::open_at(dir.path()).unwrap();
        for minor in 0..6u8 {
            reg.register(&bundle(&format!("v1.{minor}.0"), &[minor])).unwrap();
        }
        reg.promote("v1.0.0", "initial").unwrap();

        std::thread::scope(|s| {
            for minor in 0..6u8 {
                let reg = &reg;
                s.spawn(move || reg.promote(&format!("v1.{minor}.0"), "race").unwrap());
            }
            for _ in 0..3 {
                let reg = &reg;
                s.spawn(move || reg.rollback("v1.0.0", "race").unwrap());
            }
        });

        let moves: Vec<HistoryEvent> = reg
            .history()
            .into_iter()
            .filter(|e| matches!(e.event_type, EventType::Promote | EventType::Rollback))
            .collect();
        assert_eq!(moves.len(), 10);
        assert_eq!(moves.iter().filter(|e| e.event_type == EventType::Rollback).count(), 3);
        assert_eq!(moves[0].previous_champion, None);
        for pair in moves.windows(2) {
            assert_eq!(pair[1].previous_champion, Some(pair[0].version));
        }
        assert_eq!(reg.get_champion().unwrap().version, moves[9].version);
    }

    #[derive(Default)]
    struct IndexFaults {
        before_replace: AtomicBool,
        after_replace: AtomicBool,
    }

    /// Filesystem repo whose next index write can fail either before the
    /// document is replaced or after (as a failed directory fsync would).
    struct FaultyIndexRepo {
        inner: FsBundleRepo,
        faults: Arc<IndexFaults>,
    }

    impl FaultyIndexRepo {
        fn fault(&self) -> GovError {
            GovError::io(
                "fsync_dir",
                self.inner.root(),
                io::Error::new(io::ErrorKind::Other, "device gone"),
            )
        }
    }

    impl BundleRepo for FaultyIndexRepo {
        fn stage(&self, bundle: &ArtifactBundle, content_hash: &str) -> GovResult<StagedBundle> {
            self.inner.stage(bundle, content_hash)
        }

        fn publish(&self, staged: StagedBundle) -> GovResult<PathBuf> {
            self.inner.publish(staged)
        }

        fn unpublish(&self, version: &Version) -> GovResult<()> {
            self.inner.unpublish(version)
        }

        fn load(&self, entry: &VersionEntry) -> GovResult<ArtifactBundle> {
            self.inner.load(entry)
        }

        fn read_index(&self) -> GovResult<Option<RegistryIndex>> {
            self.inner.read_index()
        }

        fn write_index(&self, index: &RegistryIndex) -> GovResult<()> {
            if self.faults.before_replace.swap(false, Ordering::SeqCst) {
                return Err(self.fault());
            }
            self.inner.write_index(index)?;
            if self.faults.after_replace.swap(false, Ordering::SeqCst) {
                return Err(self.fault());
            }
            Ok(())
        }

        fn recover(&self, index: &RegistryIndex) -> GovResult<usize> {
            self.inner.recover(index)
        }

        fn root(&self) -> &Path {
            self.inner.root()
        }
    }

    fn faulty_registry(root: &Path) -> (ModelRegistry, Arc<IndexFaults>) {
        let faults = Arc::new(IndexFaults::default());
        let repo = FaultyIndexRepo {
            inner: FsBundleRepo::at(root),
            faults: Arc::clone(&faults),
        };
        (ModelRegistry::with_repo(Box::new(repo)).unwrap(), faults)
    }

    #[test]
    fn index_failure_after_replace_keeps_the_version() {
        let dir = TempDir::new().unwrap();
        let (reg, faults) = faulty_registry(dir.path());

        faults.after_replace.store(true, Ordering::SeqCst);
        let err = reg.register(&bundle("v1.0.0", b"weights")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(dir.path().join("versions/v1.0.0/model.bin").is_file());
        // Readers follow the persisted index.
        assert_eq!(reg.list_versions().len(), 1);
        assert_eq!(
            reg.register(&bundle("v1.0.0", b"weights")).unwrap(),
            RegisterOutcome::AlreadyRegistered { seq: 1 }
        );
        drop(reg);

        let reopened = ModelRegistry::open_at(dir.path()).unwrap();
        assert_eq!(reopened.list_versions().len(), 1);
        assert_eq!(reopened.load_bundle("v1.0.0").unwrap().model_blob, b"weights");
    }

    #[test]
    fn index_failure_before_replace_removes_the_version() {
        let dir = TempDir::new().unwrap();
        let (reg, faults) = faulty_registry(dir.path());
        reg.register(&bundle("v1.0.0", b"a")).unwrap();

        faults.before_replace.store(true, Ordering::SeqCst);
        let err = reg.register(&bundle("v2.0.0", b"b")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(!dir.path().join("versions/v2.0.0").exists());
        assert_eq!(reg.list_versions().len(), 1);

        faults.before_replace.store(true, Ordering::SeqCst);
        assert_eq!(reg.promote("v1.0.0", "x").unwrap_err().kind(), ErrorKind::Io);
        assert!(reg.snapshot().champion.is_none());
        drop(reg);

        let reopened = ModelRegistry::open_at(dir.path()).unwrap();
        assert_eq!(reopened.list_versions().len(), 1);
        reopened.register(&bundle("v2.0.0", b"b")).unwrap();
    }
}
