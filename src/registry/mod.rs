//! Versioned bundle registry with an atomically updated champion pointer.

pub mod domain;
pub mod repo_fs;
pub mod service;

pub use domain::{
    ArtifactBundle, ChampionRef, EventType, FeatureKind, FeatureSpec, HistoryEvent, Metrics,
    RegisterOutcome, RegistryIndex, Signature, Version, VersionSummary,
};
pub use service::ModelRegistry;
