//! Runtime configuration loaded from defaults, an optional file and the
//! environment.
//!
//! Layering, lowest to highest precedence: built-in defaults, the file named by
//! `MLGOV_CONFIG_FILE` (format picked from its extension), then `MLGOV_*`
//! environment variables with `__` separating nested keys, e.g.
//! `MLGOV_DRIFT__WARN_THRESHOLD=0.15`.

use std::env;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::drift::domain::DriftConfig;
use crate::evaluation::domain::{GuardrailConfig, GuardrailPolicy};

use super::error::GovResult;

pub const CONFIG_FILE_ENV: &str = "MLGOV_CONFIG_FILE";
const ENV_PREFIX: &str = "MLGOV";

/// Snapshot of configuration values consumed by the core.
#[derive(Clone, Debug)]
pub struct AppCfg {
    pub data_root: PathBuf,
    pub log_level: String,
    pub json_log: bool,
    pub drift: DriftConfig,
    pub guardrails: GuardrailPolicy,
}

#[derive(Debug, Deserialize)]
struct RawCfg {
    data_root: PathBuf,
    log_level: String,
    json_log: bool,
    #[serde(default)]
    drift: DriftConfig,
    #[serde(default)]
    guardrails: GuardrailConfig,
}

impl AppCfg {
    /// Load configuration, honouring `MLGOV_CONFIG_FILE` when set.
    pub fn load() -> GovResult<Self> {
        let file = env::var(CONFIG_FILE_ENV).ok().map(PathBuf::from);
        Self::load_from(file.as_deref())
    }

    /// Load configuration with an explicit (required) file layer.
    pub fn load_from(file: Option<&Path>) -> GovResult<Self> {
        let mut builder = config::Config::builder()
            .set_default("data_root", "./data")?
            .set_default("log_level", "info")?
            .set_default("json_log", false)?;

        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let raw: RawCfg = builder.build()?.try_deserialize()?;
        raw.drift.validate()?;
        let guardrails = GuardrailPolicy::try_from(raw.guardrails)?;

        Ok(Self {
            data_root: raw.data_root,
            log_level: raw.log_level,
            json_log: raw.json_log,
            drift: raw.drift,
            guardrails,
        })
    }

    /// Configuration rooted at `data_root` with every other value defaulted.
    pub fn with_root(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            log_level: "info".to_string(),
            json_log: false,
            drift: DriftConfig::default(),
            guardrails: GuardrailPolicy::default(),
        }
    }

    pub fn registry_root(&self) -> PathBuf {
        self.data_root.join("registry")
    }

    pub fn baselines_root(&self) -> PathBuf {
        self.data_root.join("baselines")
    }

    pub fn reports_root(&self) -> PathBuf {
        self.data_root.join("reports")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::ErrorKind;
    use crate::evaluation::domain::Direction;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn file_layer_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mlgov.yaml");
        fs::write(
            &path,
            r#"
data_root: /srv/models
json_log: true
drift:
  bins: 20
  warn_threshold: 0.15
guardrails:
  min_validation_samples: 1000
  rules:
    - metric: recall
      direction: higher_is_better
      max_degradation: 0.01
    - metric: brier
      direction: lower_is_better
      max_degradation: 0.03
"#,
        )
        .unwrap();

        let cfg = AppCfg::load_from(Some(&path)).unwrap();
        assert_eq!(cfg.data_root, PathBuf::from("/srv/models"));
        assert!(cfg.json_log);
        assert_eq!(cfg.log_level, "info");
        assert_eq!(cfg.drift.bins, 20);
        assert_eq!(cfg.drift.warn_threshold, 0.15);
        assert_eq!(cfg.drift.alert_threshold, 0.25);
        assert_eq!(cfg.guardrails.min_validation_samples(), 1000);
        let rules = cfg.guardrails.rules();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[1].direction, Direction::LowerIsBetter);
        assert_eq!(cfg.registry_root(), PathBuf::from("/srv/models/registry"));
    }

    #[test]
    fn invalid_guardrails_fail_at_load_time() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.yaml");
        fs::write(
            &path,
            r#"
guardrails:
  rules:
    - metric: recall
      direction: higher_is_better
      max_degradation: -0.5
"#,
        )
        .unwrap();

        let err = AppCfg::load_from(Some(&path)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn missing_required_file_is_a_config_error() {
        let err = AppCfg::load_from(Some(Path::new("/no/such/mlgov.yaml"))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}
