//! Retraining orchestration: register a challenger, gate it on the guardrails,
//! then promote it with a fresh baseline or record the rejection.
//!
//! Holds no state of its own beyond the collaborators it sequences.

use tracing::info;

use crate::common::config::AppCfg;
use crate::common::error::{GovError, GovResult};
use crate::drift::domain::{BaselineStore, DriftConfig};
use crate::drift::service::build_baseline;
use crate::evaluation::domain::{GuardrailPolicy, Verdict};
use crate::evaluation::service::evaluate;
use crate::registry::domain::{ChampionRef, Version};
use crate::registry::service::ModelRegistry;

use super::domain::{Challenger, Decision, RetrainOutcome, Trainer};

const FIRST_CHAMPION: &str = "first model, no champion to compare against";
const ALREADY_CHAMPION: &str = "already the champion";

pub struct Retrainer<'a> {
    registry: &'a ModelRegistry,
    baselines: &'a dyn BaselineStore,
    policy: GuardrailPolicy,
    drift: DriftConfig,
}

impl<'a> Retrainer<'a> {
    pub fn new(registry: &'a ModelRegistry, baselines: &'a dyn BaselineStore, cfg: &AppCfg) -> Self {
        Self {
            registry,
            baselines,
            policy: cfg.guardrails.clone(),
            drift: cfg.drift.clone(),
        }
    }

    pub fn with_policy(mut self, policy: GuardrailPolicy) -> Self {
        self.policy = policy;
        self
    }

    fn current_champion(&self) -> GovResult<Option<ChampionRef>> {
        match self.registry.get_champion() {
            Ok(champion) => Ok(Some(champion)),
            Err(GovError::NoChampion) => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn judge(&self, champion: Option<&ChampionRef>, challenger: &Challenger) -> (Decision, Option<Verdict>, String) {
        match champion {
            None => (Decision::Promoted, None, FIRST_CHAMPION.to_string()),
            Some(champion) if champion.version == challenger.bundle.version => {
                (Decision::Unchanged, None, ALREADY_CHAMPION.to_string())
            }
            Some(champion) => {
                let verdict = evaluate(&champion.metrics, &challenger.bundle.metrics, &self.policy);
                let decision = if verdict.accepted {
                    Decision::Promoted
                } else {
                    Decision::Rejected
                };
                let reason = format!("vs {}: {}", champion.version, verdict.summary());
                (decision, Some(verdict), reason)
            }
        }
    }

    /// Train a challenger for `version`, then [`Retrainer::run`] it.
    pub fn retrain_with(&self, trainer: &dyn Trainer, version: &Version) -> GovResult<RetrainOutcome> {
        let challenger = trainer.train(version)?;
        if challenger.bundle.version != *version {
            return Err(GovError::invalid(format!(
                "trainer produced {} when asked for {version}",
                challenger.bundle.version
            )));
        }
        self.run(&challenger)
    }

    /// Register the challenger and promote or reject it.
    ///
    /// The baseline is built and stored before promotion, so a challenger whose
    /// reference data cannot support drift monitoring never becomes champion.
    pub fn run(&self, challenger: &Challenger) -> GovResult<RetrainOutcome> {
        let bundle = &challenger.bundle;
        bundle.validate()?;
        let champion = self.current_champion()?;
        let version = bundle.version.to_string();

        self.registry.register(bundle)?;
        let (decision, verdict, reason) = self.judge(champion.as_ref(), challenger);

        let baseline_path = match decision {
            Decision::Promoted => {
                let features: Vec<&str> = bundle.signature.names().collect();
                let baseline = build_baseline(bundle.version, &challenger.reference, &features, &self.drift)?;
                let path = self.baselines.save(&baseline)?;
                self.registry.promote(&version, &reason)?;
                Some(path)
            }
            Decision::Rejected => {
                self.registry.reject(&version, &reason)?;
                None
            }
            Decision::Unchanged => None,
        };

        info!(version = %bundle.version, decision = ?decision, reason = %reason, "retraining finished");
        Ok(RetrainOutcome {
            version: bundle.version,
            previous_champion: champion.map(|c| c.version),
            decision,
            verdict,
            reason,
            dry_run: false,
            baseline_path,
        })
    }

    /// Evaluate without registering, promoting or persisting anything.
    pub fn dry_run(&self, challenger: &Challenger) -> GovResult<RetrainOutcome> {
        challenger.bundle.validate()?;
        let champion = self.current_champion()?;
        let (decision, verdict, reason) = self.judge(champion.as_ref(), challenger);
        info!(version = %challenger.bundle.version, decision = ?decision, "dry run evaluated");
        Ok(RetrainOutcome {
            version: challenger.bundle.version,
            previous_champion: champion.map(|c| c.version),
            decision,
            verdict,
            reason,
            dry_run: true,
            baseline_path: None,
        })
    }
}
