//! Model lifecycle governance core.
//!
//! A versioned registry of model bundles with an atomically swapped champion
//! pointer, a drift engine comparing live samples with frozen baselines, and
//! a guardrail evaluator gating champion/challenger promotion.

pub mod common;
pub mod data;
pub mod drift;
pub mod evaluation;
pub mod registry;
pub mod training;

pub use common::config::AppCfg;
pub use common::error::{ErrorKind, GovError, GovResult};
pub use common::log::init_logging;
