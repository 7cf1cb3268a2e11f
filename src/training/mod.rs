//! Retraining: turn a trained challenger into a promotion or a rejection.

pub mod domain;
pub mod service;

pub use domain::{Challenger, Decision, RetrainOutcome, Trainer};
pub use service::Retrainer;
