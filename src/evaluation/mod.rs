//! Guardrail evaluation of challengers and performance checks on labelled data.

pub mod domain;
pub mod metrics;
pub mod service;

pub use domain::{
    Direction, Guardrail, GuardrailConfig, GuardrailPolicy, Verdict, Violation, ViolationKind,
};
pub use metrics::{check_performance, classification_metrics, ClassificationMetrics, PerformanceFloors};
pub use service::evaluate;
