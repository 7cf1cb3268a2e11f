//! Champion/challenger guardrail evaluation.

use tracing::warn;

use crate::registry::domain::Metrics;

use super::domain::{
    GuardrailPolicy, Verdict, Violation, ViolationKind, SAMPLE_COUNT_METRIC, TOLERANCE,
};

/// Compare challenger metrics with the champion's under `policy`.
///
/// Pure and deterministic: every violated rule is listed, in policy order,
/// followed by the sample-size precondition.
pub fn evaluate(champion: &Metrics, challenger: &Metrics, policy: &GuardrailPolicy) -> Verdict {
    let mut violations = Vec::new();

    for rule in policy.rules() {
        let pair = champion
            .get(&rule.metric)
            .zip(challenger.get(&rule.metric))
            .filter(|(a, b)| a.is_finite() && b.is_finite());
        let Some((champ, chall)) = pair else {
            violations.push(Violation {
                metric: rule.metric.clone(),
                delta: None,
                limit: rule.max_degradation,
                kind: ViolationKind::MissingMetric,
            });
            continue;
        };

        let degradation = rule.direction.degradation(champ, chall);
        if degradation > TOLERANCE && degradation >= rule.max_degradation - TOLERANCE {
            violations.push(Violation {
                metric: rule.metric.clone(),
                delta: Some(chall - champ),
                limit: rule.max_degradation,
                kind: ViolationKind::Degradation,
            });
        }
    }

    let min = policy.min_validation_samples() as f64;
    match challenger.get(SAMPLE_COUNT_METRIC).filter(|n| n.is_finite()) {
        None => violations.push(Violation {
            metric: SAMPLE_COUNT_METRIC.to_string(),
            delta: None,
            limit: min,
            kind: ViolationKind::MissingMetric,
        }),
        Some(n) if n < min => violations.push(Violation {
            metric: SAMPLE_COUNT_METRIC.to_string(),
            delta: Some(n - min),
            limit: min,
            kind: ViolationKind::InsufficientSamples,
        }),
        Some(_) => {}
    }

    for v in &violations {
        warn!(metric = %v.metric, delta = ?v.delta, limit = v.limit, kind = ?v.kind, "guardrail violated");
    }
    Verdict::from_violations(violations)
}
