/**
 * Protocol variant state machine and performance tracking.
 */
use crate::negotiation::NegotiableParams;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariantStatus {
    Proposed,
    InTesting,
    Adopted,
    Rejected,
}

impl VariantStatus {
    /// The state machine is `Proposed -> {InTesting -> {Adopted, Rejected},
    /// Adopted, Rejected}` — a variant may skip testing and go straight to
    /// adoption or rejection, but can never leave a terminal state.
    pub fn can_transition_to(self, next: VariantStatus) -> bool {
        use VariantStatus::*;
        matches!(
            (self, next),
            (Proposed, InTesting) | (Proposed, Adopted) | (Proposed, Rejected) |
            (InTesting, Adopted) | (InTesting, Rejected)
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub recorded_at_ms: i64,
    pub metrics: HashMap<String, f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolVariant {
    pub id: String,
    pub name: String,
    pub description: String,
    pub proposer_agent_id: String,
    pub base_protocol_version: crate::version::Version,
    pub parameters: NegotiableParams,
    pub status: VariantStatus,
    pub created_at_ms: i64,
    pub performance_history: Vec<PerformanceRecord>,
    /// Running per-metric average, maintained incrementally as performance
    /// records arrive so `best_performing`/`significantly_better` don't
    /// have to rescan history on every call.
    pub performance_average: HashMap<String, f64>,
    pub sample_count: u64,
    /// Capabilities an agent must already possess (at a satisfying version)
    /// to be considered a good fit for this variant; scored in
    /// `AgentGovernance::recommend`.
    pub required_capabilities: Vec<(String, crate::version::Version)>,
    /// Named numeric characteristics (e.g. `"bandwidth_savings"`) an agent's
    /// preference weights are scored against during recommendation.
    pub characteristics: HashMap<String, f64>,
    /// Free-form metadata (proposing agent, rationale, timestamps, ...).
    pub metadata: HashMap<String, String>,
}

impl ProtocolVariant {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        proposer_agent_id: impl Into<String>,
        base_protocol_version: crate::version::Version,
        parameters: NegotiableParams,
        created_at_ms: i64,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            proposer_agent_id: proposer_agent_id.into(),
            base_protocol_version,
            parameters,
            status: VariantStatus::Proposed,
            created_at_ms,
            performance_history: Vec::new(),
            performance_average: HashMap::new(),
            sample_count: 0,
            required_capabilities: Vec::new(),
            characteristics: HashMap::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_required_capability(mut self, name: impl Into<String>, version: crate::version::Version) -> Self {
        self.required_capabilities.push((name.into(), version));
        self
    }

    pub fn with_characteristic(mut self, name: impl Into<String>, value: f64) -> Self {
        self.characteristics.insert(name.into(), value);
        self
    }

    pub fn log_performance(&mut self, metrics: HashMap<String, f64>, recorded_at_ms: i64) {
        self.sample_count += 1;
        let n = self.sample_count as f64;
        for (k, v) in &metrics {
            let avg = self.performance_average.entry(k.clone()).or_insert(0.0);
            *avg += (*v - *avg) / n;
        }
        self.performance_history.push(PerformanceRecord { recorded_at_ms, metrics });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricDirection {
    HigherIsBetter,
    LowerIsBetter,
}

/// Which metrics matter for a comparison, how they're weighted and
/// oriented, and the sample-size/threshold gates that guard both
/// `best_performing` and `significantly_better`.
pub struct PerformanceCriteria {
    pub metrics: Vec<String>,
    pub weights: HashMap<String, f64>,
    pub directions: HashMap<String, MetricDirection>,
    pub min_sample_size: u64,
    pub improvement_threshold: f64,
}

impl PerformanceCriteria {
    fn weight_of(&self, metric: &str) -> f64 {
        self.weights.get(metric).copied().unwrap_or(1.0)
    }

    fn direction_of(&self, metric: &str) -> MetricDirection {
        self.directions.get(metric).copied().unwrap_or(MetricDirection::HigherIsBetter)
    }

    /// Weighted average of `self.metrics`' per-metric averages, normalized
    /// by total weight, oriented so higher is always better.
    fn weighted_score(&self, variant: &ProtocolVariant) -> Option<f64> {
        let mut weighted_sum = 0.0;
        let mut total_weight = 0.0;
        for metric in &self.metrics {
            let Some(avg) = variant.performance_average.get(metric) else {
                continue;
            };
            let weight = self.weight_of(metric);
            let oriented = match self.direction_of(metric) {
                MetricDirection::LowerIsBetter => -*avg,
                MetricDirection::HigherIsBetter => *avg,
            };
            weighted_sum += weight * oriented;
            total_weight += weight;
        }
        if total_weight <= 0.0 {
            None
        } else {
            Some(weighted_sum / total_weight)
        }
    }
}

/// Picks the arg-max weighted-score variant among those with at least
/// `criteria.min_sample_size` performance records.
pub fn best_performing<'a>(
    variants: impl IntoIterator<Item = &'a ProtocolVariant>,
    criteria: &PerformanceCriteria,
) -> Option<&'a ProtocolVariant> {
    variants
        .into_iter()
        .filter(|v| v.sample_count >= criteria.min_sample_size)
        .filter_map(|v| criteria.weighted_score(v).map(|score| (score, v)))
        .max_by(|(a, _), (b, _)| a.partial_cmp(b).unwrap())
        .map(|(_, v)| v)
}

/// `candidate` is significantly better than `baseline` when the
/// weight-normalized mean, across `criteria.metrics`, of each metric's
/// improvement ratio — `(baseline - candidate) / baseline` for
/// lower-is-better metrics, `(candidate - baseline) / baseline` otherwise —
/// is at least `criteria.improvement_threshold`. Metrics with a zero
/// baseline average are skipped (undefined improvement ratio).
pub fn significantly_better(candidate: &ProtocolVariant, baseline: &ProtocolVariant, criteria: &PerformanceCriteria) -> bool {
    let mut weighted_sum = 0.0;
    let mut total_weight = 0.0;
    for metric in &criteria.metrics {
        let (Some(candidate_avg), Some(baseline_avg)) = (
            candidate.performance_average.get(metric),
            baseline.performance_average.get(metric),
        ) else {
            continue;
        };
        if baseline_avg.abs() < f64::EPSILON {
            continue;
        }
        let improvement = match criteria.direction_of(metric) {
            MetricDirection::LowerIsBetter => (baseline_avg - candidate_avg) / baseline_avg,
            MetricDirection::HigherIsBetter => (candidate_avg - baseline_avg) / baseline_avg,
        };
        let weight = criteria.weight_of(metric);
        weighted_sum += weight * improvement;
        total_weight += weight;
    }
    if total_weight <= 0.0 {
        return false;
    }
    weighted_sum / total_weight >= criteria.improvement_threshold
}
