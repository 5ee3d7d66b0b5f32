/**
 * Variant lifecycle management: propose, transition status, log
 * performance, compare variants, and own the content-addressed rollback
 * snapshot store.
 *
 * DESIGN DECISION: `RollbackStore` lives behind this type rather than
 * being composed externally by callers
 * WHY: mirrors `CapabilityRegistry` owning `CapabilityCache` — a
 * rollback point always belongs to a variant proposal, so the two
 * mutate together the same way the registry's index and cache do.
 */
use super::rollback::{RollbackConfig, RollbackPoint, RollbackStore};
use super::types::{best_performing, significantly_better, PerformanceCriteria, ProtocolVariant, VariantStatus};
use crate::error::{Error, Result};
use crate::negotiation::NegotiableParams;
use crate::version::Version;
use rand::RngCore;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

pub fn generate_variant_id(now_ms: i64) -> String {
    let mut bytes = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("variant_{now_ms}_{}", hex::encode(bytes))
}

pub struct VariantLifecycle {
    variants: Mutex<HashMap<String, ProtocolVariant>>,
    rollback: RollbackStore,
}

impl VariantLifecycle {
    pub fn new(rollback_config: RollbackConfig) -> Result<Self> {
        Ok(Self {
            variants: Mutex::new(HashMap::new()),
            rollback: RollbackStore::open(rollback_config)?,
        })
    }

    /// Stores `variant` under `id` with status `Proposed`. Rejects a
    /// duplicate id outright rather than overwriting the existing proposal.
    pub fn propose(&self, id: impl Into<String>, mut variant: ProtocolVariant) -> Result<ProtocolVariant> {
        let id = id.into();
        let mut variants = self.variants.lock().unwrap();
        if variants.contains_key(&id) {
            return Err(Error::DuplicateVariant(id));
        }
        variant.id = id.clone();
        variant.status = VariantStatus::Proposed;
        variants.insert(id.clone(), variant.clone());
        tracing::info!(variant_id = %id, "protocol variant proposed");
        Ok(variant)
    }

    pub fn get(&self, id: &str) -> Option<ProtocolVariant> {
        self.variants.lock().unwrap().get(id).cloned()
    }

    pub fn list_by_status(&self, status: VariantStatus) -> Vec<ProtocolVariant> {
        self.variants
            .lock()
            .unwrap()
            .values()
            .filter(|v| v.status == status)
            .cloned()
            .collect()
    }

    /// All variants regardless of status, for governance state persistence.
    pub fn all(&self) -> Vec<ProtocolVariant> {
        self.variants.lock().unwrap().values().cloned().collect()
    }

    /// Replaces the variant map wholesale, preserving each variant's stored
    /// status rather than resetting it to `Proposed` as `propose` does —
    /// used when restoring governance state from disk.
    pub fn load_variants(&self, variants: Vec<ProtocolVariant>) {
        let mut guard = self.variants.lock().unwrap();
        guard.clear();
        guard.extend(variants.into_iter().map(|v| (v.id.clone(), v)));
    }

    pub fn set_status(&self, id: &str, next: VariantStatus) -> Result<()> {
        let mut variants = self.variants.lock().unwrap();
        let variant = variants
            .get_mut(id)
            .ok_or_else(|| Error::UnknownVariant(id.to_string()))?;
        if !variant.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: format!("{:?}", variant.status),
                to: format!("{next:?}"),
            });
        }
        tracing::info!(variant_id = id, from = ?variant.status, to = ?next, "variant status transition");
        variant.status = next;
        Ok(())
    }

    pub fn log_performance(&self, id: &str, metrics: HashMap<String, f64>, recorded_at_ms: i64) -> Result<()> {
        let mut variants = self.variants.lock().unwrap();
        let variant = variants
            .get_mut(id)
            .ok_or_else(|| Error::UnknownVariant(id.to_string()))?;
        variant.log_performance(metrics, recorded_at_ms);
        Ok(())
    }

    pub fn best_performing(&self, criteria: &PerformanceCriteria) -> Option<ProtocolVariant> {
        let variants = self.variants.lock().unwrap();
        best_performing(variants.values(), criteria).cloned()
    }

    pub fn is_significantly_better(
        &self,
        candidate_id: &str,
        baseline_id: &str,
        criteria: &PerformanceCriteria,
    ) -> Result<bool> {
        let variants = self.variants.lock().unwrap();
        let candidate = variants
            .get(candidate_id)
            .ok_or_else(|| Error::UnknownVariant(candidate_id.to_string()))?;
        let baseline = variants
            .get(baseline_id)
            .ok_or_else(|| Error::UnknownVariant(baseline_id.to_string()))?;
        Ok(significantly_better(candidate, baseline, criteria))
    }

    /// Snapshots `state` as a rollback point for `variant_id` (pass
    /// `None` for a point not tied to a specific variant proposal).
    pub fn create_rollback_point(
        &self,
        variant_id: Option<String>,
        state: &Value,
        metadata: HashMap<String, String>,
        now_ms: i64,
    ) -> Result<RollbackPoint> {
        self.rollback.create_rollback_point(variant_id, state, metadata, now_ms)
    }

    /// See [`RollbackStore::restore`]: integrity failure is `Ok(None)`,
    /// not an error.
    pub fn restore(&self, id: &str) -> Result<Option<Value>> {
        self.rollback.restore(id)
    }

    pub fn verify_rollback_point(&self, id: &str) -> Result<bool> {
        self.rollback.verify(id)
    }

    pub fn get_rollback_point(&self, id: &str) -> Option<RollbackPoint> {
        self.rollback.get_rollback_point(id)
    }

    pub fn list_rollback_points(&self, variant_id: Option<&str>) -> Vec<RollbackPoint> {
        self.rollback.list_rollback_points(variant_id)
    }

    pub fn cleanup_old_rollback_points(&self, now_ms: i64) -> Result<usize> {
        self.rollback.cleanup_old_points(now_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::negotiation::{Compression, DataFormat, ErrorCorrection};
    use crate::variant::types::MetricDirection;

    fn params() -> NegotiableParams {
        NegotiableParams {
            data_format: DataFormat::VectorFloat32,
            compression: Compression::None,
            error_correction: ErrorCorrection::None,
            encryption: "none".into(),
            protocol_version: Version::new(1, 0, 0),
            security_version: Version::new(1, 0, 0),
        }
    }

    fn lifecycle() -> (VariantLifecycle, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let config = RollbackConfig { storage_path: dir.path().to_path_buf(), ..RollbackConfig::default() };
        (VariantLifecycle::new(config).unwrap(), dir)
    }

    fn throughput_criteria() -> PerformanceCriteria {
        PerformanceCriteria {
            metrics: vec!["throughput".to_string()],
            weights: HashMap::from([("throughput".to_string(), 1.0)]),
            directions: HashMap::new(),
            min_sample_size: 1,
            improvement_threshold: 0.1,
        }
    }

    fn variant(id: &str, proposer: &str) -> ProtocolVariant {
        ProtocolVariant::new(id, id, proposer, Version::new(1, 0, 0), params(), 0)
    }

    #[test]
    fn propose_then_list_by_status() {
        let (lc, _dir) = lifecycle();
        let v = lc.propose("variant-a", variant("variant-a", "agent-1")).unwrap();
        assert_eq!(lc.list_by_status(VariantStatus::Proposed).len(), 1);
        assert_eq!(lc.get(&v.id).unwrap().name, "variant-a");
    }

    #[test]
    fn duplicate_proposal_id_is_rejected() {
        let (lc, _dir) = lifecycle();
        lc.propose("variant-a", variant("variant-a", "agent-1")).unwrap();
        assert!(lc.propose("variant-a", variant("variant-a", "agent-2")).is_err());
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let (lc, _dir) = lifecycle();
        let v = lc.propose("variant-a", variant("variant-a", "agent-1")).unwrap();
        lc.set_status(&v.id, VariantStatus::Rejected).unwrap();
        assert!(lc.set_status(&v.id, VariantStatus::Adopted).is_err());
    }

    #[test]
    fn unknown_variant_errors() {
        let (lc, _dir) = lifecycle();
        assert!(lc.set_status("nope", VariantStatus::Adopted).is_err());
    }

    #[test]
    fn best_performing_picks_highest_score() {
        let (lc, _dir) = lifecycle();
        let a = lc.propose("a", variant("a", "agent-1")).unwrap();
        let b = lc.propose("b", variant("b", "agent-1")).unwrap();
        lc.log_performance(&a.id, HashMap::from([("throughput".to_string(), 10.0)]), 1).unwrap();
        lc.log_performance(&b.id, HashMap::from([("throughput".to_string(), 90.0)]), 1).unwrap();
        assert_eq!(lc.best_performing(&throughput_criteria()).unwrap().id, b.id);
    }

    #[test]
    fn rollback_point_round_trips_through_the_owning_lifecycle() {
        let (lc, _dir) = lifecycle();
        let v = lc.propose("variant-a", variant("variant-a", "agent-1")).unwrap();
        let state = serde_json::json!({"queue_depth": 3});
        let point = lc
            .create_rollback_point(Some(v.id.clone()), &state, HashMap::new(), 1000)
            .unwrap();
        assert!(lc.verify_rollback_point(&point.id).unwrap());
        assert_eq!(lc.restore(&point.id).unwrap(), Some(state));
        assert_eq!(lc.list_rollback_points(Some(&v.id)).len(), 1);
    }
}
