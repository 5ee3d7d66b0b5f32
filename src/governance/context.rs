/**
 * Agent context: what an agent advertises about itself for governance
 * purposes — capabilities it owns, characteristic preference weights, and
 * the variants it has previously reported success with.
 */
use crate::version::Version;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentContext {
    pub agent_id: String,
    pub supported_protocol_version: Version,
    /// Capabilities this agent owns, by name -> version.
    pub capabilities: HashMap<String, Version>,
    /// Characteristic name -> preference weight, used to score a variant's
    /// `characteristics` during recommendation.
    pub preferences: HashMap<String, f64>,
    /// Variant ids this agent has reported a successful experience with, in
    /// the order they were reported.
    pub successful_variants: Vec<String>,
    pub registered_at_ms: i64,
    pub last_active_ms: i64,
}

impl AgentContext {
    pub fn new(agent_id: impl Into<String>, supported_protocol_version: Version, now_ms: i64) -> Self {
        Self {
            agent_id: agent_id.into(),
            supported_protocol_version,
            capabilities: HashMap::new(),
            preferences: HashMap::new(),
            successful_variants: Vec::new(),
            registered_at_ms: now_ms,
            last_active_ms: now_ms,
        }
    }
}
