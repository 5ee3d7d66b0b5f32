/**
 * Agent-driven protocol evolution: registration, compatibility-ranked
 * recommendation, voting, and consensus-triggered adoption.
 */
use super::context::AgentContext;
use super::voting::{check_consensus, ConsensusConfig, VotingRecord};
use crate::error::{Error, Result};
use crate::variant::{generate_variant_id, ProtocolVariant, VariantLifecycle, VariantStatus};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

const STATE_FILE_NAME: &str = "emergence_state.json";

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// The full governance snapshot persisted to `emergence_state.json`:
/// variants (status and performance history travel with each
/// `ProtocolVariant`), registered agents, every cast ballot, adoption
/// timestamps, and the active consensus config.
#[derive(Debug, Serialize, Deserialize)]
struct GovernanceState {
    variants: HashMap<String, ProtocolVariant>,
    agents: HashMap<String, AgentContext>,
    votes: HashMap<String, Vec<VotingRecord>>,
    adoptions: HashMap<String, i64>,
    consensus_config: ConsensusConfig,
}

pub struct AgentGovernance<'a> {
    lifecycle: &'a VariantLifecycle,
    contexts: Mutex<HashMap<String, AgentContext>>,
    votes: Mutex<HashMap<String, Vec<VotingRecord>>>,
    adopted_at_ms: Mutex<HashMap<String, i64>>,
    consensus_config: Mutex<ConsensusConfig>,
}

impl<'a> AgentGovernance<'a> {
    pub fn new(lifecycle: &'a VariantLifecycle, consensus_config: ConsensusConfig) -> Self {
        Self {
            lifecycle,
            contexts: Mutex::new(HashMap::new()),
            votes: Mutex::new(HashMap::new()),
            adopted_at_ms: Mutex::new(HashMap::new()),
            consensus_config: Mutex::new(consensus_config),
        }
    }

    /// Registers `context` under `id`. Returns `false` without mutating
    /// state if `id` doesn't match `context.agent_id` or `id` is already
    /// registered — registration duplicates are a normal, silent branch,
    /// not a surfaced error.
    pub fn register_agent(&self, id: &str, context: AgentContext) -> bool {
        if id != context.agent_id {
            return false;
        }
        let mut contexts = self.contexts.lock().unwrap();
        if contexts.contains_key(id) {
            return false;
        }
        contexts.insert(id.to_string(), context);
        tracing::info!(agent_id = id, "agent registered with governance");
        true
    }

    /// Replaces the stored context for `id`. Fails if `id` was never
    /// registered.
    pub fn update_agent_context(&self, id: &str, context: AgentContext) -> Result<()> {
        let mut contexts = self.contexts.lock().unwrap();
        if !contexts.contains_key(id) {
            return Err(Error::UnknownAgentContext(id.to_string()));
        }
        contexts.insert(id.to_string(), context);
        Ok(())
    }

    pub fn get_agent_context(&self, agent_id: &str) -> Option<AgentContext> {
        self.contexts.lock().unwrap().get(agent_id).cloned()
    }

    /// Proposes `variant` on behalf of `agent_id`: enriches its metadata
    /// with the proposing agent, rationale, and timestamp, delegates to the
    /// lifecycle, and casts the proposer's automatic supporting ballot.
    /// Returns the new variant's id.
    pub fn propose_variant_as_agent(
        &self,
        agent_id: &str,
        mut variant: ProtocolVariant,
        rationale: impl Into<String>,
        now_ms: i64,
    ) -> Result<String> {
        if !self.contexts.lock().unwrap().contains_key(agent_id) {
            return Err(Error::UnknownAgentContext(agent_id.to_string()));
        }
        let id = generate_variant_id(now_ms);
        variant.proposer_agent_id = agent_id.to_string();
        variant.metadata.insert("proposing_agent".to_string(), agent_id.to_string());
        variant.metadata.insert("proposal_rationale".to_string(), rationale.into());
        variant.metadata.insert("proposal_timestamp".to_string(), now_ms.to_string());
        self.lifecycle.propose(id.clone(), variant)?;
        self.cast_vote(agent_id, &id, true, "automatic proposer support".to_string(), now_ms)?;
        Ok(id)
    }

    /// Casts a ballot for `variant_id`. Rejects voting on a variant that
    /// isn't `Proposed` or `InTesting`. Duplicate ballots by the same agent
    /// are appended, not deduplicated — every ballot counts toward the
    /// consensus ratio. Evaluates consensus immediately after recording the
    /// ballot.
    pub fn vote(&self, agent_id: &str, variant_id: &str, support: bool, reason: impl Into<String>, now_ms: i64) -> Result<()> {
        self.cast_vote(agent_id, variant_id, support, reason.into(), now_ms)?;
        self.process_adoption(variant_id, now_ms)?;
        Ok(())
    }

    fn cast_vote(&self, agent_id: &str, variant_id: &str, support: bool, reason: String, now_ms: i64) -> Result<()> {
        let variant = self
            .lifecycle
            .get(variant_id)
            .ok_or_else(|| Error::UnknownVariant(variant_id.to_string()))?;
        if !matches!(variant.status, VariantStatus::Proposed | VariantStatus::InTesting) {
            return Err(Error::VotingClosed {
                variant: variant_id.to_string(),
                status: format!("{:?}", variant.status),
            });
        }
        self.votes.lock().unwrap().entry(variant_id.to_string()).or_default().push(VotingRecord {
            variant_id: variant_id.to_string(),
            agent_id: agent_id.to_string(),
            support,
            reason,
            cast_at_ms: now_ms,
        });
        tracing::info!(agent_id, variant_id, support, "vote cast");
        Ok(())
    }

    pub fn list_votes(&self, variant_id: &str) -> Vec<VotingRecord> {
        self.votes.lock().unwrap().get(variant_id).cloned().unwrap_or_default()
    }

    pub fn set_consensus_config(&self, config: ConsensusConfig) -> Result<()> {
        config.validate()?;
        *self.consensus_config.lock().unwrap() = config;
        Ok(())
    }

    pub fn get_consensus_config(&self) -> ConsensusConfig {
        self.consensus_config.lock().unwrap().clone()
    }

    /// Evaluates consensus for `variant_id` and, if reached, transitions it
    /// to `Adopted` and records the adoption timestamp. Returns whether
    /// adoption happened on this call.
    pub fn process_adoption(&self, variant_id: &str, now_ms: i64) -> Result<bool> {
        let votes = self.list_votes(variant_id);
        let config = self.get_consensus_config();
        let variant = self
            .lifecycle
            .get(variant_id)
            .ok_or_else(|| Error::UnknownVariant(variant_id.to_string()))?;
        if variant.status == VariantStatus::Adopted {
            return Ok(false);
        }
        let has_evidence = !variant.performance_history.is_empty();
        if !check_consensus(&votes, &config, has_evidence, now_ms) {
            return Ok(false);
        }
        self.lifecycle.set_status(variant_id, VariantStatus::Adopted)?;
        self.adopted_at_ms.lock().unwrap().insert(variant_id.to_string(), now_ms);
        tracing::info!(variant_id, "variant adopted via consensus");
        Ok(true)
    }

    /// Variant ids adopted after `since_ms`, surfaced to `agent_id` (who
    /// must be registered).
    pub fn newly_adopted_since(&self, agent_id: &str, since_ms: i64) -> Result<Vec<String>> {
        if !self.contexts.lock().unwrap().contains_key(agent_id) {
            return Err(Error::UnknownAgentContext(agent_id.to_string()));
        }
        let adopted_at = self.adopted_at_ms.lock().unwrap();
        Ok(adopted_at
            .iter()
            .filter(|(_, ts)| **ts > since_ms)
            .filter(|(id, _)| self.lifecycle.get(id).map(|v| v.status == VariantStatus::Adopted).unwrap_or(false))
            .map(|(id, _)| id.clone())
            .collect())
    }

    /// Records an agent's outcome with a variant. On success, adds
    /// `variant_id` to the agent's `successful_variants` if not already
    /// present. The experience's metrics are always logged to the
    /// variant's performance history regardless of outcome.
    pub fn report_experience(
        &self,
        agent_id: &str,
        variant_id: &str,
        successful: bool,
        details: HashMap<String, f64>,
        now_ms: i64,
    ) -> Result<()> {
        if successful {
            let mut contexts = self.contexts.lock().unwrap();
            let ctx = contexts
                .get_mut(agent_id)
                .ok_or_else(|| Error::UnknownAgentContext(agent_id.to_string()))?;
            if !ctx.successful_variants.iter().any(|v| v == variant_id) {
                ctx.successful_variants.push(variant_id.to_string());
            }
            ctx.last_active_ms = now_ms;
        }
        tracing::info!(agent_id, variant_id, successful, "agent experience reported");
        self.lifecycle.log_performance(variant_id, details, now_ms)
    }

    /// Compatibility score used to rank recommendations: +1.0 if the agent
    /// has previously succeeded with `variant`, +0.5 per capability the
    /// variant requires that the agent already owns at a satisfying
    /// version, plus the weighted sum of the variant's characteristics
    /// against the agent's preference weights.
    pub fn calculate_agent_compatibility(&self, context: &AgentContext, variant: &ProtocolVariant) -> f64 {
        let mut score = 0.0;
        if context.successful_variants.iter().any(|v| v == &variant.id) {
            score += 1.0;
        }
        for (name, required_version) in &variant.required_capabilities {
            if context.capabilities.get(name).is_some_and(|owned| owned.satisfies(required_version)) {
                score += 0.5;
            }
        }
        for (characteristic, value) in &variant.characteristics {
            if let Some(weight) = context.preferences.get(characteristic) {
                score += weight * value;
            }
        }
        score
    }

    /// Top `max_results` `Adopted` variant ids by compatibility with
    /// `agent_id`, ties broken lexicographically by id.
    pub fn recommend(&self, agent_id: &str, max_results: usize) -> Result<Vec<String>> {
        let context = self
            .get_agent_context(agent_id)
            .ok_or_else(|| Error::UnknownAgentContext(agent_id.to_string()))?;
        let mut scored: Vec<(f64, ProtocolVariant)> = self
            .lifecycle
            .list_by_status(VariantStatus::Adopted)
            .into_iter()
            .map(|v| (self.calculate_agent_compatibility(&context, &v), v))
            .collect();
        scored.sort_by(|(score_a, a), (score_b, b)| {
            score_b.partial_cmp(score_a).unwrap().then_with(|| a.id.cmp(&b.id))
        });
        Ok(scored.into_iter().take(max_results).map(|(_, v)| v.id).collect())
    }

    /// Serializes the full governance snapshot — variants, agents, votes,
    /// adoption timestamps, consensus config — to `emergence_state.json`
    /// under `dir`, written temp-then-rename.
    pub fn save_state(&self, dir: &Path) -> Result<()> {
        let state = GovernanceState {
            variants: self.lifecycle.all().into_iter().map(|v| (v.id.clone(), v)).collect(),
            agents: self.contexts.lock().unwrap().clone(),
            votes: self.votes.lock().unwrap().clone(),
            adoptions: self.adopted_at_ms.lock().unwrap().clone(),
            consensus_config: self.get_consensus_config(),
        };
        let bytes = serde_json::to_vec_pretty(&state)?;
        let path = dir.join(STATE_FILE_NAME);
        atomic_write(&path, &bytes)?;
        tracing::info!(path = %path.display(), "saved governance state");
        Ok(())
    }

    /// Loads and replaces the full governance snapshot from
    /// `emergence_state.json` under `dir`. Variant status/performance
    /// history come back exactly as they were saved, since both travel
    /// inline on each `ProtocolVariant`. A missing or unreadable file is a
    /// best-effort load on startup: it's logged and the in-memory state is
    /// left exactly as it was, rather than returned as an error.
    pub fn load_state(&self, dir: &Path) -> Result<()> {
        let path = dir.join(STATE_FILE_NAME);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "governance state load skipped");
                return Ok(());
            }
        };
        let state: GovernanceState = match serde_json::from_slice(&bytes) {
            Ok(state) => state,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "governance state load skipped");
                return Ok(());
            }
        };
        self.lifecycle.load_variants(state.variants.into_values().collect());
        *self.contexts.lock().unwrap() = state.agents;
        *self.votes.lock().unwrap() = state.votes;
        *self.adopted_at_ms.lock().unwrap() = state.adoptions;
        *self.consensus_config.lock().unwrap() = state.consensus_config;
        tracing::info!(path = %path.display(), "loaded governance state");
        Ok(())
    }
}
