/**
 * Capability Registry
 *
 * DESIGN DECISION: single exclusive mutex over the whole registry state
 * WHY: register/unregister/discover all mutate or read the agent map, the
 * inverted index, and the query cache together; a single `Mutex` keeps
 * those three structures consistent without a lock-ordering protocol.
 *
 * REASONING CHAIN:
 * 1. Discovery is read-mostly but must invalidate the cache on any mutation
 * 2. A fine-grained RwLock-per-structure scheme needs careful ordering to
 *    avoid torn reads between the index and the cache
 * 3. Simpler locking is worth more than marginal read concurrency here —
 *    discovery is O(required capabilities), not O(agents)
 */
pub mod cache;
pub mod index;

use crate::capability::{decode_capability, encode_capability_set, Capability};
use crate::version::Version;
use cache::{CacheConfig, CacheStats, CapabilityCache};
use index::InvertedIndex;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone, Default)]
pub struct AgentRecord {
    pub agent_id: String,
    pub capabilities: Vec<Capability>,
}

struct State {
    agents: HashMap<String, AgentRecord>,
    index: InvertedIndex,
    cache: CapabilityCache,
}

pub struct CapabilityRegistry {
    state: Mutex<State>,
}

impl CapabilityRegistry {
    pub fn new(cache_config: CacheConfig) -> Self {
        Self {
            state: Mutex::new(State {
                agents: HashMap::new(),
                index: InvertedIndex::new(),
                cache: CapabilityCache::new(cache_config),
            }),
        }
    }

    /// Registers `capability` for `agent_id`. Returns `true` if this is a
    /// newly seen (name, version) pair for the agent, `false` if it
    /// replaces an existing entry of the same name+version (parameters may
    /// differ; `Capability` equality ignores them).
    pub fn register_capability(&self, agent_id: &str, capability: Capability) -> bool {
        let mut state = self.state.lock().unwrap();
        let record = state
            .agents
            .entry(agent_id.to_string())
            .or_insert_with(|| AgentRecord {
                agent_id: agent_id.to_string(),
                capabilities: Vec::new(),
            });
        let is_new = !record.capabilities.contains(&capability);
        if let Some(existing) = record
            .capabilities
            .iter_mut()
            .find(|c| **c == capability)
        {
            *existing = capability.clone();
        } else {
            record.capabilities.push(capability.clone());
        }
        state.index.insert(&capability.name, capability.version, agent_id);
        state.cache.clear();
        tracing::info!(agent_id, capability = %capability.name, version = %capability.version, "capability registered");
        is_new
    }

    pub fn register_capability_binary(&self, agent_id: &str, frame: &[u8]) -> crate::error::Result<bool> {
        let capability = decode_capability(frame)?;
        Ok(self.register_capability(agent_id, capability))
    }

    /// Removes a single (name, version) capability from an agent. Returns
    /// `true` if a matching entry was present.
    pub fn unregister_capability(&self, agent_id: &str, name: &str, version: &Version) -> bool {
        let mut state = self.state.lock().unwrap();
        let removed = if let Some(record) = state.agents.get_mut(agent_id) {
            let before = record.capabilities.len();
            record
                .capabilities
                .retain(|c| !(c.name == name && c.version == *version));
            before != record.capabilities.len()
        } else {
            false
        };
        if removed {
            state.index.remove(name, version, agent_id);
            state.cache.clear();
            tracing::info!(agent_id, capability = name, version = %version, "capability unregistered");
        }
        removed
    }

    /// Removes an agent and every capability it advertised. Returns `true`
    /// if the agent was known.
    pub fn remove_agent(&self, agent_id: &str) -> bool {
        let mut state = self.state.lock().unwrap();
        let existed = state.agents.remove(agent_id).is_some();
        if existed {
            state.index.remove_agent_everywhere(agent_id);
            state.cache.clear();
            tracing::info!(agent_id, "agent removed from registry");
        }
        existed
    }

    pub fn get_agent_capabilities(&self, agent_id: &str) -> Option<Vec<Capability>> {
        let state = self.state.lock().unwrap();
        state.agents.get(agent_id).map(|r| r.capabilities.clone())
    }

    pub fn get_agent_capabilities_binary(&self, agent_id: &str) -> Option<Vec<u8>> {
        self.get_agent_capabilities(agent_id)
            .map(|caps| encode_capability_set(&caps))
    }

    /// Finds every agent advertising all of `required` capabilities.
    ///
    /// `partial=false` (strict) uses `Version::compatible_with` for the
    /// index lookup and is memoized behind a fingerprint of the ordered
    /// requirement list (name, version, and parameters — order-sensitive by
    /// contract). `partial=true` (forward-compatible) uses
    /// `Version::satisfies` for the index lookup, then further filters each
    /// requirement's candidates down to agents that own at least one
    /// capability matching it under `Capability::matches(required, true)`
    /// (which also checks the parameter subset); partial queries always
    /// bypass the cache.
    pub fn discover_agents(&self, required: &[Capability], partial: bool) -> Vec<String> {
        if required.is_empty() {
            return Vec::new();
        }
        let key = (!partial).then(|| Self::fingerprint(required));
        let mut state = self.state.lock().unwrap();
        if let Some(key) = &key {
            if let Some(hit) = state.cache.get(key) {
                tracing::debug!(key, "discovery cache hit");
                return hit;
            }
        }

        let mut iter = required.iter();
        let Some(first) = iter.next() else {
            return Vec::new();
        };
        let mut running = state.index.candidates(&first.name, &first.version, partial);
        if partial && !running.is_empty() {
            running.retain(|agent_id| {
                state
                    .agents
                    .get(agent_id)
                    .is_some_and(|record| record.capabilities.iter().any(|c| c.matches(first, true)))
            });
        }
        for req in iter {
            if running.is_empty() {
                break;
            }
            let mut candidates = state.index.candidates(&req.name, &req.version, partial);
            if partial {
                candidates.retain(|agent_id| {
                    state
                        .agents
                        .get(agent_id)
                        .is_some_and(|record| record.capabilities.iter().any(|c| c.matches(req, true)))
                });
            }
            running.retain(|a| candidates.contains(a));
        }

        let mut result: Vec<String> = running.into_iter().collect();
        result.sort();
        if let Some(key) = key {
            state.cache.put(key, result.clone());
        }
        result
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.state.lock().unwrap().cache.get_stats()
    }

    /// `name:version_string;k=v,k=v,...|` per capability, in input order.
    fn fingerprint(required: &[Capability]) -> String {
        let mut key = String::new();
        for cap in required {
            key.push_str(&cap.name);
            key.push(':');
            key.push_str(&cap.version.to_string());
            key.push(';');
            for (i, (k, v)) in cap.parameters.iter().enumerate() {
                if i > 0 {
                    key.push(',');
                }
                key.push_str(k);
                key.push('=');
                key.push_str(v);
            }
            key.push('|');
        }
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> CapabilityRegistry {
        CapabilityRegistry::new(CacheConfig::default())
    }

    #[test]
    fn register_then_discover_finds_agent() {
        let reg = registry();
        reg.register_capability("agent-1", Capability::new("vec", Version::new(1, 0, 0)));
        let found = reg.discover_agents(&[Capability::new("vec", Version::new(1, 0, 0))], false);
        assert_eq!(found, vec!["agent-1".to_string()]);
    }

    #[test]
    fn unregister_capability_removes_from_index() {
        let reg = registry();
        reg.register_capability("agent-1", Capability::new("vec", Version::new(1, 0, 0)));
        assert!(reg.unregister_capability("agent-1", "vec", &Version::new(1, 0, 0)));
        assert!(reg
            .discover_agents(&[Capability::new("vec", Version::new(1, 0, 0))], false)
            .is_empty());
    }

    #[test]
    fn remove_agent_clears_all_capabilities() {
        let reg = registry();
        reg.register_capability("agent-1", Capability::new("vec", Version::new(1, 0, 0)));
        reg.register_capability("agent-1", Capability::new("mat", Version::new(1, 0, 0)));
        assert!(reg.remove_agent("agent-1"));
        assert!(reg.get_agent_capabilities("agent-1").is_none());
    }

    #[test]
    fn binary_round_trip_through_registry() {
        let reg = registry();
        let cap = Capability::new("vec", Version::new(2, 0, 0)).with_parameter("k", "v");
        let frame = crate::capability::encode_capability(&cap);
        reg.register_capability_binary("agent-1", &frame).unwrap();
        let blob = reg.get_agent_capabilities_binary("agent-1").unwrap();
        let decoded = crate::capability::decode_capability_set(&blob).unwrap();
        assert_eq!(decoded[0].name, "vec");
    }

    #[test]
    fn discovery_cache_is_invalidated_on_mutation() {
        let reg = registry();
        reg.register_capability("agent-1", Capability::new("vec", Version::new(1, 0, 0)));
        let req = [Capability::new("vec", Version::new(1, 0, 0))];
        assert_eq!(reg.discover_agents(&req, false), vec!["agent-1".to_string()]);
        reg.remove_agent("agent-1");
        assert!(reg.discover_agents(&req, false).is_empty());
    }

    #[test]
    fn end_to_end_discovery_with_versions_and_partial_params() {
        // Scenario from the capability-discovery spec: three agents at
        // different versions of the same capability, one carrying a param.
        let reg = registry();
        reg.register_capability("agentA", Capability::new("img.proc", Version::new(1, 0, 0)));
        reg.register_capability("agentB", Capability::new("img.proc", Version::new(2, 0, 0)));
        reg.register_capability(
            "agentC",
            Capability::new("img.proc", Version::new(1, 5, 0)).with_parameter("mode", "fast"),
        );

        let mut exact = reg.discover_agents(&[Capability::new("img.proc", Version::new(1, 0, 0))], false);
        exact.sort();
        assert_eq!(exact, vec!["agentA".to_string(), "agentC".to_string()]);

        let mut forward = reg.discover_agents(&[Capability::new("img.proc", Version::new(1, 0, 0))], true);
        forward.sort();
        assert_eq!(forward, vec!["agentA".to_string(), "agentB".to_string(), "agentC".to_string()]);

        let param_filtered = reg.discover_agents(
            &[Capability::new("img.proc", Version::new(1, 5, 0)).with_parameter("mode", "fast")],
            true,
        );
        assert_eq!(param_filtered, vec!["agentC".to_string()]);
    }

    #[test]
    fn partial_discovery_bypasses_cache() {
        let reg = CapabilityRegistry::new(CacheConfig {
            max_entries: 10,
            ttl: std::time::Duration::from_secs(60),
            track_stats: true,
        });
        reg.register_capability("agent-1", Capability::new("vec", Version::new(1, 0, 0)));
        let req = [Capability::new("vec", Version::new(1, 0, 0))];
        reg.discover_agents(&req, true);
        assert_eq!(reg.cache_stats().hits + reg.cache_stats().misses, 0);
    }
}
