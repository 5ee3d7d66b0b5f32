/**
 * Inverted capability index: name -> version -> set of agent ids.
 *
 * Indexed by name and version (not name alone) so that discovery can apply
 * `Version::compatible_with`/`Version::satisfies` rather than exact version
 * matching.
 */
use crate::version::Version;
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Default)]
pub struct InvertedIndex {
    by_name: HashMap<String, BTreeMap<Version, HashSet<String>>>,
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, version: Version, agent_id: &str) {
        self.by_name
            .entry(name.to_string())
            .or_default()
            .entry(version)
            .or_default()
            .insert(agent_id.to_string());
    }

    pub fn remove(&mut self, name: &str, version: &Version, agent_id: &str) {
        if let Some(by_version) = self.by_name.get_mut(name) {
            if let Some(agents) = by_version.get_mut(version) {
                agents.remove(agent_id);
                if agents.is_empty() {
                    by_version.remove(version);
                }
            }
            if by_version.is_empty() {
                self.by_name.remove(name);
            }
        }
    }

    pub fn remove_agent_everywhere(&mut self, agent_id: &str) {
        self.by_name.retain(|_, by_version| {
            by_version.retain(|_, agents| {
                agents.remove(agent_id);
                !agents.is_empty()
            });
            !by_version.is_empty()
        });
    }

    /// Agents offering a capability `name` at a stored version `v` with
    /// `v.satisfies(required)` (partial) or `v.compatible_with(required)`
    /// (strict) — the union across every stored version that qualifies.
    pub fn candidates(&self, name: &str, required: &Version, partial: bool) -> HashSet<String> {
        let mut out = HashSet::new();
        if let Some(by_version) = self.by_name.get(name) {
            for (version, agents) in by_version {
                let qualifies = if partial {
                    version.satisfies(required)
                } else {
                    version.compatible_with(required)
                };
                if qualifies {
                    out.extend(agents.iter().cloned());
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidates_strict_uses_compatible_with() {
        let mut idx = InvertedIndex::new();
        idx.insert("a", Version::new(1, 3, 0), "agent-1");
        idx.insert("a", Version::new(2, 0, 0), "agent-2");
        let strict = idx.candidates("a", &Version::new(1, 1, 0), false);
        assert!(strict.contains("agent-1"));
        assert!(!strict.contains("agent-2"));
    }

    #[test]
    fn candidates_partial_allows_newer_major() {
        let mut idx = InvertedIndex::new();
        idx.insert("a", Version::new(2, 0, 0), "agent-2");
        let partial = idx.candidates("a", &Version::new(1, 0, 0), true);
        assert!(partial.contains("agent-2"));
        let strict = idx.candidates("a", &Version::new(1, 0, 0), false);
        assert!(!strict.contains("agent-2"));
    }

    #[test]
    fn remove_agent_everywhere_clears_all_entries() {
        let mut idx = InvertedIndex::new();
        idx.insert("a", Version::new(1, 0, 0), "agent-1");
        idx.insert("b", Version::new(2, 0, 0), "agent-1");
        idx.remove_agent_everywhere("agent-1");
        assert!(idx.candidates("a", &Version::new(1, 0, 0), true).is_empty());
        assert!(idx.candidates("b", &Version::new(2, 0, 0), true).is_empty());
    }
}
