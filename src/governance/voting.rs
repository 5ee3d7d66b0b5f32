/**
 * Ballots and the four-part consensus predicate.
 *
 * A variant reaches consensus once it has at least `minimum_votes` ballots,
 * a quiet period (`voting_period_ms`) has elapsed since the most recent
 * ballot so late votes have had a chance to arrive, the (unweighted) support
 * ratio meets `required_majority`, and — if configured — the variant's
 * performance history is non-empty. Duplicate ballots from the same agent
 * are not deduplicated here; every ballot counts toward the ratio, mirroring
 * the append-both behavior of the system this is modeled on.
 */
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VotingRecord {
    pub variant_id: String,
    pub agent_id: String,
    pub support: bool,
    pub reason: String,
    pub cast_at_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusConfig {
    pub required_majority: f64,
    pub minimum_votes: usize,
    pub voting_period_ms: i64,
    pub require_performance_evidence: bool,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            required_majority: 0.66,
            minimum_votes: 3,
            voting_period_ms: 86_400_000,
            require_performance_evidence: false,
        }
    }
}

impl ConsensusConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.required_majority > 0.0 && self.required_majority <= 1.0) {
            return Err(Error::InvalidConfig("required_majority must be in (0, 1]".into()));
        }
        if self.minimum_votes < 1 {
            return Err(Error::InvalidConfig("minimum_votes must be >= 1".into()));
        }
        if self.voting_period_ms < 0 {
            return Err(Error::InvalidConfig("voting_period_ms must be >= 0".into()));
        }
        Ok(())
    }
}

/// Evaluates the consensus predicate for a single variant's ballots. Returns
/// `false` on insufficient participation, an unelapsed quiet period, a
/// support ratio below the majority, or missing performance evidence when
/// required — consensus is reached only when every condition holds
/// simultaneously.
pub fn check_consensus(
    votes: &[VotingRecord],
    config: &ConsensusConfig,
    variant_has_performance_evidence: bool,
    now_ms: i64,
) -> bool {
    if votes.len() < config.minimum_votes {
        return false;
    }
    let Some(latest_ballot_ms) = votes.iter().map(|v| v.cast_at_ms).max() else {
        return false;
    };
    if now_ms - latest_ballot_ms < config.voting_period_ms {
        return false;
    }
    let support_count = votes.iter().filter(|v| v.support).count();
    if (support_count as f64) / (votes.len() as f64) < config.required_majority {
        return false;
    }
    if config.require_performance_evidence && !variant_has_performance_evidence {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ballot(agent: &str, support: bool, cast_at_ms: i64) -> VotingRecord {
        VotingRecord {
            variant_id: "v1".to_string(),
            agent_id: agent.to_string(),
            support,
            reason: String::new(),
            cast_at_ms,
        }
    }

    #[test]
    fn requires_minimum_vote_count() {
        let config = ConsensusConfig { minimum_votes: 3, ..ConsensusConfig::default() };
        let votes = vec![ballot("a", true, 0), ballot("b", true, 0)];
        assert!(!check_consensus(&votes, &config, false, 1_000_000_000));
    }

    #[test]
    fn requires_quiet_period_since_latest_ballot() {
        let config = ConsensusConfig {
            minimum_votes: 2,
            voting_period_ms: 1000,
            required_majority: 0.5,
            require_performance_evidence: false,
        };
        let votes = vec![ballot("a", true, 0), ballot("b", true, 900)];
        assert!(!check_consensus(&votes, &config, false, 1000));
        assert!(check_consensus(&votes, &config, false, 1901));
    }

    #[test]
    fn requires_support_ratio_above_majority() {
        let config = ConsensusConfig {
            minimum_votes: 2,
            voting_period_ms: 0,
            required_majority: 0.66,
            require_performance_evidence: false,
        };
        let votes = vec![ballot("a", true, 0), ballot("b", false, 0)];
        assert!(!check_consensus(&votes, &config, false, 10_000));
    }

    #[test]
    fn requires_performance_evidence_when_configured() {
        let config = ConsensusConfig {
            minimum_votes: 2,
            voting_period_ms: 0,
            required_majority: 0.5,
            require_performance_evidence: true,
        };
        let votes = vec![ballot("a", true, 0), ballot("b", true, 0)];
        assert!(!check_consensus(&votes, &config, false, 10_000));
        assert!(check_consensus(&votes, &config, true, 10_000));
    }

    #[test]
    fn duplicate_ballots_from_same_agent_all_count_toward_ratio() {
        let config = ConsensusConfig {
            minimum_votes: 3,
            voting_period_ms: 0,
            required_majority: 0.6,
            require_performance_evidence: false,
        };
        // agent1 votes support twice, agent2 opposes once: 2/3 = 0.667 >= 0.6
        let votes = vec![ballot("agent1", true, 0), ballot("agent1", true, 0), ballot("agent2", false, 0)];
        assert!(check_consensus(&votes, &config, false, 10_000));
    }

    #[test]
    fn invalid_config_is_rejected() {
        assert!(ConsensusConfig { required_majority: 0.0, ..ConsensusConfig::default() }.validate().is_err());
        assert!(ConsensusConfig { required_majority: 1.5, ..ConsensusConfig::default() }.validate().is_err());
        assert!(ConsensusConfig { minimum_votes: 0, ..ConsensusConfig::default() }.validate().is_err());
        assert!(ConsensusConfig::default().validate().is_ok());
    }

    #[test]
    fn consensus_scenario_from_adoption_walkthrough() {
        let config = ConsensusConfig {
            required_majority: 0.6,
            minimum_votes: 3,
            voting_period_ms: 0,
            require_performance_evidence: false,
        };
        let votes = vec![ballot("agent1", true, 0), ballot("agent2", true, 0), ballot("agent3", false, 0)];
        assert!(check_consensus(&votes, &config, false, 0));
    }
}
