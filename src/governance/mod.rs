/**
 * Agent-driven protocol evolution: registration, voting, consensus,
 * and compatibility-ranked recommendation.
 */
pub mod context;
pub mod governance;
pub mod voting;

pub use context::AgentContext;
pub use governance::AgentGovernance;
pub use voting::{check_consensus, ConsensusConfig, VotingRecord};
