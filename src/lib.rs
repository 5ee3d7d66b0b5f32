/**
 * Agent Capability & Protocol Evolution Core
 *
 * DESIGN DECISION: modular architecture with one module per cooperating
 * subsystem
 * WHY: capability discovery, parameter negotiation, variant lifecycle, and
 * agent governance each have distinct state and failure modes; separating
 * them into modules keeps ownership boundaries clear and lets each be unit
 * tested independently.
 *
 * REASONING CHAIN:
 * 1. `version`/`capability` are the shared vocabulary every other module
 *    builds on (semantic version comparison, the capability wire format)
 * 2. `registry` is the authoritative agent/capability store plus its
 *    inverted index and query cache
 * 3. `negotiation` walks a rejected parameter bundle back to the next
 *    acceptable one along a fixed axis priority
 * 4. `variant` owns proposed protocol variants, their performance history,
 *    and the content-addressed rollback/snapshot store
 * 5. `governance` layers agent registration, voting, and consensus on top
 *    of `variant`
 * 6. `error`/`config` are the ambient layers every module depends on
 *
 * PATTERN: Pattern-001 (Rust Core + Language Bindings)
 *
 * # Architecture Overview
 *
 * ```text
 * ┌───────────────────────────────────────────────────────────────┐
 * │                       registry (+ cache)                      │
 * │        capability advertisement, discovery, invalidation       │
 * ├───────────────────────────────────────────────────────────────┤
 * │                          negotiation                           │
 * │         parameter fallback along a fixed axis priority         │
 * ├───────────────────────────────────────────────────────────────┤
 * │                    variant (+ rollback store)                  │
 * │   propose/adopt/reject, performance evaluation, snapshotting    │
 * ├───────────────────────────────────────────────────────────────┤
 * │                          governance                            │
 * │     agent registration, voting, consensus, recommend             │
 * ├───────────────────────────────────────────────────────────────┤
 * │                      error / config / codec                    │
 * └───────────────────────────────────────────────────────────────┘
 * ```
 *
 * # Examples
 *
 * ```rust
 * use agent_protocol_core::{CapabilityRegistry, Capability, Version};
 * use agent_protocol_core::registry::cache::CacheConfig;
 *
 * let registry = CapabilityRegistry::new(CacheConfig::default());
 * registry.register_capability("agent-1", Capability::new("vector-transfer", Version::new(1, 0, 0)));
 * let required = [Capability::new("vector-transfer", Version::new(1, 0, 0))];
 * let found = registry.discover_agents(&required, false);
 * assert_eq!(found, vec!["agent-1".to_string()]);
 * ```
 */

pub mod capability;
pub mod codec;
pub mod config;
pub mod error;
pub mod governance;
pub mod negotiation;
pub mod registry;
pub mod variant;
pub mod version;

pub use capability::Capability;
pub use codec::{Codec, CodecRegistry, EmptyCodecRegistry};
pub use config::{ConfigLoader, ConfigValidator, CoreConfig};
pub use error::{Error, Result};
pub use governance::{check_consensus, AgentContext, AgentGovernance, ConsensusConfig, VotingRecord};
pub use negotiation::{
    Compression, DataFormat, ErrorCorrection, FallbackConfig, NegotiableParams, NegotiationFallback,
    NegotiationPreferences,
};
pub use registry::{cache::CacheConfig, AgentRecord, CapabilityRegistry};
pub use variant::{
    best_performing, significantly_better, MetricDirection, PerformanceCriteria, ProtocolVariant,
    RollbackConfig, RollbackPoint, VariantLifecycle, VariantStatus,
};
pub use version::Version;
