/**
 * Error Handling Module
 *
 * DESIGN DECISION: Centralized error types using thiserror for consistent error semantics
 * WHY: Library code must never panic; all fallible paths return Result
 *
 * REASONING CHAIN:
 * 1. Five cooperating subsystems (registry, negotiation, variant lifecycle,
 *    rollback store, governance) each have distinct failure modes
 * 2. thiserror provides ergonomic error derive macros without boilerplate
 * 3. A single enum keeps call sites able to match exhaustively or bubble
 *    errors straight through with `?`
 * 4. From conversions for serde_json/io let persistence code use `?` without
 *    manual wrapping
 *
 * PATTERN: Pattern-001 (Rust Core + Language Bindings)
 */
use thiserror::Error;

/// Primary error type for the crate.
///
/// Expected-but-not-exceptional outcomes (duplicate registration, cache miss,
/// an unacceptable fallback) are represented as `bool`/`Option` returns at
/// their call sites, not as `Error` variants — this enum is reserved for
/// failures a caller cannot route around (corrupt state, I/O failure,
/// invariant violation).
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    #[error("unknown capability: {name} v{version}")]
    UnknownCapability { name: String, version: String },

    #[error("malformed capability binary frame: {0}")]
    MalformedFrame(String),

    #[error("no acceptable parameter fallback for axis order given constraints")]
    NegotiationExhausted,

    #[error("unknown protocol variant: {0}")]
    UnknownVariant(String),

    #[error("invalid variant state transition: {from:?} -> {to:?}")]
    InvalidTransition { from: String, to: String },

    #[error("rollback point not found: {0}")]
    UnknownRollbackPoint(String),

    #[error("chunk integrity check failed: expected {expected}, got {actual}")]
    ChunkChecksumMismatch { expected: String, actual: String },

    #[error("rollback point integrity check failed: {0}")]
    RollbackIntegrity(String),

    #[error("b-tree index corrupt: {0}")]
    IndexCorrupt(String),

    #[error("unknown agent context: {0}")]
    UnknownAgentContext(String),

    #[error("variant {variant} is not votable in status {status}")]
    VotingClosed { variant: String, status: String },

    #[error("duplicate variant id: {0}")]
    DuplicateVariant(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
