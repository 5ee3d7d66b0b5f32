/**
 * Configuration Module
 *
 * DESIGN DECISION: defaults-then-file layering
 * WHY: every component (cache, fallback, rollback store, consensus) has a
 * sane built-in default; an optional TOML file lets an embedder override
 * only what it cares about without restating the rest.
 *
 * PATTERN: Pattern-CONFIG-001 (Hierarchical Configuration), narrowed to a
 * single deployment tier — see loader.rs for why the teacher's 4-tier
 * system/team/project/user hierarchy doesn't apply here.
 */
pub mod loader;
pub mod validator;

pub use loader::{
    CacheConfigFile, ConfigLoader, ConsensusConfigFile, CoreConfig, FallbackConfigFile,
    RollbackConfigFile,
};
pub use validator::ConfigValidator;
