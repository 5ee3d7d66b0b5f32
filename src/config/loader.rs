/**
 * Configuration loading.
 *
 * DESIGN DECISION: defaults-then-file layering, no multi-tier hierarchy
 * WHY: this crate has a single deployment unit (one process embeds the
 * registry/negotiation/variant/governance components directly); a
 * system/team/project/user tier split makes sense for an IDE-integrated
 * product with multiple stakeholders, not for a library core. The layering
 * idea survives — defaults first, an optional TOML file second — the tier
 * count doesn't.
 */
use crate::error::Result;
use crate::registry::cache::CacheConfig;
use crate::variant::rollback::btree::BTreeConfig;
use crate::variant::rollback::RollbackConfig;
use crate::negotiation::FallbackConfig;
use crate::governance::ConsensusConfig as GovernanceConsensusConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfigFile {
    pub max_entries: usize,
    pub ttl_secs: u64,
    pub track_stats: bool,
}

impl Default for CacheConfigFile {
    fn default() -> Self {
        let d = CacheConfig::default();
        Self { max_entries: d.max_entries, ttl_secs: d.ttl.as_secs(), track_stats: d.track_stats }
    }
}

impl From<CacheConfigFile> for CacheConfig {
    fn from(f: CacheConfigFile) -> Self {
        CacheConfig {
            max_entries: f.max_entries,
            ttl: std::time::Duration::from_secs(f.ttl_secs),
            track_stats: f.track_stats,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfigFile {
    pub allow_format_downgrade: bool,
    pub allow_compression_downgrade: bool,
    pub allow_error_correction_downgrade: bool,
    pub max_fallback_attempts: u32,
}

impl Default for FallbackConfigFile {
    fn default() -> Self {
        let d = FallbackConfig::default();
        Self {
            allow_format_downgrade: d.allow_format_downgrade,
            allow_compression_downgrade: d.allow_compression_downgrade,
            allow_error_correction_downgrade: d.allow_error_correction_downgrade,
            max_fallback_attempts: d.max_fallback_attempts,
        }
    }
}

impl From<FallbackConfigFile> for FallbackConfig {
    fn from(f: FallbackConfigFile) -> Self {
        FallbackConfig {
            allow_format_downgrade: f.allow_format_downgrade,
            allow_compression_downgrade: f.allow_compression_downgrade,
            allow_error_correction_downgrade: f.allow_error_correction_downgrade,
            max_fallback_attempts: f.max_fallback_attempts,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RollbackConfigFile {
    pub storage_path: String,
    pub max_snapshot_size_bytes: usize,
    pub max_rollback_points: usize,
    pub retention_period_ms: i64,
    pub enable_incremental_snapshots: bool,
    pub btree_min_degree: usize,
    pub node_cache_size: usize,
}

impl Default for RollbackConfigFile {
    fn default() -> Self {
        let d = RollbackConfig::default();
        Self {
            storage_path: d.storage_path.to_string_lossy().to_string(),
            max_snapshot_size_bytes: d.max_snapshot_size_bytes,
            max_rollback_points: d.max_rollback_points,
            retention_period_ms: d.retention_period_ms,
            enable_incremental_snapshots: d.enable_incremental_snapshots,
            btree_min_degree: d.btree.min_degree,
            node_cache_size: d.btree.node_cache_size,
        }
    }
}

impl From<RollbackConfigFile> for RollbackConfig {
    fn from(f: RollbackConfigFile) -> Self {
        RollbackConfig {
            storage_path: f.storage_path.into(),
            max_snapshot_size_bytes: f.max_snapshot_size_bytes,
            max_rollback_points: f.max_rollback_points,
            retention_period_ms: f.retention_period_ms,
            enable_incremental_snapshots: f.enable_incremental_snapshots,
            btree: BTreeConfig { min_degree: f.btree_min_degree, node_cache_size: f.node_cache_size },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfigFile {
    pub minimum_votes: usize,
    pub voting_period_ms: i64,
    pub required_majority: f64,
    pub require_performance_evidence: bool,
}

impl Default for ConsensusConfigFile {
    fn default() -> Self {
        let d = GovernanceConsensusConfig::default();
        Self {
            minimum_votes: d.minimum_votes,
            voting_period_ms: d.voting_period_ms,
            required_majority: d.required_majority,
            require_performance_evidence: d.require_performance_evidence,
        }
    }
}

impl From<ConsensusConfigFile> for GovernanceConsensusConfig {
    fn from(f: ConsensusConfigFile) -> Self {
        GovernanceConsensusConfig {
            minimum_votes: f.minimum_votes,
            voting_period_ms: f.voting_period_ms,
            required_majority: f.required_majority,
            require_performance_evidence: f.require_performance_evidence,
        }
    }
}

/// Complete configuration surface for the crate's components.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub cache: CacheConfigFile,
    pub fallback: FallbackConfigFile,
    pub rollback: RollbackConfigFile,
    pub consensus: ConsensusConfigFile,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads defaults, then overlays a TOML file at `path` if it exists.
    /// A missing file is not an error — defaults alone are a valid
    /// configuration.
    pub fn load(path: impl AsRef<Path>) -> Result<CoreConfig> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(CoreConfig::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let config: CoreConfig = toml::from_str(&raw)
            .map_err(|e| crate::error::Error::InvalidConfig(e.to_string()))?;
        Ok(config)
    }
}
