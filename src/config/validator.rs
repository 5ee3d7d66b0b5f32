/**
 * Configuration validation.
 *
 * DESIGN DECISION: reject out-of-range configuration before it reaches a
 * running component, rather than clamping silently
 * WHY: a clamped `required_majority` of 1.5 silently becoming 1.0 hides an
 * operator typo; failing loudly at startup is cheaper to debug than a
 * consensus threshold nobody intended.
 */
use super::loader::CoreConfig;
use crate::error::{Error, Result};

pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &CoreConfig) -> Result<()> {
        if config.cache.max_entries == 0 {
            return Err(Error::InvalidConfig("cache.max_entries must be > 0".into()));
        }
        if config.fallback.max_fallback_attempts == 0 {
            return Err(Error::InvalidConfig("fallback.max_fallback_attempts must be > 0".into()));
        }
        if config.rollback.max_snapshot_size_bytes == 0 {
            return Err(Error::InvalidConfig("rollback.max_snapshot_size_bytes must be > 0".into()));
        }
        if config.rollback.max_rollback_points == 0 {
            return Err(Error::InvalidConfig("rollback.max_rollback_points must be > 0".into()));
        }
        if config.rollback.btree_min_degree < 2 {
            return Err(Error::InvalidConfig("rollback.btree_min_degree must be >= 2".into()));
        }
        if !(0.0..=1.0).contains(&config.consensus.required_majority) {
            return Err(Error::InvalidConfig("consensus.required_majority must be within [0, 1]".into()));
        }
        if config.consensus.minimum_votes == 0 {
            return Err(Error::InvalidConfig("consensus.minimum_votes must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ConfigValidator::validate(&CoreConfig::default()).is_ok());
    }

    #[test]
    fn out_of_range_majority_is_rejected() {
        let mut config = CoreConfig::default();
        config.consensus.required_majority = 1.5;
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn zero_cache_capacity_is_rejected() {
        let mut config = CoreConfig::default();
        config.cache.max_entries = 0;
        assert!(ConfigValidator::validate(&config).is_err());
    }
}
