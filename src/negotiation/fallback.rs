/**
 * Parameter negotiation fallback.
 *
 * A rejected parameter bundle is walked back through a fixed axis priority
 * — error correction, then compression, then data format — trying the next
 * entry in that axis's preference list until one produces an internally
 * consistent bundle, or the configured attempt budget is exhausted.
 */
use super::params::{NegotiableParams, NegotiationPreferences};

#[derive(Debug, Clone)]
pub struct FallbackConfig {
    pub allow_format_downgrade: bool,
    pub allow_compression_downgrade: bool,
    pub allow_error_correction_downgrade: bool,
    pub max_fallback_attempts: u32,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            allow_format_downgrade: true,
            allow_compression_downgrade: true,
            allow_error_correction_downgrade: true,
            max_fallback_attempts: 3,
        }
    }
}

pub struct NegotiationFallback {
    config: FallbackConfig,
}

impl NegotiationFallback {
    pub fn new(config: FallbackConfig) -> Self {
        Self { config }
    }

    /// `params.protocol_version` at or above the preferred floor, and every
    /// axis value present in its preference list.
    pub fn is_acceptable(&self, preferences: &NegotiationPreferences, params: &NegotiableParams) -> bool {
        params.protocol_version >= preferences.min_protocol_version
            && preferences.data_format.contains(&params.data_format)
            && preferences.compression.contains(&params.compression)
            && preferences.error_correction.contains(&params.error_correction)
    }

    /// Given the bundle the remote peer rejected and the number of fallback
    /// attempts already made, produces the next candidate to offer, or
    /// `None` once the attempt budget or every axis's preference list is
    /// exhausted.
    pub fn handle_rejection(
        &self,
        preferences: &NegotiationPreferences,
        rejected: &NegotiableParams,
        attempts_made: u32,
    ) -> Option<NegotiableParams> {
        if attempts_made >= self.config.max_fallback_attempts {
            return None;
        }

        if self.config.allow_error_correction_downgrade {
            if let Some(next) =
                NegotiationPreferences::next_after(&preferences.error_correction, rejected.error_correction)
            {
                let mut candidate = rejected.clone();
                candidate.error_correction = next;
                if candidate.is_internally_consistent() {
                    return Some(candidate);
                }
            }
        }

        if self.config.allow_compression_downgrade {
            if let Some(next) = NegotiationPreferences::next_after(&preferences.compression, rejected.compression) {
                let mut candidate = rejected.clone();
                candidate.compression = next;
                if candidate.is_internally_consistent() {
                    return Some(candidate);
                }
            }
        }

        if self.config.allow_format_downgrade {
            if let Some(next) = NegotiationPreferences::next_after(&preferences.data_format, rejected.data_format) {
                let mut candidate = rejected.clone();
                candidate.data_format = next;
                if candidate.is_internally_consistent() {
                    return Some(candidate);
                }
            }
        }

        None
    }
}
