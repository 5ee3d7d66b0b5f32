/**
 * Protocol parameter negotiation and fallback.
 */
pub mod fallback;
pub mod params;

pub use fallback::{FallbackConfig, NegotiationFallback};
pub use params::{Compression, DataFormat, ErrorCorrection, NegotiableParams, NegotiationPreferences};
