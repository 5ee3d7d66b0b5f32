/**
 * Protocol variant lifecycle and rollback.
 */
pub mod lifecycle;
pub mod rollback;
pub mod types;

pub use lifecycle::{generate_variant_id, VariantLifecycle};
pub use rollback::{RollbackConfig, RollbackPoint};
pub use types::{
    best_performing, significantly_better, MetricDirection, PerformanceCriteria, PerformanceRecord,
    ProtocolVariant, VariantStatus,
};
