/**
 * Rollback/snapshot subsystem: content-addressed chunking, shallow
 * incremental diffs, a B-tree secondary index, and the store tying them
 * together.
 */
pub mod btree;
pub mod chunk;
pub mod diff;
pub mod store;

pub use chunk::StateChunk;
pub use store::{RollbackConfig, RollbackPoint, RollbackStore};
