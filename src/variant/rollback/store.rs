/**
 * Chunked, content-addressed, optionally-incremental rollback point store.
 *
 * A state snapshot above half the configured max snapshot size is split
 * into content-addressed chunks (is_chunked=true). Otherwise, if
 * incremental snapshots are enabled and a prior non-chunked point exists
 * for the same variant, the point stores a shallow structural diff against
 * that point instead of the full state (metadata["base_rollback_id"]
 * records the base). A non-chunked point is never chained across a chunked
 * one. The point's checksum always covers the *full* reconstructed state,
 * never the diff, so integrity checking doesn't depend on the chain.
 * Every persistent file — point, chunk, B-tree node — is written
 * temp-then-rename so a crash mid-write never leaves a half-written file
 * where a reader expects a complete one.
 */
use super::btree::{BTreeConfig, RollbackIndex};
use super::chunk::{self, StateChunk};
use super::diff;
use crate::error::{Error, Result};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct RollbackConfig {
    pub storage_path: PathBuf,
    pub max_snapshot_size_bytes: usize,
    pub max_rollback_points: usize,
    pub retention_period_ms: i64,
    pub enable_incremental_snapshots: bool,
    pub btree: BTreeConfig,
}

impl Default for RollbackConfig {
    fn default() -> Self {
        Self {
            storage_path: PathBuf::from("./rollback_store"),
            max_snapshot_size_bytes: 1_048_576,
            max_rollback_points: 100,
            retention_period_ms: 7 * 24 * 60 * 60 * 1000,
            enable_incremental_snapshots: true,
            btree: BTreeConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackPoint {
    pub id: String,
    pub variant_id: Option<String>,
    pub created_at_ms: i64,
    pub is_chunked: bool,
    /// Populated iff `!is_chunked`: the full state, or — if
    /// `metadata["base_rollback_id"]` is set — a diff against that base.
    pub state: Option<Value>,
    /// Populated iff `is_chunked`.
    pub chunk_ids: Vec<String>,
    /// SHA-256 of the canonical serialization of the full (never diffed,
    /// never chunked) state this point represents.
    pub checksum: String,
    pub metadata: HashMap<String, String>,
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn generate_rollback_id(now_ms: i64) -> String {
    let mut bytes = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("rb_{now_ms}_{}", hex::encode(bytes))
}

pub struct RollbackStore {
    config: RollbackConfig,
    chunks_dir: PathBuf,
    points_dir: PathBuf,
    index: Mutex<RollbackIndex>,
    points: Mutex<HashMap<String, RollbackPoint>>,
}

impl RollbackStore {
    pub fn open(config: RollbackConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.storage_path)?;
        let chunks_dir = config.storage_path.join("chunks");
        let points_dir = config.storage_path.join("points");
        std::fs::create_dir_all(&chunks_dir)?;
        std::fs::create_dir_all(&points_dir)?;

        let index = RollbackIndex::open(&config.storage_path, config.btree.clone())?;

        let mut points = HashMap::new();
        for entry in std::fs::read_dir(&points_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                let raw = std::fs::read_to_string(&path)?;
                let point: RollbackPoint = serde_json::from_str(&raw)?;
                points.insert(point.id.clone(), point);
            }
        }

        Ok(Self {
            config,
            chunks_dir,
            points_dir,
            index: Mutex::new(index),
            points: Mutex::new(points),
        })
    }

    fn chunk_path(&self, id: &str) -> PathBuf {
        self.chunks_dir.join(format!("{id}.bin"))
    }

    fn point_path(&self, id: &str) -> PathBuf {
        self.points_dir.join(format!("{id}.json"))
    }

    fn persist_chunk(&self, chunk: &StateChunk, offset: u64) -> Result<()> {
        let path = self.chunk_path(&chunk.id);
        if !path.exists() {
            atomic_write(&path, &chunk::encode_chunk_file(chunk, offset))?;
        }
        let mut index = self.index.lock().unwrap();
        index.insert(chunk.id.clone(), path.to_string_lossy().to_string())?;
        let half = (self.config.max_rollback_points / 2).max(1) as u64;
        if index.insert_count() % half == 0 {
            index.optimize()?;
        }
        Ok(())
    }

    fn load_chunk(&self, id: &str) -> Result<StateChunk> {
        let path = self
            .index
            .lock()
            .unwrap()
            .search(id)?
            .map(PathBuf::from)
            .unwrap_or_else(|| self.chunk_path(id));
        let bytes = std::fs::read(&path).map_err(|_| Error::RollbackIntegrity(format!("missing chunk {id}")))?;
        let (chunk, _offset) = chunk::decode_chunk_file(id, &bytes)?;
        Ok(chunk)
    }

    /// Walks the base chain (oldest base first, via recursion) to
    /// reconstruct the full state a point represents.
    fn reconstruct_full_state(&self, point: &RollbackPoint) -> Result<Value> {
        if point.is_chunked {
            let chunks: Vec<StateChunk> = point.chunk_ids.iter().map(|id| self.load_chunk(id)).collect::<Result<_>>()?;
            let bytes = chunk::reassemble(&chunks)?;
            return Ok(serde_json::from_slice(&bytes)?);
        }
        let state = point.state.clone().unwrap_or(Value::Null);
        match point.metadata.get("base_rollback_id") {
            Some(base_id) => {
                let base = self
                    .get_rollback_point(base_id)
                    .ok_or_else(|| Error::RollbackIntegrity(format!("missing base rollback point {base_id}")))?;
                let base_state = self.reconstruct_full_state(&base)?;
                Ok(diff::apply(&base_state, &state))
            }
            None => Ok(state),
        }
    }

    pub fn create_rollback_point(
        &self,
        variant_id: Option<String>,
        state: &Value,
        mut metadata: HashMap<String, String>,
        now_ms: i64,
    ) -> Result<RollbackPoint> {
        let canonical = chunk::canonical_bytes(state)?;
        let checksum = chunk::checksum(&canonical);
        let chunk_threshold = self.config.max_snapshot_size_bytes / 2;
        let id = generate_rollback_id(now_ms);

        let point = if canonical.len() > chunk_threshold {
            let chunks = chunk::chunkify(&canonical, chunk_threshold.max(1));
            let mut offset = 0u64;
            for c in &chunks {
                self.persist_chunk(c, offset)?;
                offset += c.data.len() as u64;
            }
            RollbackPoint {
                id: id.clone(),
                variant_id,
                created_at_ms: now_ms,
                is_chunked: true,
                state: None,
                chunk_ids: chunks.into_iter().map(|c| c.id).collect(),
                checksum,
                metadata,
            }
        } else {
            let base = self.config.enable_incremental_snapshots.then(|| {
                self.points
                    .lock()
                    .unwrap()
                    .values()
                    .filter(|p| !p.is_chunked && p.variant_id == variant_id)
                    .max_by_key(|p| p.created_at_ms)
                    .cloned()
            }).flatten();

            let stored_state = match base {
                Some(base_point) => {
                    let base_state = self.reconstruct_full_state(&base_point)?;
                    metadata.insert("base_rollback_id".to_string(), base_point.id.clone());
                    diff::diff(&base_state, state)
                }
                None => state.clone(),
            };
            RollbackPoint {
                id: id.clone(),
                variant_id,
                created_at_ms: now_ms,
                is_chunked: false,
                state: Some(stored_state),
                chunk_ids: Vec::new(),
                checksum,
                metadata,
            }
        };

        atomic_write(&self.point_path(&id), &serde_json::to_vec(&point)?)?;
        self.points.lock().unwrap().insert(id.clone(), point.clone());
        tracing::info!(rollback_id = %id, is_chunked = point.is_chunked, "rollback point created");

        if self.points.lock().unwrap().len() > self.config.max_rollback_points {
            self.cleanup_old_points(now_ms)?;
        }
        Ok(point)
    }

    /// Reconstructs and returns the full state for `id`. Integrity
    /// failures (bad checksum, a missing chunk, a missing base point) are
    /// not errors — they surface as `Ok(None)`, matching this crate's
    /// split between expected-but-not-exceptional outcomes and hard
    /// failures. `Err` is reserved for I/O/serialization failures reading
    /// files that are present but unreadable/corrupt at a lower level.
    pub fn restore(&self, id: &str) -> Result<Option<Value>> {
        let point = match self.get_rollback_point(id) {
            Some(point) => point,
            None => return Ok(None),
        };
        match self.reconstruct_full_state(&point) {
            Ok(full) => {
                let actual = chunk::checksum(&chunk::canonical_bytes(&full)?);
                if actual != point.checksum {
                    tracing::warn!(rollback_id = %id, "checksum mismatch reconstructing rollback point");
                    return Ok(None);
                }
                tracing::info!(rollback_id = %id, "restored rollback point");
                Ok(Some(full))
            }
            Err(Error::RollbackIntegrity(_))
            | Err(Error::ChunkChecksumMismatch { .. })
            | Err(Error::UnknownRollbackPoint(_))
            | Err(Error::IndexCorrupt(_)) => {
                tracing::warn!(rollback_id = %id, "integrity failure reconstructing rollback point");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub fn get_rollback_point(&self, id: &str) -> Option<RollbackPoint> {
        self.points.lock().unwrap().get(id).cloned()
    }

    /// Newest first by creation time. `variant_id = None` lists every
    /// point; `Some(v)` restricts to points proposed for variant `v`.
    pub fn list_rollback_points(&self, variant_id: Option<&str>) -> Vec<RollbackPoint> {
        let mut points: Vec<_> = self
            .points
            .lock()
            .unwrap()
            .values()
            .filter(|p| match variant_id {
                Some(v) => p.variant_id.as_deref() == Some(v),
                None => true,
            })
            .cloned()
            .collect();
        points.sort_by_key(|p| std::cmp::Reverse(p.created_at_ms));
        points
    }

    pub fn verify(&self, id: &str) -> Result<bool> {
        Ok(self.restore(id)?.is_some())
    }

    /// Removes every point for which the retention predicate is false:
    /// a point is kept if it's younger than `retention_period_ms`, is
    /// marked `metadata["permanent"] == "true"`, or is (transitively)
    /// referenced as `base_rollback_id` by another retained point.
    pub fn cleanup_old_points(&self, now_ms: i64) -> Result<usize> {
        let mut points = self.points.lock().unwrap();
        let mut retained: HashSet<String> = points
            .values()
            .filter(|p| self.directly_retained(p, now_ms))
            .map(|p| p.id.clone())
            .collect();

        loop {
            let bases: Vec<String> = retained
                .iter()
                .filter_map(|id| points.get(id))
                .filter_map(|p| p.metadata.get("base_rollback_id").cloned())
                .collect();
            let mut grew = false;
            for base in bases {
                if retained.insert(base) {
                    grew = true;
                }
            }
            if !grew {
                break;
            }
        }

        let to_remove: Vec<String> = points.keys().filter(|id| !retained.contains(*id)).cloned().collect();
        for id in &to_remove {
            if let Some(point) = points.remove(id) {
                let _ = std::fs::remove_file(self.point_path(&point.id));
                tracing::info!(rollback_id = %point.id, "rollback point cleaned up");
            }
        }
        Ok(to_remove.len())
    }

    fn directly_retained(&self, point: &RollbackPoint, now_ms: i64) -> bool {
        now_ms - point.created_at_ms < self.config.retention_period_ms
            || point.metadata.get("permanent").map(|v| v == "true").unwrap_or(false)
    }

    pub fn optimize_index(&self) -> Result<()> {
        self.index.lock().unwrap().optimize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn store(max_snapshot_size_bytes: usize, max_rollback_points: usize) -> (RollbackStore, tempfile::TempDir) {
        store_with_retention(max_snapshot_size_bytes, max_rollback_points, i64::MAX)
    }

    fn store_with_retention(
        max_snapshot_size_bytes: usize,
        max_rollback_points: usize,
        retention_period_ms: i64,
    ) -> (RollbackStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let config = RollbackConfig {
            storage_path: dir.path().to_path_buf(),
            max_snapshot_size_bytes,
            max_rollback_points,
            retention_period_ms,
            enable_incremental_snapshots: true,
            btree: BTreeConfig { min_degree: 2, node_cache_size: 8 },
        };
        (RollbackStore::open(config).unwrap(), dir)
    }

    #[test]
    fn create_then_restore_round_trips_small_state() {
        let (store, _dir) = store(1_048_576, 100);
        let state = json!({"a": 1, "b": "hello"});
        let point = store.create_rollback_point(None, &state, HashMap::new(), 1000).unwrap();
        assert!(!point.is_chunked);
        assert!(store.verify(&point.id).unwrap());
        let restored = store.restore(&point.id).unwrap();
        assert_eq!(restored, Some(state));
    }

    #[test]
    fn large_state_is_chunked_across_multiple_chunks() {
        let (store, _dir) = store(64, 100);
        let big_string: String = "x".repeat(500);
        let state = json!({"payload": big_string});
        let point = store.create_rollback_point(None, &state, HashMap::new(), 1000).unwrap();
        assert!(point.is_chunked);
        assert!(point.chunk_ids.len() > 1);
        let restored = store.restore(&point.id).unwrap();
        assert_eq!(restored, Some(state));
    }

    #[test]
    fn second_snapshot_for_same_variant_is_stored_as_a_diff() {
        let (store, _dir) = store(1_048_576, 100);
        let base = store
            .create_rollback_point(Some("v1".to_string()), &json!({"a": 1, "b": 2}), HashMap::new(), 1000)
            .unwrap();
        let incremental = store
            .create_rollback_point(Some("v1".to_string()), &json!({"a": 1, "b": 3}), HashMap::new(), 2000)
            .unwrap();
        assert_eq!(incremental.metadata.get("base_rollback_id"), Some(&base.id));
        // the stored diff is strictly smaller than the full state it represents
        assert_eq!(incremental.state.as_ref().unwrap(), &json!({"b": 3}));
        assert_eq!(store.restore(&incremental.id).unwrap(), Some(json!({"a": 1, "b": 3})));
    }

    #[test]
    fn chunked_points_never_become_an_incremental_base() {
        let (store, _dir) = store(400, 100);
        let first = store
            .create_rollback_point(Some("v1".to_string()), &json!({"big": "x".repeat(200)}), HashMap::new(), 1000)
            .unwrap();
        assert!(first.is_chunked);
        let second = store
            .create_rollback_point(Some("v1".to_string()), &json!({"big": "y"}), HashMap::new(), 2000)
            .unwrap();
        assert!(!second.is_chunked);
        assert!(second.metadata.get("base_rollback_id").is_none());
    }

    #[test]
    fn verify_detects_tampered_chunk_payload() {
        let (store, _dir) = store(16, 100);
        let state = json!({"payload": "x".repeat(200)});
        let point = store.create_rollback_point(None, &state, HashMap::new(), 1000).unwrap();
        let chunk_path = store.chunk_path(&point.chunk_ids[0]);
        let mut bytes = std::fs::read(&chunk_path).unwrap();
        *bytes.last_mut().unwrap() ^= 0xFF;
        std::fs::write(&chunk_path, bytes).unwrap();
        assert!(!store.verify(&point.id).unwrap());
    }

    #[test]
    fn cleanup_respects_retention_period_and_permanent_marker() {
        let (store, _dir) = store_with_retention(1_048_576, 100, 500);
        let old = store.create_rollback_point(None, &json!({"n": 1}), HashMap::new(), 0).unwrap();
        let mut permanent_metadata = HashMap::new();
        permanent_metadata.insert("permanent".to_string(), "true".to_string());
        let permanent = store.create_rollback_point(None, &json!({"n": 2}), permanent_metadata, 0).unwrap();
        let recent = store.create_rollback_point(None, &json!({"n": 3}), HashMap::new(), 10_000).unwrap();

        store.cleanup_old_points(10_100).unwrap();
        assert!(store.get_rollback_point(&old.id).is_none());
        assert!(store.get_rollback_point(&permanent.id).is_some());
        assert!(store.get_rollback_point(&recent.id).is_some());
    }

    #[test]
    fn cleanup_retains_base_of_a_retained_incremental_point() {
        let (store, _dir) = store_with_retention(1_048_576, 100, 500);
        let base = store
            .create_rollback_point(Some("v1".to_string()), &json!({"a": 1}), HashMap::new(), 0)
            .unwrap();
        let mut permanent_metadata = HashMap::new();
        permanent_metadata.insert("permanent".to_string(), "true".to_string());
        let top = store
            .create_rollback_point(Some("v1".to_string()), &json!({"a": 2}), permanent_metadata, 0)
            .unwrap();
        assert_eq!(top.metadata.get("base_rollback_id"), Some(&base.id));

        // base is old enough to fail the age check on its own, but it's
        // still the permanent point's diff base, so it must survive.
        store.cleanup_old_points(10_000).unwrap();
        assert!(store.get_rollback_point(&base.id).is_some());
        assert!(store.get_rollback_point(&top.id).is_some());
    }

    #[test]
    fn reopening_store_reloads_existing_points() {
        let dir = tempdir().unwrap();
        let config = RollbackConfig {
            storage_path: dir.path().to_path_buf(),
            max_snapshot_size_bytes: 1_048_576,
            max_rollback_points: 100,
            retention_period_ms: i64::MAX,
            enable_incremental_snapshots: true,
            btree: BTreeConfig { min_degree: 2, node_cache_size: 8 },
        };
        let id = {
            let store = RollbackStore::open(config.clone()).unwrap();
            store.create_rollback_point(None, &json!({"a": 1}), HashMap::new(), 1000).unwrap().id
        };
        let reopened = RollbackStore::open(config).unwrap();
        assert!(reopened.get_rollback_point(&id).is_some());
    }
}
