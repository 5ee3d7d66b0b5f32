/**
 * B-tree secondary index mapping chunk id -> chunk file path.
 *
 * Nodes are content-addressed: a node's id is the SHA-256 of its
 * concatenated keys, so a node's file name changes whenever its key set
 * changes and mutation never corrupts a node some other in-flight reader
 * still holds by id. An LRU cache amortizes repeated node loads; `optimize`
 * performs the bulk-load rebuild described for `RollbackManager::optimizeBTree`.
 */
use crate::error::{Error, Result};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct BTreeConfig {
    /// Minimum degree `t` ("order"): each non-root node holds between
    /// `t-1` and `2t-1` keys. The default of 64 is chosen so a node's
    /// serialized form fits comfortably within one storage page.
    pub min_degree: usize,
    pub node_cache_size: usize,
}

impl Default for BTreeConfig {
    fn default() -> Self {
        Self { min_degree: 64, node_cache_size: 1000 }
    }
}

#[derive(Debug, Clone, Default)]
struct Node {
    keys: Vec<String>,
    values: Vec<String>,
    children: Vec<String>,
    leaf: bool,
}

fn node_id(node: &Node) -> String {
    let mut hasher = Sha256::new();
    for key in &node.keys {
        hasher.update(key.as_bytes());
    }
    hex::encode(hasher.finalize())
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Binary node layout: `u64 keyCount`, `u8 isLeaf`, then per key `u64
/// keyLen, key bytes, u64 valueLen, value bytes`; if non-leaf, then for
/// each of `keyCount + 1` children, `u64 idLen, child id bytes`. All
/// multi-byte integers are native-endian.
fn encode_node(node: &Node) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(node.keys.len() as u64).to_ne_bytes());
    out.push(u8::from(node.leaf));
    for (key, value) in node.keys.iter().zip(&node.values) {
        out.extend_from_slice(&(key.len() as u64).to_ne_bytes());
        out.extend_from_slice(key.as_bytes());
        out.extend_from_slice(&(value.len() as u64).to_ne_bytes());
        out.extend_from_slice(value.as_bytes());
    }
    if !node.leaf {
        for child in &node.children {
            out.extend_from_slice(&(child.len() as u64).to_ne_bytes());
            out.extend_from_slice(child.as_bytes());
        }
    }
    out
}

fn decode_node(bytes: &[u8]) -> Result<Node> {
    let corrupt = || Error::IndexCorrupt("b-tree node file truncated".to_string());
    let mut pos = 0usize;
    let read_u64 = |bytes: &[u8], pos: &mut usize| -> Result<u64> {
        let end = pos.checked_add(8).filter(|&e| e <= bytes.len()).ok_or_else(corrupt)?;
        let value = u64::from_ne_bytes(bytes[*pos..end].try_into().unwrap());
        *pos = end;
        Ok(value)
    };
    let read_bytes = |bytes: &[u8], pos: &mut usize, len: usize| -> Result<Vec<u8>> {
        let end = pos.checked_add(len).filter(|&e| e <= bytes.len()).ok_or_else(corrupt)?;
        let out = bytes[*pos..end].to_vec();
        *pos = end;
        Ok(out)
    };
    let read_string = |bytes: &[u8], pos: &mut usize| -> Result<String> {
        let len = read_u64(bytes, pos)? as usize;
        String::from_utf8(read_bytes(bytes, pos, len)?).map_err(|e| Error::IndexCorrupt(e.to_string()))
    };

    let key_count = read_u64(bytes, &mut pos)? as usize;
    let leaf = *bytes.get(pos).ok_or_else(corrupt)? != 0;
    pos += 1;
    let mut keys = Vec::with_capacity(key_count);
    let mut values = Vec::with_capacity(key_count);
    for _ in 0..key_count {
        keys.push(read_string(bytes, &mut pos)?);
        values.push(read_string(bytes, &mut pos)?);
    }
    let mut children = Vec::new();
    if !leaf {
        for _ in 0..key_count + 1 {
            children.push(read_string(bytes, &mut pos)?);
        }
    }
    Ok(Node { keys, values, children, leaf })
}

#[derive(Serialize, Deserialize)]
struct MetaFile {
    root_id: String,
    insert_count: u64,
}

pub struct RollbackIndex {
    config: BTreeConfig,
    dir: PathBuf,
    cache: LruCache<String, Node>,
    root_id: String,
    insert_count: u64,
}

impl RollbackIndex {
    pub fn open(storage_path: impl AsRef<Path>, config: BTreeConfig) -> Result<Self> {
        let dir = storage_path.as_ref().join("btree");
        std::fs::create_dir_all(&dir)?;
        let meta_path = dir.join("meta.json");
        let (root_id, insert_count) = if meta_path.exists() {
            let raw = std::fs::read_to_string(&meta_path)?;
            let meta: MetaFile = serde_json::from_str(&raw)?;
            (meta.root_id, meta.insert_count)
        } else {
            let empty = Node { leaf: true, ..Node::default() };
            let id = node_id(&empty);
            atomic_write(&dir.join(format!("{id}.bin")), &encode_node(&empty))?;
            (id, 0)
        };
        let mut index = Self {
            cache: LruCache::new(NonZeroUsize::new(config.node_cache_size.max(1)).unwrap()),
            config,
            dir,
            root_id,
            insert_count,
        };
        index.write_meta()?;
        Ok(index)
    }

    fn node_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.bin"))
    }

    fn load_node(&mut self, id: &str) -> Result<Node> {
        if let Some(node) = self.cache.get(id) {
            return Ok(node.clone());
        }
        let bytes = std::fs::read(self.node_path(id)).map_err(|e| Error::IndexCorrupt(format!("missing b-tree node {id}: {e}")))?;
        let node = decode_node(&bytes)?;
        self.cache.put(id.to_string(), node.clone());
        Ok(node)
    }

    /// Writes `node` under the id derived from its key set. Unlike the
    /// chunk store's true content addressing, this id is keyed only by
    /// `keys` (per the node-file naming rule), so two nodes sharing a key
    /// set but differing in values or children share a filename — the
    /// write always happens, it is never skipped as a presumed duplicate.
    fn persist_node(&mut self, node: Node) -> Result<String> {
        let id = node_id(&node);
        atomic_write(&self.node_path(&id), &encode_node(&node))?;
        self.cache.put(id.clone(), node);
        Ok(id)
    }

    fn write_meta(&self) -> Result<()> {
        atomic_write(
            &self.dir.join("meta.json"),
            &serde_json::to_vec(&MetaFile { root_id: self.root_id.clone(), insert_count: self.insert_count })?,
        )
    }

    fn split_node(&mut self, mut node: Node) -> (String, String, Node, Node) {
        let t = self.config.min_degree;
        let mut right = Node { leaf: node.leaf, ..Node::default() };
        right.keys = node.keys.split_off(t);
        right.values = node.values.split_off(t);
        let median_key = node.keys.pop().unwrap();
        let median_value = node.values.pop().unwrap();
        if !node.leaf {
            right.children = node.children.split_off(t);
        }
        (median_key, median_value, node, right)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let key = key.into();
        let value = value.into();
        let max_keys = 2 * self.config.min_degree - 1;
        let root = self.load_node(&self.root_id)?;
        let root_id = if root.keys.len() >= max_keys {
            let (median_key, median_value, left, right) = self.split_node(root);
            let left_id = self.persist_node(left)?;
            let right_id = self.persist_node(right)?;
            self.persist_node(Node {
                leaf: false,
                keys: vec![median_key],
                values: vec![median_value],
                children: vec![left_id, right_id],
            })?
        } else {
            self.root_id.clone()
        };
        self.root_id = self.insert_non_full(&root_id, key, value)?;
        self.insert_count += 1;
        self.write_meta()
    }

    fn insert_non_full(&mut self, node_id: &str, key: String, value: String) -> Result<String> {
        let mut node = self.load_node(node_id)?;
        let mut idx = node.keys.partition_point(|k| k.as_str() < key.as_str());
        if idx < node.keys.len() && node.keys[idx] == key {
            node.values[idx] = value;
            return self.persist_node(node);
        }
        if node.leaf {
            node.keys.insert(idx, key);
            node.values.insert(idx, value);
            return self.persist_node(node);
        }
        let max_keys = 2 * self.config.min_degree - 1;
        let child_id = node.children[idx].clone();
        let child = self.load_node(&child_id)?;
        if child.keys.len() >= max_keys {
            let (median_key, median_value, left, right) = self.split_node(child);
            let left_id = self.persist_node(left)?;
            let right_id = self.persist_node(right)?;
            node.children[idx] = left_id;
            node.children.insert(idx + 1, right_id);
            match key.cmp(&median_key) {
                std::cmp::Ordering::Equal => {
                    node.keys.insert(idx, median_key);
                    node.values.insert(idx, value);
                    return self.persist_node(node);
                }
                std::cmp::Ordering::Greater => {
                    node.keys.insert(idx, median_key);
                    node.values.insert(idx, median_value);
                    idx += 1;
                }
                std::cmp::Ordering::Less => {
                    node.keys.insert(idx, median_key);
                    node.values.insert(idx, median_value);
                }
            }
        }
        let child_id = node.children[idx].clone();
        let new_child_id = self.insert_non_full(&child_id, key, value)?;
        node.children[idx] = new_child_id;
        self.persist_node(node)
    }

    pub fn search(&mut self, key: &str) -> Result<Option<String>> {
        let mut node_id = self.root_id.clone();
        loop {
            let node = self.load_node(&node_id)?;
            match node.keys.binary_search_by(|k| k.as_str().cmp(key)) {
                Ok(idx) => return Ok(Some(node.values[idx].clone())),
                Err(idx) => {
                    if node.leaf {
                        return Ok(None);
                    }
                    node_id = node.children[idx].clone();
                }
            }
        }
    }

    fn collect_all(&mut self, node_id: &str, out: &mut Vec<(String, String)>) -> Result<()> {
        let node = self.load_node(node_id)?;
        if node.leaf {
            for i in 0..node.keys.len() {
                out.push((node.keys[i].clone(), node.values[i].clone()));
            }
            return Ok(());
        }
        for i in 0..node.keys.len() {
            self.collect_all(&node.children[i], out)?;
            out.push((node.keys[i].clone(), node.values[i].clone()));
        }
        if let Some(last) = node.children.last().cloned() {
            self.collect_all(&last, out)?;
        }
        Ok(())
    }

    /// Bulk-load rebuild: gathers every (key, value) pair, discards
    /// duplicates (a content-addressed separator and its originating leaf
    /// entry can coexist after repeated optimizations), and repacks a
    /// balanced tree bottom-up with leaves of about `2*min_degree - 1`
    /// entries and internal nodes of about `2*min_degree` children.
    pub fn optimize(&mut self) -> Result<()> {
        let mut raw = Vec::new();
        self.collect_all(&self.root_id.clone(), &mut raw)?;
        let mut dedup: HashMap<String, String> = HashMap::new();
        for (k, v) in raw {
            dedup.insert(k, v);
        }
        let mut sorted: Vec<(String, String)> = dedup.into_iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        self.cache.clear();

        let leaf_cap = (2 * self.config.min_degree - 1).max(1);
        let child_cap = (2 * self.config.min_degree).max(2);

        self.root_id = if sorted.is_empty() {
            self.persist_node(Node { leaf: true, ..Node::default() })?
        } else {
            let mut level_ids = Vec::new();
            let mut level_keys = Vec::new();
            for chunk in sorted.chunks(leaf_cap) {
                level_keys.push(chunk[0].0.clone());
                level_ids.push(self.persist_node(Node {
                    leaf: true,
                    keys: chunk.iter().map(|(k, _)| k.clone()).collect(),
                    values: chunk.iter().map(|(_, v)| v.clone()).collect(),
                    children: Vec::new(),
                })?);
            }
            while level_ids.len() > 1 {
                let mut next_ids = Vec::new();
                let mut next_keys = Vec::new();
                let mut i = 0;
                while i < level_ids.len() {
                    let take = child_cap.min(level_ids.len() - i);
                    let children = level_ids[i..i + take].to_vec();
                    let separators = level_keys[i + 1..i + take].to_vec();
                    let separator_values = separators
                        .iter()
                        .map(|k| sorted.binary_search_by(|e| e.0.cmp(k)).map(|idx| sorted[idx].1.clone()).unwrap_or_default())
                        .collect();
                    next_keys.push(level_keys[i].clone());
                    next_ids.push(self.persist_node(Node { leaf: false, keys: separators, values: separator_values, children })?);
                    i += take;
                }
                level_ids = next_ids;
                level_keys = next_keys;
            }
            level_ids.into_iter().next().unwrap()
        };
        self.insert_count = 0;
        self.write_meta()
    }

    pub fn insert_count(&self) -> u64 {
        self.insert_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn insert_then_search_finds_value() {
        let dir = tempdir().unwrap();
        let mut idx = RollbackIndex::open(dir.path(), BTreeConfig { min_degree: 2, node_cache_size: 4 }).unwrap();
        for i in 0..50 {
            idx.insert(format!("chunk_{i:03}"), format!("chunks/chunk_{i:03}.bin")).unwrap();
        }
        assert_eq!(idx.search("chunk_010").unwrap(), Some("chunks/chunk_010.bin".to_string()));
        assert_eq!(idx.search("chunk_999").unwrap(), None);
    }

    #[test]
    fn optimize_preserves_all_entries() {
        let dir = tempdir().unwrap();
        let mut idx = RollbackIndex::open(dir.path(), BTreeConfig { min_degree: 2, node_cache_size: 4 }).unwrap();
        for i in 0..30 {
            idx.insert(format!("chunk_{i:03}"), format!("p{i}")).unwrap();
        }
        idx.optimize().unwrap();
        for i in 0..30 {
            assert_eq!(idx.search(&format!("chunk_{i:03}")).unwrap(), Some(format!("p{i}")));
        }
    }

    #[test]
    fn index_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let mut idx = RollbackIndex::open(dir.path(), BTreeConfig::default()).unwrap();
            idx.insert("chunk_a", "path_a").unwrap();
        }
        let mut reopened = RollbackIndex::open(dir.path(), BTreeConfig::default()).unwrap();
        assert_eq!(reopened.search("chunk_a").unwrap(), Some("path_a".to_string()));
    }

    #[test]
    fn reinserting_same_key_updates_value() {
        let dir = tempdir().unwrap();
        let mut idx = RollbackIndex::open(dir.path(), BTreeConfig { min_degree: 2, node_cache_size: 4 }).unwrap();
        idx.insert("chunk_a", "path_a").unwrap();
        idx.insert("chunk_a", "path_a_v2").unwrap();
        assert_eq!(idx.search("chunk_a").unwrap(), Some("path_a_v2".to_string()));
    }
}
