/**
 * Content-addressed state chunking.
 *
 * State bytes above the chunking threshold are split into fixed-size
 * chunks, each named by the hex SHA-256 of its own bytes so the id doubles
 * as an integrity checksum and identical chunks across snapshots are
 * deduplicated by construction.
 */
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone)]
pub struct StateChunk {
    pub id: String,
    pub data: Vec<u8>,
}

pub fn checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Canonical serialization of a state document: `serde_json::Value`'s
/// object variant is backed by a `BTreeMap` (this crate never enables the
/// `preserve_order` feature), so `to_vec` already emits keys in recursive
/// lexicographic order. Hashing this output is what makes checksums
/// reproducible regardless of how the document was originally built.
pub fn canonical_bytes(state: &serde_json::Value) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(state)?)
}

#[derive(Debug, Serialize, Deserialize)]
struct ChunkFileMetadata {
    offset: u64,
    checksum: String,
}

/// Encodes a chunk file: little-endian u32 metadata length, the metadata
/// document (offset + checksum), then the chunk payload.
pub fn encode_chunk_file(chunk: &StateChunk, offset: u64) -> Vec<u8> {
    let metadata = ChunkFileMetadata { offset, checksum: chunk.id.clone() };
    let metadata_bytes = serde_json::to_vec(&metadata).expect("metadata always serializes");
    let mut out = Vec::with_capacity(4 + metadata_bytes.len() + chunk.data.len());
    out.extend_from_slice(&(metadata_bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(&metadata_bytes);
    out.extend_from_slice(&chunk.data);
    out
}

/// Decodes a chunk file written by [`encode_chunk_file`], returning the
/// chunk (keyed by the caller-supplied id, since the id is the filename,
/// not part of the payload) and its recorded offset.
pub fn decode_chunk_file(id: &str, bytes: &[u8]) -> Result<(StateChunk, u64)> {
    if bytes.len() < 4 {
        return Err(Error::RollbackIntegrity(format!("chunk file {id} truncated before metadata length")));
    }
    let metadata_len = u32::from_le_bytes(bytes[0..4].try_into().unwrap()) as usize;
    let metadata_start = 4;
    let payload_start = metadata_start
        .checked_add(metadata_len)
        .filter(|&end| end <= bytes.len())
        .ok_or_else(|| Error::RollbackIntegrity(format!("chunk file {id} truncated metadata")))?;
    let metadata: ChunkFileMetadata = serde_json::from_slice(&bytes[metadata_start..payload_start])?;
    let data = bytes[payload_start..].to_vec();
    Ok((StateChunk { id: id.to_string(), data }, metadata.offset))
}

/// Splits `data` into chunks of at most `chunk_size` bytes. A state smaller
/// than the threshold still yields exactly one chunk — chunking is always
/// content-addressed, never conditional on size once this function is
/// reached (the caller decides whether chunking applies at all).
pub fn chunkify(data: &[u8], chunk_size: usize) -> Vec<StateChunk> {
    if data.is_empty() {
        return vec![StateChunk { id: checksum(data), data: Vec::new() }];
    }
    data.chunks(chunk_size.max(1))
        .map(|bytes| StateChunk { id: checksum(bytes), data: bytes.to_vec() })
        .collect()
}

/// Reassembles chunks in the given order, verifying each chunk's id against
/// its own content before concatenating.
pub fn reassemble(chunks: &[StateChunk]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    for chunk in chunks {
        let actual = checksum(&chunk.data);
        if actual != chunk.id {
            return Err(Error::ChunkChecksumMismatch {
                expected: chunk.id.clone(),
                actual,
            });
        }
        out.extend_from_slice(&chunk.data);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunkify_then_reassemble_round_trips() {
        let data = vec![1u8; 10_000];
        let chunks = chunkify(&data, 4096);
        assert_eq!(chunks.len(), 3);
        let restored = reassemble(&chunks).unwrap();
        assert_eq!(restored, data);
    }

    #[test]
    fn identical_chunks_share_an_id() {
        let data = vec![7u8; 8192];
        let chunks = chunkify(&data, 4096);
        assert_eq!(chunks[0].id, chunks[1].id);
    }

    #[test]
    fn tampered_chunk_fails_reassembly() {
        let mut chunks = chunkify(&vec![1u8; 100], 4096);
        chunks[0].data[0] ^= 0xFF;
        assert!(reassemble(&chunks).is_err());
    }

    #[test]
    fn canonical_bytes_sort_keys_recursively() {
        let a = serde_json::json!({"b": 1, "a": {"z": 1, "y": 2}});
        let b = serde_json::json!({"a": {"y": 2, "z": 1}, "b": 1});
        assert_eq!(canonical_bytes(&a).unwrap(), canonical_bytes(&b).unwrap());
    }

    #[test]
    fn chunk_file_round_trips_through_encode_decode() {
        let chunk = StateChunk { id: checksum(b"hello"), data: b"hello".to_vec() };
        let bytes = encode_chunk_file(&chunk, 128);
        let (decoded, offset) = decode_chunk_file(&chunk.id, &bytes).unwrap();
        assert_eq!(decoded.data, chunk.data);
        assert_eq!(offset, 128);
    }

    #[test]
    fn decode_chunk_file_rejects_truncated_input() {
        assert!(decode_chunk_file("x", &[0, 0]).is_err());
        assert!(decode_chunk_file("x", &[255, 0, 0, 0]).is_err());
    }
}
