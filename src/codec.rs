/**
 * Codec collaborator surface.
 *
 * Data transcoding/compression is explicitly out of scope for this crate.
 * This trait lets negotiation and the rollback chunk store reference "a
 * codec for this tag" without the crate implementing RLE, delta, FSK, or
 * base64 itself.
 */
use crate::negotiation::DataFormat;
use std::sync::Arc;

pub trait Codec: Send + Sync {
    fn encode(&self, input: &[u8]) -> Vec<u8>;
    fn decode(&self, input: &[u8]) -> Vec<u8>;
}

pub trait CodecRegistry: Send + Sync {
    fn codec_for(&self, tag: DataFormat) -> Option<Arc<dyn Codec>>;
}

/// A registry with no codecs registered — the default when a deployment
/// hasn't wired in transcoding collaborators yet. Negotiation and chunking
/// both treat "no codec" as "pass bytes through unmodified", never as an
/// error.
#[derive(Default)]
pub struct EmptyCodecRegistry;

impl CodecRegistry for EmptyCodecRegistry {
    fn codec_for(&self, _tag: DataFormat) -> Option<Arc<dyn Codec>> {
        None
    }
}
