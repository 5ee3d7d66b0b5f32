/**
 * Negotiable parameter tag vocabulary.
 *
 * `encryption` is kept as an opaque string since its values belong to the
 * out-of-scope authentication layer; the other axes need concrete tag sets
 * for the fallback algorithm to walk through.
 */
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataFormat {
    VectorFloat32,
    VectorInt8,
    CompressedState,
    BinaryCustom,
    GgwaveFsk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Compression {
    None,
    Lz4,
    Rle,
    Delta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCorrection {
    None,
    ChecksumOnly,
    ReedSolomon,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiableParams {
    pub data_format: DataFormat,
    pub compression: Compression,
    pub error_correction: ErrorCorrection,
    pub encryption: String,
    pub protocol_version: crate::version::Version,
    pub security_version: crate::version::Version,
}

impl NegotiableParams {
    /// Cross-axis compatibility rules that must hold independent of
    /// fallback order: COMPRESSED_STATE forbids any compression other than
    /// `None` (the format is already dense), and GGWAVE_FSK only tolerates
    /// `None` or `ChecksumOnly` error correction (its audio framing has no
    /// room for heavier redundancy coding).
    pub fn is_internally_consistent(&self) -> bool {
        if self.data_format == DataFormat::CompressedState && self.compression != Compression::None {
            return false;
        }
        if self.data_format == DataFormat::GgwaveFsk
            && !matches!(self.error_correction, ErrorCorrection::None | ErrorCorrection::ChecksumOnly)
        {
            return false;
        }
        true
    }
}

/// Per-axis ordered fallback lists (most preferred first) plus the floor
/// below which no protocol version is acceptable.
#[derive(Debug, Clone)]
pub struct NegotiationPreferences {
    pub data_format: Vec<DataFormat>,
    pub compression: Vec<Compression>,
    pub error_correction: Vec<ErrorCorrection>,
    pub min_protocol_version: crate::version::Version,
}

impl NegotiationPreferences {
    pub fn next_after<T: PartialEq + Copy>(list: &[T], current: T) -> Option<T> {
        let idx = list.iter().position(|v| *v == current)?;
        list.get(idx + 1).copied()
    }
}
