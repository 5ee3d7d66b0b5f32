/**
 * Capability type and its external binary framing.
 *
 * DESIGN DECISION: parameters kept as an ordered Vec<(String, String)>, not a
 * BTreeMap
 * WHY: the binary wire format round-trips parameters in insertion order; a
 * sorted map would silently reorder them and break byte-for-byte round-trip
 * tests.
 */
use crate::error::{Error, Result};
use crate::version::Version;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capability {
    pub name: String,
    pub version: Version,
    pub parameters: Vec<(String, String)>,
    pub deprecated: bool,
    pub deprecated_since: Option<Version>,
    pub removal_version: Option<Version>,
    pub replacement_name: Option<String>,
}

impl Capability {
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
            parameters: Vec::new(),
            deprecated: false,
            deprecated_since: None,
            removal_version: None,
            replacement_name: None,
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.push((key.into(), value.into()));
        self
    }

    pub fn deprecate(&mut self, since: Version, removal: Option<Version>, replacement: Option<String>) {
        self.deprecated = true;
        self.deprecated_since = Some(since);
        self.removal_version = removal;
        self.replacement_name = replacement;
    }

    /// A capability "matches" a request when names are equal, this
    /// capability's version is compatible (strict) or satisfies (partial)
    /// the requested version, and every parameter the request asks for is
    /// present here with an identical value (extra parameters on this side
    /// are fine).
    pub fn matches(&self, required: &Capability, partial: bool) -> bool {
        if self.name != required.name {
            return false;
        }
        let version_ok = if partial {
            self.version.satisfies(&required.version)
        } else {
            self.version.compatible_with(&required.version)
        };
        if !version_ok {
            return false;
        }
        required
            .parameters
            .iter()
            .all(|(k, v)| self.parameters.iter().any(|(ok, ov)| ok == k && ov == v))
    }
}

impl PartialEq for Capability {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.version == other.version
    }
}
impl Eq for Capability {}

impl Hash for Capability {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.version.major.hash(state);
        self.version.minor.hash(state);
        self.version.patch.hash(state);
    }
}

fn write_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn read_u32(buf: &[u8], pos: &mut usize) -> Result<u32> {
    let end = *pos + 4;
    let slice = buf
        .get(*pos..end)
        .ok_or_else(|| Error::MalformedFrame("truncated u32".into()))?;
    *pos = end;
    Ok(u32::from_be_bytes(slice.try_into().unwrap()))
}

fn read_u16(buf: &[u8], pos: &mut usize) -> Result<u16> {
    let end = *pos + 2;
    let slice = buf
        .get(*pos..end)
        .ok_or_else(|| Error::MalformedFrame("truncated u16".into()))?;
    *pos = end;
    Ok(u16::from_be_bytes(slice.try_into().unwrap()))
}

fn write_string(buf: &mut Vec<u8>, s: &str) {
    write_u32(buf, s.len() as u32);
    buf.extend_from_slice(s.as_bytes());
}

fn read_string(buf: &[u8], pos: &mut usize) -> Result<String> {
    let len = read_u32(buf, pos)? as usize;
    let end = *pos + len;
    let slice = buf
        .get(*pos..end)
        .ok_or_else(|| Error::MalformedFrame("truncated string".into()))?;
    *pos = end;
    String::from_utf8(slice.to_vec()).map_err(|e| Error::MalformedFrame(e.to_string()))
}

/// Encodes a capability's name, version and parameters in the binary form
/// consumed by `register_capability_binary` / produced by
/// `get_agent_capabilities_binary`: name as a length-prefixed string,
/// version as three big-endian u16s, then a u32 parameter count followed by
/// length-prefixed key/value pairs in insertion order.
pub fn encode_capability(cap: &Capability) -> Vec<u8> {
    let mut buf = Vec::new();
    write_string(&mut buf, &cap.name);
    buf.extend_from_slice(&cap.version.major.to_be_bytes());
    buf.extend_from_slice(&cap.version.minor.to_be_bytes());
    buf.extend_from_slice(&cap.version.patch.to_be_bytes());
    write_u32(&mut buf, cap.parameters.len() as u32);
    for (k, v) in &cap.parameters {
        write_string(&mut buf, k);
        write_string(&mut buf, v);
    }
    buf
}

pub fn decode_capability(buf: &[u8]) -> Result<Capability> {
    let mut pos = 0usize;
    let name = read_string(buf, &mut pos)?;
    let major = read_u16(buf, &mut pos)?;
    let minor = read_u16(buf, &mut pos)?;
    let patch = read_u16(buf, &mut pos)?;
    let count = read_u32(buf, &mut pos)? as usize;
    let mut parameters = Vec::with_capacity(count);
    for _ in 0..count {
        let k = read_string(buf, &mut pos)?;
        let v = read_string(buf, &mut pos)?;
        parameters.push((k, v));
    }
    Ok(Capability {
        name,
        version: Version::new(major, minor, patch),
        parameters,
        deprecated: false,
        deprecated_since: None,
        removal_version: None,
        replacement_name: None,
    })
}

/// A capability-set blob: u32 count followed by concatenated
/// length-framed `encode_capability` records — the wire shape of
/// `get_agent_capabilities_binary`.
pub fn encode_capability_set(caps: &[Capability]) -> Vec<u8> {
    let mut buf = Vec::new();
    write_u32(&mut buf, caps.len() as u32);
    for cap in caps {
        let encoded = encode_capability(cap);
        write_u32(&mut buf, encoded.len() as u32);
        buf.extend_from_slice(&encoded);
    }
    buf
}

pub fn decode_capability_set(buf: &[u8]) -> Result<Vec<Capability>> {
    let mut pos = 0usize;
    let count = read_u32(buf, &mut pos)? as usize;
    let mut out = Vec::with_capacity(count);
    for _ in 0..count {
        let len = read_u32(buf, &mut pos)? as usize;
        let end = pos + len;
        let slice = buf
            .get(pos..end)
            .ok_or_else(|| Error::MalformedFrame("truncated capability record".into()))?;
        out.push(decode_capability(slice)?);
        pos = end;
    }
    Ok(out)
}
