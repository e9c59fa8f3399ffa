//! Keyspace ids and the key ranges shards own

use std::cmp::Ordering;
use std::fmt;

use serde::{Serialize, Serializer};

use super::errors::{TopoError, TopoResult};

/// Opaque routing key produced by a vindex
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyspaceId(Vec<u8>);

impl KeyspaceId {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Big-endian encoding of a 64-bit value
    pub fn from_u64(v: u64) -> Self {
        Self(v.to_be_bytes().to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Lowercase hex rendering, as used in error messages
    pub fn to_hex(&self) -> String {
        encode_hex(&self.0)
    }
}

impl fmt::Display for KeyspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for KeyspaceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// Half-open range `[start, end)` of keyspace ids. Empty bounds are open.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct KeyRange {
    pub start: Vec<u8>,
    pub end: Vec<u8>,
}

impl KeyRange {
    /// Range covering every keyspace id
    pub fn full() -> Self {
        Self::default()
    }

    /// Parses a shard name such as `-80`, `40-60`, `80-`, `-` or `0`.
    pub fn parse(shard: &str) -> TopoResult<Self> {
        if shard == "0" || shard == "-" || shard.is_empty() {
            return Ok(Self::full());
        }
        let (start, end) = shard
            .split_once('-')
            .ok_or_else(|| TopoError::invalid_key_range(shard, "missing '-' separator"))?;
        if end.contains('-') {
            return Err(TopoError::invalid_key_range(shard, "more than one '-' separator"));
        }
        let range = Self {
            start: decode_hex(start).map_err(|e| TopoError::invalid_key_range(shard, e))?,
            end: decode_hex(end).map_err(|e| TopoError::invalid_key_range(shard, e))?,
        };
        if !range.end.is_empty() && range.start >= range.end {
            return Err(TopoError::invalid_key_range(shard, "start must be below end"));
        }
        Ok(range)
    }

    pub fn is_full(&self) -> bool {
        self.start.is_empty() && self.end.is_empty()
    }

    /// Returns true if `start <= id < end`
    pub fn contains(&self, id: &KeyspaceId) -> bool {
        let id = id.as_bytes();
        self.start.as_slice() <= id && (self.end.is_empty() || id < self.end.as_slice())
    }
}

impl fmt::Display for KeyRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", encode_hex(&self.start), encode_hex(&self.end))
    }
}

/// Checks that ranges partition the whole keyspace without gaps or overlap.
pub fn check_partition(ranges: &[KeyRange]) -> Result<(), String> {
    if ranges.is_empty() {
        return Err("no shards".to_string());
    }
    let mut sorted: Vec<&KeyRange> = ranges.iter().collect();
    sorted.sort_by(|a, b| match (a.start.is_empty(), b.start.is_empty()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.start.cmp(&b.start),
    });

    if !sorted[0].start.is_empty() {
        return Err(format!("first shard {} does not start at the minimum key", sorted[0]));
    }
    for pair in sorted.windows(2) {
        if pair[0].end.is_empty() || pair[0].end != pair[1].start {
            return Err(format!("shards {} and {} are not contiguous", pair[0], pair[1]));
        }
    }
    let last = sorted[sorted.len() - 1];
    if !last.end.is_empty() {
        return Err(format!("last shard {} does not reach the maximum key", last));
    }
    Ok(())
}

fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn decode_hex(s: &str) -> Result<Vec<u8>, String> {
    if s.len() % 2 != 0 {
        return Err(format!("odd-length hex {:?}", s));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| format!("invalid hex {:?}", s))
        })
        .collect()
}
