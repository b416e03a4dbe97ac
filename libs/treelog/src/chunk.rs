//! Chunk framing.
//!
//! ```text
//! chunk       := zigzag_varint(size) payload
//! size >= 0   => record chunk of `size` bytes
//! size <  0   => type declaration chunk of `!size` bytes
//!
//! declaration := varint(name_len) name schema_bytes
//! record      := zigzag_varint(parent_delta) zigzag_varint(type_ref) message_bytes
//! ```
//!
//! `parent_delta` is 0 for a root record, otherwise `parent_id - current_id`
//! (always negative). `type_ref` is the registry index, negated for a group,
//! and 0 only for a group terminator.

use prost::Message;

use crate::error::{Result, StreamError};
use crate::schema::Schema;
use crate::varint;

/// Position of a record in the stream, counting groups and leaves alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct RecordId(pub u64);

impl RecordId {
    pub fn next(self) -> Self {
        RecordId(self.0 + 1)
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Dense, 1-based, stream-local type index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeIndex(pub u64);

impl std::fmt::Display for TypeIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkKind {
    Declaration,
    Record,
}

/// Length prefix of one chunk, decoded but not yet followed by its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub kind: ChunkKind,
    /// Bytes taken by the length prefix itself.
    pub header_len: usize,
    pub payload_len: u64,
}

impl FrameHeader {
    pub fn total_len(&self) -> u64 {
        self.header_len as u64 + self.payload_len
    }
}

/// Parse the length prefix at the front of `buf`. `Ok(None)` means more bytes
/// are needed.
pub fn peek_header(buf: &[u8]) -> Result<Option<FrameHeader>> {
    let Some((raw, header_len)) = varint::decode_varint(buf)? else {
        return Ok(None);
    };
    let size = varint::zigzag_decode(raw);
    let (kind, payload_len) = if size < 0 {
        (ChunkKind::Declaration, (!size) as u64)
    } else {
        (ChunkKind::Record, size as u64)
    };
    Ok(Some(FrameHeader { kind, header_len, payload_len }))
}

/// Append a framed chunk (length prefix + payload) to `out`.
pub fn encode_frame(kind: ChunkKind, payload: &[u8], out: &mut Vec<u8>) {
    let len = payload.len() as i64;
    let size = match kind {
        ChunkKind::Record => len,
        ChunkKind::Declaration => !len,
    };
    varint::write_signed(size, out);
    out.extend_from_slice(payload);
}

// ═══════════════════════════════════════════════════════════════
//  Declaration payload
// ═══════════════════════════════════════════════════════════════

pub fn encode_declaration(name: &str, schema: &Schema, out: &mut Vec<u8>) {
    varint::encode_varint(name.len() as u64, out);
    out.extend_from_slice(name.as_bytes());
    out.extend_from_slice(&schema.encode_to_vec());
}

pub fn decode_declaration(payload: &[u8]) -> Result<(String, Schema)> {
    let mut cursor = payload;
    let name_len = varint::read_varint(&mut cursor)?;
    let name_len = usize::try_from(name_len)
        .ok()
        .filter(|&n| n <= cursor.len())
        .ok_or(StreamError::Truncated("type declaration name"))?;
    let (name, rest) = cursor.split_at(name_len);
    let name = std::str::from_utf8(name)
        .map_err(|e| StreamError::Corrupt(format!("type name is not UTF-8: {e}")))?;
    if name.is_empty() {
        return Err(StreamError::Corrupt("empty type name in declaration".into()));
    }
    let schema = Schema::decode(rest)?;
    Ok((name.to_owned(), schema))
}

// ═══════════════════════════════════════════════════════════════
//  Record payload
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeRef {
    Leaf(TypeIndex),
    Group(TypeIndex),
    /// Terminator of the group named by the parent reference.
    End,
}

impl TypeRef {
    fn to_wire(self) -> i64 {
        match self {
            TypeRef::Leaf(index) => index.0 as i64,
            TypeRef::Group(index) => -(index.0 as i64),
            TypeRef::End => 0,
        }
    }

    fn from_wire(value: i64) -> Self {
        match value {
            0 => TypeRef::End,
            v if v > 0 => TypeRef::Leaf(TypeIndex(v as u64)),
            v => TypeRef::Group(TypeIndex(v.unsigned_abs())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub parent_delta: i64,
    pub type_ref: TypeRef,
}

impl RecordHeader {
    /// Header for a record written at `current` under `parent`.
    pub fn new(current: RecordId, parent: Option<RecordId>, type_ref: TypeRef) -> Self {
        let parent_delta = match parent {
            Some(parent) => parent.0 as i64 - current.0 as i64,
            None => 0,
        };
        Self { parent_delta, type_ref }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        varint::write_signed(self.parent_delta, out);
        varint::write_signed(self.type_ref.to_wire(), out);
    }

    /// Decode the header from the front of a record payload, leaving the
    /// cursor at the message bytes.
    pub fn decode(payload: &mut &[u8]) -> Result<Self> {
        let parent_delta = varint::read_signed(payload)?;
        let type_ref = TypeRef::from_wire(varint::read_signed(payload)?);
        Ok(Self { parent_delta, type_ref })
    }

    /// Resolve the parent reference against the id of the record being read.
    pub fn parent(&self, current: RecordId) -> Result<Option<RecordId>> {
        match self.parent_delta {
            0 => Ok(None),
            d if d > 0 => Err(StreamError::Corrupt(format!(
                "parent delta {d} points forward from record {current}"
            ))),
            d => current
                .0
                .checked_sub(d.unsigned_abs())
                .map(|id| Some(RecordId(id)))
                .ok_or_else(|| {
                    StreamError::Corrupt(format!(
                        "parent delta {d} points before the start of the stream at record {current}"
                    ))
                }),
        }
    }
}
