use std::sync::Arc;

use crate::error::{Result, StreamError};
use crate::registry::Registry;
use crate::schema::{FieldKind, FieldSchema};
use crate::varint;

use super::{GenericRecord, Value};

/// Nesting limit for messages inside messages.
const RECURSION_LIMIT: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum WireType {
    Varint = 0,
    Fixed64 = 1,
    LengthDelimited = 2,
    StartGroup = 3,
    EndGroup = 4,
    Fixed32 = 5,
}

impl WireType {
    fn from_key(key: u64) -> Result<Self> {
        match key & 0x07 {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::Fixed64),
            2 => Ok(WireType::LengthDelimited),
            3 => Ok(WireType::StartGroup),
            4 => Ok(WireType::EndGroup),
            5 => Ok(WireType::Fixed32),
            other => Err(StreamError::Corrupt(format!("invalid wire type {other}"))),
        }
    }

    /// Wire type a singular value of `kind` is encoded with.
    pub(super) fn of(kind: FieldKind) -> Option<Self> {
        match kind {
            FieldKind::Int32
            | FieldKind::Int64
            | FieldKind::Uint32
            | FieldKind::Uint64
            | FieldKind::Sint32
            | FieldKind::Sint64
            | FieldKind::Bool
            | FieldKind::Enum => Some(WireType::Varint),
            FieldKind::Fixed64 | FieldKind::Sfixed64 | FieldKind::Double => Some(WireType::Fixed64),
            FieldKind::Fixed32 | FieldKind::Sfixed32 | FieldKind::Float => Some(WireType::Fixed32),
            FieldKind::String | FieldKind::Bytes | FieldKind::Message => {
                Some(WireType::LengthDelimited)
            }
            FieldKind::Group => Some(WireType::StartGroup),
            FieldKind::Unspecified => None,
        }
    }
}

/// One undecoded field value as it appears on the wire.
#[derive(Debug, Clone, Copy)]
enum Raw<'a> {
    Varint(u64),
    Fixed64(u64),
    Fixed32(u32),
    Bytes(&'a [u8]),
}

fn take<'a>(buf: &mut &'a [u8], n: usize, what: &'static str) -> Result<&'a [u8]> {
    if buf.len() < n {
        return Err(StreamError::Truncated(what));
    }
    let (head, tail) = buf.split_at(n);
    *buf = tail;
    Ok(head)
}

fn read_raw<'a>(buf: &mut &'a [u8], wire: WireType) -> Result<Raw<'a>> {
    match wire {
        WireType::Varint => Ok(Raw::Varint(varint::read_varint(buf)?)),
        WireType::Fixed64 => {
            let bytes = take(buf, 8, "fixed64 field")?;
            let mut le = [0u8; 8];
            le.copy_from_slice(bytes);
            Ok(Raw::Fixed64(u64::from_le_bytes(le)))
        }
        WireType::Fixed32 => {
            let bytes = take(buf, 4, "fixed32 field")?;
            let mut le = [0u8; 4];
            le.copy_from_slice(bytes);
            Ok(Raw::Fixed32(u32::from_le_bytes(le)))
        }
        WireType::LengthDelimited => {
            let len = varint::read_varint(buf)?;
            let len = usize::try_from(len)
                .map_err(|_| StreamError::Corrupt(format!("field length {len} out of range")))?;
            Ok(Raw::Bytes(take(buf, len, "length-delimited field")?))
        }
        WireType::StartGroup | WireType::EndGroup => Err(StreamError::UnsupportedWireConstruct(
            "deprecated group encoding".into(),
        )),
    }
}

pub(super) fn merge_record(
    record: &mut GenericRecord,
    bytes: &[u8],
    registry: &Registry,
    depth: u32,
) -> Result<()> {
    if depth > RECURSION_LIMIT {
        return Err(StreamError::Corrupt(format!(
            "{}: messages nested deeper than {RECURSION_LIMIT}",
            record.type_name()
        )));
    }
    let descriptor = Arc::clone(&record.descriptor);
    let mut buf = bytes;
    while !buf.is_empty() {
        let key = varint::read_varint(&mut buf)?;
        let wire = WireType::from_key(key)?;
        let number = u32::try_from(key >> 3)
            .ok()
            .filter(|&n| n != 0)
            .ok_or_else(|| StreamError::Corrupt(format!("invalid field number in key {key:#x}")))?;
        let raw = read_raw(&mut buf, wire)?;
        let Some(field) = descriptor.field(number) else {
            tracing::trace!(type_name = descriptor.name(), number, "skipping unknown field");
            continue;
        };
        apply(record, field, wire, raw, registry, depth)?;
    }
    Ok(())
}

fn apply(
    record: &mut GenericRecord,
    field: &FieldSchema,
    wire: WireType,
    raw: Raw<'_>,
    registry: &Registry,
    depth: u32,
) -> Result<()> {
    let kind = field.kind();
    let expected = match kind {
        FieldKind::Unspecified => {
            return Err(StreamError::Corrupt(format!(
                "{}.{}: field kind is not specified",
                record.type_name(),
                field.name
            )));
        }
        FieldKind::Group => {
            return Err(StreamError::UnsupportedWireConstruct(format!(
                "{}.{}: group fields",
                record.type_name(),
                field.name
            )));
        }
        other => WireType::of(other),
    };

    if field.repeated {
        // Packed blob for a scalar repeated field: the wire type says
        // length-delimited while the kind says otherwise.
        if let (Raw::Bytes(blob), true) = (raw, kind.is_packable()) {
            let element_wire = expected.unwrap_or(WireType::Varint);
            let mut blob = blob;
            let mut items = Vec::new();
            while !blob.is_empty() {
                let raw = read_raw(&mut blob, element_wire)?;
                items.push(convert(record, field, raw, registry, depth)?);
            }
            push_items(record, field, items);
            return Ok(());
        }
    }

    if Some(wire) != expected {
        return Err(StreamError::Corrupt(format!(
            "{}.{}: wire type {wire:?} does not match {kind:?}",
            record.type_name(),
            field.name
        )));
    }

    if field.repeated {
        let value = convert(record, field, raw, registry, depth)?;
        push_items(record, field, vec![value]);
        return Ok(());
    }

    // A singular message seen twice merges into the earlier value.
    if let (FieldKind::Message, Raw::Bytes(bytes)) = (kind, raw) {
        if let Some(Value::Message(existing)) = record.fields.get_mut(&field.name) {
            return merge_record(existing, bytes, registry, depth + 1);
        }
    }

    let value = convert(record, field, raw, registry, depth)?;
    record.fields.insert(field.name.clone(), value);
    Ok(())
}

fn push_items(record: &mut GenericRecord, field: &FieldSchema, items: Vec<Value>) {
    let slot = record
        .fields
        .entry(field.name.clone())
        .or_insert_with(|| Value::List(Vec::new()));
    match slot {
        Value::List(list) => list.extend(items),
        other => *other = Value::List(items),
    }
}

fn convert(
    record: &GenericRecord,
    field: &FieldSchema,
    raw: Raw<'_>,
    registry: &Registry,
    depth: u32,
) -> Result<Value> {
    let kind = field.kind();
    let value = match (kind, raw) {
        (FieldKind::Int32, Raw::Varint(v)) => Value::I32(v as i32),
        (FieldKind::Int64, Raw::Varint(v)) => Value::I64(v as i64),
        (FieldKind::Uint32, Raw::Varint(v)) => Value::U32(v as u32),
        (FieldKind::Uint64, Raw::Varint(v)) => Value::U64(v),
        (FieldKind::Sint32, Raw::Varint(v)) => Value::I32(varint::zigzag_decode32(v as u32)),
        (FieldKind::Sint64, Raw::Varint(v)) => Value::I64(varint::zigzag_decode(v)),
        (FieldKind::Bool, Raw::Varint(v)) => Value::Bool(v != 0),
        (FieldKind::Enum, Raw::Varint(v)) => Value::Enum(v as i32),
        (FieldKind::Fixed64, Raw::Fixed64(v)) => Value::U64(v),
        (FieldKind::Sfixed64, Raw::Fixed64(v)) => Value::I64(v as i64),
        (FieldKind::Double, Raw::Fixed64(v)) => Value::F64(f64::from_bits(v)),
        (FieldKind::Fixed32, Raw::Fixed32(v)) => Value::U32(v),
        (FieldKind::Sfixed32, Raw::Fixed32(v)) => Value::I32(v as i32),
        (FieldKind::Float, Raw::Fixed32(v)) => Value::F32(f32::from_bits(v)),
        (FieldKind::String, Raw::Bytes(b)) => {
            let text = std::str::from_utf8(b).map_err(|e| {
                StreamError::Corrupt(format!("{}.{}: invalid UTF-8: {e}", record.type_name(), field.name))
            })?;
            Value::String(text.to_owned())
        }
        (FieldKind::Bytes, Raw::Bytes(b)) => Value::Bytes(b.to_vec()),
        (FieldKind::Message, Raw::Bytes(b)) => {
            let nested = registry.descriptor(&field.type_name)?;
            let mut message = GenericRecord::new(nested);
            merge_record(&mut message, b, registry, depth + 1)?;
            Value::Message(message)
        }
        (kind, raw) => {
            return Err(StreamError::Corrupt(format!(
                "{}.{}: {raw:?} does not decode as {kind:?}",
                record.type_name(),
                field.name
            )));
        }
    };
    Ok(value)
}
