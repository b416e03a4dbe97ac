use crate::error::{Result, StreamError};
use crate::schema::{FieldKind, FieldSchema};
use crate::varint;

use super::decode::WireType;
use super::{GenericRecord, Value};

pub(super) fn encode_record(record: &GenericRecord, out: &mut Vec<u8>) -> Result<()> {
    for field in record.descriptor.fields() {
        let Some(value) = record.fields.get(&field.name) else {
            continue;
        };
        match value {
            Value::List(items) if field.repeated => encode_repeated(record, field, items, out)?,
            value if !field.repeated => encode_field(record, field, value, out)?,
            _ => return Err(mismatch(record, field)),
        }
    }
    Ok(())
}

fn encode_repeated(
    record: &GenericRecord,
    field: &FieldSchema,
    items: &[Value],
    out: &mut Vec<u8>,
) -> Result<()> {
    if items.is_empty() {
        return Ok(());
    }
    if field.packed && field.kind().is_packable() {
        let mut blob = Vec::new();
        for item in items {
            encode_scalar(record, field, item, &mut blob)?;
        }
        write_key(field.number, WireType::LengthDelimited, out);
        varint::encode_varint(blob.len() as u64, out);
        out.extend_from_slice(&blob);
        return Ok(());
    }
    for item in items {
        encode_field(record, field, item, out)?;
    }
    Ok(())
}

fn encode_field(
    record: &GenericRecord,
    field: &FieldSchema,
    value: &Value,
    out: &mut Vec<u8>,
) -> Result<()> {
    let wire = WireType::of(field.kind()).ok_or_else(|| mismatch(record, field))?;
    write_key(field.number, wire, out);
    match (field.kind(), value) {
        (FieldKind::String, Value::String(s)) => {
            varint::encode_varint(s.len() as u64, out);
            out.extend_from_slice(s.as_bytes());
        }
        (FieldKind::Bytes, Value::Bytes(b)) => {
            varint::encode_varint(b.len() as u64, out);
            out.extend_from_slice(b);
        }
        (FieldKind::Message, Value::Message(nested)) => {
            let mut body = Vec::new();
            encode_record(nested, &mut body)?;
            varint::encode_varint(body.len() as u64, out);
            out.extend_from_slice(&body);
        }
        _ => encode_scalar(record, field, value, out)?,
    }
    Ok(())
}

/// Value bytes of a scalar, without a key.
fn encode_scalar(
    record: &GenericRecord,
    field: &FieldSchema,
    value: &Value,
    out: &mut Vec<u8>,
) -> Result<()> {
    match (field.kind(), value) {
        (FieldKind::Bool, Value::Bool(b)) => varint::encode_varint(u64::from(*b), out),
        // negative int32 and enum values are sign-extended to ten bytes
        (FieldKind::Int32, Value::I32(v)) | (FieldKind::Enum, Value::Enum(v)) => {
            varint::encode_varint(i64::from(*v) as u64, out)
        }
        (FieldKind::Int64, Value::I64(v)) => varint::encode_varint(*v as u64, out),
        (FieldKind::Uint32, Value::U32(v)) => varint::encode_varint(u64::from(*v), out),
        (FieldKind::Uint64, Value::U64(v)) => varint::encode_varint(*v, out),
        (FieldKind::Sint32, Value::I32(v)) => {
            varint::encode_varint(u64::from(varint::zigzag_encode32(*v)), out)
        }
        (FieldKind::Sint64, Value::I64(v)) => varint::encode_varint(varint::zigzag_encode(*v), out),
        (FieldKind::Fixed32, Value::U32(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (FieldKind::Sfixed32, Value::I32(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (FieldKind::Float, Value::F32(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (FieldKind::Fixed64, Value::U64(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (FieldKind::Sfixed64, Value::I64(v)) => out.extend_from_slice(&v.to_le_bytes()),
        (FieldKind::Double, Value::F64(v)) => out.extend_from_slice(&v.to_le_bytes()),
        _ => return Err(mismatch(record, field)),
    }
    Ok(())
}

fn write_key(number: u32, wire: WireType, out: &mut Vec<u8>) {
    varint::encode_varint((u64::from(number) << 3) | wire as u64, out);
}

fn mismatch(record: &GenericRecord, field: &FieldSchema) -> StreamError {
    StreamError::Descriptor(format!(
        "{}.{}: stored value does not fit a {}{:?} field",
        record.type_name(),
        field.name,
        if field.repeated { "repeated " } else { "" },
        field.kind()
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::schema::{Schema, TypeDescriptor};

    fn descriptor() -> Arc<TypeDescriptor> {
        Arc::new(TypeDescriptor::new(
            "test.Mixed",
            Schema {
                fields: vec![
                    FieldSchema::scalar("a", 1, FieldKind::Int32),
                    FieldSchema::scalar("b", 2, FieldKind::Sint64),
                    FieldSchema::scalar("c", 3, FieldKind::Uint32).into_repeated(true),
                    FieldSchema::scalar("d", 4, FieldKind::String).into_repeated(false),
                ],
            },
        ))
    }

    #[test]
    fn schema_order_and_packing() {
        let mut record = GenericRecord::new(descriptor());
        record
            .set("d", Value::List(vec![Value::String("x".into()), Value::String("".into())]))
            .unwrap();
        record.set("c", Value::List(vec![Value::U32(1), Value::U32(300)])).unwrap();
        record.set("b", Value::I64(-1)).unwrap();
        record.set("a", Value::I32(-1)).unwrap();

        let bytes = record.encode_to_vec().unwrap();
        let expected = [
            0x08, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01, // a = -1
            0x10, 0x01, // b = -1 zigzag
            0x1a, 0x03, 0x01, 0xac, 0x02, // c packed [1, 300]
            0x22, 0x01, b'x', 0x22, 0x00, // d = ["x", ""]
        ];
        assert_eq!(bytes, expected);
    }

    #[test]
    fn empty_list_writes_nothing() {
        let mut record = GenericRecord::new(descriptor());
        record.set("c", Value::List(vec![])).unwrap();
        assert!(record.encode_to_vec().unwrap().is_empty());
    }
}
