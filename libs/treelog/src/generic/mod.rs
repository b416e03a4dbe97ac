//! Schema-driven records for types with no static implementation.
//!
//! A [`GenericRecord`] pairs a [`TypeDescriptor`] with a name → [`Value`]
//! map. Only fields present on the wire are stored, in the order they were
//! first seen. Nested messages are generic records too, resolved by type name
//! through the [`Registry`].

mod decode;
mod encode;
mod json;

use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{Result, StreamError};
use crate::registry::Registry;
use crate::schema::{FieldKind, FieldSchema, TypeDescriptor};

/// Generic decoding of a message field.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    /// Enum number; names are not carried by the schema.
    Enum(i32),
    String(String),
    Bytes(Vec<u8>),
    Message(GenericRecord),
    /// Repeated field, in wire order.
    List(Vec<Value>),
}

impl Value {
    /// Whether this value can be stored in a singular field of `kind`.
    pub fn fits(&self, kind: FieldKind) -> bool {
        matches!(
            (self, kind),
            (Value::Bool(_), FieldKind::Bool)
                | (Value::I32(_), FieldKind::Int32 | FieldKind::Sint32 | FieldKind::Sfixed32)
                | (Value::I64(_), FieldKind::Int64 | FieldKind::Sint64 | FieldKind::Sfixed64)
                | (Value::U32(_), FieldKind::Uint32 | FieldKind::Fixed32)
                | (Value::U64(_), FieldKind::Uint64 | FieldKind::Fixed64)
                | (Value::F32(_), FieldKind::Float)
                | (Value::F64(_), FieldKind::Double)
                | (Value::Enum(_), FieldKind::Enum)
                | (Value::String(_), FieldKind::String)
                | (Value::Bytes(_), FieldKind::Bytes)
                | (Value::Message(_), FieldKind::Message)
        )
    }

    fn fits_field(&self, field: &FieldSchema) -> bool {
        match (self, field.repeated) {
            (Value::List(items), true) => items.iter().all(|v| v.fits(field.kind())),
            (_, true) => false,
            (value, false) => value.fits(field.kind()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenericRecord {
    descriptor: Arc<TypeDescriptor>,
    fields: IndexMap<String, Value>,
}

impl GenericRecord {
    pub fn new(descriptor: Arc<TypeDescriptor>) -> Self {
        Self { descriptor, fields: IndexMap::new() }
    }

    pub fn descriptor(&self) -> &Arc<TypeDescriptor> {
        &self.descriptor
    }

    pub fn type_name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Set a field, checking the value against the schema. Returns the
    /// previous value.
    pub fn set(&mut self, name: &str, value: Value) -> Result<Option<Value>> {
        let field = self.descriptor.field_by_name(name).ok_or_else(|| {
            StreamError::Descriptor(format!("{} has no field '{name}'", self.type_name()))
        })?;
        if !value.fits_field(field) {
            return Err(StreamError::Descriptor(format!(
                "{}.{name}: value does not fit a {}{:?} field",
                self.type_name(),
                if field.repeated { "repeated " } else { "" },
                field.kind(),
            )));
        }
        Ok(self.fields.insert(name.to_owned(), value))
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.shift_remove(name)
    }

    /// Decode `bytes` into this record, merging with what is already set.
    pub fn merge(&mut self, bytes: &[u8], registry: &Registry) -> Result<()> {
        decode::merge_record(self, bytes, registry, 0)
    }

    /// Re-encode in the embedded message encoding, fields in schema order.
    pub fn encode_to_vec(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        encode::encode_record(self, &mut out)?;
        Ok(out)
    }
}

/// Structural equality: same type name and same field values, regardless of
/// the order fields were seen in.
impl PartialEq for GenericRecord {
    fn eq(&self, other: &Self) -> bool {
        self.type_name() == other.type_name() && self.fields == other.fields
    }
}
