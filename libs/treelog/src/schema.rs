use std::collections::HashMap;

use prost_reflect::{Kind, MessageDescriptor};

/// Value of `FieldDescriptorProto.type` for deprecated proto2 groups.
const PROTO_TYPE_GROUP: i32 = 10;

// ════════════════════════════════════════════════════════════════
//  Wire schema
// ════════════════════════════════════════════════════════════════

/// Semantic type of a field. Numbering follows `descriptor.proto`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum FieldKind {
    Unspecified = 0,
    Double = 1,
    Float = 2,
    Int64 = 3,
    Uint64 = 4,
    Int32 = 5,
    Fixed64 = 6,
    Fixed32 = 7,
    Bool = 8,
    String = 9,
    /// Deprecated proto2 group. Representable so that it can be rejected.
    Group = 10,
    Message = 11,
    Bytes = 12,
    Uint32 = 13,
    Enum = 14,
    Sfixed32 = 15,
    Sfixed64 = 16,
    Sint32 = 17,
    Sint64 = 18,
}

impl FieldKind {
    /// Kinds whose repeated form may be packed into one length-delimited blob.
    pub fn is_packable(self) -> bool {
        !matches!(
            self,
            FieldKind::Unspecified
                | FieldKind::String
                | FieldKind::Bytes
                | FieldKind::Message
                | FieldKind::Group
        )
    }
}

/// One field of a message type.
#[derive(Clone, PartialEq, prost::Message)]
pub struct FieldSchema {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(uint32, tag = "2")]
    pub number: u32,
    #[prost(enumeration = "FieldKind", tag = "3")]
    pub kind: i32,
    #[prost(bool, tag = "4")]
    pub repeated: bool,
    #[prost(bool, tag = "5")]
    pub packed: bool,
    /// Fully-qualified nested message or enum type, empty for scalars.
    #[prost(string, tag = "6")]
    pub type_name: String,
}

impl FieldSchema {
    pub fn scalar(name: impl Into<String>, number: u32, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            number,
            kind: kind as i32,
            ..Default::default()
        }
    }

    pub fn message(name: impl Into<String>, number: u32, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            number,
            kind: FieldKind::Message as i32,
            type_name: type_name.into(),
            ..Default::default()
        }
    }

    /// Turn the field into a repeated one, packed when the kind allows it.
    pub fn into_repeated(mut self, packed: bool) -> Self {
        self.repeated = true;
        self.packed = packed && self.kind().is_packable();
        self
    }
}

/// Language-neutral description of a record type, carried inline in the
/// stream by a type declaration chunk.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Schema {
    #[prost(message, repeated, tag = "1")]
    pub fields: Vec<FieldSchema>,
}

impl Schema {
    /// Capture the schema of a statically known or reflected message type.
    pub fn from_descriptor(desc: &MessageDescriptor) -> Self {
        let fields = desc
            .fields()
            .map(|field| {
                let (kind, type_name) = if field.field_descriptor_proto().r#type == Some(PROTO_TYPE_GROUP) {
                    (FieldKind::Group, String::new())
                } else {
                    kind_of(&field.kind())
                };
                FieldSchema {
                    name: field.name().to_owned(),
                    number: field.number(),
                    kind: kind as i32,
                    repeated: field.is_list() || field.is_map(),
                    packed: field.is_packed(),
                    type_name,
                }
            })
            .collect();
        Schema { fields }
    }
}

fn kind_of(kind: &Kind) -> (FieldKind, String) {
    let scalar = |k| (k, String::new());
    match kind {
        Kind::Double => scalar(FieldKind::Double),
        Kind::Float => scalar(FieldKind::Float),
        Kind::Int32 => scalar(FieldKind::Int32),
        Kind::Int64 => scalar(FieldKind::Int64),
        Kind::Uint32 => scalar(FieldKind::Uint32),
        Kind::Uint64 => scalar(FieldKind::Uint64),
        Kind::Sint32 => scalar(FieldKind::Sint32),
        Kind::Sint64 => scalar(FieldKind::Sint64),
        Kind::Fixed32 => scalar(FieldKind::Fixed32),
        Kind::Fixed64 => scalar(FieldKind::Fixed64),
        Kind::Sfixed32 => scalar(FieldKind::Sfixed32),
        Kind::Sfixed64 => scalar(FieldKind::Sfixed64),
        Kind::Bool => scalar(FieldKind::Bool),
        Kind::String => scalar(FieldKind::String),
        Kind::Bytes => scalar(FieldKind::Bytes),
        Kind::Message(m) => (FieldKind::Message, m.full_name().to_owned()),
        Kind::Enum(e) => (FieldKind::Enum, e.full_name().to_owned()),
    }
}

/// Message types referenced by fields of `desc`, in field order, each once.
/// Map fields contribute their entry type.
pub fn nested_messages(desc: &MessageDescriptor) -> Vec<MessageDescriptor> {
    let mut nested: Vec<MessageDescriptor> = Vec::new();
    for field in desc.fields() {
        if let Kind::Message(m) = field.kind() {
            if !nested.iter().any(|n| n.full_name() == m.full_name()) {
                nested.push(m);
            }
        }
    }
    nested
}

// ════════════════════════════════════════════════════════════════
//  Runtime descriptor
// ════════════════════════════════════════════════════════════════

/// A captured schema bound to its type name, indexed by field number.
/// Immutable once built; shared through `Arc` by registry entries and
/// generic records.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDescriptor {
    name: String,
    schema: Schema,
    by_number: HashMap<u32, usize>,
}

impl TypeDescriptor {
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        let by_number = schema
            .fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.number, i))
            .collect();
        Self { name: name.into(), schema, by_number }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn fields(&self) -> &[FieldSchema] {
        &self.schema.fields
    }

    pub fn field(&self, number: u32) -> Option<&FieldSchema> {
        self.by_number.get(&number).map(|&i| &self.schema.fields[i])
    }

    pub fn field_by_name(&self, name: &str) -> Option<&FieldSchema> {
        self.schema.fields.iter().find(|f| f.name == name)
    }
}
