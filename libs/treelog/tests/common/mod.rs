#![allow(dead_code)]

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::ops::Range;
use std::sync::{Arc, LazyLock};

use prost_reflect::{DescriptorPool, DynamicMessage, MessageDescriptor, ReflectMessage};
use prost_types::field_descriptor_proto::{Label, Type};
use prost_types::{
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
    FileDescriptorProto, FileDescriptorSet, MessageOptions,
};
use treelog::chunk::{self, ChunkKind};
use treelog::{
    Events, GenericRecord, ReaderOptions, RecordId, RecordInstance, StaticTypeSet, Version, Writer,
};

// ════════════════════════════════════════════════════════════════
//  Test messages
// ════════════════════════════════════════════════════════════════

#[derive(Clone, PartialEq, prost::Message)]
pub struct A {
    #[prost(int32, tag = "1")]
    pub x: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct B {
    #[prost(int64, tag = "1")]
    pub y: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Tree {
    #[prost(string, tag = "1")]
    pub label: String,
    #[prost(message, repeated, tag = "2")]
    pub children: Vec<Tree>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum Kind {
    Unknown = 0,
    Leaf = 1,
    Branch = 2,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Sample {
    #[prost(double, tag = "1")]
    pub ratio: f64,
    #[prost(float, tag = "2")]
    pub scale: f32,
    #[prost(int32, tag = "3")]
    pub signed: i32,
    #[prost(int64, tag = "4")]
    pub long: i64,
    #[prost(uint32, tag = "5")]
    pub unsigned: u32,
    #[prost(uint64, tag = "6")]
    pub ulong: u64,
    #[prost(sint32, tag = "7")]
    pub zig: i32,
    #[prost(sint64, tag = "8")]
    pub zig_long: i64,
    #[prost(fixed32, tag = "9")]
    pub fixed: u32,
    #[prost(fixed64, tag = "10")]
    pub fixed_long: u64,
    #[prost(sfixed32, tag = "11")]
    pub sfixed: i32,
    #[prost(sfixed64, tag = "12")]
    pub sfixed_long: i64,
    #[prost(bool, tag = "13")]
    pub flag: bool,
    #[prost(string, tag = "14")]
    pub text: String,
    #[prost(bytes = "vec", tag = "15")]
    pub blob: Vec<u8>,
    #[prost(message, optional, tag = "16")]
    pub nested: Option<A>,
    #[prost(sint32, repeated, tag = "17")]
    pub deltas: Vec<i32>,
    #[prost(string, repeated, tag = "18")]
    pub tags: Vec<String>,
    #[prost(message, repeated, tag = "19")]
    pub items: Vec<A>,
    #[prost(enumeration = "Kind", tag = "20")]
    pub kind: i32,
    #[prost(btree_map = "string, int32", tag = "21")]
    pub counts: BTreeMap<String, i32>,
    #[prost(double, repeated, tag = "22")]
    pub weights: Vec<f64>,
}

impl Sample {
    /// Every field set, negative values where the type allows them.
    pub fn full() -> Self {
        Sample {
            ratio: -2.5,
            scale: 0.125,
            signed: -7,
            long: -1 << 40,
            unsigned: 4_000_000_000,
            ulong: u64::MAX,
            zig: -5,
            zig_long: i64::MIN,
            fixed: 0xdead_beef,
            fixed_long: 1 << 63,
            sfixed: -3,
            sfixed_long: -9,
            flag: true,
            text: "naïve tree".into(),
            blob: vec![0, 1, 2, 255],
            nested: Some(A { x: -1 }),
            deltas: vec![-1, 0, 1, i32::MIN],
            tags: vec!["a".into(), String::new(), "c".into()],
            items: vec![A { x: 1 }, A { x: 2 }],
            kind: Kind::Branch as i32,
            counts: BTreeMap::from([("one".into(), 1), ("minus".into(), -1)]),
            weights: vec![0.5, -0.0, 1e300],
        }
    }
}

macro_rules! reflect {
    ($($ty:ident => $name:literal),* $(,)?) => {$(
        impl ReflectMessage for $ty {
            fn descriptor(&self) -> MessageDescriptor {
                POOL.get_message_by_name($name)
                    .expect(concat!($name, " is in the test pool"))
            }
        }
    )*};
}

reflect! {
    A => "test.A",
    B => "test.B",
    Tree => "test.Tree",
    Sample => "test.Sample",
}

// ════════════════════════════════════════════════════════════════
//  Descriptor pool
// ════════════════════════════════════════════════════════════════

pub static POOL: LazyLock<DescriptorPool> = LazyLock::new(|| {
    DescriptorPool::from_file_descriptor_set(FileDescriptorSet { file: vec![test_file()] })
        .expect("test descriptors are valid")
});

fn field(name: &str, number: i32, ty: Type) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.into()),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(ty as i32),
        ..Default::default()
    }
}

fn typed(name: &str, number: i32, ty: Type, type_name: &str) -> FieldDescriptorProto {
    FieldDescriptorProto {
        type_name: Some(type_name.into()),
        ..field(name, number, ty)
    }
}

fn repeated(mut field: FieldDescriptorProto) -> FieldDescriptorProto {
    field.label = Some(Label::Repeated as i32);
    field
}

fn message(name: &str, fields: Vec<FieldDescriptorProto>) -> DescriptorProto {
    DescriptorProto {
        name: Some(name.into()),
        field: fields,
        ..Default::default()
    }
}

fn test_file() -> FileDescriptorProto {
    let counts_entry = DescriptorProto {
        options: Some(MessageOptions {
            map_entry: Some(true),
            ..Default::default()
        }),
        ..message(
            "CountsEntry",
            vec![field("key", 1, Type::String), field("value", 2, Type::Int32)],
        )
    };
    let sample = DescriptorProto {
        nested_type: vec![counts_entry],
        ..message(
            "Sample",
            vec![
                field("ratio", 1, Type::Double),
                field("scale", 2, Type::Float),
                field("signed", 3, Type::Int32),
                field("long", 4, Type::Int64),
                field("unsigned", 5, Type::Uint32),
                field("ulong", 6, Type::Uint64),
                field("zig", 7, Type::Sint32),
                field("zig_long", 8, Type::Sint64),
                field("fixed", 9, Type::Fixed32),
                field("fixed_long", 10, Type::Fixed64),
                field("sfixed", 11, Type::Sfixed32),
                field("sfixed_long", 12, Type::Sfixed64),
                field("flag", 13, Type::Bool),
                field("text", 14, Type::String),
                field("blob", 15, Type::Bytes),
                typed("nested", 16, Type::Message, ".test.A"),
                repeated(field("deltas", 17, Type::Sint32)),
                repeated(field("tags", 18, Type::String)),
                repeated(typed("items", 19, Type::Message, ".test.A")),
                typed("kind", 20, Type::Enum, ".test.Kind"),
                repeated(typed("counts", 21, Type::Message, ".test.Sample.CountsEntry")),
                repeated(field("weights", 22, Type::Double)),
            ],
        )
    };
    let kind = EnumDescriptorProto {
        name: Some("Kind".into()),
        value: [("UNKNOWN", 0), ("LEAF", 1), ("BRANCH", 2)]
            .into_iter()
            .map(|(name, number)| EnumValueDescriptorProto {
                name: Some(name.into()),
                number: Some(number),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    };
    FileDescriptorProto {
        name: Some("test.proto".into()),
        package: Some("test".into()),
        syntax: Some("proto3".into()),
        message_type: vec![
            message("A", vec![field("x", 1, Type::Int32)]),
            message("B", vec![field("y", 1, Type::Int64)]),
            message(
                "Tree",
                vec![
                    field("label", 1, Type::String),
                    repeated(typed("children", 2, Type::Message, ".test.Tree")),
                ],
            ),
            sample,
        ],
        enum_type: vec![kind],
        ..Default::default()
    }
}

pub fn static_types() -> Arc<StaticTypeSet> {
    Arc::new(
        StaticTypeSet::default()
            .with::<A>()
            .with::<B>()
            .with::<Tree>()
            .with::<Sample>(),
    )
}

pub fn forced_dynamic() -> ReaderOptions {
    ReaderOptions {
        forced_dynamic: true,
        ..Default::default()
    }
}

// ════════════════════════════════════════════════════════════════
//  Stream helpers
// ════════════════════════════════════════════════════════════════

pub fn header_len() -> usize {
    let mut out = Vec::new();
    treelog::header::encode_header(Version::CURRENT, &mut out);
    out.len()
}

/// Kind and byte range (length prefix included) of every chunk after the
/// header.
pub fn frames(bytes: &[u8]) -> Vec<(ChunkKind, Range<usize>)> {
    let mut pos = header_len();
    let mut out = Vec::new();
    while pos < bytes.len() {
        let frame = chunk::peek_header(&bytes[pos..])
            .expect("valid length prefix")
            .expect("complete length prefix");
        let end = pos + frame.total_len() as usize;
        out.push((frame.kind, pos..end));
        pos = end;
    }
    out
}

/// Type names declared in the stream, in stream order.
pub fn declared_names(bytes: &[u8]) -> Vec<String> {
    frames(bytes)
        .into_iter()
        .filter(|(kind, _)| *kind == ChunkKind::Declaration)
        .map(|(_, range)| {
            let frame = chunk::peek_header(&bytes[range.clone()]).unwrap().unwrap();
            let payload = &bytes[range.start + frame.header_len..range.end];
            chunk::decode_declaration(payload).unwrap().0
        })
        .collect()
}

pub fn new_writer() -> Writer<Vec<u8>> {
    Writer::new(Vec::new()).expect("header write to a Vec")
}

// ════════════════════════════════════════════════════════════════
//  Recorder
// ════════════════════════════════════════════════════════════════

/// A decoded record, unwrapped to its concrete type.
#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    A(A),
    B(B),
    Tree(Tree),
    Sample(Sample),
    Generic(GenericRecord),
}

impl Msg {
    pub fn from_record(record: RecordInstance) -> Self {
        if let Some(m) = record.downcast_ref::<A>() {
            return Msg::A(m.clone());
        }
        if let Some(m) = record.downcast_ref::<B>() {
            return Msg::B(m.clone());
        }
        if let Some(m) = record.downcast_ref::<Tree>() {
            return Msg::Tree(m.clone());
        }
        if let Some(m) = record.downcast_ref::<Sample>() {
            return Msg::Sample(m.clone());
        }
        match record {
            RecordInstance::Generic(record) => Msg::Generic(record),
            RecordInstance::Static(other) => panic!("unexpected static type {}", other.type_name()),
        }
    }

    pub fn to_dynamic(&self) -> DynamicMessage {
        match self {
            Msg::A(m) => m.transcode_to_dynamic(),
            Msg::B(m) => m.transcode_to_dynamic(),
            Msg::Tree(m) => m.transcode_to_dynamic(),
            Msg::Sample(m) => m.transcode_to_dynamic(),
            Msg::Generic(g) => panic!("generic {} cannot be written", g.type_name()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Object(Msg),
    ChildObject(Msg, u64),
    /// Record and the handle returned for it.
    BeginGroup(Msg, u64),
    BeginChildGroup(Msg, u64, u64),
    EndGroup(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Handles {
    /// Handles are stream record ids.
    ByRecord,
    /// Handles count groups from 0.
    ByGroup,
}

#[derive(Debug)]
pub struct Recorder {
    pub calls: Vec<Call>,
    handles: Handles,
    records: u64,
    groups: u64,
}

impl Recorder {
    pub fn by_record() -> Self {
        Self::with(Handles::ByRecord)
    }

    pub fn by_group() -> Self {
        Self::with(Handles::ByGroup)
    }

    fn with(handles: Handles) -> Self {
        Self {
            calls: Vec::new(),
            handles,
            records: 0,
            groups: 0,
        }
    }

    fn open(&mut self) -> u64 {
        let handle = match self.handles {
            Handles::ByRecord => self.records,
            Handles::ByGroup => self.groups,
        };
        self.records += 1;
        self.groups += 1;
        handle
    }
}

impl Events for Recorder {
    type GroupId = u64;
    type Error = Infallible;

    fn object(&mut self, record: RecordInstance) -> Result<(), Infallible> {
        self.records += 1;
        self.calls.push(Call::Object(Msg::from_record(record)));
        Ok(())
    }

    fn child_object(&mut self, record: RecordInstance, parent: &u64) -> Result<(), Infallible> {
        self.records += 1;
        self.calls.push(Call::ChildObject(Msg::from_record(record), *parent));
        Ok(())
    }

    fn begin_group(&mut self, record: RecordInstance) -> Result<u64, Infallible> {
        let handle = self.open();
        self.calls.push(Call::BeginGroup(Msg::from_record(record), handle));
        Ok(handle)
    }

    fn begin_child_group(&mut self, record: RecordInstance, parent: &u64) -> Result<u64, Infallible> {
        let handle = self.open();
        self.calls
            .push(Call::BeginChildGroup(Msg::from_record(record), *parent, handle));
        Ok(handle)
    }

    fn end_group(&mut self, group: u64) -> Result<(), Infallible> {
        self.calls.push(Call::EndGroup(group));
        Ok(())
    }
}

/// Ids the writer handed out, for building expected call lists.
pub fn id(record: RecordId) -> u64 {
    record.0
}
