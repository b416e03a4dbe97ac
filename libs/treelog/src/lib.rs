//! Streaming container for tree-shaped protobuf records.
//!
//! A stream is a header followed by length-prefixed chunks. Each chunk either
//! declares a message type (name plus schema, once per type, before its first
//! use) or carries one record: a leaf, a group that later records may attach
//! to, or the terminator of a group. Readers need no schema file; types with
//! no static implementation decode into [`GenericRecord`]s.
//!
//! ```ignore
//! let mut writer = Writer::new(file)?;
//! let run = writer.begin_group(&proto::Run { name: "nightly".into() })?;
//! writer.child_object(&proto::Sample { value: 3 }, run)?;
//! writer.end_group(run)?;
//! writer.finish()?;
//!
//! let types = StaticTypeSet::default().with::<proto::Run>().with::<proto::Sample>();
//! let mut reader = Reader::with_types(file, Arc::new(types))?;
//! reader.run(&mut my_events, &mut Session::new(), &CancellationToken::new())?;
//! ```

pub mod chunk;
pub mod error;
pub mod events;
pub mod generic;
pub mod header;
pub mod instance;
pub mod options;
pub mod reader;
pub mod registry;
pub mod schema;
pub mod varint;
pub mod writer;

pub use chunk::{RecordId, TypeIndex};
pub use error::{ErrorKind, Result, StreamError};
pub use events::{Event, Events, ReadOutcome, Session};
pub use generic::{GenericRecord, Value};
pub use header::{MAGIC, MAX_VERSION, MIN_VERSION, Version};
pub use instance::{RecordInstance, StaticMessage};
pub use options::{ReaderOptions, WriterOptions};
pub use reader::Reader;
pub use registry::{Registry, StaticTypeSet, StaticTypes, TypeEntry};
pub use schema::{FieldKind, FieldSchema, Schema, TypeDescriptor};
pub use writer::Writer;

pub use tokio_util::sync::CancellationToken;
