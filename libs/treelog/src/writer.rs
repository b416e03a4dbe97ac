use std::collections::HashSet;
use std::io::Write;

use prost::Message;
use prost_reflect::{MessageDescriptor, ReflectMessage};

use crate::chunk::{self, ChunkKind, RecordHeader, RecordId, TypeIndex, TypeRef};
use crate::error::{Result, StreamError};
use crate::header;
use crate::options::WriterOptions;
use crate::registry::Registry;
use crate::schema::{self, Schema};

/// Appends records to a treelog stream.
///
/// Every record, group or leaf, takes the next id starting from 0. A type is
/// declared in the stream the first time a record of that type is written,
/// after every message type it references.
///
/// Each chunk is handed to the inner writer with a single `write_all`; wrap
/// it in a [`BufWriter`](std::io::BufWriter) for throughput.
pub struct Writer<W: Write> {
    inner: W,
    registry: Registry,
    next_id: RecordId,
    open_groups: HashSet<RecordId>,
    payload: Vec<u8>,
    frame: Vec<u8>,
}

impl<W: Write> Writer<W> {
    /// Write the stream header and return a writer positioned at the first
    /// chunk.
    pub fn new(inner: W) -> Result<Self> {
        Self::with_options(inner, WriterOptions::default())
    }

    pub fn with_options(mut inner: W, options: WriterOptions) -> Result<Self> {
        let mut head = Vec::new();
        header::encode_header(options.version, &mut head);
        inner.write_all(&head)?;
        tracing::debug!(version = %options.version, "stream header written");
        Ok(Self {
            inner,
            registry: Registry::new(),
            next_id: RecordId(0),
            open_groups: HashSet::new(),
            payload: Vec::new(),
            frame: Vec::new(),
        })
    }

    /// Write a leaf with no parent.
    pub fn object<M: ReflectMessage>(&mut self, message: &M) -> Result<()> {
        self.emit(message, None, false).map(|_| ())
    }

    /// Write a leaf under the open group `parent`.
    pub fn child_object<M: ReflectMessage>(&mut self, message: &M, parent: RecordId) -> Result<()> {
        self.emit(message, Some(parent), false).map(|_| ())
    }

    /// Open a group with no parent. It accepts children until
    /// [`end_group`](Self::end_group) is called with the returned id.
    pub fn begin_group<M: ReflectMessage>(&mut self, message: &M) -> Result<RecordId> {
        self.emit(message, None, true)
    }

    pub fn begin_child_group<M: ReflectMessage>(
        &mut self,
        message: &M,
        parent: RecordId,
    ) -> Result<RecordId> {
        self.emit(message, Some(parent), true)
    }

    /// Close an open group. Consumes no id.
    pub fn end_group(&mut self, group: RecordId) -> Result<()> {
        if !self.open_groups.contains(&group) {
            return Err(StreamError::GroupNotOpen(group));
        }
        self.payload.clear();
        RecordHeader::new(self.next_id, Some(group), TypeRef::End).encode(&mut self.payload);
        self.write_chunk(ChunkKind::Record)?;
        self.open_groups.remove(&group);
        tracing::trace!(%group, "group closed");
        Ok(())
    }

    /// Id the next record will get.
    pub fn next_id(&self) -> RecordId {
        self.next_id
    }

    pub fn open_groups(&self) -> usize {
        self.open_groups.len()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    /// Flush and hand back the inner writer. Fails if a group is still open.
    pub fn finish(mut self) -> Result<W> {
        if !self.open_groups.is_empty() {
            return Err(StreamError::GroupsStillOpen(self.open_groups.len()));
        }
        self.inner.flush()?;
        tracing::debug!(
            records = self.next_id.0,
            types = self.registry.len(),
            "stream finished"
        );
        Ok(self.inner)
    }

    fn emit<M: ReflectMessage>(
        &mut self,
        message: &M,
        parent: Option<RecordId>,
        group: bool,
    ) -> Result<RecordId> {
        if let Some(parent) = parent {
            self.check_parent(parent)?;
        }
        let index = self.declare(&message.descriptor())?;

        let id = self.next_id;
        let type_ref = if group {
            TypeRef::Group(index)
        } else {
            TypeRef::Leaf(index)
        };
        self.payload.clear();
        RecordHeader::new(id, parent, type_ref).encode(&mut self.payload);
        message.encode(&mut self.payload)?;
        self.write_chunk(ChunkKind::Record)?;
        tracing::trace!(%id, ?parent, %index, group, len = self.payload.len(), "record written");

        self.next_id = id.next();
        if group {
            self.open_groups.insert(id);
        }
        Ok(id)
    }

    fn check_parent(&self, parent: RecordId) -> Result<()> {
        if parent >= self.next_id {
            return Err(StreamError::ParentOutOfRange { parent, next: self.next_id });
        }
        if !self.open_groups.contains(&parent) {
            return Err(StreamError::ParentNotOpen(parent));
        }
        Ok(())
    }

    /// Index of `desc`, declaring it and the types it references if needed.
    fn declare(&mut self, desc: &MessageDescriptor) -> Result<TypeIndex> {
        if let Some(entry) = self.registry.lookup(desc.full_name()) {
            return Ok(entry.index());
        }
        let mut visiting = HashSet::new();
        self.declare_tree(desc, &mut visiting)
    }

    fn declare_tree(
        &mut self,
        desc: &MessageDescriptor,
        visiting: &mut HashSet<String>,
    ) -> Result<TypeIndex> {
        visiting.insert(desc.full_name().to_owned());
        for nested in schema::nested_messages(desc) {
            // a type on the current path is declared when the walk unwinds
            if visiting.contains(nested.full_name()) || self.registry.lookup(nested.full_name()).is_some() {
                continue;
            }
            self.declare_tree(&nested, visiting)?;
        }

        let schema = Schema::from_descriptor(desc);
        self.payload.clear();
        chunk::encode_declaration(desc.full_name(), &schema, &mut self.payload);
        self.write_chunk(ChunkKind::Declaration)?;
        let (entry, _) = self.registry.register(desc.full_name(), Some(schema))?;
        Ok(entry.index())
    }

    fn write_chunk(&mut self, kind: ChunkKind) -> Result<()> {
        self.frame.clear();
        chunk::encode_frame(kind, &self.payload, &mut self.frame);
        self.inner.write_all(&self.frame)?;
        Ok(())
    }
}
