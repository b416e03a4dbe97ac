use std::collections::HashSet;
use std::io::{self, Read};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::chunk::{self, ChunkKind, FrameHeader, RecordHeader, RecordId, TypeRef};
use crate::error::{Result, StreamError};
use crate::events::{Event, Events, ReadOutcome, Session};
use crate::header::{self, MAGIC, MAX_VERSION_LEN, Version};
use crate::options::ReaderOptions;
use crate::registry::{Registry, StaticTypeSet, StaticTypes};
use crate::varint;

/// Smallest read buffer, enough for the header in one pass.
const MIN_CAPACITY: usize = 64;

/// Decodes a treelog stream one chunk at a time.
///
/// The header is checked when the reader is built. Records are then pulled
/// with [`next_event`](Self::next_event) or pushed into an [`Events`]
/// implementation with [`run`](Self::run).
pub struct Reader<R: Read> {
    inner: R,
    buf: Vec<u8>,
    /// Start of unconsumed bytes in `buf`.
    pos: usize,
    /// End of valid bytes in `buf`.
    filled: usize,
    registry: Registry,
    version: Version,
    next_id: RecordId,
    open_groups: HashSet<RecordId>,
    options: ReaderOptions,
}

impl<R: Read> Reader<R> {
    /// Reader that decodes every type generically.
    pub fn new(inner: R) -> Result<Self> {
        Self::with_options(inner, Arc::new(StaticTypeSet::default()), ReaderOptions::default())
    }

    /// Reader that builds statically typed records for the types in `types`.
    pub fn with_types(inner: R, types: Arc<dyn StaticTypes>) -> Result<Self> {
        Self::with_options(inner, types, ReaderOptions::default())
    }

    pub fn with_options(inner: R, types: Arc<dyn StaticTypes>, options: ReaderOptions) -> Result<Self> {
        let mut reader = Self {
            inner,
            buf: vec![0; options.initial_capacity.max(MIN_CAPACITY)],
            pos: 0,
            filled: 0,
            registry: Registry::with_static_types(types, options.forced_dynamic),
            version: Version::CURRENT,
            next_id: RecordId(0),
            open_groups: HashSet::new(),
            options,
        };
        reader.version = reader.read_header()?;
        tracing::debug!(
            version = %reader.version,
            forced_dynamic = reader.options.forced_dynamic,
            "stream opened"
        );
        Ok(reader)
    }

    /// Version from the stream header.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Records decoded so far, groups included; also the id of the next one.
    pub fn records_read(&self) -> u64 {
        self.next_id.0
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Decode chunks until the next record or group terminator. Type
    /// declarations are applied to the registry on the way. `Ok(None)` is a
    /// clean end of input at a chunk boundary.
    pub fn next_event(&mut self) -> Result<Option<Event>> {
        loop {
            let Some(frame) = self.next_frame()? else {
                return Ok(None);
            };
            if frame.payload_len > self.options.max_chunk_len as u64 {
                return Err(StreamError::ChunkTooLarge {
                    len: frame.payload_len,
                    max: self.options.max_chunk_len,
                });
            }
            let payload_len = frame.payload_len as usize;
            if !self.fill(frame.header_len + payload_len)? {
                return Err(StreamError::Truncated(match frame.kind {
                    ChunkKind::Declaration => "type declaration chunk",
                    ChunkKind::Record => "record chunk",
                }));
            }
            let start = self.pos + frame.header_len;
            let end = start + payload_len;
            self.pos = end;
            let payload = &self.buf[start..end];

            match frame.kind {
                ChunkKind::Declaration => {
                    let (name, schema) = chunk::decode_declaration(payload)?;
                    self.registry.register(&name, Some(schema))?;
                }
                ChunkKind::Record => {
                    let event = decode_record(
                        payload,
                        &self.registry,
                        &mut self.next_id,
                        &mut self.open_groups,
                    )?;
                    return Ok(Some(event));
                }
            }
        }
    }

    /// Feed every remaining record to `events`, in stream order.
    ///
    /// `cancel` is checked before each chunk; a cancelled read returns
    /// [`ReadOutcome::Stopped`] and can be resumed by calling `run` again
    /// with the same `events` and `session`.
    pub fn run<E: Events>(
        &mut self,
        events: &mut E,
        session: &mut Session<E::GroupId>,
        cancel: &CancellationToken,
    ) -> Result<ReadOutcome> {
        loop {
            if cancel.is_cancelled() {
                tracing::info!(
                    records = self.records_read(),
                    open_groups = session.open_groups(),
                    "read stopped"
                );
                return Ok(ReadOutcome::Stopped);
            }
            let Some(event) = self.next_event()? else {
                tracing::debug!(records = self.records_read(), "end of stream");
                return Ok(ReadOutcome::Finished);
            };
            match event {
                Event::Object { record, .. } => events.object(record).map_err(events_error)?,
                Event::ChildObject { parent, record, .. } => {
                    let parent = session.parent(parent)?;
                    events.child_object(record, parent).map_err(events_error)?;
                }
                Event::BeginGroup { id, record } => {
                    let group = events.begin_group(record).map_err(events_error)?;
                    session.open(id, group);
                }
                Event::BeginChildGroup { id, parent, record } => {
                    let parent = session.parent(parent)?;
                    let group = events.begin_child_group(record, parent).map_err(events_error)?;
                    session.open(id, group);
                }
                Event::EndGroup { id } => {
                    let group = session.close(id)?;
                    events.end_group(group).map_err(events_error)?;
                }
            }
        }
    }

    fn read_header(&mut self) -> Result<Version> {
        self.fill(MAGIC.len())?;
        header::check_magic(self.unread())?;
        self.pos += MAGIC.len();

        let Some((len, prefix)) = self.fill_varint()? else {
            return Err(StreamError::Truncated("version chunk"));
        };
        let len = usize::try_from(len)
            .ok()
            .filter(|&n| n <= MAX_VERSION_LEN)
            .ok_or_else(|| StreamError::Corrupt(format!("version chunk of {len} bytes")))?;
        if !self.fill(prefix + len)? {
            return Err(StreamError::Truncated("version chunk"));
        }
        let start = self.pos + prefix;
        let version = header::decode_version(&self.buf[start..start + len])?;
        self.pos = start + len;
        Ok(version)
    }

    /// Length prefix of the next chunk, or `None` at a clean end of input.
    fn next_frame(&mut self) -> Result<Option<FrameHeader>> {
        if self.fill_varint()?.is_none() {
            return if self.available() == 0 {
                Ok(None)
            } else {
                Err(StreamError::Truncated("chunk length"))
            };
        }
        chunk::peek_header(self.unread())?
            .map(Some)
            .ok_or(StreamError::Truncated("chunk length"))
    }

    /// Buffer a complete varint at the read position. `None` when input
    /// ends first.
    fn fill_varint(&mut self) -> Result<Option<(u64, usize)>> {
        loop {
            if let Some(decoded) = varint::decode_varint(self.unread())? {
                return Ok(Some(decoded));
            }
            let need = self.available() + 1;
            if !self.fill(need)? {
                return Ok(None);
            }
        }
    }

    /// Make at least `need` unconsumed bytes available. Returns `false` if
    /// input ends first.
    fn fill(&mut self, need: usize) -> Result<bool> {
        if self.available() >= need {
            return Ok(true);
        }
        if self.pos + need > self.buf.len() {
            self.buf.copy_within(self.pos..self.filled, 0);
            self.filled -= self.pos;
            self.pos = 0;
            if need > self.buf.len() {
                let grown = need + need / 4;
                tracing::debug!(from = self.buf.len(), to = grown, "growing read buffer");
                self.buf.resize(grown, 0);
            }
        }
        while self.available() < need {
            match self.inner.read(&mut self.buf[self.filled..]) {
                Ok(0) => return Ok(false),
                Ok(n) => self.filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(true)
    }

    fn available(&self) -> usize {
        self.filled - self.pos
    }

    fn unread(&self) -> &[u8] {
        &self.buf[self.pos..self.filled]
    }
}

/// Decode one record chunk payload, allocating its id from `next_id`.
fn decode_record(
    mut payload: &[u8],
    registry: &Registry,
    next_id: &mut RecordId,
    open_groups: &mut HashSet<RecordId>,
) -> Result<Event> {
    let current = *next_id;
    let header = RecordHeader::decode(&mut payload)?;
    let parent = header.parent(current)?;

    let (index, group) = match header.type_ref {
        TypeRef::End => {
            let id = parent.ok_or_else(|| {
                StreamError::Corrupt(format!("group terminator at {current} names no group"))
            })?;
            if !payload.is_empty() {
                return Err(StreamError::Corrupt(format!(
                    "group terminator for {id} carries {} message bytes",
                    payload.len()
                )));
            }
            if !open_groups.remove(&id) {
                return Err(StreamError::GroupNotOpen(id));
            }
            tracing::trace!(%id, "group closed");
            return Ok(Event::EndGroup { id });
        }
        TypeRef::Leaf(index) => (index, false),
        TypeRef::Group(index) => (index, true),
    };

    if let Some(parent) = parent {
        if !open_groups.contains(&parent) {
            return Err(StreamError::ParentNotOpen(parent));
        }
    }
    let entry = registry.resolve(index)?;
    let mut record = entry.instantiate();
    record.merge(payload, registry)?;
    tracing::trace!(id = %current, ?parent, type_name = entry.name(), group, "record read");

    *next_id = current.next();
    if group {
        open_groups.insert(current);
    }
    let id = current;
    Ok(match (parent, group) {
        (None, false) => Event::Object { id, record },
        (None, true) => Event::BeginGroup { id, record },
        (Some(parent), false) => Event::ChildObject { id, parent, record },
        (Some(parent), true) => Event::BeginChildGroup { id, parent, record },
    })
}

fn events_error<E: std::error::Error + Send + Sync + 'static>(e: E) -> StreamError {
    StreamError::Events(Box::new(e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::Writer;

    fn msg(seconds: i64) -> prost_types::Duration {
        prost_types::Duration { seconds, nanos: 0 }
    }

    fn sample_stream() -> Vec<u8> {
        let mut w = Writer::new(Vec::new()).unwrap();
        w.object(&msg(1)).unwrap();
        let g = w.begin_group(&msg(2)).unwrap();
        w.child_object(&msg(3), g).unwrap();
        w.end_group(g).unwrap();
        w.finish().unwrap()
    }

    #[test]
    fn pull_events() {
        let bytes = sample_stream();
        let mut reader = Reader::new(bytes.as_slice()).unwrap();
        assert_eq!(reader.version(), Version::CURRENT);

        let mut ids = Vec::new();
        while let Some(event) = reader.next_event().unwrap() {
            ids.push(match event {
                Event::Object { id, .. } => ("object", id, None),
                Event::BeginGroup { id, .. } => ("begin", id, None),
                Event::ChildObject { id, parent, .. } => ("child", id, Some(parent)),
                Event::BeginChildGroup { id, parent, .. } => ("begin_child", id, Some(parent)),
                Event::EndGroup { id } => ("end", id, None),
            });
        }
        assert_eq!(
            ids,
            vec![
                ("object", RecordId(0), None),
                ("begin", RecordId(1), None),
                ("child", RecordId(2), Some(RecordId(1))),
                ("end", RecordId(1), None),
            ]
        );
        assert_eq!(reader.records_read(), 3);
        assert_eq!(reader.registry().len(), 1);
        assert!(reader.next_event().unwrap().is_none());
    }

    #[test]
    fn generic_without_static_types() {
        let bytes = sample_stream();
        let mut reader = Reader::new(bytes.as_slice()).unwrap();
        let Some(Event::Object { record, .. }) = reader.next_event().unwrap() else {
            panic!("expected an object");
        };
        let record = record.into_generic().unwrap();
        assert_eq!(record.type_name(), "google.protobuf.Duration");
        assert_eq!(record.get("seconds"), Some(&crate::generic::Value::I64(1)));
    }

    #[test]
    fn buffer_grows_for_large_chunk() {
        let mut w = Writer::new(Vec::new()).unwrap();
        w.object(&prost_types::Value {
            kind: Some(prost_types::value::Kind::StringValue("x".repeat(1000))),
        })
        .unwrap();
        let bytes = w.finish().unwrap();
        let options = ReaderOptions { initial_capacity: 1, ..Default::default() };
        let mut reader =
            Reader::with_options(bytes.as_slice(), Arc::new(StaticTypeSet::default()), options).unwrap();
        assert!(matches!(reader.next_event().unwrap(), Some(Event::Object { .. })));
        assert!(reader.next_event().unwrap().is_none());
    }

    #[test]
    fn chunk_limit() {
        let bytes = sample_stream();
        let options = ReaderOptions { max_chunk_len: 2, ..Default::default() };
        let mut reader =
            Reader::with_options(bytes.as_slice(), Arc::new(StaticTypeSet::default()), options).unwrap();
        let err = reader.next_event().unwrap_err();
        assert!(matches!(err, StreamError::ChunkTooLarge { max: 2, .. }), "{err}");
    }

    #[test]
    fn bad_magic() {
        let err = Reader::new(&b"PK\x03\x04 not a log"[..]).err().unwrap();
        assert!(matches!(err, StreamError::IncorrectMagic), "{err}");
    }

    #[test]
    fn forward_parent_reference() {
        let mut bytes = Vec::new();
        header::encode_header(Version::CURRENT, &mut bytes);
        // record chunk with parent delta +1 and the terminator type ref
        chunk::encode_frame(ChunkKind::Record, &[0x02, 0x00], &mut bytes);
        let mut reader = Reader::new(bytes.as_slice()).unwrap();
        assert!(matches!(reader.next_event(), Err(StreamError::Corrupt(_))));
    }
}
