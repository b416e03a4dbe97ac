use std::collections::HashMap;

use crate::chunk::RecordId;
use crate::error::{Result, StreamError};
use crate::instance::RecordInstance;

/// Receiver of decoded records, driven by [`Reader::run`](crate::Reader::run).
///
/// Calls arrive in stream order. Every `parent` handed back was returned by
/// `begin_group` or `begin_child_group` and has not been passed to
/// `end_group` yet.
pub trait Events {
    /// Handle the application uses to name an open group.
    type GroupId: Clone;
    type Error: std::error::Error + Send + Sync + 'static;

    fn object(&mut self, record: RecordInstance) -> Result<(), Self::Error>;

    fn child_object(
        &mut self,
        record: RecordInstance,
        parent: &Self::GroupId,
    ) -> Result<(), Self::Error>;

    fn begin_group(&mut self, record: RecordInstance) -> Result<Self::GroupId, Self::Error>;

    fn begin_child_group(
        &mut self,
        record: RecordInstance,
        parent: &Self::GroupId,
    ) -> Result<Self::GroupId, Self::Error>;

    fn end_group(&mut self, group: Self::GroupId) -> Result<(), Self::Error>;
}

/// One decoded record chunk, with raw stream ids.
#[derive(Debug)]
pub enum Event {
    Object {
        id: RecordId,
        record: RecordInstance,
    },
    ChildObject {
        id: RecordId,
        parent: RecordId,
        record: RecordInstance,
    },
    BeginGroup {
        id: RecordId,
        record: RecordInstance,
    },
    BeginChildGroup {
        id: RecordId,
        parent: RecordId,
        record: RecordInstance,
    },
    EndGroup {
        id: RecordId,
    },
}

impl Event {
    /// Record carried by the event; `None` for a group terminator.
    pub fn record(&self) -> Option<&RecordInstance> {
        match self {
            Event::Object { record, .. }
            | Event::ChildObject { record, .. }
            | Event::BeginGroup { record, .. }
            | Event::BeginChildGroup { record, .. } => Some(record),
            Event::EndGroup { .. } => None,
        }
    }
}

/// How [`Reader::run`](crate::Reader::run) ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Input ended cleanly at a chunk boundary.
    Finished,
    /// The cancellation token fired between chunks.
    Stopped,
}

/// Group handles issued by one [`Events`] implementation, keyed by stream id.
///
/// Pass the same session to every [`Reader::run`](crate::Reader::run) call on
/// a stream, so a read stopped inside a group can be resumed.
#[derive(Debug)]
pub struct Session<G> {
    handles: HashMap<RecordId, G>,
}

impl<G> Default for Session<G> {
    fn default() -> Self {
        Self { handles: HashMap::new() }
    }
}

impl<G> Session<G> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Groups begun and not yet ended.
    pub fn open_groups(&self) -> usize {
        self.handles.len()
    }

    pub fn is_open(&self, id: RecordId) -> bool {
        self.handles.contains_key(&id)
    }

    pub(crate) fn parent(&self, id: RecordId) -> Result<&G> {
        self.handles.get(&id).ok_or(StreamError::ParentNotOpen(id))
    }

    pub(crate) fn open(&mut self, id: RecordId, group: G) {
        self.handles.insert(id, group);
    }

    pub(crate) fn close(&mut self, id: RecordId) -> Result<G> {
        self.handles.remove(&id).ok_or(StreamError::GroupNotOpen(id))
    }
}
