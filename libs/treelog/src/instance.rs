use std::any::Any;

use prost::Message;
use prost_reflect::{ReflectMessage, SerializeOptions};

use crate::error::{Result, StreamError};
use crate::generic::GenericRecord;
use crate::registry::Registry;

/// A statically typed message the registry can build and fill.
///
/// Implemented for every generated `prost` message that also implements
/// [`ReflectMessage`], so callers never implement it by hand.
pub trait StaticMessage: Any + std::fmt::Debug + Send + Sync {
    fn type_name(&self) -> String;

    fn merge_bytes(&mut self, bytes: &[u8]) -> Result<(), prost::DecodeError>;

    fn encode_bytes(&self) -> Vec<u8>;

    /// Render through `prost-reflect` with the same conventions as
    /// [`GenericRecord`]: proto field names, 64-bit integers as numbers and
    /// enums as numbers.
    fn to_json(&self) -> Result<serde_json::Value, serde_json::Error>;

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T> StaticMessage for T
where
    T: ReflectMessage + Default + 'static,
{
    fn type_name(&self) -> String {
        self.descriptor().full_name().to_owned()
    }

    fn merge_bytes(&mut self, bytes: &[u8]) -> Result<(), prost::DecodeError> {
        self.merge(bytes)
    }

    fn encode_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }

    fn to_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        self.transcode_to_dynamic()
            .serialize_with_options(serde_json::value::Serializer, &json_options())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

fn json_options() -> SerializeOptions {
    SerializeOptions::new()
        .stringify_64_bit_integers(false)
        .use_enum_numbers(true)
        .use_proto_field_name(true)
}

/// One decoded record, as handed to [`Events`](crate::Events).
///
/// The variant is chosen once per type when the type is registered, never per
/// record.
#[derive(Debug)]
pub enum RecordInstance {
    Static(Box<dyn StaticMessage>),
    Generic(GenericRecord),
}

impl RecordInstance {
    pub fn type_name(&self) -> String {
        match self {
            RecordInstance::Static(msg) => msg.type_name(),
            RecordInstance::Generic(record) => record.type_name().to_owned(),
        }
    }

    pub fn is_generic(&self) -> bool {
        matches!(self, RecordInstance::Generic(_))
    }

    pub fn as_generic(&self) -> Option<&GenericRecord> {
        match self {
            RecordInstance::Generic(record) => Some(record),
            RecordInstance::Static(_) => None,
        }
    }

    pub fn into_generic(self) -> Option<GenericRecord> {
        match self {
            RecordInstance::Generic(record) => Some(record),
            RecordInstance::Static(_) => None,
        }
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        match self {
            RecordInstance::Static(msg) => (**msg).as_any().downcast_ref::<T>(),
            RecordInstance::Generic(_) => None,
        }
    }

    /// Take the statically typed message out, if it is a `T`.
    pub fn into_static<T: 'static>(self) -> Option<T> {
        match self {
            RecordInstance::Static(msg) => msg.into_any().downcast::<T>().ok().map(|b| *b),
            RecordInstance::Generic(_) => None,
        }
    }

    /// Message bytes in the embedded message encoding.
    pub fn encode_to_vec(&self) -> Result<Vec<u8>> {
        match self {
            RecordInstance::Static(msg) => Ok(msg.encode_bytes()),
            RecordInstance::Generic(record) => record.encode_to_vec(),
        }
    }

    /// JSON with proto field names, numeric 64-bit integers and numeric
    /// enums for both variants. Map fields still differ: a static record
    /// renders them as objects, a generic one as lists of entry messages.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        let value = match self {
            RecordInstance::Static(msg) => msg.to_json(),
            RecordInstance::Generic(record) => serde_json::to_value(record),
        };
        value.map_err(|e| StreamError::Corrupt(format!("{}: json: {e}", self.type_name())))
    }

    pub(crate) fn merge(&mut self, bytes: &[u8], registry: &Registry) -> Result<()> {
        match self {
            RecordInstance::Static(msg) => Ok(msg.merge_bytes(bytes)?),
            RecordInstance::Generic(record) => record.merge(bytes, registry),
        }
    }
}
