use crate::chunk::RecordId;

/// Category of a stream error. Lets the caller decide what to do with the
/// stream (abort, skip it, ask the producer to resend).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad bytes: wrong header, truncated or corrupt chunk, undeclared type.
    Format,
    /// Underlying reader/writer failed.
    Io,
    /// API misuse by the caller or by the `Events` implementation.
    Logic,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Format => f.write_str("format"),
            ErrorKind::Io => f.write_str("io"),
            ErrorKind::Logic => f.write_str("logic"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("incorrect magic bytes, not a treelog stream")]
    IncorrectMagic,

    #[error("unsupported format version {got} (supported {min}..={max})")]
    UnsupportedVersion { got: u64, min: u64, max: u64 },

    /// Input ended inside a chunk or a field. A clean end of input at a chunk
    /// boundary is not an error.
    #[error("truncated input: {0}")]
    Truncated(&'static str),

    #[error("unknown type index {index} ({declared} types declared)")]
    UnknownTypeIndex { index: u64, declared: usize },

    #[error("unknown protobuf type '{0}': no static type and no descriptor")]
    UnknownProtoType(String),

    #[error("unsupported wire construct: {0}")]
    UnsupportedWireConstruct(String),

    #[error("corrupt stream: {0}")]
    Corrupt(String),

    #[error("parent {parent} is not before record {next}")]
    ParentOutOfRange { parent: RecordId, next: RecordId },

    #[error("parent {0} is not an open group")]
    ParentNotOpen(RecordId),

    #[error("record {0} is not an open group")]
    GroupNotOpen(RecordId),

    #[error("{0} groups still open")]
    GroupsStillOpen(usize),

    #[error("chunk of {len} bytes exceeds limit of {max} bytes")]
    ChunkTooLarge { len: u64, max: usize },

    #[error("protobuf decode: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("protobuf encode: {0}")]
    Encode(#[from] prost::EncodeError),

    #[error("descriptor: {0}")]
    Descriptor(String),

    #[error("events handler: {0}")]
    Events(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl StreamError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StreamError::Io(_) => ErrorKind::Io,
            StreamError::ParentOutOfRange { .. }
            | StreamError::GroupsStillOpen(_)
            | StreamError::Events(_)
            | StreamError::Encode(_)
            | StreamError::Descriptor(_)
            | StreamError::ParentNotOpen(_)
            | StreamError::GroupNotOpen(_) => ErrorKind::Logic,
            _ => ErrorKind::Format,
        }
    }

    /// `true` for errors caused by input that ended too early.
    pub fn is_truncation(&self) -> bool {
        matches!(self, StreamError::Truncated(_))
            || matches!(self, StreamError::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof)
    }
}

pub type Result<T, E = StreamError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        assert_eq!(StreamError::IncorrectMagic.kind(), ErrorKind::Format);
        assert_eq!(StreamError::Truncated("chunk payload").kind(), ErrorKind::Format);
        assert_eq!(
            StreamError::Io(std::io::Error::other("boom")).kind(),
            ErrorKind::Io
        );
        assert_eq!(StreamError::GroupsStillOpen(2).kind(), ErrorKind::Logic);
        assert_eq!(ErrorKind::Format.to_string(), "format");
    }

    #[test]
    fn display() {
        let err = StreamError::UnsupportedVersion { got: 7, min: 1, max: 1 };
        assert_eq!(err.to_string(), "unsupported format version 7 (supported 1..=1)");
        let err = StreamError::UnknownTypeIndex { index: 4, declared: 2 };
        assert_eq!(err.to_string(), "unknown type index 4 (2 types declared)");
    }
}
