use serde::Deserialize;

use crate::header::Version;

/// Reader configuration, usually the `[reader]` table of a TOML file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReaderOptions {
    /// Decode every type generically even when a static type is available.
    pub forced_dynamic: bool,

    /// Starting size of the read buffer, in bytes.
    pub initial_capacity: usize,

    /// Largest chunk payload accepted, in bytes. Bounds memory spent on a
    /// corrupt length prefix.
    pub max_chunk_len: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            forced_dynamic: false,
            initial_capacity: 64 * 1024,
            max_chunk_len: 64 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(default)]
pub struct WriterOptions {
    /// Version written in the stream header.
    pub version: Version,
}
