//! Stream header: fixed magic followed by a length-prefixed version chunk.
//!
//! ```text
//! header  := MAGIC varint(len) version
//! version := varint(major) varint(minor)
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{Result, StreamError};
use crate::varint;

pub const MAGIC: [u8; 8] = *b"TREELOG\n";

/// Oldest major version this build reads.
pub const MIN_VERSION: u64 = 1;
/// Newest major version this build reads.
pub const MAX_VERSION: u64 = 1;

/// Upper bound on the version chunk length; anything longer is not a header.
pub(crate) const MAX_VERSION_LEN: usize = 2 * varint::MAX_VARINT_LEN;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub major: u64,
    /// Informational, never rejected.
    pub minor: u64,
}

impl Version {
    pub const CURRENT: Version = Version { major: 1, minor: 0 };

    pub fn is_supported(&self) -> bool {
        (MIN_VERSION..=MAX_VERSION).contains(&self.major)
    }
}

impl Default for Version {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Append magic and version chunk to `out`.
pub fn encode_header(version: Version, out: &mut Vec<u8>) {
    out.extend_from_slice(&MAGIC);
    let mut body = Vec::with_capacity(MAX_VERSION_LEN);
    varint::encode_varint(version.major, &mut body);
    varint::encode_varint(version.minor, &mut body);
    varint::encode_varint(body.len() as u64, out);
    out.extend_from_slice(&body);
}

/// Check the magic at the front of `buf`. A short `buf` that still matches
/// is a truncated header rather than a foreign file.
pub fn check_magic(buf: &[u8]) -> Result<()> {
    if buf.len() < MAGIC.len() {
        return if MAGIC.starts_with(buf) {
            Err(StreamError::Truncated("stream header"))
        } else {
            Err(StreamError::IncorrectMagic)
        };
    }
    if buf[..MAGIC.len()] != MAGIC {
        return Err(StreamError::IncorrectMagic);
    }
    Ok(())
}

/// Decode the version chunk body and gate it on the supported range.
pub fn decode_version(body: &[u8]) -> Result<Version> {
    let mut cursor = body;
    let major = varint::read_varint(&mut cursor)?;
    let minor = varint::read_varint(&mut cursor)?;
    if !cursor.is_empty() {
        return Err(StreamError::Corrupt(format!(
            "{} trailing bytes in version chunk",
            cursor.len()
        )));
    }
    let version = Version { major, minor };
    if !version.is_supported() {
        return Err(StreamError::UnsupportedVersion {
            got: major,
            min: MIN_VERSION,
            max: MAX_VERSION,
        });
    }
    Ok(version)
}
