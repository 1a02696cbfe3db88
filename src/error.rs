// Error type shared by the encoder, decoder, framer and file helpers.

use std::io;

use thiserror::Error;

use crate::wire::code_table::Tag;

/// Errors produced while encoding, decoding or framing RSER data.
///
/// Decode-side variants carry the byte offset (relative to the start of the
/// buffer being decoded) at which the problem was detected.
#[derive(Debug, Error)]
pub enum RserError {
    /// The value has no wire representation.
    #[error("cannot encode {kind}: {reason}")]
    UnsupportedValue { kind: &'static str, reason: String },

    /// The output buffer is shorter than the measured encoding.
    #[error("output buffer too small: need {needed} bytes, {available} available")]
    OutputTooSmall { needed: usize, available: usize },

    /// Fewer bytes remain than a read demands.
    #[error("truncated buffer at offset {offset}: need {needed} bytes, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// A tag or sub-tag byte outside the code table.
    #[error("invalid tag {byte:#04x} at offset {offset}")]
    InvalidTag { offset: usize, byte: u8 },

    /// A known tag in a position that does not accept it.
    #[error("unexpected {found} at offset {offset}, expected {expected}")]
    UnexpectedTag {
        offset: usize,
        found: Tag,
        expected: &'static str,
    },

    /// A REFERENCE id with no matching DECLARE_REFERENCE.
    #[error("unknown reference id {id} at offset {offset}")]
    UnknownReference { offset: usize, id: u64 },

    /// Structurally invalid payload (bad UTF-8, negative length, ...).
    #[error("malformed payload at offset {offset}: {reason}")]
    Malformed { offset: usize, reason: String },

    /// Nesting deeper than `DecodeOptions::max_depth`.
    #[error("nesting depth exceeds {limit} at offset {offset}")]
    DepthLimit { offset: usize, limit: usize },

    /// Stream header version differs from `PROTOCOL_VERSION`.
    #[error("protocol version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: u64, actual: u64 },

    /// A message header declared a payload above the configured maximum.
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl RserError {
    /// Byte offset of a decode error, if the variant carries one.
    pub fn offset(&self) -> Option<usize> {
        match self {
            Self::Truncated { offset, .. }
            | Self::InvalidTag { offset, .. }
            | Self::UnexpectedTag { offset, .. }
            | Self::UnknownReference { offset, .. }
            | Self::Malformed { offset, .. }
            | Self::DepthLimit { offset, .. } => Some(*offset),
            _ => None,
        }
    }

    pub(crate) fn malformed(offset: usize, reason: impl Into<String>) -> Self {
        Self::Malformed {
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn unsupported(kind: &'static str, reason: impl Into<String>) -> Self {
        Self::UnsupportedValue {
            kind,
            reason: reason.into(),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, RserError>;
