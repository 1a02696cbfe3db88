// RSER wire format: code table, sinks, encoder, decoder and headers.

pub mod code_table;
pub mod decoder;
pub mod encoder;
pub mod header;
pub mod key_cache;
pub mod reference;
pub mod sink;

pub use code_table::Tag;
pub use decoder::{DecodeOptions, Decoder, decode_value, decode_value_with};
pub use encoder::{Encoder, encode_message, encode_value, measure_value};
pub use header::{
    Header, HeaderStatus, PROTOCOL_VERSION, encode_stream_header, parse_header,
};
pub use key_cache::KeyCache;
pub use sink::{SizeCounter, SliceWriter, Sink};

use crate::error::{Result, RserError};
use crate::value::Value;

/// Decode one complete framed message (MESSAGE_HEADER + payload).
pub fn decode_message(data: &[u8]) -> Result<Value> {
    match parse_header(data)? {
        HeaderStatus::NeedMore(needed) => Err(RserError::Truncated {
            offset: 0,
            needed,
            available: data.len(),
        }),
        HeaderStatus::Complete {
            header: Header::Stream { .. },
            ..
        } => Err(RserError::UnexpectedTag {
            offset: 0,
            found: Tag::StreamHeader,
            expected: "message header",
        }),
        HeaderStatus::Complete {
            header: Header::Message { length },
            len,
        } => {
            let body = &data[len..];
            if body.len() < length {
                return Err(RserError::Truncated {
                    offset: len,
                    needed: length,
                    available: body.len(),
                });
            }
            if body.len() > length {
                return Err(RserError::malformed(
                    len + length,
                    format!("{} bytes after message", body.len() - length),
                ));
            }
            decode_value(body).map_err(|e| shift_offset(e, len))
        }
    }
}

/// Rebase a payload-relative decode error onto the enclosing buffer.
fn shift_offset(err: RserError, by: usize) -> RserError {
    match err {
        RserError::Truncated {
            offset,
            needed,
            available,
        } => RserError::Truncated {
            offset: offset + by,
            needed,
            available,
        },
        RserError::InvalidTag { offset, byte } => RserError::InvalidTag {
            offset: offset + by,
            byte,
        },
        RserError::UnexpectedTag {
            offset,
            found,
            expected,
        } => RserError::UnexpectedTag {
            offset: offset + by,
            found,
            expected,
        },
        RserError::UnknownReference { offset, id } => RserError::UnknownReference {
            offset: offset + by,
            id,
        },
        RserError::Malformed { offset, reason } => RserError::Malformed {
            offset: offset + by,
            reason,
        },
        RserError::DepthLimit { offset, limit } => RserError::DepthLimit {
            offset: offset + by,
            limit,
        },
        other => other,
    }
}
