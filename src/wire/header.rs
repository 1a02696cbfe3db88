// Stream and message headers.
//
//   STREAM_HEADER  <version: encoded integer>
//   MESSAGE_HEADER <payload length: encoded integer>
//
// A header is a tag byte followed by an encoded integer, so its total size
// is known once the first two bytes have arrived.  `parse_header` reports
// how many bytes it still needs, which lets the framer buffer exactly one
// header's worth of input before decoding it.

use super::code_table::{self, Tag};
use super::decoder::Decoder;
use super::sink::{SizeCounter, Sink};
use crate::error::{Result, RserError};

/// Wire protocol version carried by every stream header.
pub const PROTOCOL_VERSION: u64 = 1;

/// A decoded framing token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Header {
    Stream { version: u64 },
    Message { length: usize },
}

/// Outcome of parsing a possibly incomplete header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderStatus {
    /// The header is not complete; this many bytes in total are needed
    /// before it can be parsed (a lower bound until two bytes are known).
    NeedMore(usize),
    /// A complete header occupying the first `len` bytes.
    Complete { header: Header, len: usize },
}

pub fn write_stream_header<S: Sink>(sink: &mut S, version: u64) {
    sink.write_tag(Tag::StreamHeader);
    sink.write_length(version as usize);
}

pub fn write_message_header<S: Sink>(sink: &mut S, payload_len: usize) {
    sink.write_tag(Tag::MessageHeader);
    sink.write_length(payload_len);
}

/// Encoded size of a message header for a payload of `payload_len` bytes.
pub fn message_header_len(payload_len: usize) -> usize {
    let mut counter = SizeCounter::new();
    write_message_header(&mut counter, payload_len);
    counter.len()
}

/// Stream header announcing `PROTOCOL_VERSION`.
pub fn encode_stream_header() -> Vec<u8> {
    let mut counter = SizeCounter::new();
    write_stream_header(&mut counter, PROTOCOL_VERSION);
    let mut buf = vec![0u8; counter.len()];
    write_stream_header(&mut super::sink::SliceWriter::new(&mut buf), PROTOCOL_VERSION);
    buf
}

/// Parse a header at the start of `buf`.
///
/// Unknown tag bytes, non-header tags and non-integer operands are errors.
/// Bytes after the header are ignored.
pub fn parse_header(buf: &[u8]) -> Result<HeaderStatus> {
    let Some(&first) = buf.first() else {
        return Ok(HeaderStatus::NeedMore(2));
    };
    let tag = code_table::validate(first, 0)?;
    if !tag.is_framing() {
        return Err(RserError::UnexpectedTag {
            offset: 0,
            found: tag,
            expected: "stream or message header",
        });
    }
    let Some(&second) = buf.get(1) else {
        return Ok(HeaderStatus::NeedMore(2));
    };
    let operand = code_table::validate(second, 1)?;
    let Some(payload) = operand.number_payload_len() else {
        return Err(RserError::UnexpectedTag {
            offset: 1,
            found: operand,
            expected: "integer",
        });
    };
    let total = 2 + payload;
    if buf.len() < total {
        return Ok(HeaderStatus::NeedMore(total));
    }

    let mut decoder = Decoder::new(&buf[..total]);
    decoder.read_tag()?;
    let n = decoder.read_uint()?;
    let header = match tag {
        Tag::StreamHeader => Header::Stream { version: n },
        _ => Header::Message {
            length: usize::try_from(n)
                .map_err(|_| RserError::malformed(1, "message length overflows usize"))?,
        },
    };
    Ok(HeaderStatus::Complete { header, len: total })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
