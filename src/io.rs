// File-level helpers for RSER streams.
//
// `write_file()` writes a stream header followed by one framed message per
// value.  `read_file()` feeds the file through a file-mode framer in fixed
// chunks, exactly as a socket reader would.  With the `file-io` feature a
// SHA-256 of the written bytes is computed on the fly.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

#[cfg(feature = "file-io")]
use sha2::Digest;

use crate::error::{Result, RserError};
use crate::stream::{FrameEvent, Framer, FramerOptions};
use crate::value::Value;
use crate::wire::{encode_message, encode_stream_header};

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Statistics returned by `write_file()` and `write_stream()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStats {
    /// Messages written.
    pub messages: u64,
    /// Total bytes written, stream header included.
    pub bytes: u64,
    /// SHA-256 of everything written (if `file-io` feature is enabled).
    pub sha256: Option<[u8; 32]>,
}

/// What a stream turned out to contain.
#[derive(Debug)]
pub enum FileContents {
    Values(Vec<Value>),
    /// The stream header announced a version this build cannot read.
    Incompatible { version: u64 },
}

const BUF_SIZE: usize = 64 * 1024; // 64 KiB

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Write `values` as an RSER stream to `path`, replacing any existing file.
pub fn write_file(path: &Path, values: &[Value]) -> Result<FileStats> {
    let file = File::create(path)?;
    let mut writer = BufWriter::with_capacity(BUF_SIZE, file);
    let stats = write_stream(&mut writer, values)?;
    writer.flush()?;
    Ok(stats)
}

/// Write a stream header and one message per value to `writer`.
pub fn write_stream<W: Write>(writer: &mut W, values: &[Value]) -> Result<FileStats> {
    #[cfg(feature = "file-io")]
    let mut hasher = sha2::Sha256::new();

    let mut emit = |bytes: &[u8]| -> io::Result<()> {
        #[cfg(feature = "file-io")]
        hasher.update(bytes);
        writer.write_all(bytes)
    };

    let header = encode_stream_header();
    emit(&header)?;
    let mut bytes = header.len() as u64;
    for value in values {
        // Encode fully before writing so a failure leaves no partial frame.
        let message = encode_message(value)?;
        emit(&message)?;
        bytes += message.len() as u64;
    }

    #[cfg(feature = "file-io")]
    let sha256 = Some(hasher.finalize().into());
    #[cfg(not(feature = "file-io"))]
    let sha256: Option<[u8; 32]> = None;

    Ok(FileStats {
        messages: values.len() as u64,
        bytes,
        sha256,
    })
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Read every message of the RSER stream at `path`.
pub fn read_file(path: &Path) -> Result<FileContents> {
    let file = File::open(path)?;
    read_stream(BufReader::with_capacity(BUF_SIZE, file))
}

/// Read every message from `reader`.
///
/// A message that fails to decode aborts the read with that error.  Input
/// that ends partway through a header or payload is `Truncated`.
pub fn read_stream<R: Read>(mut reader: R) -> Result<FileContents> {
    let mut framer = Framer::new(FramerOptions::default());
    let mut events = Vec::new();
    let mut values = Vec::new();
    let mut buf = vec![0u8; BUF_SIZE];
    let mut offset = 0usize;

    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        framer.append(&buf[..n], &mut events)?;
        offset += n;

        for event in events.drain(..) {
            match event {
                FrameEvent::Value(v) => values.push(v),
                FrameEvent::Error(e) => return Err(e),
                FrameEvent::Incompatible(version) => {
                    return Ok(FileContents::Incompatible { version });
                }
                FrameEvent::Handshake(_) => {}
            }
        }
    }

    if framer.buffered() > 0 {
        return Err(RserError::Truncated {
            offset,
            needed: framer.pending(),
            available: 0,
        });
    }
    Ok(FileContents::Values(values))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
