// Incremental message framer.
//
// Arbitrary byte chunks go in; one callback per complete message comes out.
//
// State machine:
//   Init          live stream, waiting for the peer's stream header
//   Idle          between messages, accumulating a header
//   Read          header seen, accumulating `expected` payload bytes
//   Incompatible  peer announced another protocol version; input ignored
//
// When idle with nothing buffered, whole messages are decoded straight out
// of the caller's chunk.  Anything else is queued as a fragment and drained
// in arrival order, each fragment filling the current header or payload
// buffer up to what that buffer still needs.

use std::collections::VecDeque;

use log::{debug, trace, warn};

use crate::error::{Result, RserError};
use crate::value::Value;
use crate::wire::code_table::Tag;
use crate::wire::decoder::{DecodeOptions, decode_value_with};
use crate::wire::header::{
    Header, HeaderStatus, PROTOCOL_VERSION, encode_stream_header, parse_header,
};
use crate::wire::key_cache::KeyCache;

/// Default upper bound on a single message payload (64 MiB).
pub const DEFAULT_MAX_MESSAGE_LEN: usize = 64 * 1024 * 1024;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Which side of a live connection this framer serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamRole {
    /// Sends its stream header first.
    Initiator,
    /// Answers the peer's stream header with its own.
    Responder,
}

/// How the stream header is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramerMode {
    /// Persisted stream: a stream header may appear between messages; a
    /// version mismatch parks the framer without an error.
    File,
    /// Live connection: the first token must be a stream header and a
    /// version mismatch is fatal.
    Live(StreamRole),
}

#[derive(Debug, Clone)]
pub struct FramerOptions {
    pub mode: FramerMode,
    /// Largest accepted message payload in bytes.
    pub max_message_len: usize,
    /// Limits for decoding each payload.
    pub decode: DecodeOptions,
    /// Memoize short object keys across messages.
    pub key_cache: bool,
}

impl Default for FramerOptions {
    fn default() -> Self {
        Self {
            mode: FramerMode::File,
            max_message_len: DEFAULT_MAX_MESSAGE_LEN,
            decode: DecodeOptions::default(),
            key_cache: true,
        }
    }
}

impl FramerOptions {
    pub fn live(role: StreamRole) -> Self {
        Self {
            mode: FramerMode::Live(role),
            ..Self::default()
        }
    }
}

/// Externally visible framer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramerState {
    Init,
    Idle,
    Read { expected: usize },
    Incompatible { version: u64 },
}

// ---------------------------------------------------------------------------
// Handler
// ---------------------------------------------------------------------------

/// Receives framer output.
pub trait FrameHandler {
    /// A message decoded successfully.
    fn on_value(&mut self, value: Value);

    /// A message payload failed to decode.  The framer has already moved
    /// on to the next message.
    fn on_error(&mut self, error: RserError);

    /// A file-mode stream announced an unsupported version.
    fn on_incompatible(&mut self, _version: u64) {}

    /// A responder accepted the peer's stream header; `reply` is the stream
    /// header to send back.
    fn on_handshake(&mut self, _reply: &[u8]) {}
}

/// Recorded framer output, in order.
#[derive(Debug)]
pub enum FrameEvent {
    Value(Value),
    Error(RserError),
    Incompatible(u64),
    Handshake(Vec<u8>),
}

impl FrameHandler for Vec<FrameEvent> {
    fn on_value(&mut self, value: Value) {
        self.push(FrameEvent::Value(value));
    }

    fn on_error(&mut self, error: RserError) {
        self.push(FrameEvent::Error(error));
    }

    fn on_incompatible(&mut self, version: u64) {
        self.push(FrameEvent::Incompatible(version));
    }

    fn on_handshake(&mut self, reply: &[u8]) {
        self.push(FrameEvent::Handshake(reply.to_vec()));
    }
}

// ---------------------------------------------------------------------------
// Framer
// ---------------------------------------------------------------------------

/// A queued chunk and how much of it has been consumed.
#[derive(Debug)]
struct Fragment {
    bytes: Vec<u8>,
    start: usize,
}

impl Fragment {
    fn rest(&self) -> &[u8] {
        &self.bytes[self.start..]
    }
}

pub struct Framer {
    options: FramerOptions,
    state: FramerState,
    header: Vec<u8>,
    payload: Vec<u8>,
    overflow: VecDeque<Fragment>,
    key_cache: Option<KeyCache>,
    messages: u64,
}

impl Framer {
    pub fn new(options: FramerOptions) -> Self {
        let state = match options.mode {
            FramerMode::File => FramerState::Idle,
            FramerMode::Live(_) => FramerState::Init,
        };
        let key_cache = options.key_cache.then(KeyCache::new);
        Self {
            options,
            state,
            header: Vec::new(),
            payload: Vec::new(),
            overflow: VecDeque::new(),
            key_cache,
            messages: 0,
        }
    }

    /// Stream header an initiator sends before its first message.
    pub fn stream_header() -> Vec<u8> {
        encode_stream_header()
    }

    pub fn state(&self) -> FramerState {
        self.state
    }

    /// Messages decoded successfully so far.
    pub fn messages(&self) -> u64 {
        self.messages
    }

    /// Bytes held across calls (partial header, partial payload, queued).
    pub fn buffered(&self) -> usize {
        self.header.len()
            + self.payload.len()
            + self.overflow.iter().map(|f| f.rest().len()).sum::<usize>()
    }

    /// Bytes still required to finish the header or payload in progress.
    pub fn pending(&self) -> usize {
        match self.state {
            FramerState::Read { expected } => expected - self.payload.len(),
            FramerState::Init | FramerState::Idle if !self.header.is_empty() => {
                match parse_header(&self.header) {
                    Ok(HeaderStatus::NeedMore(total)) => total - self.header.len(),
                    _ => 0,
                }
            }
            _ => 0,
        }
    }

    /// Feed one chunk of input.
    ///
    /// Payload decode failures go to `handler.on_error` and framing
    /// continues.  Header errors, oversized messages and live-mode version
    /// mismatches are returned as errors and leave the stream unusable.
    pub fn append<H: FrameHandler>(&mut self, chunk: &[u8], handler: &mut H) -> Result<()> {
        if let FramerState::Incompatible { version } = self.state {
            debug!(
                "ignoring {} bytes on incompatible stream (version {version})",
                chunk.len()
            );
            return Ok(());
        }
        if chunk.is_empty() {
            return Ok(());
        }

        let mut chunk = chunk;
        if self.state == FramerState::Idle && self.header.is_empty() && self.overflow.is_empty() {
            while let HeaderStatus::Complete {
                header: Header::Message { length },
                len,
            } = parse_header(chunk)?
            {
                self.check_length(length)?;
                if chunk.len() - len < length {
                    break;
                }
                trace!("fast path: {length}-byte message");
                self.deliver(&chunk[len..len + length], handler);
                chunk = &chunk[len + length..];
                if chunk.is_empty() {
                    return Ok(());
                }
            }
        }

        trace!("queueing {} bytes", chunk.len());
        self.overflow.push_back(Fragment {
            bytes: chunk.to_vec(),
            start: 0,
        });
        self.drain(handler)
    }

    fn drain<H: FrameHandler>(&mut self, handler: &mut H) -> Result<()> {
        while let Some(mut fragment) = self.overflow.pop_front() {
            if matches!(self.state, FramerState::Incompatible { .. }) {
                self.overflow.clear();
                break;
            }

            let want = self.wanted()?;
            let rest = fragment.rest();
            let take = want.min(rest.len());
            match self.state {
                FramerState::Read { .. } => self.payload.extend_from_slice(&rest[..take]),
                _ => self.header.extend_from_slice(&rest[..take]),
            }
            fragment.start += take;
            if !fragment.rest().is_empty() {
                self.overflow.push_front(fragment);
            }

            self.step(handler)?;
        }
        Ok(())
    }

    /// Bytes the current buffer can take before it must be processed.
    fn wanted(&self) -> Result<usize> {
        Ok(match self.state {
            FramerState::Read { expected } => expected - self.payload.len(),
            _ => match parse_header(&self.header)? {
                HeaderStatus::NeedMore(total) => total - self.header.len(),
                HeaderStatus::Complete { .. } => 0,
            },
        })
    }

    /// Act on a buffer that may have just become complete.
    fn step<H: FrameHandler>(&mut self, handler: &mut H) -> Result<()> {
        match self.state {
            FramerState::Read { expected } if self.payload.len() == expected => {
                let payload = std::mem::take(&mut self.payload);
                self.state = FramerState::Idle;
                self.deliver(&payload, handler);
            }
            FramerState::Init | FramerState::Idle => {
                if let HeaderStatus::Complete { header, .. } = parse_header(&self.header)? {
                    self.header.clear();
                    self.on_header(header, handler)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn on_header<H: FrameHandler>(&mut self, header: Header, handler: &mut H) -> Result<()> {
        match (self.state, header) {
            (FramerState::Init, Header::Stream { version }) => self.handshake(version, handler),
            (FramerState::Idle, Header::Stream { version })
                if self.options.mode == FramerMode::File =>
            {
                self.handshake(version, handler)
            }
            (FramerState::Idle, Header::Message { length }) => {
                self.check_length(length)?;
                if length == 0 {
                    self.deliver(&[], handler);
                } else {
                    debug!("reading {length}-byte message");
                    self.payload.reserve(length);
                    self.state = FramerState::Read { expected: length };
                }
                Ok(())
            }
            (FramerState::Init, Header::Message { .. }) => Err(RserError::UnexpectedTag {
                offset: 0,
                found: Tag::MessageHeader,
                expected: "stream header",
            }),
            (_, Header::Stream { .. }) => Err(RserError::UnexpectedTag {
                offset: 0,
                found: Tag::StreamHeader,
                expected: "message header",
            }),
            (state, header) => unreachable!("header {header:?} in state {state:?}"),
        }
    }

    fn handshake<H: FrameHandler>(&mut self, version: u64, handler: &mut H) -> Result<()> {
        if version == PROTOCOL_VERSION {
            debug!("stream header accepted (version {version})");
            self.state = FramerState::Idle;
            if self.options.mode == FramerMode::Live(StreamRole::Responder) {
                handler.on_handshake(&encode_stream_header());
            }
            return Ok(());
        }

        self.state = FramerState::Incompatible { version };
        self.overflow.clear();
        match self.options.mode {
            FramerMode::File => {
                warn!("incompatible stream version {version} (supported: {PROTOCOL_VERSION})");
                handler.on_incompatible(version);
                Ok(())
            }
            FramerMode::Live(_) => Err(RserError::VersionMismatch {
                expected: PROTOCOL_VERSION,
                actual: version,
            }),
        }
    }

    fn check_length(&self, length: usize) -> Result<()> {
        if length > self.options.max_message_len {
            return Err(RserError::MessageTooLarge {
                size: length,
                max: self.options.max_message_len,
            });
        }
        Ok(())
    }

    fn deliver<H: FrameHandler>(&mut self, payload: &[u8], handler: &mut H) {
        match decode_value_with(payload, &self.options.decode, self.key_cache.as_mut()) {
            Ok(value) => {
                self.messages += 1;
                handler.on_value(value);
            }
            Err(e) => {
                warn!("dropping undecodable message: {e}");
                handler.on_error(e);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
