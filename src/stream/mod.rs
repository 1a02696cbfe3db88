// Message framing over byte streams.

pub mod framer;

pub use framer::{
    DEFAULT_MAX_MESSAGE_LEN, FrameEvent, FrameHandler, Framer, FramerMode, FramerOptions,
    FramerState, StreamRole,
};
