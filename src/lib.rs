//! RSER: a compact, tagged binary serialization format for rich values.
//!
//! The crate provides:
//! - A value model with shared, possibly cyclic composites (`value`)
//! - The wire codec: code table, two-pass encoder, decoder (`wire`)
//! - An incremental message framer with a version handshake (`stream`)
//! - File-oriented helpers (`io`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```
//! use rser::{Value, decode_value, encode_value};
//!
//! let shared = Value::array(vec![Value::from(1), Value::from("x")]);
//! let root = Value::object([("a", shared.clone()), ("b", shared)]);
//!
//! let bytes = encode_value(&root).unwrap();
//! let back = decode_value(&bytes).unwrap();
//! assert_eq!(back, root);
//!
//! let record = back.as_object().unwrap();
//! let record = record.borrow();
//! assert!(record.get("a").unwrap().ptr_eq(record.get("b").unwrap()));
//! ```

pub mod error;
pub mod io;
pub mod stream;
pub mod value;
pub mod wire;

#[cfg(feature = "cli")]
pub mod cli;

pub use error::{Result, RserError};
pub use stream::{FrameEvent, FrameHandler, Framer, FramerMode, FramerOptions, StreamRole};
pub use value::Value;
pub use wire::{
    PROTOCOL_VERSION, decode_message, decode_value, encode_message, encode_stream_header,
    encode_value, measure_value,
};
