// Reference table: shared-identity tracking for one encode or decode call.
//
// Encode side works in two phases over the same table.  While measuring,
// every referenceable value is recorded on first sighting; a second
// sighting assigns the next dense id, charges the DECLARE_REFERENCE prefix
// that the first occurrence will carry, and charges a REFERENCE for itself.
// While writing, the table is sealed: the first occurrence of a shared value
// writes DECLARE_REFERENCE(id) ahead of its body and later occurrences write
// REFERENCE(id).  Ids are assigned in first-recognition order, which is the
// same order in both passes.
//
// Decode side maps ids to the placeholder values registered by
// DECLARE_REFERENCE so that back-references (including cycles) resolve to
// the same allocation.

use std::collections::HashMap;

use log::trace;

use super::code_table::Tag;
use super::sink::Sink;
use crate::error::{Result, RserError};
use crate::value::Value;

// ---------------------------------------------------------------------------
// Encode side
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Sighting {
    /// Seen once; not (yet) shared.
    Once,
    /// Seen more than once; `declared` is set once the write pass has
    /// emitted its DECLARE_REFERENCE.
    Shared { id: u64, declared: bool },
}

/// Identity table for one encode call.
#[derive(Debug, Default)]
pub struct EncodeRefs {
    seen: HashMap<usize, Sighting>,
    next_id: u64,
    sealed: bool,
}

impl EncodeRefs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of values found to be shared.
    pub fn shared_count(&self) -> u64 {
        self.next_id
    }

    /// True once a measuring pass has finished and the table is fixed.
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Fix the table after the measuring pass.  Further measuring is a bug.
    pub fn seal(&mut self) {
        trace!(
            "reference table sealed: {} tracked, {} shared",
            self.seen.len(),
            self.next_id
        );
        self.sealed = true;
    }

    /// Consult the table for a referenceable value about to be encoded.
    ///
    /// Returns true if a REFERENCE was emitted and the caller must not
    /// encode the body.  Returns false if the caller should encode the body
    /// (possibly after a DECLARE_REFERENCE this call just emitted).
    pub fn encode_possible_reference<S: Sink>(&mut self, identity: usize, sink: &mut S) -> bool {
        if S::MEASURING {
            debug_assert!(!self.sealed, "measuring against a sealed table");
            self.measure(identity, sink)
        } else {
            debug_assert!(self.sealed, "writing against an unmeasured table");
            self.write(identity, sink)
        }
    }

    fn measure<S: Sink>(&mut self, identity: usize, sink: &mut S) -> bool {
        match self.seen.get(&identity).copied() {
            None => {
                self.seen.insert(identity, Sighting::Once);
                false
            }
            Some(Sighting::Once) => {
                let id = self.next_id;
                self.next_id += 1;
                self.seen.insert(
                    identity,
                    Sighting::Shared {
                        id,
                        declared: false,
                    },
                );
                // The prefix belongs to the first occurrence; only its size
                // matters here.
                write_marker(sink, Tag::DeclareReference, id);
                write_marker(sink, Tag::Reference, id);
                true
            }
            Some(Sighting::Shared { id, .. }) => {
                write_marker(sink, Tag::Reference, id);
                true
            }
        }
    }

    fn write<S: Sink>(&mut self, identity: usize, sink: &mut S) -> bool {
        match self.seen.get_mut(&identity) {
            Some(Sighting::Shared { id, declared }) => {
                let id = *id;
                if *declared {
                    write_marker(sink, Tag::Reference, id);
                    true
                } else {
                    *declared = true;
                    write_marker(sink, Tag::DeclareReference, id);
                    false
                }
            }
            _ => false,
        }
    }
}

fn write_marker<S: Sink>(sink: &mut S, tag: Tag, id: u64) {
    sink.write_tag(tag);
    sink.write_length(id as usize);
}

// ---------------------------------------------------------------------------
// Decode side
// ---------------------------------------------------------------------------

/// Id → value table for one decode call.
#[derive(Debug, Default)]
pub struct DecodeRefs {
    values: HashMap<u64, Value>,
}

impl DecodeRefs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the placeholder for a DECLARE_REFERENCE.
    pub fn register(&mut self, id: u64, value: Value, offset: usize) -> Result<()> {
        if self.values.contains_key(&id) {
            return Err(RserError::malformed(
                offset,
                format!("reference id {id} declared twice"),
            ));
        }
        self.values.insert(id, value);
        Ok(())
    }

    /// Resolve a REFERENCE; the returned value shares the registered
    /// allocation.
    pub fn resolve(&self, id: u64, offset: usize) -> Result<Value> {
        self.values
            .get(&id)
            .cloned()
            .ok_or(RserError::UnknownReference { offset, id })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
