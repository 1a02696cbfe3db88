#![no_main]
use libfuzzer_sys::fuzz_target;
use rser::{FrameEvent, Framer, FramerOptions, StreamRole};

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    // First byte picks mode and chunk size.
    let control = data[0];
    let input = &data[1..];
    let chunk = 1 + (control >> 2) as usize;
    let options = match control & 3 {
        0 | 1 => FramerOptions::default(),
        2 => FramerOptions::live(StreamRole::Initiator),
        _ => FramerOptions::live(StreamRole::Responder),
    };

    let mut framer = Framer::new(FramerOptions {
        max_message_len: 1 << 16,
        ..options
    });
    let mut events: Vec<FrameEvent> = Vec::new();
    for piece in input.chunks(chunk) {
        if framer.append(piece, &mut events).is_err() {
            break;
        }
    }
});
