//! Data frames from the radio are untrusted: decoding and reassembly must
//! reject garbage without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tacs_proto::{DataFrame, FrameAssembler, reassemble};

fuzz_target!(|data: &[u8]| {
    // Treat the input as a sequence of length-prefixed transport writes.
    let mut assembler = FrameAssembler::new();
    let mut frames = Vec::new();
    let mut rest = data;
    while let Some((&len, tail)) = rest.split_first() {
        let take = usize::from(len).min(tail.len());
        let (write, next) = tail.split_at(take);
        rest = next;

        let Ok(frame) = DataFrame::decode(write) else {
            continue;
        };
        assert_eq!(frame.encode().as_ref(), write);
        frames.push(frame.clone());
        if let Ok(Some(message)) = assembler.push(frame) {
            assert!(message.len() <= tacs_proto::frame::MAX_MESSAGE_SIZE);
        }
    }
    let _ = reassemble(&frames);
});
