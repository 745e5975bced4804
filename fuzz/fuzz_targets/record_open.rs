//! Encrypted records may be corrupted or forged; opening must fail cleanly.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tacs_core::{lease::SessionKey, record::MessageCrypto};

fuzz_target!(|data: &[u8]| {
    let crypto = MessageCrypto::with_session_key(&SessionKey::new([0x42; 16]));
    if let Ok(message) = crypto.open(data) {
        let _ = crypto.seal(&message);
    }
    let _ = MessageCrypto::Plain.open(data);
});
