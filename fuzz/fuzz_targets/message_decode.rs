//! Every message and payload decoder must handle arbitrary bytes.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tacs_proto::{
    SorcMessage,
    payloads::{
        BlobRequest, LtBlobPayload, MtuReceive, PhoneToSorcChallenge, PhoneToSorcResponse,
        ServiceGrantRequest, ServiceGrantTrigger, SorcToPhoneResponse,
    },
};

fuzz_target!(|data: &[u8]| {
    if let Ok(message) = SorcMessage::decode(data) {
        assert_eq!(message.encode().as_ref(), data);
    }

    let _ = PhoneToSorcChallenge::decode(data);
    let _ = SorcToPhoneResponse::decode(data);
    let _ = PhoneToSorcResponse::decode(data);
    let _ = BlobRequest::decode(data);
    let _ = LtBlobPayload::decode(data);
    let _ = MtuReceive::decode(data);
    let _ = ServiceGrantRequest::decode(data);
    if let Ok(trigger) = ServiceGrantTrigger::decode(data) {
        let _ = trigger.encode();
    }
});
