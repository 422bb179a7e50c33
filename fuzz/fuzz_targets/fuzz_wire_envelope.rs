// Copyright (c) 2026 Asinka
// Licensed under the Apache-2.0 License.

#![no_main]
#![forbid(unsafe_code)]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Frame decoding must never panic, whatever the peer sends. A frame
    // that decodes must re-encode and decode to the same envelope.
    if let Ok(envelope) = asinka::wire::decode_envelope(data, 4 * 1024 * 1024) {
        let bytes = asinka::wire::encode_envelope(&envelope);
        let again = asinka::wire::decode_envelope(&bytes, 4 * 1024 * 1024)
            .expect("re-encoded envelope must decode");
        assert_eq!(again, envelope);
    }
});
