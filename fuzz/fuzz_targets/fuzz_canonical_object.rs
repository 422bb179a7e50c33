// Copyright (c) 2026 Asinka
// Licensed under the Apache-2.0 License.

#![no_main]
#![forbid(unsafe_code)]

use libfuzzer_sys::fuzz_target;

use asinka::core::types::{decode_canonical_limited, SyncObject};

fuzz_target!(|data: &[u8]| {
    // Size-capped canonical decoding must never panic or over-allocate.
    let _ = decode_canonical_limited::<SyncObject>(data, 64 * 1024);
});
