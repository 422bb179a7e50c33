// Copyright (c) 2026 Asinka
// Licensed under the Apache-2.0 License.

#![no_main]
#![forbid(unsafe_code)]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Config parsing is exposed to embedder-supplied files; it must reject
    // garbage without panicking.
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = asinka::core::config::AsinkaConfig::from_toml(s);
    }
});
