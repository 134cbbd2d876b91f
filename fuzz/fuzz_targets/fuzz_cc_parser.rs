#![no_main]

use libfuzzer_sys::fuzz_target;
use npm_core::parser::parse_cc_file;

fuzz_target!(|data: &[u8]| {
    if let Ok(source) = core::str::from_utf8(data) {
        let _ = parse_cc_file(source);
    }
});
