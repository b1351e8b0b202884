#![no_main]

use eazdevirt::resolver::TypeName;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = TypeName::parse(text);
    }
});
