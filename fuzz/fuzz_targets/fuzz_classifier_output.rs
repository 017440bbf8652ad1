#![no_main]
use deskhand::agent::{parse_classification, Classification};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        // Output without a leading brace must never become a tool call.
        if let Ok(Classification::ToolCall { .. } | Classification::MissingParameter { .. }) =
            parse_classification(s)
        {
            assert!(s.trim().starts_with('{'));
        }
    }
});
