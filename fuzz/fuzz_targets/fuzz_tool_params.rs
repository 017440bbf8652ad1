#![no_main]
use deskhand::config::CancelTripConfig;
use deskhand::tools::{validate, CancelTripTool, Tool, Validation};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(serde_json::Value::Object(raw)) = serde_json::from_slice(data) else {
        return;
    };
    let tool = CancelTripTool::new(&CancelTripConfig::default());
    if let Validation::Valid(params) = validate(tool.schema(), &raw) {
        // Every field the schema declares is realized once validation passes.
        assert_eq!(params.len(), tool.schema().fields().len());
    }
});
