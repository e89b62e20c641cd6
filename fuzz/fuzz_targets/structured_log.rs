#![no_main]

use dllgraph::config::EngineConfig;
use dllgraph::pipeline::analyze_structured;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(log) = std::str::from_utf8(data) {
        let _ = analyze_structured(log, &EngineConfig::default());
    }
});
