#![no_main]

use dllgraph::config::EngineConfig;
use dllgraph::pipeline::analyze_debugger;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(body) = std::str::from_utf8(data) {
        let config = EngineConfig::default();
        let output = format!("{}\n{}\n{}\n", config.start_marker, body, config.end_marker);

        // Malformed captures may fail, but must never panic
        let _ = analyze_debugger(&output, "fuzz.exe", &config);
    }
});
