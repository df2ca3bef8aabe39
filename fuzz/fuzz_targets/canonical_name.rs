#![no_main]

use libfuzzer_sys::fuzz_target;
use mvbench::params::ExperimentParams;

fuzz_target!(|data: &[u8]| {
    if let Ok(name) = std::str::from_utf8(data) {
        // Anything that parses must format back to the same name
        if let Ok(params) = ExperimentParams::from_canonical_name(name) {
            assert_eq!(params.canonical_name(), name);
        }
    }
});
