#![no_main]

use libfuzzer_sys::fuzz_target;
use mvbench::metrics::{parse_marker_line, ExperimentSummary};

fuzz_target!(|data: &[u8]| {
    if let Ok(line) = std::str::from_utf8(data) {
        if let Some(record) = parse_marker_line(line) {
            assert!(record.latency.is_finite());
            assert!(record.tps.is_finite());
            let _ = ExperimentSummary::from_records(&[record]);
        }
    }
});
