#![no_main]

use libfuzzer_sys::fuzz_target;
use panelflow::Operation;
use panelflow::timeline::{MAX_AFTER, MAX_BEFORE, Timeline};

// Drive the timeline with an arbitrary edit sequence and check the
// bounded-history invariants after every step.
fuzz_target!(|data: &[u8]| {
    let mut timeline = Timeline::new();
    for &byte in data {
        match byte % 8 {
            0 | 1 | 2 => timeline.insert(Operation::Threshold(byte)),
            3 => timeline.insert(Operation::Invert),
            4 => timeline.delete(),
            5 => timeline.descend(),
            6 => timeline.ascend(),
            _ => timeline.reset(),
        }
        assert!(timeline.len() <= MAX_BEFORE + MAX_AFTER);
        assert!(timeline.cursor() <= timeline.len());
        // Identity must be derivable without panicking
        let _ = timeline.ident();
        let _ = timeline.snapshot();
    }
});
