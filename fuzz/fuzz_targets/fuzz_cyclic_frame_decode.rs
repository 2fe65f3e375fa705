#![no_main]

use cipmaster_core::io::CyclicFrame;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = CyclicFrame::decode(data);
});
