#![no_main]

use cipmaster_core::cpf::CommandData;
use cipmaster_core::encoding::reader::Reader;
use cipmaster_datalink::enip::encapsulation::decode_frame;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok((_, body)) = decode_frame(data) {
        let mut r = Reader::new(body);
        let _ = CommandData::decode(&mut r);
    }
});
