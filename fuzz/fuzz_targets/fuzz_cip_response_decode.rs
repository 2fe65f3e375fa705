#![no_main]

use cipmaster_core::cip::services::{decode_instance_list, AttributeReply, ForwardOpenReply};
use cipmaster_core::cip::MessageResponse;
use cipmaster_core::encoding::reader::Reader;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut r = Reader::new(data);
    if let Ok(response) = MessageResponse::decode(&mut r) {
        let _ = ForwardOpenReply::decode(&mut Reader::new(response.data));
        let _ = AttributeReply::decode_single(&mut Reader::new(response.data));
        let _ = decode_instance_list(response.data);
    }
});
