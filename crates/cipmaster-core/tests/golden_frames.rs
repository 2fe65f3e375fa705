use cipmaster_core::cip::services::{
    ForwardCloseRequest, ForwardOpenRequest, GetAttributeListRequest, SetAttributeListRequest,
    UnconnectedSend, SERVICE_FORWARD_CLOSE, SERVICE_FORWARD_OPEN, SERVICE_GET_ATTRIBUTE_LIST,
    SERVICE_SET_ATTRIBUTE_LIST, SERVICE_UNCONNECTED_SEND,
};
use cipmaster_core::cip::{CipPath, MessageRequest, MessageResponse};
use cipmaster_core::connection::ConnectionParameters;
use cipmaster_core::cpf::{CommandData, CpfItem, ITEM_UNCONNECTED_DATA};
use cipmaster_core::encoding::{reader::Reader, writer::Writer};
use cipmaster_core::io::{CipIoHeader, CyclicFrame, SequencedAddress};

const CONNECTION_PATH: [u8; 18] = [
    0x34, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x20, 0x04, 0x24, 0x01, 0x2C,
    0x65, 0x2C, 0x64,
];

fn message(service: u8, path: CipPath, body: &[u8]) -> Vec<u8> {
    let mut buf = [0u8; 256];
    let mut w = Writer::new(&mut buf);
    MessageRequest::new(service, path, body)
        .encode(&mut w)
        .unwrap();
    w.as_written().to_vec()
}

#[test]
fn forward_open_frame_matches_fixture() {
    let params = ConnectionParameters::from_sizes(8, 2);
    let mut body = [0u8; 128];
    let mut w = Writer::new(&mut body);
    ForwardOpenRequest::new(params.ot_param as u16, params.to_param as u16)
        .encode(&mut w)
        .unwrap();
    let frame = message(
        SERVICE_FORWARD_OPEN,
        CipPath::CONNECTION_MANAGER,
        w.as_written(),
    );

    let mut expected = vec![
        0x54, 0x02, 0x20, 0x06, 0x24, 0x01, 0x0A, 0xF9, 0x31, 0x00, 0x00, 0x80, 0x30, 0x00, 0xFE,
        0x80, 0x37, 0x13, 0x4D, 0x00, 0xEF, 0xBE, 0xAD, 0xDE, 0x00, 0x00, 0x00, 0x00, 0x00, 0x12,
        0x7A, 0x00, 0x0E, 0x48, 0x00, 0x12, 0x7A, 0x00, 0x08, 0x28, 0xA3, 0x09,
    ];
    expected.extend_from_slice(&CONNECTION_PATH);
    assert_eq!(frame, expected);
}

#[test]
fn forward_close_frame_matches_fixture() {
    let mut body = [0u8; 64];
    let mut w = Writer::new(&mut body);
    ForwardCloseRequest::new().encode(&mut w).unwrap();
    let frame = message(
        SERVICE_FORWARD_CLOSE,
        CipPath::CONNECTION_MANAGER,
        w.as_written(),
    );

    let mut expected = vec![
        0x4E, 0x02, 0x20, 0x06, 0x24, 0x01, 0x0A, 0xF9, 0x37, 0x13, 0x4D, 0x00, 0xEF, 0xBE, 0xAD,
        0xDE, 0x09, 0x00,
    ];
    expected.extend_from_slice(&CONNECTION_PATH);
    assert_eq!(frame, expected);
}

#[test]
fn routed_get_attribute_matches_fixture() {
    let mut body = [0u8; 16];
    let mut w = Writer::new(&mut body);
    GetAttributeListRequest::new(&[7]).encode(&mut w).unwrap();
    let inner = message(
        SERVICE_GET_ATTRIBUTE_LIST,
        CipPath::class_instance(1, 1),
        w.as_written(),
    );

    let mut routed = [0u8; 64];
    let mut w = Writer::new(&mut routed);
    UnconnectedSend::new(&inner).encode(&mut w).unwrap();
    let frame = message(
        SERVICE_UNCONNECTED_SEND,
        CipPath::CONNECTION_MANAGER,
        w.as_written(),
    );

    assert_eq!(
        frame,
        vec![
            0x52, 0x02, 0x20, 0x06, 0x24, 0x01, 0x05, 0x9D, 0x0A, 0x00, 0x03, 0x02, 0x20, 0x01,
            0x24, 0x01, 0x01, 0x00, 0x07, 0x00, 0x01, 0x00, 0x01, 0x00,
        ]
    );
}

#[test]
fn routed_set_attribute_with_odd_value_is_padded() {
    let mut body = [0u8; 16];
    let mut w = Writer::new(&mut body);
    SetAttributeListRequest::new(3, &[0x2A]).encode(&mut w).unwrap();
    let inner = message(
        SERVICE_SET_ATTRIBUTE_LIST,
        CipPath::class_instance(0x04, 0x65),
        w.as_written(),
    );
    assert_eq!(inner.len(), 11);

    let mut routed = [0u8; 64];
    let mut w = Writer::new(&mut routed);
    UnconnectedSend::new(&inner).encode(&mut w).unwrap();
    let out = w.as_written();
    assert_eq!(&out[2..4], &[0x0B, 0x00]);
    assert_eq!(out[4 + 11], 0x00);
    assert_eq!(&out[out.len() - 4..], &[0x01, 0x00, 0x01, 0x00]);
}

#[test]
fn rr_data_reply_decodes_forward_open_ids() {
    let reply = [
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0xB2, 0x00, 0x1E,
        0x00, 0xD4, 0x00, 0x00, 0x00, 0x11, 0x00, 0x00, 0x00, 0x22, 0x00, 0x00, 0x00, 0x37, 0x13,
        0x4D, 0x00, 0xEF, 0xBE, 0xAD, 0xDE, 0x10, 0x27, 0x00, 0x00, 0x10, 0x27, 0x00, 0x00, 0x00,
        0x00,
    ];
    let mut r = Reader::new(&reply);
    let data = CommandData::decode(&mut r).unwrap();
    let item = data.item(ITEM_UNCONNECTED_DATA).unwrap();
    let mut r = Reader::new(item.data);
    let response = MessageResponse::decode(&mut r).unwrap();
    assert_eq!(response.service, SERVICE_FORWARD_OPEN);
    assert_eq!(response.general_status(), 0);

    let mut r = Reader::new(response.data);
    let open = cipmaster_core::cip::services::ForwardOpenReply::decode(&mut r).unwrap();
    assert_eq!(open.ot_connection_id, 0x11);
    assert_eq!(open.to_connection_id, 0x22);
    assert_eq!(open.ot_api_us, 10_000);
}

#[test]
fn cyclic_output_matches_fixture() {
    let frame = CyclicFrame {
        address: Some(SequencedAddress {
            connection_id: 0x8000_0031,
            sequence: 1,
        }),
        io_header: CipIoHeader::new(0xFFFF, 1),
        payload: &[0x01, 0x02, 0x03, 0x04],
    };
    let mut buf = [0u8; 64];
    let mut w = Writer::new(&mut buf);
    frame.encode(&mut w).unwrap();
    assert_eq!(
        w.as_written(),
        &[
            0x02, 0x00, 0x02, 0x80, 0x08, 0x00, 0x31, 0x00, 0x00, 0x80, 0x01, 0x00, 0x00, 0x00,
            0xB1, 0x00, 0x07, 0x00, 0xFF, 0xFF, 0x01, 0x01, 0x02, 0x03, 0x04,
        ]
    );
}

#[test]
fn null_address_item_is_empty() {
    let mut buf = [0u8; 8];
    let mut w = Writer::new(&mut buf);
    CpfItem::null_address().encode(&mut w).unwrap();
    assert_eq!(w.as_written(), &[0, 0, 0, 0]);
}
