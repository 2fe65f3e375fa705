//! Lightweight simulated EtherNet/IP adapter.
//!
//! [`SimulatedAdapter`] answers RegisterSession, Forward-Open/Close, the
//! attribute list services and Get-Instance-List. [`SimulatedTransport`]
//! plugs it into a [`WireClient`](crate::WireClient) so a whole session can
//! run without hardware; cyclic frames travel over in-memory channels.

use crate::ClientError;
use cipmaster_core::cip::services::{
    AttributeReply, ForwardCloseReply, ForwardCloseRequest, ForwardOpenReply, ForwardOpenRequest,
    GetAttributeListRequest, SetAttributeListRequest, UnconnectedSend, SERVICE_FORWARD_CLOSE,
    SERVICE_FORWARD_OPEN, SERVICE_GET_ATTRIBUTE_LIST, SERVICE_GET_INSTANCE_LIST,
    SERVICE_SET_ATTRIBUTE_LIST, SERVICE_UNCONNECTED_SEND,
};
use cipmaster_core::cip::status::{
    STATUS_ATTRIBUTE_NOT_SUPPORTED, STATUS_PARTIAL_TRANSFER, STATUS_PATH_DESTINATION_UNKNOWN,
    STATUS_SERVICE_NOT_SUPPORTED,
};
use cipmaster_core::cip::{MessageRequest, MessageResponse, ResponseStatus};
use cipmaster_core::cpf::{
    CommandData, CpfItem, ITEM_CONNECTED_ADDRESS, ITEM_CONNECTED_DATA, ITEM_UNCONNECTED_DATA,
};
use cipmaster_core::encoding::{reader::Reader, writer::Writer};
use cipmaster_core::io::{CipIoHeader, CyclicFrame, SequencedAddress};
use cipmaster_core::{DecodeError, EncodeError};
use cipmaster_datalink::enip::encapsulation::{decode_frame, encode_frame, RegisterSessionData};
use cipmaster_datalink::{CipTransport, DataLinkError, EncapsulationCommand};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

/// Instances returned per Get-Instance-List reply before a partial status.
const INSTANCE_PAGE: usize = 2;

type AttributeKey = (u16, u32, u16);

#[derive(Debug)]
struct AdapterState {
    next_session: u32,
    connection: Option<(u32, u32)>,
    forward_open_status: u8,
    attributes: HashMap<AttributeKey, Vec<u8>>,
    instances: HashMap<u16, Vec<u32>>,
}

/// A simulated adapter with an attribute store.
#[derive(Debug)]
pub struct SimulatedAdapter {
    state: Mutex<AdapterState>,
}

impl Default for SimulatedAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedAdapter {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(AdapterState {
                next_session: 0x0000_1001,
                connection: None,
                forward_open_status: 0,
                attributes: HashMap::new(),
                instances: HashMap::new(),
            }),
        }
    }

    pub fn with_attribute(
        self,
        class_id: u16,
        instance_id: u32,
        attribute_id: u16,
        value: Vec<u8>,
    ) -> Self {
        self.lock()
            .attributes
            .insert((class_id, instance_id, attribute_id), value);
        self
    }

    pub fn with_instances(self, class_id: u16, mut instances: Vec<u32>) -> Self {
        instances.sort_unstable();
        self.lock().instances.insert(class_id, instances);
        self
    }

    /// Makes every Forward-Open fail with `general` as CIP status.
    pub fn with_forward_open_status(self, general: u8) -> Self {
        self.lock().forward_open_status = general;
        self
    }

    /// OT and TO connection ids of the open connection, if any.
    pub fn connection_ids(&self) -> Option<(u32, u32)> {
        self.lock().connection
    }

    pub fn attribute(&self, class_id: u16, instance_id: u32, attribute_id: u16) -> Option<Vec<u8>> {
        self.lock()
            .attributes
            .get(&(class_id, instance_id, attribute_id))
            .cloned()
    }

    fn lock(&self) -> MutexGuard<'_, AdapterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Answers one encapsulation frame with a complete reply frame.
    pub fn handle_explicit(&self, frame: &[u8]) -> Result<Vec<u8>, ClientError> {
        let (header, body) = decode_frame(frame)?;
        match header.command {
            EncapsulationCommand::RegisterSession => {
                let mut r = Reader::new(body);
                let request = RegisterSessionData::decode(&mut r)?;
                let handle = {
                    let mut state = self.lock();
                    let handle = state.next_session;
                    state.next_session = handle.wrapping_add(1);
                    handle
                };
                Ok(encode_frame(
                    EncapsulationCommand::RegisterSession,
                    handle,
                    &request.to_bytes(),
                )?)
            }
            EncapsulationCommand::SendRRData => {
                let mut r = Reader::new(body);
                let command = CommandData::decode(&mut r)?;
                let message = command
                    .item(ITEM_UNCONNECTED_DATA)
                    .ok_or(DecodeError::MissingItem(ITEM_UNCONNECTED_DATA))?;
                let reply = self.handle_cip(message.data)?;
                let reply = CommandData::new(
                    0,
                    vec![
                        CpfItem::null_address(),
                        CpfItem::new(ITEM_UNCONNECTED_DATA, &reply),
                    ],
                );
                let body = encode_vec(reply.encoded_len(), |w| reply.encode(w))?;
                Ok(encode_frame(
                    EncapsulationCommand::SendRRData,
                    header.session_handle,
                    &body,
                )?)
            }
            EncapsulationCommand::SendUnitData => {
                let mut r = Reader::new(body);
                let command = CommandData::decode(&mut r)?;
                let address = command
                    .item(ITEM_CONNECTED_ADDRESS)
                    .ok_or(DecodeError::MissingItem(ITEM_CONNECTED_ADDRESS))?;
                let data = command
                    .item(ITEM_CONNECTED_DATA)
                    .ok_or(DecodeError::MissingItem(ITEM_CONNECTED_DATA))?;
                let mut r = Reader::new(data.data);
                let sequence = r.read_le_u16()?;
                let reply = self.handle_cip(r.read_rest())?;

                let mut connected = sequence.to_le_bytes().to_vec();
                connected.extend_from_slice(&reply);
                let reply = CommandData::new(
                    0,
                    vec![
                        CpfItem::new(ITEM_CONNECTED_ADDRESS, address.data),
                        CpfItem::new(ITEM_CONNECTED_DATA, &connected),
                    ],
                );
                let body = encode_vec(reply.encoded_len(), |w| reply.encode(w))?;
                Ok(encode_frame(
                    EncapsulationCommand::SendUnitData,
                    header.session_handle,
                    &body,
                )?)
            }
            other => Err(DecodeError::UnexpectedCommand(other.to_u16()).into()),
        }
    }

    fn handle_cip(&self, message: &[u8]) -> Result<Vec<u8>, ClientError> {
        let mut r = Reader::new(message);
        let request = MessageRequest::decode(&mut r)?;
        let mut data = Reader::new(request.data);

        match request.service {
            SERVICE_UNCONNECTED_SEND => {
                let send = UnconnectedSend::decode(&mut data)?;
                self.handle_cip(send.message)
            }
            SERVICE_FORWARD_OPEN => {
                let open = ForwardOpenRequest::decode(&mut data)?;
                let mut state = self.lock();
                if state.forward_open_status != 0 {
                    let general = state.forward_open_status;
                    return reply(request.service, general, &[]);
                }
                let ids = (
                    0x1000_0000 | u32::from(open.triad.connection_serial),
                    0x2000_0000 | u32::from(open.triad.connection_serial),
                );
                state.connection = Some(ids);
                let body = ForwardOpenReply {
                    ot_connection_id: ids.0,
                    to_connection_id: ids.1,
                    triad: open.triad,
                    ot_api_us: open.ot_rpi_us,
                    to_api_us: open.to_rpi_us,
                    application_reply: &[],
                };
                let body = encode_vec(32, |w| body.encode(w))?;
                reply(request.service, 0, &body)
            }
            SERVICE_FORWARD_CLOSE => {
                let close = ForwardCloseRequest::decode(&mut data)?;
                self.lock().connection = None;
                let body = ForwardCloseReply { triad: close.triad };
                let body = encode_vec(16, |w| body.encode(w))?;
                reply(request.service, 0, &body)
            }
            SERVICE_GET_ATTRIBUTE_LIST => {
                let ids = GetAttributeListRequest::decode_ids(&mut data)?;
                let Some((class_id, instance_id)) = request.path.class_and_instance() else {
                    return reply(request.service, STATUS_PATH_DESTINATION_UNKNOWN, &[]);
                };
                let [attribute_id] = ids.as_slice() else {
                    return reply(request.service, STATUS_SERVICE_NOT_SUPPORTED, &[]);
                };
                let value = self.attribute(class_id, instance_id, *attribute_id);
                let status = if value.is_some() {
                    0
                } else {
                    u16::from(STATUS_ATTRIBUTE_NOT_SUPPORTED)
                };
                let value = value.unwrap_or_default();
                let body = AttributeReply {
                    attribute_id: *attribute_id,
                    status,
                    value: &value,
                };
                let body = encode_vec(6 + value.len(), |w| body.encode(w))?;
                reply(request.service, 0, &body)
            }
            SERVICE_SET_ATTRIBUTE_LIST => {
                let set = SetAttributeListRequest::decode(&mut data)?;
                let Some((class_id, instance_id)) = request.path.class_and_instance() else {
                    return reply(request.service, STATUS_PATH_DESTINATION_UNKNOWN, &[]);
                };
                self.lock()
                    .attributes
                    .insert((class_id, instance_id, set.attribute_id), set.value.to_vec());
                let mut body = vec![0x01, 0x00];
                body.extend_from_slice(&set.attribute_id.to_le_bytes());
                body.extend_from_slice(&[0x00, 0x00]);
                reply(request.service, 0, &body)
            }
            SERVICE_GET_INSTANCE_LIST => {
                let Some((class_id, start)) = request.path.class_and_instance() else {
                    return reply(request.service, STATUS_PATH_DESTINATION_UNKNOWN, &[]);
                };
                let remaining: Vec<u32> = self
                    .lock()
                    .instances
                    .get(&class_id)
                    .map(|all| all.iter().copied().filter(|id| *id >= start).collect())
                    .unwrap_or_default();
                let page = &remaining[..remaining.len().min(INSTANCE_PAGE)];
                let body: Vec<u8> = page.iter().flat_map(|id| id.to_le_bytes()).collect();
                let status = if remaining.len() > page.len() {
                    STATUS_PARTIAL_TRANSFER
                } else {
                    0
                };
                reply(request.service, status, &body)
            }
            other => {
                log::debug!("simulator: unsupported service 0x{other:02x}");
                reply(other, STATUS_SERVICE_NOT_SUPPORTED, &[])
            }
        }
    }

    /// Frames `payload` as a cyclic input datagram on the open connection.
    pub fn cyclic_frame(&self, sequence: u16, payload: &[u8]) -> Result<Vec<u8>, ClientError> {
        let to_connection_id = self.lock().connection.map(|(_, to)| to).unwrap_or(0);
        let frame = CyclicFrame {
            address: Some(SequencedAddress {
                connection_id: to_connection_id,
                sequence: u32::from(sequence),
            }),
            io_header: CipIoHeader::new(sequence, 1),
            payload,
        };
        Ok(encode_vec(frame.encoded_len(), |w| frame.encode(w))?)
    }
}

fn reply(service: u8, general: u8, data: &[u8]) -> Result<Vec<u8>, ClientError> {
    let response = MessageResponse {
        service,
        status: Some(ResponseStatus {
            general,
            additional: Vec::new(),
        }),
        data,
    };
    Ok(encode_vec(4 + data.len(), |w| response.encode(w))?)
}

fn encode_vec<F>(len: usize, encode: F) -> Result<Vec<u8>, EncodeError>
where
    F: FnOnce(&mut Writer<'_>) -> Result<(), EncodeError>,
{
    let mut buf = vec![0u8; len];
    let mut w = Writer::new(&mut buf);
    encode(&mut w)?;
    let written = w.as_written().len();
    buf.truncate(written);
    Ok(buf)
}

/// Test-side end of a [`SimulatedTransport`]: pushes input frames toward
/// the master and collects its output frames.
#[derive(Debug)]
pub struct SimulatorLink {
    adapter: Arc<SimulatedAdapter>,
    to_master: mpsc::UnboundedSender<Vec<u8>>,
    from_master: mpsc::UnboundedReceiver<Vec<u8>>,
    sequence: u16,
}

impl SimulatorLink {
    pub fn adapter(&self) -> &Arc<SimulatedAdapter> {
        &self.adapter
    }

    /// Queues one cyclic input frame carrying `payload`.
    pub fn push_input(&mut self, payload: &[u8]) -> Result<(), ClientError> {
        let frame = self.adapter.cyclic_frame(self.sequence, payload)?;
        self.sequence = self.sequence.wrapping_add(1);
        self.push_raw(frame);
        Ok(())
    }

    pub fn push_raw(&self, frame: Vec<u8>) {
        let _ = self.to_master.send(frame);
    }

    /// Waits up to `wait` for the next cyclic output frame.
    pub async fn next_output(&mut self, wait: Duration) -> Option<Vec<u8>> {
        tokio::time::timeout(wait, self.from_master.recv())
            .await
            .ok()
            .flatten()
    }
}

/// In-memory [`CipTransport`] backed by a [`SimulatedAdapter`].
#[derive(Debug)]
pub struct SimulatedTransport {
    adapter: Arc<SimulatedAdapter>,
    replies: tokio::sync::Mutex<VecDeque<Vec<u8>>>,
    inbound: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    connected: AtomicBool,
    open: AtomicBool,
}

impl SimulatedTransport {
    pub fn new(adapter: Arc<SimulatedAdapter>) -> (Self, SimulatorLink) {
        let (to_master, inbound) = mpsc::unbounded_channel();
        let (outbound, from_master) = mpsc::unbounded_channel();
        (
            Self {
                adapter: adapter.clone(),
                replies: tokio::sync::Mutex::new(VecDeque::new()),
                inbound: tokio::sync::Mutex::new(inbound),
                outbound,
                connected: AtomicBool::new(true),
                open: AtomicBool::new(true),
            },
            SimulatorLink {
                adapter,
                to_master,
                from_master,
                sequence: 0,
            },
        )
    }

    /// A transport whose explicit channel never connected.
    pub fn unreachable(adapter: Arc<SimulatedAdapter>) -> (Self, SimulatorLink) {
        let (transport, link) = Self::new(adapter);
        transport.connected.store(false, Ordering::SeqCst);
        (transport, link)
    }
}

impl CipTransport for SimulatedTransport {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send_explicit(&self, frame: &[u8]) -> Result<(), DataLinkError> {
        if !self.is_connected() {
            return Err(DataLinkError::NotConnected);
        }
        let reply = self.adapter.handle_explicit(frame).map_err(|err| {
            log::debug!("simulator: rejecting frame: {err}");
            DataLinkError::InvalidFrame
        })?;
        self.replies.lock().await.push_back(reply);
        Ok(())
    }

    async fn recv_explicit(&self) -> Result<Vec<u8>, DataLinkError> {
        self.replies
            .lock()
            .await
            .pop_front()
            .ok_or(DataLinkError::Timeout)
    }

    async fn send_cyclic(&self, frame: &[u8]) -> Result<(), DataLinkError> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(DataLinkError::NotConnected);
        }
        let _ = self.outbound.send(frame.to_vec());
        Ok(())
    }

    async fn recv_cyclic(
        &self,
        buf: &mut [u8],
        wait: Duration,
    ) -> Result<Option<usize>, DataLinkError> {
        if !self.open.load(Ordering::SeqCst) {
            tokio::time::sleep(wait).await;
            return Ok(None);
        }
        let mut inbound = self.inbound.lock().await;
        match tokio::time::timeout(wait, inbound.recv()).await {
            Ok(Some(frame)) => {
                if frame.len() > buf.len() {
                    return Err(DataLinkError::FrameTooLarge);
                }
                buf[..frame.len()].copy_from_slice(&frame);
                Ok(Some(frame.len()))
            }
            Ok(None) => {
                drop(inbound);
                tokio::time::sleep(wait).await;
                Ok(None)
            }
            Err(_) => Ok(None),
        }
    }

    async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        self.open.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::{SimulatedAdapter, SimulatedTransport};
    use crate::{ClientError, WireClient};
    use cipmaster_core::connection::ConnectionParameters;
    use cipmaster_core::io::CyclicFrame;
    use std::sync::Arc;
    use std::time::Duration;

    fn adapter() -> Arc<SimulatedAdapter> {
        Arc::new(
            SimulatedAdapter::new()
                .with_attribute(0x01, 1, 7, b"\x05MPU-0".to_vec())
                .with_instances(0x04, vec![0x64, 0x65, 0x66, 0x96, 0x97]),
        )
    }

    #[tokio::test]
    async fn client_round_trip_against_simulator() {
        let (transport, link) = SimulatedTransport::new(adapter());
        let client = WireClient::with_transport(transport)
            .with_connection_parameters(ConnectionParameters::from_sizes(8, 2));

        client.register_session().await.unwrap();
        assert_eq!(client.session().session_handle, 0x1001);

        client.forward_open().await.unwrap();
        let (ot, to) = link.adapter().connection_ids().unwrap();
        assert_eq!(client.session().ot_connection_id, ot);
        assert_eq!(client.session().to_connection_id, to);

        let name = client.get_attribute(0x01, 1, 7).await.unwrap();
        assert_eq!(name, b"\x05MPU-0");

        client.set_attribute(0x04, 0x65, 3, &[1, 2, 3]).await.unwrap();
        assert_eq!(link.adapter().attribute(0x04, 0x65, 3), Some(vec![1, 2, 3]));

        let instances = client.get_list_of_instances(0x04).await.unwrap();
        assert_eq!(instances, vec![0x64, 0x65, 0x66, 0x96, 0x97]);

        client.forward_close().await.unwrap();
        assert!(link.adapter().connection_ids().is_none());
    }

    #[tokio::test]
    async fn missing_attribute_is_reported() {
        let (transport, _link) = SimulatedTransport::new(adapter());
        let client = WireClient::with_transport(transport);
        let err = client.get_attribute(0x01, 1, 99).await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::AttributeMismatch {
                expected: 99,
                actual: 99,
                status: 0x14
            }
        ));
    }

    #[tokio::test]
    async fn rejected_forward_open_leaves_ids_unset() {
        let adapter = Arc::new(SimulatedAdapter::new().with_forward_open_status(0x01));
        let (transport, _link) = SimulatedTransport::new(adapter);
        let client = WireClient::with_transport(transport)
            .with_connection_parameters(ConnectionParameters::from_sizes(8, 2));
        assert!(client.forward_open().await.is_err());
        assert_eq!(client.session().ot_connection_id, 0);
    }

    #[tokio::test]
    async fn cyclic_frames_flow_both_ways() {
        let (transport, mut link) = SimulatedTransport::new(adapter());
        let client = WireClient::with_transport(transport);

        link.push_input(&[0xAA, 0xBB]).unwrap();
        let frame = client.recv_cyclic(Duration::from_millis(100)).await.unwrap();
        assert_eq!(frame.payload, vec![0xAA, 0xBB]);
        assert!(client
            .recv_cyclic(Duration::from_millis(10))
            .await
            .is_none());

        assert!(client.send_cyclic(65500, 1, &[1, 2]).await.unwrap());
        let out = link.next_output(Duration::from_millis(100)).await.unwrap();
        let decoded = CyclicFrame::decode(&out).unwrap();
        assert_eq!(decoded.io_header.sequence_count, 65500);
        assert_eq!(decoded.payload, &[1, 2]);

        client.close().await;
        assert!(!client.send_cyclic(1, 1, &[0]).await.unwrap());
        assert!(!client.is_connected());
    }
}
