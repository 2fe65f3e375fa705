use crate::ClientError;
use cipmaster_core::cip::services::{
    decode_instance_list, AttributeReply, ForwardCloseRequest, ForwardOpenReply,
    ForwardOpenRequest, GetAttributeListRequest, SetAttributeListRequest, UnconnectedSend,
    SERVICE_FORWARD_CLOSE, SERVICE_FORWARD_OPEN, SERVICE_GET_ATTRIBUTE_LIST,
    SERVICE_GET_INSTANCE_LIST, SERVICE_SET_ATTRIBUTE_LIST, SERVICE_UNCONNECTED_SEND,
};
use cipmaster_core::cip::status::{
    general_status_name, status_details, STATUS_PARTIAL_TRANSFER, STATUS_SUCCESS,
};
use cipmaster_core::cip::{CipPath, MessageResponse};
use cipmaster_core::connection::ConnectionParameters;
use cipmaster_core::cpf::{
    CommandData, CpfItem, ITEM_CONNECTED_ADDRESS, ITEM_CONNECTED_DATA, ITEM_UNCONNECTED_DATA,
};
use cipmaster_core::encoding::{reader::Reader, writer::Writer};
use cipmaster_core::io::{CipIoHeader, CyclicFrame, SequencedAddress};
use cipmaster_core::{DecodeError, EncodeError};
use cipmaster_datalink::enip::encapsulation::{
    decode_frame, encode_frame, EncapsulationHeader, RegisterSessionData,
};
use cipmaster_datalink::{
    CipTransport, DataLinkError, EncapsulationCommand, EnipEndpoint, EnipTransport,
};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::time::timeout;

const RR_DATA_TIMEOUT: u16 = 255;
const UNIT_DATA_TIMEOUT: u16 = 0;
const MAX_DATAGRAM_LEN: usize = 2000;

/// Per-connection counters and identifiers negotiated with the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WireSession {
    pub session_handle: u32,
    pub ot_connection_id: u32,
    pub to_connection_id: u32,
    /// Sequence written into the sequenced address item; wraps at 16 bits.
    pub io_sequence: u16,
    pub unit_sequence: u16,
}

impl Default for WireSession {
    fn default() -> Self {
        Self {
            session_handle: 0,
            ot_connection_id: 0,
            to_connection_id: 0,
            io_sequence: 1,
            unit_sequence: 1,
        }
    }
}

/// One received cyclic datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoFrame {
    pub header: CipIoHeader,
    /// Connection id from the sequenced address item, when one was present.
    pub connection_id: Option<u32>,
    pub payload: Vec<u8>,
}

/// EtherNet/IP originator talking to a single adapter.
///
/// Explicit requests are serialized so each request reads its own reply.
/// Cyclic I/O bypasses that lock.
#[derive(Debug)]
pub struct WireClient<T: CipTransport> {
    transport: T,
    session: Mutex<WireSession>,
    request_io_lock: tokio::sync::Mutex<()>,
    params: Option<ConnectionParameters>,
    response_timeout: Option<Duration>,
}

impl WireClient<EnipTransport> {
    /// Opens the sockets for `endpoint` and registers an encapsulation
    /// session. An unreachable adapter yields a client that reports
    /// `is_connected() == false` rather than an error.
    pub async fn open(endpoint: EnipEndpoint) -> Result<Self, ClientError> {
        let transport = EnipTransport::open(endpoint).await;
        let client = Self::with_transport(transport);
        client.register_session().await?;
        Ok(client)
    }
}

impl<T: CipTransport> WireClient<T> {
    pub fn with_transport(transport: T) -> Self {
        Self {
            transport,
            session: Mutex::new(WireSession::default()),
            request_io_lock: tokio::sync::Mutex::new(()),
            params: None,
            response_timeout: None,
        }
    }

    pub fn with_connection_parameters(mut self, params: ConnectionParameters) -> Self {
        self.params = Some(params);
        self
    }

    /// Bounds each explicit reply wait. Without it a silent adapter blocks
    /// the request indefinitely.
    pub fn with_response_timeout(mut self, response_timeout: Duration) -> Self {
        self.response_timeout = Some(response_timeout);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn connection_parameters(&self) -> Option<ConnectionParameters> {
        self.params
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Snapshot of the negotiated identifiers and counters.
    pub fn session(&self) -> WireSession {
        *self.lock_session()
    }

    fn lock_session(&self) -> MutexGuard<'_, WireSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sends RegisterSession and stores the returned handle. Does nothing
    /// when the explicit channel never connected.
    pub async fn register_session(&self) -> Result<(), ClientError> {
        if !self.transport.is_connected() {
            log::warn!("explicit channel not connected; skipping session registration");
            return Ok(());
        }
        let body = RegisterSessionData::default().to_bytes();
        let (header, _) = self
            .exchange(EncapsulationCommand::RegisterSession, &body)
            .await?;
        self.lock_session().session_handle = header.session_handle;
        log::debug!("registered session 0x{:08x}", header.session_handle);
        Ok(())
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(skip(self), level = "debug")
    )]
    pub async fn forward_open(&self) -> Result<(), ClientError> {
        let params = self
            .params
            .ok_or(ClientError::MissingConnectionParameters)?;
        let ot_params = u16::try_from(params.ot_param).map_err(|_| EncodeError::ValueOutOfRange)?;
        let to_params = u16::try_from(params.to_param).map_err(|_| EncodeError::ValueOutOfRange)?;
        let request = ForwardOpenRequest::new(ot_params, to_params);
        let message = self.cip_message(SERVICE_FORWARD_OPEN, CipPath::CONNECTION_MANAGER, |w| {
            request.encode(w)
        })?;

        let reply = self.request_rr(&message).await?;
        let response = decode_response(&reply, SERVICE_FORWARD_OPEN)?;
        self.accept_forward_open(&response)
    }

    fn accept_forward_open(&self, response: &MessageResponse<'_>) -> Result<(), ClientError> {
        check_status("Failed to Forward Open CIP connection", response)?;
        let mut r = Reader::new(response.data);
        let open = ForwardOpenReply::decode(&mut r)?;
        let mut session = self.lock_session();
        session.ot_connection_id = open.ot_connection_id;
        session.to_connection_id = open.to_connection_id;
        log::info!(
            "forward open accepted: OT 0x{:08x}, TO 0x{:08x}",
            open.ot_connection_id,
            open.to_connection_id
        );
        Ok(())
    }

    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(skip(self), level = "debug")
    )]
    pub async fn forward_close(&self) -> Result<(), ClientError> {
        let request = ForwardCloseRequest::new();
        let message = self.cip_message(SERVICE_FORWARD_CLOSE, CipPath::CONNECTION_MANAGER, |w| {
            request.encode(w)
        })?;

        let reply = self.request_rr(&message).await?;
        let response = decode_response(&reply, SERVICE_FORWARD_CLOSE)?;
        check_status("Failed to Forward Close CIP connection", &response)?;
        let mut session = self.lock_session();
        session.ot_connection_id = 0;
        session.to_connection_id = 0;
        log::info!("forward close accepted");
        Ok(())
    }

    /// Reads one attribute with Get_Attribute_List routed through the
    /// connection manager and returns its raw value bytes.
    pub async fn get_attribute(
        &self,
        class_id: u16,
        instance_id: u32,
        attribute_id: u16,
    ) -> Result<Vec<u8>, ClientError> {
        let attributes = [attribute_id];
        let request = GetAttributeListRequest::new(&attributes);
        let inner = self.cip_message(
            SERVICE_GET_ATTRIBUTE_LIST,
            CipPath::class_instance(class_id, instance_id),
            |w| request.encode(w),
        )?;

        let reply = self.routed(&inner).await?;
        let response = decode_response(&reply, SERVICE_GET_ATTRIBUTE_LIST)?;
        check_status("CIP get attribute error", &response)?;
        let mut r = Reader::new(response.data);
        let attribute = AttributeReply::decode_single(&mut r)?;
        if attribute.attribute_id != attribute_id || attribute.status != 0 {
            return Err(ClientError::AttributeMismatch {
                expected: attribute_id,
                actual: attribute.attribute_id,
                status: attribute.status,
            });
        }
        Ok(attribute.value.to_vec())
    }

    pub async fn set_attribute(
        &self,
        class_id: u16,
        instance_id: u32,
        attribute_id: u16,
        value: &[u8],
    ) -> Result<(), ClientError> {
        let request = SetAttributeListRequest::new(attribute_id, value);
        let inner = self.cip_message(
            SERVICE_SET_ATTRIBUTE_LIST,
            CipPath::class_instance(class_id, instance_id),
            |w| request.encode(w),
        )?;

        let reply = self.routed(&inner).await?;
        let response = decode_response(&reply, SERVICE_SET_ATTRIBUTE_LIST)?;
        check_status("CIP set attribute error", &response)
    }

    /// Lists the instances of `class_id`, re-querying after each partial
    /// reply from the instance following the last one received.
    pub async fn get_list_of_instances(&self, class_id: u16) -> Result<Vec<u32>, ClientError> {
        let mut start_instance = 0u32;
        let mut instances = Vec::new();
        loop {
            let inner = self.cip_message(
                SERVICE_GET_INSTANCE_LIST,
                CipPath::class_instance(class_id, start_instance),
                |_| Ok(()),
            )?;
            let reply = self.routed(&inner).await?;
            let response = decode_response(&reply, SERVICE_GET_INSTANCE_LIST)?;
            let batch = decode_instance_list(response.data)?;
            instances.extend_from_slice(&batch);

            match response.general_status() {
                STATUS_SUCCESS => return Ok(instances),
                STATUS_PARTIAL_TRANSFER => {
                    let last = batch.last().ok_or(ClientError::UnexpectedReply)?;
                    start_instance = last.checked_add(1).ok_or(ClientError::UnexpectedReply)?;
                }
                _ => {
                    check_status("Error in Get Instance List response", &response)?;
                    return Ok(instances);
                }
            }
        }
    }

    /// Sends a CIP message over the connected explicit channel and returns
    /// the CIP bytes of the reply, sequence number stripped.
    pub async fn send_connected(&self, message: &[u8]) -> Result<Vec<u8>, ClientError> {
        let (connection_id, sequence) = {
            let mut session = self.lock_session();
            let sequence = session.unit_sequence;
            session.unit_sequence = sequence.wrapping_add(1);
            (session.ot_connection_id, sequence)
        };
        let mut data = Vec::with_capacity(2 + message.len());
        data.extend_from_slice(&sequence.to_le_bytes());
        data.extend_from_slice(message);
        let address = connection_id.to_le_bytes();
        let command = CommandData::new(
            UNIT_DATA_TIMEOUT,
            vec![
                CpfItem::new(ITEM_CONNECTED_ADDRESS, &address),
                CpfItem::new(ITEM_CONNECTED_DATA, &data),
            ],
        );
        let body = self.encode_with_growth(|w| command.encode(w))?;

        let (_, reply) = self
            .exchange(EncapsulationCommand::SendUnitData, &body)
            .await?;
        let mut r = Reader::new(&reply);
        let reply = CommandData::decode(&mut r)?;
        let item = reply
            .item(ITEM_CONNECTED_DATA)
            .ok_or(DecodeError::MissingItem(ITEM_CONNECTED_DATA))?;
        let mut r = Reader::new(item.data);
        let _sequence = r.read_le_u16()?;
        Ok(r.read_rest().to_vec())
    }

    /// Sends one cyclic output datagram. Returns `Ok(false)` when no unicast
    /// socket exists.
    pub async fn send_cyclic(
        &self,
        app_sequence: u16,
        header: u8,
        data: &[u8],
    ) -> Result<bool, ClientError> {
        let address = {
            let mut session = self.lock_session();
            let sequence = session.io_sequence;
            session.io_sequence = sequence.wrapping_add(1);
            SequencedAddress {
                connection_id: session.ot_connection_id,
                sequence: u32::from(sequence),
            }
        };
        let frame = CyclicFrame {
            address: Some(address),
            io_header: CipIoHeader::new(app_sequence, header),
            payload: data,
        };
        let mut buf = vec![0u8; frame.encoded_len()];
        let mut w = Writer::new(&mut buf);
        frame.encode(&mut w)?;

        match self.transport.send_cyclic(&buf).await {
            Ok(()) => Ok(true),
            Err(DataLinkError::NotConnected) => {
                log::warn!("no unicast socket; cyclic frame not sent");
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Waits up to `wait` for one cyclic input datagram. Timeouts, socket
    /// errors and undecodable datagrams all yield `None`.
    pub async fn recv_cyclic(&self, wait: Duration) -> Option<IoFrame> {
        let mut buf = [0u8; MAX_DATAGRAM_LEN];
        let n = match self.transport.recv_cyclic(&mut buf, wait).await {
            Ok(Some(n)) => n,
            Ok(None) => {
                log::debug!("no cyclic frame within {wait:?}");
                return None;
            }
            Err(err) => {
                log::warn!("socket error while waiting for cyclic frame: {err}");
                return None;
            }
        };

        let frame = match CyclicFrame::decode(&buf[..n]) {
            Ok(frame) => frame,
            Err(DecodeError::MissingItem(type_id)) => {
                log::debug!("ignoring datagram without item 0x{type_id:04x}");
                return None;
            }
            Err(err) => {
                log::warn!("failed to decode cyclic datagram: {err}");
                return None;
            }
        };

        let connection_id = frame.address.map(|address| address.connection_id);
        if let Some(id) = connection_id {
            let session = self.session();
            let expected = [session.to_connection_id, session.ot_connection_id];
            let known = expected.iter().any(|cid| *cid != 0);
            if known && !expected.contains(&id) {
                log::debug!(
                    "sequenced connection id 0x{id:08x} does not match TO 0x{:08x} / OT 0x{:08x}",
                    session.to_connection_id,
                    session.ot_connection_id
                );
            }
        }

        Some(IoFrame {
            header: frame.io_header,
            connection_id,
            payload: frame.payload.to_vec(),
        })
    }

    /// Closes every socket. Identifiers are kept.
    pub async fn close(&self) {
        self.transport.close().await;
    }

    async fn routed(&self, inner: &[u8]) -> Result<Vec<u8>, ClientError> {
        let send = UnconnectedSend::new(inner);
        let message = self.cip_message(
            SERVICE_UNCONNECTED_SEND,
            CipPath::CONNECTION_MANAGER,
            |w| send.encode(w),
        )?;
        self.request_rr(&message).await
    }

    /// Wraps `message` in SendRRData and returns the unconnected data item
    /// of the reply.
    async fn request_rr(&self, message: &[u8]) -> Result<Vec<u8>, ClientError> {
        let command = CommandData::new(
            RR_DATA_TIMEOUT,
            vec![
                CpfItem::null_address(),
                CpfItem::new(ITEM_UNCONNECTED_DATA, message),
            ],
        );
        let body = self.encode_with_growth(|w| command.encode(w))?;

        let (_, reply) = self
            .exchange(EncapsulationCommand::SendRRData, &body)
            .await?;
        let mut r = Reader::new(&reply);
        let reply = CommandData::decode(&mut r)?;
        let item = reply
            .item(ITEM_UNCONNECTED_DATA)
            .ok_or(DecodeError::MissingItem(ITEM_UNCONNECTED_DATA))?;
        Ok(item.data.to_vec())
    }

    async fn exchange(
        &self,
        command: EncapsulationCommand,
        body: &[u8],
    ) -> Result<(EncapsulationHeader, Vec<u8>), ClientError> {
        if !self.transport.is_connected() {
            return Err(ClientError::NotConnected);
        }
        let session_handle = self.lock_session().session_handle;
        let frame = encode_frame(command, session_handle, body)?;

        let _io_guard = self.request_io_lock.lock().await;
        self.transport.send_explicit(&frame).await?;
        let reply = self.await_reply().await?;

        let (header, body) = decode_frame(&reply)?;
        if header.command != command {
            return Err(DecodeError::UnexpectedCommand(header.command.to_u16()).into());
        }
        if header.status != 0 {
            return Err(ClientError::EncapsulationStatus(header.status));
        }
        Ok((header, body.to_vec()))
    }

    async fn await_reply(&self) -> Result<Vec<u8>, ClientError> {
        match self.response_timeout {
            Some(limit) => timeout(limit, self.transport.recv_explicit())
                .await
                .map_err(|_| ClientError::Timeout)?
                .map_err(ClientError::from),
            None => Ok(self.transport.recv_explicit().await?),
        }
    }

    fn cip_message<F>(&self, service: u8, path: CipPath, body: F) -> Result<Vec<u8>, ClientError>
    where
        F: Fn(&mut Writer<'_>) -> Result<(), EncodeError>,
    {
        self.encode_with_growth(|w| {
            w.write_u8(service)?;
            path.encode(w)?;
            body(w)
        })
    }

    fn encode_with_growth<F>(&self, mut encode: F) -> Result<Vec<u8>, ClientError>
    where
        F: FnMut(&mut Writer<'_>) -> Result<(), EncodeError>,
    {
        for size in [512usize, 1024, 2048, 4096, 8192, 16_384, 32_768, 65_536] {
            let mut buf = vec![0u8; size];
            let mut w = Writer::new(&mut buf);
            match encode(&mut w) {
                Ok(()) => {
                    let written_len = w.as_written().len();
                    buf.truncate(written_len);
                    return Ok(buf);
                }
                Err(EncodeError::BufferTooSmall) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(ClientError::RequestTooLarge)
    }
}

/// Decodes a CIP reply. Routed requests may be answered either by the
/// embedded service or by the Unconnected Send itself.
fn decode_response(reply: &[u8], expected_service: u8) -> Result<MessageResponse<'_>, ClientError> {
    let mut r = Reader::new(reply);
    let response = MessageResponse::decode(&mut r)?;
    if response.service != expected_service && response.service != SERVICE_UNCONNECTED_SEND {
        return Err(DecodeError::UnexpectedService(response.service).into());
    }
    Ok(response)
}

fn check_status(context: &'static str, response: &MessageResponse<'_>) -> Result<(), ClientError> {
    let (general, status) = status_details(response.status.as_ref());
    if general != STATUS_SUCCESS {
        let additional = status.map(|s| s.additional.clone()).unwrap_or_default();
        let name = general_status_name(general);
        log::error!("{context}: status 0x{general:02x} ({name}) additional {additional:04x?}");
        return Err(ClientError::CipStatus {
            context,
            general,
            additional,
            name,
        });
    }
    if status.is_none() {
        log::debug!("{context}: CIP response omitted status; assuming success");
    }
    Ok(())
}
