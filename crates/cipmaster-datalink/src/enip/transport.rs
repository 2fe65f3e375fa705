use crate::enip::encapsulation::ENCAPSULATION_HEADER_LEN;
use crate::{CipTransport, DataLinkError, EnipEndpoint};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout, Duration};

type SocketSlot = RwLock<Option<Arc<UdpSocket>>>;

/// TCP explicit channel plus the UDP multicast receive and unicast send
/// sockets of one adapter.
///
/// Opening never fails as a whole: each socket that cannot be set up is
/// logged and left out, and the matching operations degrade (explicit calls
/// report [`DataLinkError::NotConnected`], cyclic receive reports no data).
#[derive(Debug)]
pub struct EnipTransport {
    endpoint: EnipEndpoint,
    local_ip: Option<Ipv4Addr>,
    connected: AtomicBool,
    reader: Mutex<Option<OwnedReadHalf>>,
    writer: Mutex<Option<OwnedWriteHalf>>,
    multicast: SocketSlot,
    unicast: SocketSlot,
}

impl EnipTransport {
    pub async fn open(endpoint: EnipEndpoint) -> Self {
        let explicit_addr = endpoint.explicit_addr();
        let stream = match timeout(endpoint.connect_timeout, TcpStream::connect(explicit_addr)).await
        {
            Ok(Ok(stream)) => Some(stream),
            Ok(Err(err)) => {
                log::warn!("tcp connect to {explicit_addr} failed: {err}; continuing without sending anything");
                None
            }
            Err(_) => {
                log::warn!("tcp connect to {explicit_addr} timed out; continuing without sending anything");
                None
            }
        };

        let local_ip = stream
            .as_ref()
            .and_then(|stream| stream.local_addr().ok())
            .and_then(|addr| match addr.ip() {
                IpAddr::V4(ip) => Some(ip),
                IpAddr::V6(_) => None,
            });
        if let Some(ip) = local_ip {
            log::debug!("detected local interface {ip} for cip session");
        }

        let multicast = match open_multicast(&endpoint, local_ip) {
            Ok(socket) => Some(Arc::new(socket)),
            Err(err) => {
                log::warn!(
                    "not possible to manage multicast group {}: {err}",
                    endpoint.multicast_group
                );
                None
            }
        };

        let unicast = match open_unicast(endpoint.io_addr()).await {
            Ok(socket) => Some(Arc::new(socket)),
            Err(err) => {
                log::warn!(
                    "udp socket to {} failed: {err}; continuing without sending anything",
                    endpoint.io_addr()
                );
                None
            }
        };

        let (reader, writer) = match stream {
            Some(stream) => {
                let (reader, writer) = stream.into_split();
                (Some(reader), Some(writer))
            }
            None => (None, None),
        };

        Self {
            endpoint,
            local_ip,
            connected: AtomicBool::new(reader.is_some()),
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            multicast: RwLock::new(multicast),
            unicast: RwLock::new(unicast),
        }
    }

    pub fn endpoint(&self) -> &EnipEndpoint {
        &self.endpoint
    }

    /// Local address of the explicit connection, used as the multicast interface.
    pub fn local_ip(&self) -> Option<Ipv4Addr> {
        self.local_ip
    }

    pub fn has_multicast(&self) -> bool {
        slot_socket(&self.multicast).is_some()
    }

    pub fn has_unicast(&self) -> bool {
        slot_socket(&self.unicast).is_some()
    }
}

fn slot_socket(slot: &SocketSlot) -> Option<Arc<UdpSocket>> {
    let guard = slot.read().unwrap_or_else(PoisonError::into_inner);
    guard.as_ref().map(Arc::clone)
}

fn clear_slot(slot: &SocketSlot) -> bool {
    slot.write()
        .unwrap_or_else(PoisonError::into_inner)
        .take()
        .is_some()
}

fn open_multicast(endpoint: &EnipEndpoint, local_ip: Option<Ipv4Addr>) -> io::Result<UdpSocket> {
    let group = endpoint.multicast_group;
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    if let Err(err) = socket.set_reuse_address(true) {
        log::debug!("unable to enable SO_REUSEADDR on multicast socket: {err}");
    }
    socket.bind(&endpoint.io_bind_addr().into())?;

    let mut joined = false;
    if let Some(iface) = local_ip {
        if let Err(err) = socket.set_multicast_if_v4(&iface) {
            log::debug!("unable to select multicast interface {iface}: {err}");
        }
        match socket.join_multicast_v4(&group, &iface) {
            Ok(()) => joined = true,
            Err(err) => log::debug!("failed to join {group} on interface {iface}: {err}"),
        }
    }
    if !joined {
        socket.join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)?;
        log::debug!("joined multicast group {group} on the wildcard interface");
    }

    socket.set_nonblocking(true)?;
    UdpSocket::from_std(socket.into())
}

async fn open_unicast(target: SocketAddr) -> io::Result<UdpSocket> {
    let socket = UdpSocket::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))).await?;
    socket.connect(target).await?;
    Ok(socket)
}

impl CipTransport for EnipTransport {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn send_explicit(&self, frame: &[u8]) -> Result<(), DataLinkError> {
        let mut writer = self.writer.lock().await;
        let stream = writer.as_mut().ok_or(DataLinkError::NotConnected)?;
        stream.write_all(frame).await?;
        Ok(())
    }

    async fn recv_explicit(&self) -> Result<Vec<u8>, DataLinkError> {
        let mut reader = self.reader.lock().await;
        let stream = reader.as_mut().ok_or(DataLinkError::NotConnected)?;
        let mut frame = vec![0u8; ENCAPSULATION_HEADER_LEN];
        stream.read_exact(&mut frame).await?;
        let body_len = u16::from_le_bytes([frame[2], frame[3]]) as usize;
        frame.resize(ENCAPSULATION_HEADER_LEN + body_len, 0);
        stream
            .read_exact(&mut frame[ENCAPSULATION_HEADER_LEN..])
            .await?;
        Ok(frame)
    }

    async fn send_cyclic(&self, frame: &[u8]) -> Result<(), DataLinkError> {
        let socket = slot_socket(&self.unicast).ok_or(DataLinkError::NotConnected)?;
        let sent = socket.send(frame).await?;
        if sent != frame.len() {
            return Err(DataLinkError::FrameTooLarge);
        }
        Ok(())
    }

    async fn recv_cyclic(
        &self,
        buf: &mut [u8],
        wait: Duration,
    ) -> Result<Option<usize>, DataLinkError> {
        let Some(socket) = slot_socket(&self.multicast) else {
            sleep(wait).await;
            return Ok(None);
        };
        match timeout(wait, socket.recv_from(buf)).await {
            Err(_) => Ok(None),
            Ok(Ok((n, src))) => {
                log::debug!("received {n} cyclic bytes from {src}");
                Ok(Some(n))
            }
            Ok(Err(err)) => Err(err.into()),
        }
    }

    async fn close(&self) {
        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(err) = writer.shutdown().await {
                log::debug!("error while closing tcp socket: {err}");
            }
        }
        self.reader.lock().await.take();
        self.connected.store(false, Ordering::Release);
        if clear_slot(&self.multicast) {
            log::debug!("multicast socket closed");
        }
        if clear_slot(&self.unicast) {
            log::debug!("unicast socket closed");
        }
    }
}
