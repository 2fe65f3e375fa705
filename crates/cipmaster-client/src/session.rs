//! Background cyclic I/O session.
//!
//! [`CipSession`] owns one worker thread at a time. The worker opens the
//! connection, runs the cyclic exchange until asked to stop and always
//! closes the sockets on the way out.

use crate::fields::{lock_packet, write_heartbeat, SharedPacket};
use crate::{ClientError, FieldError, SessionError, WireClient};
use cipmaster_core::codec::WireValue;
use cipmaster_core::connection::ConnectionParameters;
use cipmaster_core::layout::{AssemblyLayout, FieldType};
use cipmaster_core::packet::{PacketError, PacketInstance};
use cipmaster_datalink::{CipTransport, EnipEndpoint, EnipTransport};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::{oneshot, watch};

/// Run/idle header sent with every output frame.
const OUTPUT_HEADER: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SessionState {
    Idle,
    Starting,
    Connected,
    ForwardOpen,
    Running,
    Closing,
    Closed,
}

/// Session tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionConfig {
    /// Upper bound of each cyclic receive.
    pub recv_timeout: Duration,
    /// How long `stop()` waits for the worker to finish.
    pub stop_timeout: Duration,
    pub heartbeat_field: String,
    pub timestamp_field: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            recv_timeout: Duration::from_millis(500),
            stop_timeout: Duration::from_secs(1),
            heartbeat_field: "MPU_CTCMSAlive".to_string(),
            timestamp_field: "MPU_CDateTimeSec".to_string(),
        }
    }
}

impl SessionConfig {
    pub fn with_recv_timeout(mut self, recv_timeout: Duration) -> Self {
        self.recv_timeout = recv_timeout;
        self
    }

    pub fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    pub fn with_heartbeat_field(mut self, field: impl Into<String>) -> Self {
        self.heartbeat_field = field.into();
        self
    }

    pub fn with_timestamp_field(mut self, field: impl Into<String>) -> Self {
        self.timestamp_field = field.into();
        self
    }
}

/// Opens the transport a session runs on.
pub trait Connector: Send + Sync + 'static {
    type Transport: CipTransport + 'static;

    async fn connect(&self, endpoint: EnipEndpoint) -> Self::Transport;
}

/// Socket connector used outside of tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnipConnector;

impl Connector for EnipConnector {
    type Transport = EnipTransport;

    async fn connect(&self, endpoint: EnipEndpoint) -> EnipTransport {
        EnipTransport::open(endpoint).await
    }
}

pub type FrameCallback = Box<dyn FnMut(&PacketInstance) + Send>;
pub type HeartbeatCallback = Box<dyn FnMut(&str, u8) -> Result<(), FieldError> + Send>;

/// Everything one session run needs.
pub struct SessionStart {
    pub endpoint: EnipEndpoint,
    pub params: ConnectionParameters,
    /// Output assembly, shared with foreground field mutations.
    pub outbound: SharedPacket,
    pub inbound_layout: Arc<AssemblyLayout>,
    on_frame: FrameCallback,
    on_heartbeat: HeartbeatCallback,
}

impl SessionStart {
    /// By default the heartbeat counter is written into `outbound` and
    /// frame updates are not observed.
    pub fn new(
        endpoint: EnipEndpoint,
        params: ConnectionParameters,
        outbound: SharedPacket,
        inbound_layout: Arc<AssemblyLayout>,
    ) -> Self {
        let heartbeat_target = outbound.clone();
        Self {
            endpoint,
            params,
            outbound,
            inbound_layout,
            on_frame: Box::new(|_| {}),
            on_heartbeat: Box::new(move |field, value| {
                write_heartbeat(&heartbeat_target, field, value).map(|_| ())
            }),
        }
    }

    /// Called with every decoded inbound frame, after it is published.
    pub fn with_frame_callback(
        mut self,
        callback: impl FnMut(&PacketInstance) + Send + 'static,
    ) -> Self {
        self.on_frame = Box::new(callback);
        self
    }

    /// Replaces the heartbeat writer. It receives the configured field name
    /// and the new counter value.
    pub fn with_heartbeat(
        mut self,
        callback: impl FnMut(&str, u8) -> Result<(), FieldError> + Send + 'static,
    ) -> Self {
        self.on_heartbeat = Box::new(callback);
        self
    }
}

/// Heartbeat and application sequence counters of the cyclic loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CyclicCounters {
    heartbeat: u8,
    app_sequence: u16,
}

impl Default for CyclicCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl CyclicCounters {
    pub const APP_SEQUENCE_START: u16 = 65500;

    pub const fn new() -> Self {
        Self {
            heartbeat: 0,
            app_sequence: Self::APP_SEQUENCE_START,
        }
    }

    /// Advances the heartbeat and returns the new value; the first call
    /// yields 1.
    pub fn next_heartbeat(&mut self) -> u8 {
        self.heartbeat = self.heartbeat.wrapping_add(1);
        self.heartbeat
    }

    /// Returns the sequence for the next frame, then advances.
    pub fn next_app_sequence(&mut self) -> u16 {
        let current = self.app_sequence;
        self.app_sequence = current.wrapping_add(1);
        current
    }
}

#[derive(Debug, Error)]
enum LoopError {
    #[error("unable to parse inbound frame: {0}")]
    Inbound(PacketError),
    #[error("heartbeat update failed: {0}")]
    Heartbeat(FieldError),
    #[error("{0} callback panicked")]
    Callback(&'static str),
    #[error("cyclic send failed: {0}")]
    Send(ClientError),
}

struct Shared<T: CipTransport> {
    state: Mutex<SessionState>,
    errored: AtomicBool,
    client: Mutex<Option<Arc<WireClient<T>>>>,
    inbound: Mutex<Option<PacketInstance>>,
}

impl<T: CipTransport> Shared<T> {
    fn set_state(&self, state: SessionState) {
        *lock(&self.state) = state;
    }

    fn fail(&self) {
        self.errored.store(true, Ordering::SeqCst);
        self.set_state(SessionState::Closing);
    }

    fn client(&self) -> Option<Arc<WireClient<T>>> {
        lock(&self.client).clone()
    }
}

fn lock<U>(mutex: &Mutex<U>) -> MutexGuard<'_, U> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Worker {
    thread: std::thread::JoinHandle<()>,
    shutdown: watch::Sender<bool>,
    /// Taken while a `stop()` is waiting on it.
    done: Option<oneshot::Receiver<()>>,
}

/// Handle to the background cyclic session.
pub struct CipSession<C: Connector = EnipConnector> {
    connector: Arc<C>,
    config: SessionConfig,
    shared: Arc<Shared<C::Transport>>,
    worker: Mutex<Option<Worker>>,
}

impl CipSession<EnipConnector> {
    pub fn new(config: SessionConfig) -> Self {
        Self::with_connector(EnipConnector, config)
    }
}

impl<C: Connector> CipSession<C> {
    pub fn with_connector(connector: C, config: SessionConfig) -> Self {
        Self {
            connector: Arc::new(connector),
            config,
            shared: Arc::new(Shared {
                state: Mutex::new(SessionState::Idle),
                errored: AtomicBool::new(false),
                client: Mutex::new(None),
                inbound: Mutex::new(None),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Spawns the worker. Fails without side effects while a previous
    /// worker is still alive. Must be called from within a tokio runtime.
    pub fn start(&self, start: SessionStart) -> Result<(), SessionError> {
        let mut worker = lock(&self.worker);
        if worker.as_ref().is_some_and(|w| !w.thread.is_finished()) {
            return Err(SessionError::AlreadyRunning);
        }
        let runtime_handle =
            tokio::runtime::Handle::try_current().map_err(|_| SessionError::NoRuntime)?;
        if let Some(previous) = worker.take() {
            let _ = previous.thread.join();
        }

        self.shared.errored.store(false, Ordering::SeqCst);
        self.shared.set_state(SessionState::Starting);
        *lock(&self.shared.inbound) = None;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (done_tx, done_rx) = oneshot::channel();
        let connector = self.connector.clone();
        let config = self.config.clone();
        let shared = self.shared.clone();

        let thread = std::thread::spawn(move || {
            runtime_handle.block_on(async move {
                run_session(connector, config, shared, start, shutdown_rx).await;
            });
            let _ = done_tx.send(());
        });
        *worker = Some(Worker {
            thread,
            shutdown: shutdown_tx,
            done: Some(done_rx),
        });
        Ok(())
    }

    /// Signals the worker, closes the connection on its behalf and waits up
    /// to `stop_timeout` for it to finish. A worker that outlives the wait
    /// stays tracked, so `running()` keeps reporting it and `start()` is
    /// refused until it exits. Calling it again is a no-op once stopped.
    pub async fn stop(&self) {
        let done = {
            let mut slot = lock(&self.worker);
            let Some(worker) = slot.as_mut() else {
                return;
            };
            let _ = worker.shutdown.send(true);
            worker.done.take()
        };
        let Some(mut done) = done else {
            // another stop is already waiting on this worker
            return;
        };

        if let Some(client) = self.shared.client() {
            if client.is_connected() && client.session().ot_connection_id != 0 {
                if let Err(err) = client.forward_close().await {
                    log::warn!("forward close during stop failed: {err}");
                }
            }
            client.close().await;
        }

        let finished = tokio::time::timeout(self.config.stop_timeout, &mut done)
            .await
            .is_ok();
        let mut slot = lock(&self.worker);
        if !slot.as_ref().is_some_and(|w| w.done.is_none()) {
            return;
        }
        if finished {
            if let Some(worker) = slot.take() {
                let _ = worker.thread.join();
            }
        } else {
            log::warn!(
                "session worker still running after {:?}",
                self.config.stop_timeout
            );
            if let Some(worker) = slot.as_mut() {
                worker.done = Some(done);
            }
        }
    }

    pub fn running(&self) -> bool {
        lock(&self.worker)
            .as_ref()
            .is_some_and(|w| !w.thread.is_finished())
    }

    pub fn error_occurred(&self) -> bool {
        self.shared.errored.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.shared.state)
    }

    /// Most recent decoded inbound frame.
    pub fn latest_inbound(&self) -> Option<PacketInstance> {
        lock(&self.shared.inbound).clone()
    }
}

/// Dropping the handle only signals shutdown. The worker thread is detached
/// and keeps using the runtime until it notices the signal, which can take
/// up to one receive timeout, or longer while it is still connecting. Call
/// `stop()` first when the runtime is about to shut down.
impl<C: Connector> Drop for CipSession<C> {
    fn drop(&mut self) {
        let mut slot = lock(&self.worker);
        let finished = slot.as_ref().is_some_and(|w| w.thread.is_finished());
        match slot.take() {
            Some(worker) if finished => {
                let _ = worker.thread.join();
            }
            Some(worker) => {
                let _ = worker.shutdown.send(true);
            }
            None => {}
        }
    }
}

async fn run_session<C: Connector>(
    connector: Arc<C>,
    config: SessionConfig,
    shared: Arc<Shared<C::Transport>>,
    mut start: SessionStart,
    mut shutdown: watch::Receiver<bool>,
) {
    log::info!("starting CIP session with {}", start.endpoint);
    let transport = connector.connect(start.endpoint).await;
    let client =
        Arc::new(WireClient::with_transport(transport).with_connection_parameters(start.params));
    *lock(&shared.client) = Some(client.clone());

    if *shutdown.borrow() {
        log::info!("stop requested while connecting; not establishing");
        shared.set_state(SessionState::Closing);
        client.close().await;
        *lock(&shared.client) = None;
        shared.set_state(SessionState::Closed);
        return;
    }

    match establish(&client, &shared).await {
        Ok(()) => {
            shared.set_state(SessionState::Running);
            log::info!("cyclic exchange running");
            match cyclic_loop(&client, &config, &shared, &mut start, &mut shutdown).await {
                Ok(()) => {
                    if client.is_connected() && client.session().ot_connection_id != 0 {
                        if let Err(err) = client.forward_close().await {
                            log::warn!("forward close failed: {err}");
                        }
                    }
                }
                Err(err) => {
                    log::error!("cyclic exchange stopped: {err}");
                    shared.fail();
                }
            }
        }
        Err(err) => {
            log::error!("unable to establish CIP session: {err}");
            shared.fail();
        }
    }

    shared.set_state(SessionState::Closing);
    client.close().await;
    *lock(&shared.client) = None;
    shared.set_state(SessionState::Closed);
    log::info!("CIP session closed");
}

async fn establish<T: CipTransport>(
    client: &WireClient<T>,
    shared: &Shared<T>,
) -> Result<(), ClientError> {
    client.register_session().await?;
    if !client.is_connected() {
        return Err(ClientError::NotConnected);
    }
    shared.set_state(SessionState::Connected);
    client.forward_open().await?;
    shared.set_state(SessionState::ForwardOpen);
    Ok(())
}

async fn cyclic_loop<T: CipTransport>(
    client: &WireClient<T>,
    config: &SessionConfig,
    shared: &Shared<T>,
    start: &mut SessionStart,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<(), LoopError> {
    let mut counters = CyclicCounters::new();
    while !*shutdown.borrow() {
        let Some(frame) = client.recv_cyclic(config.recv_timeout).await else {
            continue;
        };

        let inbound = PacketInstance::from_bytes(start.inbound_layout.clone(), &frame.payload)
            .map_err(LoopError::Inbound)?;
        *lock(&shared.inbound) = Some(inbound.clone());
        catch_unwind(AssertUnwindSafe(|| (start.on_frame)(&inbound)))
            .map_err(|_| LoopError::Callback("frame"))?;

        let heartbeat = counters.next_heartbeat();
        catch_unwind(AssertUnwindSafe(|| {
            (start.on_heartbeat)(&config.heartbeat_field, heartbeat)
        }))
        .map_err(|_| LoopError::Callback("heartbeat"))?
        .map_err(LoopError::Heartbeat)?;

        stamp_timestamp(&start.outbound, &config.timestamp_field);
        let payload = lock_packet(&start.outbound).as_bytes().to_vec();
        let sequence = counters.next_app_sequence();
        client
            .send_cyclic(sequence, OUTPUT_HEADER, &payload)
            .await
            .map_err(LoopError::Send)?;
    }
    log::info!("cyclic exchange stop requested");
    Ok(())
}

/// Writes UTC epoch seconds into `field` when it is a `udint`.
fn stamp_timestamp(outbound: &SharedPacket, field: &str) {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let seconds = u32::try_from(seconds).unwrap_or(u32::MAX);

    let mut packet = lock_packet(outbound);
    let Ok(field_type) = packet.field(field).map(|spec| spec.field_type) else {
        return;
    };
    if field_type != FieldType::UInt32 {
        log::debug!("timestamp field {field} is {field_type}; not stamped");
        return;
    }
    if let Err(err) = packet.set_wire(field, &WireValue::U32(seconds)) {
        log::debug!("unable to stamp {field}: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::{CipSession, Connector, CyclicCounters, SessionConfig, SessionStart, SessionState};
    use crate::fields::{get_field, shared_packet, SharedPacket};
    use crate::simulator::{SimulatedAdapter, SimulatedTransport, SimulatorLink};
    use crate::{FieldError, SessionError};
    use cipmaster_core::codec::HumanValue;
    use cipmaster_core::connection::ConnectionParameters;
    use cipmaster_core::io::CyclicFrame;
    use cipmaster_core::layout::{AssemblyLayout, FieldSpec, FieldType};
    use cipmaster_core::packet::{PacketError, PacketInstance};
    use cipmaster_datalink::EnipEndpoint;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    struct TestConnector {
        transports: Mutex<Vec<SimulatedTransport>>,
        connects: AtomicUsize,
        connect_delay: Duration,
    }

    impl TestConnector {
        fn new(transports: Vec<SimulatedTransport>) -> Self {
            Self {
                transports: Mutex::new(transports),
                connects: AtomicUsize::new(0),
                connect_delay: Duration::ZERO,
            }
        }

        fn with_connect_delay(mut self, delay: Duration) -> Self {
            self.connect_delay = delay;
            self
        }
    }

    impl Connector for TestConnector {
        type Transport = SimulatedTransport;

        async fn connect(&self, _endpoint: EnipEndpoint) -> SimulatedTransport {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if !self.connect_delay.is_zero() {
                tokio::time::sleep(self.connect_delay).await;
            }
            let next = self.transports.lock().unwrap().pop();
            next.unwrap_or_else(|| {
                SimulatedTransport::unreachable(Arc::new(SimulatedAdapter::new())).0
            })
        }
    }

    fn layouts() -> (Arc<AssemblyLayout>, Arc<AssemblyLayout>) {
        let ot = AssemblyLayout::compile(
            vec![
                FieldSpec::new("MPU_CTCMSAlive", 0, FieldType::UInt8, 1),
                FieldSpec::new("MPU_CDateTimeSec", 32, FieldType::UInt32, 1),
            ],
            64,
        )
        .unwrap();
        let to = AssemblyLayout::compile(
            vec![FieldSpec::new("DCU_Alive", 0, FieldType::UInt8, 1)],
            16,
        )
        .unwrap();
        (Arc::new(ot), Arc::new(to))
    }

    fn session_start(outbound: &SharedPacket, to: Arc<AssemblyLayout>) -> SessionStart {
        SessionStart::new(
            EnipEndpoint::default(),
            ConnectionParameters::from_sizes(8, 2),
            outbound.clone(),
            to,
        )
    }

    fn config() -> SessionConfig {
        SessionConfig::default()
            .with_recv_timeout(Duration::from_millis(20))
            .with_stop_timeout(Duration::from_secs(2))
    }

    fn simulated() -> (SimulatedTransport, SimulatorLink) {
        SimulatedTransport::new(Arc::new(SimulatedAdapter::new()))
    }

    async fn wait_for(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[test]
    fn counters_wrap() {
        let mut counters = CyclicCounters::new();
        assert_eq!(counters.next_heartbeat(), 1);
        for _ in 0..253 {
            counters.next_heartbeat();
        }
        assert_eq!(counters.next_heartbeat(), 255);
        assert_eq!(counters.next_heartbeat(), 0);

        let sequences: Vec<u16> = (0..37).map(|_| counters.next_app_sequence()).collect();
        assert_eq!(sequences[0], 65500);
        assert_eq!(sequences[35], 65535);
        assert_eq!(sequences[36], 0);
    }

    #[test]
    fn start_outside_runtime_is_rejected() {
        let (ot, to) = layouts();
        let outbound = shared_packet(PacketInstance::new(ot));
        let session = CipSession::with_connector(TestConnector::new(vec![]), config());
        let err = session.start(session_start(&outbound, to)).unwrap_err();
        assert!(matches!(err, SessionError::NoRuntime));
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cyclic_exchange_runs_until_stopped() {
        let (ot, to) = layouts();
        let outbound = shared_packet(PacketInstance::new(ot));
        let (transport, mut link) = simulated();
        let adapter = link.adapter().clone();
        let frames = Arc::new(AtomicUsize::new(0));
        let seen = frames.clone();

        let session = CipSession::with_connector(TestConnector::new(vec![transport]), config());
        session
            .start(
                session_start(&outbound, to).with_frame_callback(move |_| {
                    seen.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        wait_for(|| session.state() == SessionState::Running).await;
        assert!(adapter.connection_ids().is_some());

        link.push_input(&[0x2A, 0x00]).unwrap();
        let first = link.next_output(Duration::from_secs(2)).await.unwrap();
        let first = CyclicFrame::decode(&first).unwrap();
        assert_eq!(first.io_header.sequence_count, 65500);
        assert_eq!(first.io_header.header, 1);
        assert_eq!(first.payload[0], 1);
        assert_ne!(&first.payload[4..8], &[0, 0, 0, 0]);

        link.push_input(&[0x2B, 0x00]).unwrap();
        let second = link.next_output(Duration::from_secs(2)).await.unwrap();
        let second = CyclicFrame::decode(&second).unwrap();
        assert_eq!(second.io_header.sequence_count, 65501);
        assert_eq!(second.payload[0], 2);

        let inbound = session.latest_inbound().unwrap();
        assert_eq!(inbound.get("DCU_Alive").unwrap(), HumanValue::Int(0x2B));
        assert_eq!(frames.load(Ordering::SeqCst), 2);
        assert_eq!(
            get_field(&outbound, "MPU_CTCMSAlive").unwrap(),
            HumanValue::Int(2)
        );

        session.stop().await;
        assert!(!session.running());
        assert!(!session.error_occurred());
        assert_eq!(session.state(), SessionState::Closed);
        assert!(adapter.connection_ids().is_none());

        session.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn second_start_is_rejected_while_running() {
        let (ot, to) = layouts();
        let outbound = shared_packet(PacketInstance::new(ot));
        let (transport, _link) = simulated();
        let session = CipSession::with_connector(TestConnector::new(vec![transport]), config());

        session.start(session_start(&outbound, to.clone())).unwrap();
        wait_for(|| session.state() == SessionState::Running).await;
        let err = session.start(session_start(&outbound, to)).unwrap_err();
        assert!(matches!(err, SessionError::AlreadyRunning));
        assert_eq!(session.connector.connects.load(Ordering::SeqCst), 1);
        assert!(session.running());

        session.stop().await;
        assert!(!session.running());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn unreachable_adapter_sets_error() {
        let (ot, to) = layouts();
        let outbound = shared_packet(PacketInstance::new(ot));
        let session = CipSession::with_connector(TestConnector::new(vec![]), config());
        session.start(session_start(&outbound, to)).unwrap();

        wait_for(|| !session.running()).await;
        assert!(session.error_occurred());
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn rejected_forward_open_sets_error() {
        let (ot, to) = layouts();
        let outbound = shared_packet(PacketInstance::new(ot));
        let adapter = Arc::new(SimulatedAdapter::new().with_forward_open_status(0x01));
        let (transport, _link) = SimulatedTransport::new(adapter);
        let session = CipSession::with_connector(TestConnector::new(vec![transport]), config());
        session.start(session_start(&outbound, to)).unwrap();

        wait_for(|| !session.running()).await;
        assert!(session.error_occurred());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn short_inbound_frame_ends_session_with_error() {
        let (ot, to) = layouts();
        let outbound = shared_packet(PacketInstance::new(ot));
        let (transport, mut link) = simulated();
        let session = CipSession::with_connector(TestConnector::new(vec![transport]), config());
        session.start(session_start(&outbound, to)).unwrap();
        wait_for(|| session.state() == SessionState::Running).await;

        link.push_input(&[0x01]).unwrap();
        wait_for(|| !session.running()).await;
        assert!(session.error_occurred());
        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.latest_inbound().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failing_heartbeat_ends_session_with_error() {
        let (ot, to) = layouts();
        let outbound = shared_packet(PacketInstance::new(ot));
        let (transport, mut link) = simulated();
        let session = CipSession::with_connector(TestConnector::new(vec![transport]), config());
        session
            .start(session_start(&outbound, to).with_heartbeat(|field, _| {
                Err(FieldError::Packet(PacketError::UnknownField(field.into())))
            }))
            .unwrap();
        wait_for(|| session.state() == SessionState::Running).await;

        link.push_input(&[0x01, 0x00]).unwrap();
        wait_for(|| !session.running()).await;
        assert!(session.error_occurred());
        assert!(link.next_output(Duration::from_millis(50)).await.is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn slow_worker_stays_tracked_after_stop_times_out() {
        let (ot, to) = layouts();
        let outbound = shared_packet(PacketInstance::new(ot));
        let (first, _first_link) = simulated();
        let (second, _second_link) = simulated();
        let connector = TestConnector::new(vec![second, first])
            .with_connect_delay(Duration::from_millis(800));
        let session = CipSession::with_connector(
            connector,
            config().with_stop_timeout(Duration::from_millis(50)),
        );

        session.start(session_start(&outbound, to.clone())).unwrap();
        session.stop().await;
        assert!(session.running());
        let err = session.start(session_start(&outbound, to.clone())).unwrap_err();
        assert!(matches!(err, SessionError::AlreadyRunning));
        assert_eq!(session.connector.connects.load(Ordering::SeqCst), 1);

        wait_for(|| !session.running()).await;
        assert!(!session.error_occurred());
        assert_eq!(session.state(), SessionState::Closed);

        session.start(session_start(&outbound, to)).unwrap();
        wait_for(|| session.connector.connects.load(Ordering::SeqCst) == 2).await;
        session.stop().await;
        wait_for(|| !session.running()).await;
        assert!(!session.error_occurred());
    }
}
