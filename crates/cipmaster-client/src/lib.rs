#![allow(async_fn_in_trait)]

pub mod client;
pub mod config;
pub mod error;
pub mod fields;
pub mod network;
pub mod session;
pub mod simulator;

pub use client::{IoFrame, WireClient, WireSession};
pub use config::{
    available_config_files, load_config, resolve_config_path, validate_config, AssemblyConfig,
    CheckResult, CheckStatus, CipConfig, ValidationReport,
};
pub use error::{ClientError, ConfigError, FieldError, SessionError};
pub use fields::{
    clear_field, get_field, set_field, shared_packet, snapshot, FieldReading, SharedPacket,
};
pub use network::{check_network, HostPlatform, NetworkCheckResult, SystemRunner};
pub use session::{
    CipSession, Connector, CyclicCounters, EnipConnector, SessionConfig, SessionStart,
    SessionState,
};
pub use simulator::{SimulatedAdapter, SimulatedTransport, SimulatorLink};
