use cipmaster_core::layout::LayoutError;
use cipmaster_core::packet::PacketError;
use cipmaster_datalink::DataLinkError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("datalink error: {0}")]
    DataLink(#[from] DataLinkError),
    #[error("encode error: {0}")]
    Encode(#[from] cipmaster_core::EncodeError),
    #[error("decode error: {0}")]
    Decode(#[from] cipmaster_core::DecodeError),
    #[error("request timed out")]
    Timeout,
    #[error("explicit channel is not connected")]
    NotConnected,
    #[error("connection parameters were not configured")]
    MissingConnectionParameters,
    #[error("{context}: CIP status 0x{general:02x} ({name})")]
    CipStatus {
        context: &'static str,
        general: u8,
        additional: Vec<u16>,
        name: &'static str,
    },
    #[error("encapsulation status 0x{0:08x}")]
    EncapsulationStatus(u32),
    #[error("unexpected reply")]
    UnexpectedReply,
    #[error("attribute reply mismatch: expected {expected}, got {actual} with status {status}")]
    AttributeMismatch {
        expected: u16,
        actual: u16,
        status: u16,
    },
    #[error("request too large")]
    RequestTooLarge,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a session is already running")]
    AlreadyRunning,
    #[error("no tokio runtime available to drive the session")]
    NoRuntime,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration {0} not found")]
    NotFound(String),
    #[error("unable to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid XML: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("expected exactly one assembly with subtype '{subtype}', found {found}")]
    AssemblyCount { subtype: &'static str, found: usize },
    #[error("field {id} has unmappable type '{tag}'")]
    UnmappableType { id: String, tag: String },
    #[error("attribute '{attribute}' on <{element}> is not a valid number: {value}")]
    InvalidAttribute {
        element: String,
        attribute: &'static str,
        value: String,
    },
    #[error("layout error: {0}")]
    Layout(#[from] LayoutError),
    #[error("{0} assembly is missing")]
    MissingAssembly(&'static str),
}

#[derive(Debug, Error)]
pub enum FieldError {
    #[error("{0}")]
    Packet(#[from] PacketError),
}
