/// Explicit message request/response framing (service byte, path, status).
pub mod message;
/// Logical-segment EPATH construction.
pub mod path;
/// Service codecs: Forward-Open/Close, attribute lists, Unconnected-Send.
pub mod services;
/// General status codes and the missing-status rule.
pub mod status;

pub use message::{MessageRequest, MessageResponse, ResponseStatus};
pub use path::CipPath;
