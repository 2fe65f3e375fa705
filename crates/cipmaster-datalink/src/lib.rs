#![allow(async_fn_in_trait)]

pub mod endpoint;
pub mod enip;
pub mod traits;

pub use endpoint::EnipEndpoint;
pub use enip::encapsulation::{EncapsulationCommand, EncapsulationHeader};
pub use enip::transport::EnipTransport;
pub use traits::{CipTransport, DataLinkError};
