//! EtherNet/IP and CIP encoding for the cipmaster master station.
//!
//! `cipmaster-core` holds everything that does not touch a socket: CIP
//! message and service codecs, Common Packet Format items, cyclic I/O
//! datagrams, the assembly layout compiler and the field codecs that move
//! user values in and out of an assembly buffer.
//!
//! # Feature flags
//!
//! - **`std`** (default): enables `std::error::Error` implementations.
//! - **`serde`**: derives `Serialize`/`Deserialize` on layout and status types.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

/// CIP request/response framing, EPATHs, status codes and service bodies.
pub mod cip;
/// Field codec registry and the human/wire value types.
pub mod codec;
/// Network connection parameters derived from assembly sizes.
pub mod connection;
/// Common Packet Format item lists.
pub mod cpf;
/// Zero-copy reader/writer.
pub mod encoding;
/// Error types for encoding and decoding operations.
pub mod error;
pub mod io;
pub mod layout;
/// Assembly byte buffers with typed field access.
pub mod packet;

pub use error::{DecodeError, EncodeError};
