//! Framing layer.
//!
//! Every request and response travels as a 4-byte big-endian signed length followed by
//! exactly that many payload bytes.
//!
//! - `RequestFrame`: splits complete frames off a read buffer and validates the length
//!   prefix against the configured maximum.
//! - `ResponseFrame`: length-prefixes a response payload.
//! - `Connection`: owns one stream and reads and writes whole frames on it, with
//!   optional read and idle timeouts.

pub use connection::Connection;
pub use frame::{RequestFrame, ResponseFrame, FRAME_LENGTH_SIZE};
mod connection;
mod frame;
