//! Protocol primitives shared by the request and response headers.
//!
//! - `codec`: pure decode/encode functions for the wire types
//! - `types`: tagged fields and string encodings
//! - `api_key`: api keys known by name

mod api_key;
pub mod codec;
mod types;

pub use api_key::ApiKey;
pub use types::{StringEncoding, TaggedField};
