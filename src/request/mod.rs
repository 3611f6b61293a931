//! Request side of the broker: header parsing, dispatch and the handlers that ship with it.

pub mod api;
mod dispatcher;
mod errors;
mod request_header;

pub use dispatcher::{
    error_response, ApiRegistration, DispatchTable, DispatchTableBuilder, ParsedRequest,
};
pub use errors::{DispatchMiss, ErrorCode};
pub use request_header::{
    HeaderFormat, HeaderPrefix, RequestHeader, ResponseHeader, FIXED_HEADER_SIZE,
};
