/// Error codes carried inside response bodies.
///
/// Only the codes the core itself produces are listed; handlers are free to write any
/// other code into their own responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum ErrorCode {
    Unknown = -1,
    None = 0,
    UnsupportedVersion = 35,
    InvalidRequest = 42,
}

impl ErrorCode {
    pub fn code(&self) -> i16 {
        *self as i16
    }

    pub fn message(&self) -> &'static str {
        match self {
            ErrorCode::Unknown => {
                "The server experienced an unexpected error when processing the request"
            }
            ErrorCode::None => "",
            ErrorCode::UnsupportedVersion => "The version of API is not supported",
            ErrorCode::InvalidRequest => "This most likely occurs because of a request being malformed by the client library or the message was sent to an incompatible broker",
        }
    }

    pub fn from_code(code: i16) -> Self {
        match code {
            0 => ErrorCode::None,
            35 => ErrorCode::UnsupportedVersion,
            42 => ErrorCode::InvalidRequest,
            _ => ErrorCode::Unknown,
        }
    }
}

/// Why a request could not be routed to a handler.
///
/// Both outcomes are answered with an error response and leave the connection open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMiss {
    UnsupportedApi,
    UnsupportedVersion,
}

impl DispatchMiss {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            DispatchMiss::UnsupportedApi => ErrorCode::InvalidRequest,
            DispatchMiss::UnsupportedVersion => ErrorCode::UnsupportedVersion,
        }
    }
}
