// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// codec errors, the frame being decoded is malformed
    #[error("truncated input: {0}")]
    TruncatedInput(String),

    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),

    /// framing errors
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("peer closed the connection mid-frame: expected {expected} bytes, received {received}")]
    TruncatedFrame { expected: usize, received: usize },

    #[error("read timed out after {0} ms with a partial frame buffered")]
    ReadTimeout(u64),

    #[error("connection idle for {0} ms")]
    IdleTimeout(u64),

    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// a handler could not answer the request, the connection is closed
    #[error("handler failure: {0}")]
    HandlerFailure(String),

    /// general errors
    #[error("illegal state: {0}")]
    IllegalStateError(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Accept error = {0}")]
    Accept(String),

    #[error("config file error: {0}")]
    ConfigFileError(#[from] config::ConfigError),
}

impl AppError {
    /// Whether the connection loop should end in the `Closed` state rather than `Failed`.
    pub fn is_clean_close(&self) -> bool {
        matches!(self, AppError::IdleTimeout(_))
    }
}
