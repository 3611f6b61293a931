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

use bytes::{Bytes, BytesMut};

use crate::request::RequestHeader;
use crate::AppResult;

/// Logic answering one api key.
///
/// A handler receives the parsed header and the request body that follows it, and
/// returns the response body. The dispatcher adds the response header and the frame
/// length; the handler never writes either. An `Err` closes the connection without a
/// response.
pub trait ApiHandler: Send + Sync {
    fn handle(&self, header: &RequestHeader, body: Bytes) -> AppResult<BytesMut>;
}

impl<F> ApiHandler for F
where
    F: Fn(&RequestHeader, Bytes) -> AppResult<BytesMut> + Send + Sync,
{
    fn handle(&self, header: &RequestHeader, body: Bytes) -> AppResult<BytesMut> {
        self(header, body)
    }
}
