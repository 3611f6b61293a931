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

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tracing::{trace, warn};

use crate::protocol::codec::encode_int16;
use crate::protocol::{ApiKey, StringEncoding};
use crate::request::api::{
    ApiHandler, ApiVersionRange, ApiVersionsHandler, ApiVersionsResponse,
    API_VERSIONS_FLEXIBLE_FROM,
};
use crate::request::{
    DispatchMiss, ErrorCode, HeaderFormat, HeaderPrefix, RequestHeader, ResponseHeader,
};
use crate::{AppError, AppResult};

/// One api key served by the broker, with the versions and header layout it accepts.
pub struct ApiRegistration {
    range: ApiVersionRange,
    /// first version whose headers carry tagged fields
    flexible_from: Option<i16>,
    client_id_encoding: StringEncoding,
    classic_response_header: bool,
    handler: Arc<dyn ApiHandler>,
}

impl ApiRegistration {
    pub fn new(
        api_key: i16,
        min_version: i16,
        max_version: i16,
        handler: impl ApiHandler + 'static,
    ) -> Self {
        ApiRegistration {
            range: ApiVersionRange::new(api_key, min_version, max_version),
            flexible_from: None,
            client_id_encoding: StringEncoding::Classic,
            classic_response_header: false,
            handler: Arc::new(handler),
        }
    }

    pub fn flexible_from(mut self, api_version: i16) -> Self {
        self.flexible_from = Some(api_version);
        self
    }

    pub fn client_id_encoding(mut self, encoding: StringEncoding) -> Self {
        self.client_id_encoding = encoding;
        self
    }

    /// Keep the response header free of tagged fields even for flexible versions.
    pub fn classic_response_header(mut self) -> Self {
        self.classic_response_header = true;
        self
    }

    pub fn range(&self) -> ApiVersionRange {
        self.range
    }

    fn is_flexible(&self, api_version: i16) -> bool {
        self.flexible_from
            .is_some_and(|flexible_from| api_version >= flexible_from)
    }

    pub fn header_format(&self, api_version: i16) -> HeaderFormat {
        HeaderFormat {
            client_id_encoding: self.client_id_encoding,
            tagged_fields: self.is_flexible(api_version),
        }
    }

    pub fn flexible_response_header(&self, api_version: i16) -> bool {
        !self.classic_response_header && self.is_flexible(api_version)
    }
}

impl fmt::Debug for ApiRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiRegistration")
            .field("range", &self.range)
            .field("flexible_from", &self.flexible_from)
            .field("client_id_encoding", &self.client_id_encoding)
            .field("classic_response_header", &self.classic_response_header)
            .finish_non_exhaustive()
    }
}

/// A request after header parsing, either bound to its handler or known to be unroutable.
#[derive(Debug)]
pub enum ParsedRequest<'a> {
    Routed {
        registration: &'a ApiRegistration,
        header: RequestHeader,
        body: Bytes,
    },
    Unroutable {
        prefix: HeaderPrefix,
        miss: DispatchMiss,
    },
}

impl ParsedRequest<'_> {
    pub fn correlation_id(&self) -> i32 {
        match self {
            ParsedRequest::Routed { header, .. } => header.correlation_id,
            ParsedRequest::Unroutable { prefix, .. } => prefix.correlation_id,
        }
    }
}

/// Maps api keys to handlers.
///
/// Built once before the listener starts and shared read-only by every connection.
#[derive(Debug)]
pub struct DispatchTable {
    entries: HashMap<i16, ApiRegistration>,
}

impl DispatchTable {
    pub fn builder() -> DispatchTableBuilder {
        DispatchTableBuilder::default()
    }

    pub fn lookup(&self, api_key: i16, api_version: i16) -> Result<&ApiRegistration, DispatchMiss> {
        let registration = self
            .entries
            .get(&api_key)
            .ok_or(DispatchMiss::UnsupportedApi)?;
        if registration.range.contains(api_version) {
            Ok(registration)
        } else {
            Err(DispatchMiss::UnsupportedVersion)
        }
    }

    pub fn supported_versions(&self) -> Vec<ApiVersionRange> {
        let mut ranges: Vec<_> = self.entries.values().map(|r| r.range).collect();
        ranges.sort();
        ranges
    }

    /// An ApiVersions request above the served range is answered with a v0 body carrying
    /// `UNSUPPORTED_VERSION` and the served ranges, which every client can decode and
    /// use to retry at a lower version.
    fn api_versions_fallback(&self, correlation_id: i32) -> AppResult<BytesMut> {
        let response = ApiVersionsResponse {
            error_code: ErrorCode::UnsupportedVersion.code(),
            api_versions: self.supported_versions(),
            throttle_time_ms: 0,
        };
        let mut writer = BytesMut::with_capacity(10 + response.api_versions.len() * 6);
        ResponseHeader::new(correlation_id).write_to(&mut writer, false)?;
        response.write_to(&mut writer, 0)?;
        Ok(writer)
    }

    /// Decodes the request header of a frame payload.
    ///
    /// Requests for an unknown api key or version are returned as `Unroutable` without
    /// reading past the fixed header, their client id layout is unknown.
    pub fn parse(&self, payload: Bytes) -> AppResult<ParsedRequest<'_>> {
        let prefix = HeaderPrefix::read_from(&payload)?;
        let registration = match self.lookup(prefix.api_key, prefix.api_version) {
            Ok(registration) => registration,
            Err(miss) => return Ok(ParsedRequest::Unroutable { prefix, miss }),
        };

        let format = registration.header_format(prefix.api_version);
        let (header, body_offset) = RequestHeader::read_from(&payload, format)?;
        trace!(
            "parsed request header {:?}, body is {} bytes",
            header,
            payload.len() - body_offset
        );
        Ok(ParsedRequest::Routed {
            registration,
            header,
            body: payload.slice(body_offset..),
        })
    }

    /// Produces the response payload for a parsed request: response header then body.
    ///
    /// Unroutable requests get an error response. A handler error is returned as
    /// `HandlerFailure` and nothing is produced for the request.
    pub fn dispatch(&self, request: ParsedRequest<'_>) -> AppResult<BytesMut> {
        match request {
            ParsedRequest::Unroutable { prefix, miss } => {
                warn!(
                    "{:?} for api key {}({}) version {}, correlation id {}",
                    miss,
                    prefix.api_key,
                    ApiKey::name_of(prefix.api_key),
                    prefix.api_version,
                    prefix.correlation_id
                );
                if miss == DispatchMiss::UnsupportedVersion
                    && prefix.api_key == ApiKey::ApiVersions.as_i16()
                {
                    return self.api_versions_fallback(prefix.correlation_id);
                }
                error_response(prefix.correlation_id, miss.error_code())
            }
            ParsedRequest::Routed {
                registration,
                header,
                body,
            } => {
                let response_body = registration.handler.handle(&header, body).map_err(|e| {
                    AppError::HandlerFailure(format!(
                        "api key {} version {}: {}",
                        header.api_key, header.api_version, e
                    ))
                })?;
                let mut response = BytesMut::with_capacity(5 + response_body.len());
                ResponseHeader::new(header.correlation_id).write_to(
                    &mut response,
                    registration.flexible_response_header(header.api_version),
                )?;
                response.unsplit(response_body);
                Ok(response)
            }
        }
    }
}

/// `[correlation_id][error_code]`, the answer to a request no handler can take.
pub fn error_response(correlation_id: i32, error_code: ErrorCode) -> AppResult<BytesMut> {
    let mut response = BytesMut::with_capacity(6);
    ResponseHeader::new(correlation_id).write_to(&mut response, false)?;
    encode_int16(&mut response, error_code.code());
    Ok(response)
}

#[derive(Default)]
pub struct DispatchTableBuilder {
    registrations: Vec<ApiRegistration>,
    api_versions: bool,
}

impl DispatchTableBuilder {
    pub fn register(mut self, registration: ApiRegistration) -> Self {
        self.registrations.push(registration);
        self
    }

    /// Serve ApiVersions (api key 18), advertising every other registration.
    pub fn with_api_versions(mut self) -> Self {
        self.api_versions = true;
        self
    }

    pub fn build(self) -> AppResult<DispatchTable> {
        let mut registrations = self.registrations;
        if self.api_versions {
            let own = ApiVersionsHandler::registration_range();
            let mut advertised: Vec<_> = registrations.iter().map(|r| r.range).collect();
            advertised.push(own);
            registrations.push(
                ApiRegistration::new(
                    own.api_key,
                    own.min_version,
                    own.max_version,
                    ApiVersionsHandler::new(advertised),
                )
                .flexible_from(API_VERSIONS_FLEXIBLE_FROM)
                .classic_response_header(),
            );
        }

        let mut entries = HashMap::with_capacity(registrations.len());
        for registration in registrations {
            let range = registration.range;
            if range.min_version < 0 || range.min_version > range.max_version {
                return Err(AppError::InvalidValue(format!(
                    "api key {} has an invalid version range {}..={}",
                    range.api_key, range.min_version, range.max_version
                )));
            }
            if entries.insert(range.api_key, registration).is_some() {
                return Err(AppError::IllegalStateError(format!(
                    "api key {} is registered twice",
                    range.api_key
                )));
            }
        }
        Ok(DispatchTable { entries })
    }
}

#[cfg(test)]
mod tests {
    use bytes::BufMut;

    use super::*;
    use crate::protocol::codec::{decode_int16, decode_int32};

    const ECHO_KEY: i16 = 1000;
    const FAILING_KEY: i16 = 1001;

    fn echo(header: &RequestHeader, body: Bytes) -> AppResult<BytesMut> {
        let mut response = BytesMut::new();
        response.put_i16(header.api_version);
        response.put_slice(&body);
        Ok(response)
    }

    fn failing(_header: &RequestHeader, _body: Bytes) -> AppResult<BytesMut> {
        Err(AppError::InvalidValue("boom".to_string()))
    }

    fn table() -> DispatchTable {
        DispatchTable::builder()
            .register(
                ApiRegistration::new(ECHO_KEY, 0, 3, echo)
                    .flexible_from(2)
                    .client_id_encoding(StringEncoding::Compact),
            )
            .register(ApiRegistration::new(FAILING_KEY, 0, 0, failing))
            .with_api_versions()
            .build()
            .unwrap()
    }

    fn request(header: &RequestHeader, format: HeaderFormat, body: &[u8]) -> Bytes {
        let mut payload = BytesMut::new();
        header.write_to(&mut payload, format).unwrap();
        payload.put_slice(body);
        payload.freeze()
    }

    #[test]
    fn test_lookup() {
        let table = table();
        assert!(table.lookup(ECHO_KEY, 3).is_ok());
        assert_eq!(
            table.lookup(9999, 0).unwrap_err(),
            DispatchMiss::UnsupportedApi
        );
        assert_eq!(
            table.lookup(ECHO_KEY, i16::MAX).unwrap_err(),
            DispatchMiss::UnsupportedVersion
        );
        assert_eq!(
            table.lookup(ECHO_KEY, -1).unwrap_err(),
            DispatchMiss::UnsupportedVersion
        );
    }

    #[test]
    fn test_supported_versions_include_api_versions() {
        assert_eq!(
            table().supported_versions(),
            vec![
                ApiVersionRange::new(18, 0, 4),
                ApiVersionRange::new(ECHO_KEY, 0, 3),
                ApiVersionRange::new(FAILING_KEY, 0, 0),
            ]
        );
    }

    #[test]
    fn test_routed_request_gets_flexible_header() {
        let table = table();
        let header = RequestHeader::new(ECHO_KEY, 2, -5, Some("c".to_string()));
        let format = table.lookup(ECHO_KEY, 2).unwrap().header_format(2);
        let payload = request(&header, format, b"xyz");

        let parsed = table.parse(payload).unwrap();
        assert_eq!(parsed.correlation_id(), -5);
        let response = table.dispatch(parsed).unwrap();
        // correlation id, empty tagged fields, echoed version, echoed body
        assert_eq!(
            &response[..],
            &[0xff, 0xff, 0xff, 0xfb, 0x00, 0x00, 0x02, b'x', b'y', b'z']
        );
    }

    #[test]
    fn test_non_flexible_version_keeps_classic_header() {
        let table = table();
        let header = RequestHeader::new(ECHO_KEY, 1, 9, None);
        let format = table.lookup(ECHO_KEY, 1).unwrap().header_format(1);
        assert!(!format.tagged_fields);
        let response = table
            .dispatch(table.parse(request(&header, format, &[])).unwrap())
            .unwrap();
        assert_eq!(&response[..], &[0x00, 0x00, 0x00, 0x09, 0x00, 0x01]);
    }

    #[test]
    fn test_unknown_api_key_gets_error_response() {
        let table = table();
        let header = RequestHeader::new(9999, 0, 77, None);
        let parsed = table
            .parse(request(&header, HeaderFormat::CLASSIC, &[]))
            .unwrap();
        assert!(matches!(
            parsed,
            ParsedRequest::Unroutable {
                miss: DispatchMiss::UnsupportedApi,
                ..
            }
        ));
        let response = table.dispatch(parsed).unwrap();
        assert_eq!(decode_int32(&response, 0).unwrap(), (77, 4));
        assert_eq!(
            decode_int16(&response, 4).unwrap().0,
            ErrorCode::InvalidRequest.code()
        );
    }

    #[test]
    fn test_unknown_version_gets_error_response() {
        let table = table();
        // only the fixed header is present, the rest is never read
        let payload = Bytes::from_static(&[0x03, 0xe8, 0x7f, 0xff, 0x00, 0x00, 0x00, 0x01]);
        let response = table.dispatch(table.parse(payload).unwrap()).unwrap();
        assert_eq!(
            &response[..],
            &[0x00, 0x00, 0x00, 0x01, 0x00, ErrorCode::UnsupportedVersion.code() as u8]
        );
    }

    #[test]
    fn test_api_versions_above_range_gets_v0_fallback() {
        let table = table();
        let header = RequestHeader::new(18, 9, 12, None);
        let parsed = table
            .parse(request(&header, HeaderFormat::CLASSIC, &[]))
            .unwrap();
        let response = table.dispatch(parsed).unwrap();

        assert_eq!(decode_int32(&response, 0).unwrap(), (12, 4));
        let (body, read) = ApiVersionsResponse::read_from(&response[4..], 0).unwrap();
        assert_eq!(read, response.len() - 4);
        assert_eq!(body.error_code, ErrorCode::UnsupportedVersion.code());
        assert_eq!(body.api_versions, table.supported_versions());
    }

    #[test]
    fn test_handler_error_is_handler_failure() {
        let table = table();
        let header = RequestHeader::new(FAILING_KEY, 0, 1, None);
        let parsed = table
            .parse(request(&header, HeaderFormat::CLASSIC, &[]))
            .unwrap();
        assert!(matches!(
            table.dispatch(parsed),
            Err(AppError::HandlerFailure(_))
        ));
    }

    #[test]
    fn test_malformed_header() {
        let table = table();
        assert!(matches!(
            table.parse(Bytes::from_static(&[0x00, 0x12])),
            Err(AppError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let result = DispatchTable::builder()
            .register(ApiRegistration::new(18, 0, 1, echo))
            .with_api_versions()
            .build();
        assert!(matches!(result, Err(AppError::IllegalStateError(_))));
    }

    #[test]
    fn test_inverted_range_is_rejected() {
        let result = DispatchTable::builder()
            .register(ApiRegistration::new(ECHO_KEY, 3, 1, echo))
            .build();
        assert!(matches!(result, Err(AppError::InvalidValue(_))));
    }
}
