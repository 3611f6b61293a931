use bytes::{Bytes, BytesMut};

use crate::protocol::codec::{
    decode_int16, decode_int32, decode_tagged_fields, decode_unsigned_varint, encode_int16,
    encode_int32, encode_unsigned_varint,
};
use crate::protocol::ApiKey;
use crate::request::{ErrorCode, RequestHeader};
use crate::{AppError, AppResult};

use super::handler::ApiHandler;

pub const API_VERSIONS_MIN_VERSION: i16 = 0;
pub const API_VERSIONS_MAX_VERSION: i16 = 4;
/// first ApiVersions version with compact arrays and tagged fields
pub const API_VERSIONS_FLEXIBLE_FROM: i16 = 3;

/// Inclusive version range served for one api key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ApiVersionRange {
    pub api_key: i16,
    pub min_version: i16,
    pub max_version: i16,
}

impl ApiVersionRange {
    pub fn new(api_key: i16, min_version: i16, max_version: i16) -> Self {
        ApiVersionRange {
            api_key,
            min_version,
            max_version,
        }
    }

    pub fn contains(&self, api_version: i16) -> bool {
        (self.min_version..=self.max_version).contains(&api_version)
    }
}

/// Answers ApiVersions with every api key registered in the dispatch table.
pub struct ApiVersionsHandler {
    api_versions: Vec<ApiVersionRange>,
}

impl ApiVersionsHandler {
    pub fn new(mut api_versions: Vec<ApiVersionRange>) -> Self {
        api_versions.sort();
        ApiVersionsHandler { api_versions }
    }

    pub fn registration_range() -> ApiVersionRange {
        ApiVersionRange::new(
            ApiKey::ApiVersions.as_i16(),
            API_VERSIONS_MIN_VERSION,
            API_VERSIONS_MAX_VERSION,
        )
    }
}

impl ApiHandler for ApiVersionsHandler {
    fn handle(&self, header: &RequestHeader, _body: Bytes) -> AppResult<BytesMut> {
        let response = ApiVersionsResponse {
            error_code: ErrorCode::None.code(),
            api_versions: self.api_versions.clone(),
            throttle_time_ms: 0,
        };
        let mut writer = BytesMut::with_capacity(16 + self.api_versions.len() * 7);
        response.write_to(&mut writer, header.api_version)?;
        Ok(writer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiVersionsResponse {
    pub error_code: i16,
    pub api_versions: Vec<ApiVersionRange>,
    pub throttle_time_ms: i32,
}

impl ApiVersionsResponse {
    pub fn write_to(&self, writer: &mut BytesMut, api_version: i16) -> AppResult<()> {
        let flexible = api_version >= API_VERSIONS_FLEXIBLE_FROM;
        encode_int16(writer, self.error_code);
        if flexible {
            let count = u32::try_from(self.api_versions.len())
                .ok()
                .and_then(|len| len.checked_add(1))
                .ok_or_else(|| AppError::InvalidEncoding("too many api keys".to_string()))?;
            encode_unsigned_varint(writer, count);
        } else {
            let count = i32::try_from(self.api_versions.len())
                .map_err(|_| AppError::InvalidEncoding("too many api keys".to_string()))?;
            encode_int32(writer, count);
        }
        for range in &self.api_versions {
            encode_int16(writer, range.api_key);
            encode_int16(writer, range.min_version);
            encode_int16(writer, range.max_version);
            if flexible {
                // no tagged fields per api key
                encode_unsigned_varint(writer, 0);
            }
        }
        if api_version >= 1 {
            encode_int32(writer, self.throttle_time_ms);
        }
        if flexible {
            encode_unsigned_varint(writer, 0);
        }
        Ok(())
    }

    pub fn read_from(bytes: &[u8], api_version: i16) -> AppResult<(ApiVersionsResponse, usize)> {
        let flexible = api_version >= API_VERSIONS_FLEXIBLE_FROM;
        let (error_code, mut offset) = decode_int16(bytes, 0)?;
        let count = if flexible {
            let (count, next) = decode_unsigned_varint(bytes, offset)?;
            offset = next;
            count.checked_sub(1).ok_or_else(|| {
                AppError::InvalidEncoding("api_keys array is null".to_string())
            })? as usize
        } else {
            let (count, next) = decode_int32(bytes, offset)?;
            offset = next;
            usize::try_from(count).map_err(|_| {
                AppError::InvalidEncoding(format!("api_keys array length {} is negative", count))
            })?
        };

        let mut api_versions = Vec::with_capacity(count.min(bytes.len() / 6));
        for _ in 0..count {
            let (api_key, next) = decode_int16(bytes, offset)?;
            let (min_version, next) = decode_int16(bytes, next)?;
            let (max_version, next) = decode_int16(bytes, next)?;
            offset = next;
            if flexible {
                offset = decode_tagged_fields(bytes, offset)?.1;
            }
            api_versions.push(ApiVersionRange::new(api_key, min_version, max_version));
        }

        let mut throttle_time_ms = 0;
        if api_version >= 1 {
            let (value, next) = decode_int32(bytes, offset)?;
            throttle_time_ms = value;
            offset = next;
        }
        if flexible {
            offset = decode_tagged_fields(bytes, offset)?.1;
        }
        Ok((
            ApiVersionsResponse {
                error_code,
                api_versions,
                throttle_time_ms,
            },
            offset,
        ))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn handler() -> ApiVersionsHandler {
        ApiVersionsHandler::new(vec![
            ApiVersionsHandler::registration_range(),
            ApiVersionRange::new(ApiKey::Fetch.as_i16(), 0, 16),
        ])
    }

    #[test]
    fn test_v4_layout() {
        let header = RequestHeader::new(18, 4, 311908132, Some("kafka-cli".to_string()));
        let body = handler().handle(&header, Bytes::new()).unwrap();
        #[rustfmt::skip]
        let expected: &[u8] = &[
            0x00, 0x00,                         // error_code
            0x03,                               // 2 api keys + 1
            0x00, 0x01, 0x00, 0x00, 0x00, 0x10, 0x00, // Fetch 0..=16
            0x00, 0x12, 0x00, 0x00, 0x00, 0x04, 0x00, // ApiVersions 0..=4
            0x00, 0x00, 0x00, 0x00,             // throttle_time_ms
            0x00,                               // tagged fields
        ];
        assert_eq!(&body[..], expected);
    }

    #[test]
    fn test_v0_has_no_throttle_time() {
        let header = RequestHeader::new(18, 0, 1, None);
        let body = handler().handle(&header, Bytes::new()).unwrap();
        // error_code + int32 count + 2 * 6 bytes
        assert_eq!(body.len(), 2 + 4 + 12);
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(2)]
    #[case(3)]
    #[case(4)]
    fn test_response_reads_back(#[case] api_version: i16) {
        let header = RequestHeader::new(18, api_version, 1, None);
        let body = handler().handle(&header, Bytes::new()).unwrap();
        let (response, offset) = ApiVersionsResponse::read_from(&body, api_version).unwrap();
        assert_eq!(offset, body.len());
        assert_eq!(response.error_code, 0);
        assert_eq!(
            response.api_versions,
            vec![
                ApiVersionRange::new(1, 0, 16),
                ApiVersionRange::new(18, 0, 4)
            ]
        );
    }

    #[test]
    fn test_range_contains() {
        let range = ApiVersionRange::new(1, 2, 5);
        assert!(range.contains(2));
        assert!(range.contains(5));
        assert!(!range.contains(1));
        assert!(!range.contains(i16::MAX));
    }
}
