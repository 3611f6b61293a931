use bytes::BytesMut;

use crate::protocol::codec::{
    decode_int16, decode_int32, decode_string, decode_tagged_fields, encode_int16, encode_int32,
    encode_string, encode_tagged_fields,
};
use crate::protocol::{StringEncoding, TaggedField};
use crate::{AppError, AppResult};

/// api_key + api_version + correlation_id
pub const FIXED_HEADER_SIZE: usize = 2 + 2 + 4;

/// How the variable part of a request header is laid out for one api key and version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeaderFormat {
    pub client_id_encoding: StringEncoding,
    /// a tagged-field trailer follows the client id
    pub tagged_fields: bool,
}

impl HeaderFormat {
    pub const CLASSIC: HeaderFormat = HeaderFormat {
        client_id_encoding: StringEncoding::Classic,
        tagged_fields: false,
    };
}

/// The fixed-size start of every request header.
///
/// It is all the dispatcher needs to pick a handler, and all it needs to answer a
/// request it cannot route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderPrefix {
    pub api_key: i16,
    pub api_version: i16,
    pub correlation_id: i32,
}

impl HeaderPrefix {
    pub fn read_from(payload: &[u8]) -> AppResult<HeaderPrefix> {
        if payload.len() < FIXED_HEADER_SIZE {
            return Err(AppError::MalformedHeader(format!(
                "request of {} bytes is shorter than the {} byte fixed header",
                payload.len(),
                FIXED_HEADER_SIZE
            )));
        }
        let (api_key, offset) = decode_int16(payload, 0)?;
        let (api_version, offset) = decode_int16(payload, offset)?;
        let (correlation_id, _) = decode_int32(payload, offset)?;
        Ok(HeaderPrefix {
            api_key,
            api_version,
            correlation_id,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHeader {
    pub api_key: i16,
    pub api_version: i16,
    pub correlation_id: i32,
    pub client_id: Option<String>,
    pub tagged_fields: Vec<TaggedField>,
}

impl RequestHeader {
    pub fn new(api_key: i16, api_version: i16, correlation_id: i32, client_id: Option<String>) -> Self {
        RequestHeader {
            api_key,
            api_version,
            correlation_id,
            client_id,
            tagged_fields: Vec::new(),
        }
    }

    /// Reads a request header from the start of a frame payload.
    ///
    /// Returns the header and the offset of the first body byte. When `format` has no
    /// tagged-field trailer the returned header has no tagged fields.
    pub fn read_from(payload: &[u8], format: HeaderFormat) -> AppResult<(RequestHeader, usize)> {
        let prefix = HeaderPrefix::read_from(payload)?;
        let (client_id, offset) =
            decode_string(payload, FIXED_HEADER_SIZE, format.client_id_encoding)?;
        let (tagged_fields, offset) = if format.tagged_fields {
            decode_tagged_fields(payload, offset)?
        } else {
            (Vec::new(), offset)
        };

        Ok((
            RequestHeader {
                api_key: prefix.api_key,
                api_version: prefix.api_version,
                correlation_id: prefix.correlation_id,
                client_id,
                tagged_fields,
            },
            offset,
        ))
    }

    pub fn write_to(&self, writer: &mut BytesMut, format: HeaderFormat) -> AppResult<()> {
        encode_int16(writer, self.api_key);
        encode_int16(writer, self.api_version);
        encode_int32(writer, self.correlation_id);
        encode_string(writer, self.client_id.as_deref(), format.client_id_encoding)?;
        if format.tagged_fields {
            encode_tagged_fields(writer, &self.tagged_fields)?;
        } else if !self.tagged_fields.is_empty() {
            return Err(AppError::InvalidEncoding(
                "header format has no room for tagged fields".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHeader {
    pub correlation_id: i32,
    pub tagged_fields: Vec<TaggedField>,
}

impl ResponseHeader {
    pub fn new(correlation_id: i32) -> Self {
        ResponseHeader {
            correlation_id,
            tagged_fields: Vec::new(),
        }
    }

    /// Writes the header, with a tagged-field trailer when `flexible` is set.
    pub fn write_to(&self, writer: &mut BytesMut, flexible: bool) -> AppResult<()> {
        encode_int32(writer, self.correlation_id);
        if flexible {
            encode_tagged_fields(writer, &self.tagged_fields)?;
        }
        Ok(())
    }

    pub fn read_from(payload: &[u8], flexible: bool) -> AppResult<(ResponseHeader, usize)> {
        let (correlation_id, offset) = decode_int32(payload, 0)?;
        let (tagged_fields, offset) = if flexible {
            decode_tagged_fields(payload, offset)?
        } else {
            (Vec::new(), offset)
        };
        Ok((
            ResponseHeader {
                correlation_id,
                tagged_fields,
            },
            offset,
        ))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    const COMPACT_FLEXIBLE: HeaderFormat = HeaderFormat {
        client_id_encoding: StringEncoding::Compact,
        tagged_fields: true,
    };
    const CLASSIC_FLEXIBLE: HeaderFormat = HeaderFormat {
        client_id_encoding: StringEncoding::Classic,
        tagged_fields: true,
    };

    fn sample_header(format: HeaderFormat, client_id: Option<&str>) -> RequestHeader {
        let mut header = RequestHeader::new(18, 4, i32::MIN, client_id.map(str::to_string));
        if format.tagged_fields {
            header.tagged_fields = vec![
                TaggedField::new(0, vec![0x01u8]),
                TaggedField::new(4242, Vec::<u8>::new()),
            ];
        }
        header
    }

    #[rstest]
    #[case(HeaderFormat::CLASSIC, Some("kafka-cli"))]
    #[case(HeaderFormat::CLASSIC, None)]
    #[case(CLASSIC_FLEXIBLE, Some("kafka-cli"))]
    #[case(COMPACT_FLEXIBLE, Some(""))]
    #[case(COMPACT_FLEXIBLE, None)]
    fn test_header_round_trip(#[case] format: HeaderFormat, #[case] client_id: Option<&str>) {
        let header = sample_header(format, client_id);
        let mut writer = BytesMut::new();
        header.write_to(&mut writer, format).unwrap();
        // the body starts right after the header
        writer.extend_from_slice(&[0xde, 0xad]);

        let (decoded, offset) = RequestHeader::read_from(&writer, format).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(&writer[offset..], &[0xde, 0xad]);
    }

    #[test]
    fn test_classic_header_layout() {
        let header = RequestHeader::new(18, 3, 7, Some("ab".to_string()));
        let mut writer = BytesMut::new();
        header.write_to(&mut writer, HeaderFormat::CLASSIC).unwrap();
        assert_eq!(
            &writer[..],
            &[0x00, 0x12, 0x00, 0x03, 0x00, 0x00, 0x00, 0x07, 0x00, 0x02, b'a', b'b']
        );
    }

    #[test]
    fn test_short_header_is_malformed() {
        let payload = [0x00, 0x12, 0x00, 0x04, 0x00, 0x00, 0x00];
        assert!(matches!(
            HeaderPrefix::read_from(&payload),
            Err(AppError::MalformedHeader(_))
        ));
        assert!(matches!(
            RequestHeader::read_from(&payload, HeaderFormat::CLASSIC),
            Err(AppError::MalformedHeader(_))
        ));
    }

    #[test]
    fn test_prefix_without_client_id() {
        let payload = [0x27, 0x0f, 0x7f, 0xff, 0xff, 0xff, 0xff, 0x85];
        let prefix = HeaderPrefix::read_from(&payload).unwrap();
        assert_eq!(
            prefix,
            HeaderPrefix {
                api_key: 9999,
                api_version: i16::MAX,
                correlation_id: -123,
            }
        );
        // the client id is missing entirely, so the full header is truncated
        assert!(matches!(
            RequestHeader::read_from(&payload, HeaderFormat::CLASSIC),
            Err(AppError::TruncatedInput(_))
        ));
    }

    #[test]
    fn test_tagged_fields_need_flexible_format() {
        let header = sample_header(COMPACT_FLEXIBLE, Some("x"));
        let mut writer = BytesMut::new();
        assert!(header.write_to(&mut writer, HeaderFormat::CLASSIC).is_err());
    }

    #[test]
    fn test_response_header() {
        let mut writer = BytesMut::new();
        ResponseHeader::new(-1).write_to(&mut writer, false).unwrap();
        assert_eq!(&writer[..], &[0xff, 0xff, 0xff, 0xff]);

        writer.clear();
        ResponseHeader::new(42).write_to(&mut writer, true).unwrap();
        assert_eq!(&writer[..], &[0x00, 0x00, 0x00, 0x2a, 0x00]);
        let (header, offset) = ResponseHeader::read_from(&writer, true).unwrap();
        assert_eq!(header, ResponseHeader::new(42));
        assert_eq!(offset, 5);
    }
}
