use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{AppError, AppResult};

/// Size of the big-endian length that precedes every frame.
pub const FRAME_LENGTH_SIZE: usize = 4;

/// One complete request, without its length prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestFrame {
    pub payload: Bytes,
}

impl RequestFrame {
    /// Validates the frame at the head of `buffer`.
    ///
    /// Returns the payload length once the whole frame is buffered and `None` while more
    /// bytes are needed. The length prefix is validated as soon as it is available, so an
    /// oversized or negative length fails before any payload byte is read.
    pub fn check(buffer: &mut BytesMut, max_frame_size: usize) -> AppResult<Option<usize>> {
        let Some(body_size) = Self::declared_length(&buffer[..]) else {
            return Ok(None);
        };
        if body_size < 0 {
            return Err(AppError::ProtocolViolation(format!(
                "frame size {} less than 0",
                body_size
            )));
        }
        let body_size = body_size as usize;
        if body_size > max_frame_size {
            return Err(AppError::ProtocolViolation(format!(
                "Frame of length {} is too large, max frame size is {}",
                body_size, max_frame_size
            )));
        }
        let frame_size = FRAME_LENGTH_SIZE + body_size;
        if buffer.remaining() < frame_size {
            buffer.reserve(frame_size - buffer.remaining());
            return Ok(None);
        }
        Ok(Some(body_size))
    }

    /// Splits the next complete frame off `buffer`, leaving any following bytes in place.
    pub fn parse(buffer: &mut BytesMut, max_frame_size: usize) -> AppResult<Option<RequestFrame>> {
        match Self::check(buffer, max_frame_size)? {
            Some(body_size) => {
                buffer.advance(FRAME_LENGTH_SIZE);
                let payload = buffer.split_to(body_size).freeze();
                Ok(Some(RequestFrame { payload }))
            }
            None => Ok(None),
        }
    }

    /// The length prefix at the head of `buffer`, if all four bytes have arrived.
    pub fn declared_length(buffer: &[u8]) -> Option<i32> {
        let prefix = buffer.get(..FRAME_LENGTH_SIZE)?;
        Some(i32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]))
    }
}

/// A response payload ready to be length-prefixed.
#[derive(Debug)]
pub struct ResponseFrame<'a> {
    pub payload: &'a [u8],
}

impl<'a> ResponseFrame<'a> {
    pub fn new(payload: &'a [u8]) -> Self {
        ResponseFrame { payload }
    }

    /// Length prefix followed by the payload, as one contiguous buffer.
    pub fn encode(&self) -> AppResult<BytesMut> {
        let length = i32::try_from(self.payload.len()).map_err(|_| {
            AppError::ProtocolViolation(format!(
                "response of {} bytes does not fit a frame",
                self.payload.len()
            ))
        })?;
        let mut frame = BytesMut::with_capacity(FRAME_LENGTH_SIZE + self.payload.len());
        frame.put_i32(length);
        frame.put_slice(self.payload);
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_incomplete_frame() {
        let mut buffer = BytesMut::from(&[0x00u8, 0x00][..]);
        assert_eq!(RequestFrame::parse(&mut buffer, 1024).unwrap(), None);

        let mut buffer = BytesMut::from(&[0x00u8, 0x00, 0x00, 0x05, 0x01, 0x02][..]);
        assert_eq!(RequestFrame::parse(&mut buffer, 1024).unwrap(), None);
        // nothing is consumed until the frame is complete
        assert_eq!(buffer.len(), 6);
        assert!(buffer.capacity() >= 9);
    }

    #[test]
    fn test_parse_stops_at_frame_boundary() {
        let mut buffer = BytesMut::from(&[0x00u8, 0x00, 0x00, 0x02, 0xaa, 0xbb, 0x00, 0x00][..]);
        let frame = RequestFrame::parse(&mut buffer, 1024).unwrap().unwrap();
        assert_eq!(&frame.payload[..], &[0xaa, 0xbb]);
        assert_eq!(&buffer[..], &[0x00, 0x00]);
    }

    #[test]
    fn test_empty_frame() {
        let mut buffer = BytesMut::from(&[0x00u8, 0x00, 0x00, 0x00][..]);
        let frame = RequestFrame::parse(&mut buffer, 1024).unwrap().unwrap();
        assert!(frame.payload.is_empty());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_oversized_frame_fails_before_payload() {
        let mut buffer = BytesMut::from(&[0x00u8, 0x00, 0x04, 0x01][..]);
        assert!(matches!(
            RequestFrame::parse(&mut buffer, 1024),
            Err(AppError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_negative_frame_length() {
        let mut buffer = BytesMut::from(&[0xffu8, 0xff, 0xff, 0xff, 0x00][..]);
        assert!(matches!(
            RequestFrame::parse(&mut buffer, 1024),
            Err(AppError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_response_frame_prefix() {
        let frame = ResponseFrame::new(&[0x00, 0x00, 0x00, 0x07]).encode().unwrap();
        assert_eq!(
            &frame[..],
            &[0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x07]
        );
    }

    #[test]
    fn test_response_frame_reads_back() {
        let payload = b"correlated response".to_vec();
        let mut buffer = ResponseFrame::new(&payload).encode().unwrap();
        let frame = RequestFrame::parse(&mut buffer, 1024).unwrap().unwrap();
        assert_eq!(&frame.payload[..], &payload[..]);
    }
}
