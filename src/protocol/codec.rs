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

//! Wire codec for the primitive types shared by every request and response header.
//!
//! Decoders are pure functions over a byte slice and an offset. They return the decoded
//! value together with the offset just past it, so callers can chain them without
//! mutating the input. Encoders append to a `BytesMut` and are the exact inverse of the
//! matching decoder.
//!
//! All integers are big-endian. Varints are unsigned LEB128.

use bytes::{BufMut, Bytes, BytesMut};
use integer_encoding::VarInt;

use crate::protocol::types::{StringEncoding, TaggedField};
use crate::{AppError, AppResult};

/// Returns `offset..offset + len` if it lies within `bytes`.
fn checked_range(
    bytes: &[u8],
    offset: usize,
    len: usize,
) -> Option<std::ops::Range<usize>> {
    let end = offset.checked_add(len)?;
    (end <= bytes.len()).then_some(offset..end)
}

///
/// Generate the decode/encode pair for a fixed width big-endian integer.
///
macro_rules! fixed_width_codec {
    ($decode:ident, $encode:ident, $type:ty, $put_method:ident, $size:expr) => {
        pub fn $decode(bytes: &[u8], offset: usize) -> AppResult<($type, usize)> {
            let range = checked_range(bytes, offset, $size).ok_or_else(|| {
                AppError::TruncatedInput(format!(
                    "can not read a {} at offset {}, {} bytes available",
                    stringify!($type),
                    offset,
                    bytes.len().saturating_sub(offset)
                ))
            })?;
            let mut raw = [0u8; $size];
            raw.copy_from_slice(&bytes[range]);
            Ok((<$type>::from_be_bytes(raw), offset + $size))
        }

        pub fn $encode(writer: &mut BytesMut, value: $type) {
            writer.$put_method(value);
        }
    };
}

fixed_width_codec!(decode_int16, encode_int16, i16, put_i16, 2);
fixed_width_codec!(decode_int32, encode_int32, i32, put_i32, 4);

/// Longest LEB128 encoding of a `u32`.
const MAX_VARINT32_SIZE: usize = 5;

/// Reads an unsigned varint.
///
/// Input that ends before the terminating byte is `TruncatedInput`; a terminated varint
/// whose value does not fit a `u32` is `InvalidEncoding`.
pub fn decode_unsigned_varint(bytes: &[u8], offset: usize) -> AppResult<(u32, usize)> {
    let remaining = bytes.get(offset..).unwrap_or_default();
    let Some(last) = remaining.iter().position(|b| b & 0x80 == 0) else {
        return Err(AppError::TruncatedInput(format!(
            "can not read an unsigned varint at offset {}",
            offset
        )));
    };
    let overflow = || {
        AppError::InvalidEncoding(format!(
            "unsigned varint of {} bytes at offset {} overflows u32",
            last + 1,
            offset
        ))
    };
    // the fifth byte only has room for the top 4 bits
    if last >= MAX_VARINT32_SIZE || (last == MAX_VARINT32_SIZE - 1 && remaining[last] > 0x0f) {
        return Err(overflow());
    }
    match u32::decode_var(&remaining[..=last]) {
        Some((value, read_size)) => Ok((value, offset + read_size)),
        None => Err(overflow()),
    }
}

pub fn encode_unsigned_varint(writer: &mut BytesMut, value: u32) {
    writer.put_slice(u32::encode_var_vec(value).as_slice());
}

fn utf8_at(bytes: &[u8], offset: usize, len: usize) -> AppResult<(String, usize)> {
    let range = checked_range(bytes, offset, len).ok_or_else(|| {
        AppError::InvalidEncoding(format!(
            "string of {} bytes at offset {} runs past the end of a {} byte buffer",
            len,
            offset,
            bytes.len()
        ))
    })?;
    let end = range.end;
    let value = String::from_utf8(bytes[range].to_vec())
        .map_err(|e| AppError::InvalidEncoding(format!("string is not utf-8: {}", e)))?;
    Ok((value, end))
}

/// Reads a compact nullable string: varint `N`, null when `N == 0`, otherwise `N - 1` bytes.
pub fn decode_compact_string(bytes: &[u8], offset: usize) -> AppResult<(Option<String>, usize)> {
    let (length_plus_one, offset) = decode_unsigned_varint(bytes, offset)?;
    match length_plus_one {
        0 => Ok((None, offset)),
        n => {
            let (value, offset) = utf8_at(bytes, offset, (n - 1) as usize)?;
            Ok((Some(value), offset))
        }
    }
}

pub fn encode_compact_string(writer: &mut BytesMut, value: Option<&str>) -> AppResult<()> {
    match value {
        None => encode_unsigned_varint(writer, 0),
        Some(value) => {
            let length = u32::try_from(value.len())
                .ok()
                .and_then(|len| len.checked_add(1))
                .ok_or_else(|| {
                    AppError::InvalidEncoding(format!(
                        "compact string of {} bytes is too long",
                        value.len()
                    ))
                })?;
            encode_unsigned_varint(writer, length);
            writer.put_slice(value.as_bytes());
        }
    }
    Ok(())
}

/// Reads a classic nullable string: int16 length, null when the length is -1.
pub fn decode_nullable_string(bytes: &[u8], offset: usize) -> AppResult<(Option<String>, usize)> {
    let (length, offset) = decode_int16(bytes, offset)?;
    match length {
        -1 => Ok((None, offset)),
        len if len < -1 => Err(AppError::InvalidEncoding(format!(
            "nullable string length {} is negative",
            len
        ))),
        len => {
            let (value, offset) = utf8_at(bytes, offset, len as usize)?;
            Ok((Some(value), offset))
        }
    }
}

pub fn encode_nullable_string(writer: &mut BytesMut, value: Option<&str>) -> AppResult<()> {
    match value {
        None => encode_int16(writer, -1),
        Some(value) => {
            let length = i16::try_from(value.len()).map_err(|_| {
                AppError::InvalidEncoding(format!(
                    "nullable string of {} bytes exceeds {}",
                    value.len(),
                    i16::MAX
                ))
            })?;
            encode_int16(writer, length);
            writer.put_slice(value.as_bytes());
        }
    }
    Ok(())
}

pub fn decode_string(
    bytes: &[u8],
    offset: usize,
    encoding: StringEncoding,
) -> AppResult<(Option<String>, usize)> {
    match encoding {
        StringEncoding::Classic => decode_nullable_string(bytes, offset),
        StringEncoding::Compact => decode_compact_string(bytes, offset),
    }
}

pub fn encode_string(
    writer: &mut BytesMut,
    value: Option<&str>,
    encoding: StringEncoding,
) -> AppResult<()> {
    match encoding {
        StringEncoding::Classic => encode_nullable_string(writer, value),
        StringEncoding::Compact => encode_compact_string(writer, value),
    }
}

/// Reads a tagged-field trailer: varint count, then `(tag, length, data)` for each entry.
///
/// Tags are not checked against any known set.
pub fn decode_tagged_fields(bytes: &[u8], offset: usize) -> AppResult<(Vec<TaggedField>, usize)> {
    let (count, mut offset) = decode_unsigned_varint(bytes, offset)?;
    // every entry takes at least two bytes, cap the preallocation by what the buffer could hold
    let capacity = (count as usize).min(bytes.len().saturating_sub(offset) / 2);
    let mut fields = Vec::with_capacity(capacity);
    for _ in 0..count {
        let (tag, next) = decode_unsigned_varint(bytes, offset)?;
        let (length, next) = decode_unsigned_varint(bytes, next)?;
        let range = checked_range(bytes, next, length as usize).ok_or_else(|| {
            AppError::InvalidEncoding(format!(
                "tagged field {} of {} bytes runs past the end of the buffer",
                tag, length
            ))
        })?;
        offset = range.end;
        fields.push(TaggedField {
            tag,
            data: Bytes::copy_from_slice(&bytes[range]),
        });
    }
    Ok((fields, offset))
}

pub fn encode_tagged_fields(writer: &mut BytesMut, fields: &[TaggedField]) -> AppResult<()> {
    let count = u32::try_from(fields.len())
        .map_err(|_| AppError::InvalidEncoding("too many tagged fields".to_string()))?;
    encode_unsigned_varint(writer, count);
    for field in fields {
        let length = u32::try_from(field.data.len()).map_err(|_| {
            AppError::InvalidEncoding(format!("tagged field {} is too large", field.tag))
        })?;
        encode_unsigned_varint(writer, field.tag);
        encode_unsigned_varint(writer, length);
        writer.put_slice(&field.data);
    }
    Ok(())
}
