use bytes::Bytes;

/// One entry of a tagged-field trailer.
///
/// The broker does not interpret any tag; entries are kept as opaque bytes in the order
/// they were received so that a re-encoded record is identical to the original.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedField {
    pub tag: u32,
    pub data: Bytes,
}

impl TaggedField {
    pub fn new(tag: u32, data: impl Into<Bytes>) -> Self {
        TaggedField {
            tag,
            data: data.into(),
        }
    }
}

/// Wire form of a nullable string.
///
/// - `Classic`: int16 length, -1 for null
/// - `Compact`: unsigned varint of length + 1, 0 for null
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StringEncoding {
    #[default]
    Classic,
    Compact,
}
