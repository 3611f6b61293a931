/// Api keys the broker knows by name.
///
/// The dispatcher routes on the raw `i16` received on the wire, so an api key missing
/// from this enum can still be registered and served. The names are used for logging
/// and for the handlers that ship with the broker.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ApiKey {
    Produce = 0,
    Fetch = 1,
    ListOffsets = 2,
    Metadata = 3,
    OffsetCommit = 8,
    OffsetFetch = 9,
    FindCoordinator = 10,
    JoinGroup = 11,
    Heartbeat = 12,
    LeaveGroup = 13,
    SyncGroup = 14,
    ApiVersions = 18,
    CreateTopics = 19,
    DescribeTopicPartitions = 75,
}

impl ApiKey {
    pub fn from_i16(value: i16) -> Option<Self> {
        match value {
            0 => Some(ApiKey::Produce),
            1 => Some(ApiKey::Fetch),
            2 => Some(ApiKey::ListOffsets),
            3 => Some(ApiKey::Metadata),
            8 => Some(ApiKey::OffsetCommit),
            9 => Some(ApiKey::OffsetFetch),
            10 => Some(ApiKey::FindCoordinator),
            11 => Some(ApiKey::JoinGroup),
            12 => Some(ApiKey::Heartbeat),
            13 => Some(ApiKey::LeaveGroup),
            14 => Some(ApiKey::SyncGroup),
            18 => Some(ApiKey::ApiVersions),
            19 => Some(ApiKey::CreateTopics),
            75 => Some(ApiKey::DescribeTopicPartitions),
            _ => None,
        }
    }

    pub fn as_i16(&self) -> i16 {
        *self as i16
    }

    /// Name of a raw api key for log lines, `"Unknown"` when it has none.
    pub fn name_of(value: i16) -> &'static str {
        match ApiKey::from_i16(value) {
            Some(ApiKey::Produce) => "Produce",
            Some(ApiKey::Fetch) => "Fetch",
            Some(ApiKey::ListOffsets) => "ListOffsets",
            Some(ApiKey::Metadata) => "Metadata",
            Some(ApiKey::OffsetCommit) => "OffsetCommit",
            Some(ApiKey::OffsetFetch) => "OffsetFetch",
            Some(ApiKey::FindCoordinator) => "FindCoordinator",
            Some(ApiKey::JoinGroup) => "JoinGroup",
            Some(ApiKey::Heartbeat) => "Heartbeat",
            Some(ApiKey::LeaveGroup) => "LeaveGroup",
            Some(ApiKey::SyncGroup) => "SyncGroup",
            Some(ApiKey::ApiVersions) => "ApiVersions",
            Some(ApiKey::CreateTopics) => "CreateTopics",
            Some(ApiKey::DescribeTopicPartitions) => "DescribeTopicPartitions",
            None => "Unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_conversion() {
        assert_eq!(ApiKey::from_i16(18), Some(ApiKey::ApiVersions));
        assert_eq!(ApiKey::ApiVersions.as_i16(), 18);
        assert_eq!(ApiKey::from_i16(9999), None);
        assert_eq!(ApiKey::name_of(9999), "Unknown");
        assert_eq!(ApiKey::name_of(3), "Metadata");
    }
}
