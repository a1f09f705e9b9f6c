//! Bit vectors carried by OP_QUERY requests and OP_REPLY responses.

/// OP_QUERY option bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryFlags(i32);

impl QueryFlags {
    /// Cursor stays open after the last document is returned.
    pub const TAILABLE_CURSOR: i32 = 1 << 1;
    /// Allow reads from a non-primary member.
    pub const SLAVE_OK: i32 = 1 << 2;
    /// Internal replication flag.
    pub const OPLOG_REPLAY: i32 = 1 << 3;
    /// Server does not time the cursor out after inactivity.
    pub const NO_CURSOR_TIMEOUT: i32 = 1 << 4;
    /// With a tailable cursor, block for a while instead of returning no data.
    pub const AWAIT_DATA: i32 = 1 << 5;
    /// Stream all batches without waiting for GET_MORE.
    pub const EXHAUST: i32 = 1 << 6;
    /// Return partial results if some shards are down.
    pub const PARTIAL: i32 = 1 << 7;

    pub fn new() -> Self {
        Self(0)
    }

    pub fn with(mut self, bit: i32) -> Self {
        self.0 |= bit;
        self
    }

    /// Sets `bit` only when `enabled` is true.
    pub fn with_if(self, bit: i32, enabled: bool) -> Self {
        if enabled {
            self.with(bit)
        } else {
            self
        }
    }

    pub fn contains(&self, bit: i32) -> bool {
        self.0 & bit != 0
    }

    pub fn bits(&self) -> i32 {
        self.0
    }

    pub fn from_bits(bits: i32) -> Self {
        Self(bits)
    }
}

/// OP_REPLY response bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResponseFlags(i32);

impl ResponseFlags {
    pub const CURSOR_NOT_FOUND: i32 = 1 << 0;
    pub const QUERY_FAILURE: i32 = 1 << 1;
    pub const SHARD_CONFIG_STALE: i32 = 1 << 2;
    pub const AWAIT_CAPABLE: i32 = 1 << 3;

    pub fn new() -> Self {
        Self(0)
    }

    pub fn with(mut self, bit: i32) -> Self {
        self.0 |= bit;
        self
    }

    /// The GET_MORE named a cursor the server no longer knows.
    pub fn is_cursor_not_found(&self) -> bool {
        self.0 & Self::CURSOR_NOT_FOUND != 0
    }

    /// The query failed; the single returned document holds `$err`.
    pub fn is_query_failure(&self) -> bool {
        self.0 & Self::QUERY_FAILURE != 0
    }

    pub fn is_shard_config_stale(&self) -> bool {
        self.0 & Self::SHARD_CONFIG_STALE != 0
    }

    pub fn is_await_capable(&self) -> bool {
        self.0 & Self::AWAIT_CAPABLE != 0
    }

    pub fn bits(&self) -> i32 {
        self.0
    }

    pub fn from_bits(bits: i32) -> Self {
        Self(bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_flags() {
        let flags = QueryFlags::new()
            .with(QueryFlags::TAILABLE_CURSOR)
            .with_if(QueryFlags::AWAIT_DATA, true)
            .with_if(QueryFlags::PARTIAL, false);

        assert_eq!(flags.bits(), 2 | 32);
        assert!(flags.contains(QueryFlags::TAILABLE_CURSOR));
        assert!(!flags.contains(QueryFlags::PARTIAL));
    }

    #[test]
    fn test_response_flags() {
        let flags = ResponseFlags::from_bits(0b1010);
        assert!(!flags.is_cursor_not_found());
        assert!(flags.is_query_failure());
        assert!(!flags.is_shard_config_stale());
        assert!(flags.is_await_capable());

        let flags = ResponseFlags::new().with(ResponseFlags::CURSOR_NOT_FOUND);
        assert!(flags.is_cursor_not_found());
        assert_eq!(flags.bits(), 1);
    }
}
