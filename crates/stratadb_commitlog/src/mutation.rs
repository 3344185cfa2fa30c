//! The unit of write submitted to the commit log.

/// Fixed per-entry overhead: length prefix (4) + entry CRC (4) + tail
/// marker (4).
pub const ENTRY_OVERHEAD: u32 = 12;

/// A mutation submitted to the commit log.
///
/// A mutation is one or more row updates targeting a single keyspace. The
/// CDC-tracked bit is derived upstream from the keyspace's CDC datacenter
/// configuration; the allocator only consumes the boolean.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    keyspace: String,
    cdc_tracked: bool,
    payload: Vec<u8>,
}

impl Mutation {
    /// Creates a mutation that is not tracked by CDC.
    pub fn new(keyspace: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            keyspace: keyspace.into(),
            cdc_tracked: false,
            payload,
        }
    }

    /// Creates a CDC-tracked mutation.
    pub fn cdc_tracked(keyspace: impl Into<String>, payload: Vec<u8>) -> Self {
        Self {
            keyspace: keyspace.into(),
            cdc_tracked: true,
            payload,
        }
    }

    /// The keyspace this mutation targets.
    #[must_use]
    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    /// Whether this mutation is tracked by CDC.
    #[must_use]
    pub fn is_cdc_tracked(&self) -> bool {
        self.cdc_tracked
    }

    /// The serialized payload.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Total bytes this mutation occupies in a segment: entry overhead plus
    /// serialized size.
    #[must_use]
    pub fn serialized_size(&self) -> u32 {
        ENTRY_OVERHEAD + self.payload.len() as u32
    }
}
