//! Packet types

use std::fmt;

use crate::{Error, Result};

/// Capture timestamp as reported by the capture library
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    /// Seconds since the Unix epoch
    pub seconds: i64,
    /// Microseconds within the second
    pub micros: i64,
}

impl Timestamp {
    pub const fn new(seconds: i64, micros: i64) -> Self {
        Self { seconds, micros }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:06}", self.seconds, self.micros)
    }
}

/// Per-packet header surfaced by the capture loop
///
/// Only valid for the duration of one capture callback, together with the
/// borrowed packet bytes it describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub timestamp: Timestamp,
    /// Number of bytes actually captured
    pub caplen: u32,
    /// Length of the packet on the wire
    pub len: u32,
}

impl PacketHeader {
    pub fn new(timestamp: Timestamp, caplen: u32, len: u32) -> Self {
        Self {
            timestamp,
            caplen,
            len,
        }
    }
}

/// A captured packet with its own copy of the payload
///
/// Produced by the capture worker from transient capture-library memory and
/// handed to the consumer by value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedPacket {
    /// Position of this packet in the session's capture order
    pub sequence: u64,
    /// When the packet was captured
    pub timestamp: Timestamp,
    /// Number of captured bytes (`payload.len()`)
    pub capture_length: u32,
    /// Length of the packet on the wire (may exceed `capture_length` if truncated)
    pub original_length: u32,
    /// Captured bytes, including all headers
    pub payload: Vec<u8>,
}

impl CapturedPacket {
    /// Copy a transient header and buffer into an owned packet.
    ///
    /// Fails with [`Error::PacketAllocation`] if the buffer is shorter than the
    /// header's capture length or the payload cannot be allocated.
    pub fn copy_from(sequence: u64, header: &PacketHeader, data: &[u8]) -> Result<Self> {
        let caplen = header.caplen as usize;
        if data.len() < caplen {
            return Err(Error::PacketAllocation(format!(
                "buffer holds {} bytes, header claims {}",
                data.len(),
                caplen
            )));
        }

        let mut payload = Vec::new();
        payload
            .try_reserve_exact(caplen)
            .map_err(|e| Error::PacketAllocation(format!("{} bytes: {}", caplen, e)))?;
        payload.extend_from_slice(&data[..caplen]);

        Ok(Self {
            sequence,
            timestamp: header.timestamp,
            capture_length: header.caplen,
            original_length: header.len,
            payload,
        })
    }

    /// Header describing this packet
    pub fn header(&self) -> PacketHeader {
        PacketHeader::new(self.timestamp, self.capture_length, self.original_length)
    }

    /// Get packet data as slice
    pub fn data(&self) -> &[u8] {
        &self.payload
    }

    /// Get captured length
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Check if packet is empty
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Whether the snapshot length cut the packet short
    pub fn is_truncated(&self) -> bool {
        self.original_length > self.capture_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_from_owns_payload() {
        let header = PacketHeader::new(Timestamp::new(10, 5), 4, 60);
        let mut buffer = vec![1u8, 2, 3, 4, 5, 6];

        let packet = CapturedPacket::copy_from(7, &header, &buffer).unwrap();
        buffer.fill(0);

        assert_eq!(packet.sequence, 7);
        assert_eq!(packet.data(), &[1, 2, 3, 4]);
        assert_eq!(packet.capture_length, 4);
        assert_eq!(packet.original_length, 60);
        assert!(packet.is_truncated());
        assert_eq!(packet.header(), header);
    }

    #[test]
    fn test_copy_from_short_buffer() {
        let header = PacketHeader::new(Timestamp::default(), 10, 10);
        let result = CapturedPacket::copy_from(0, &header, &[0u8; 3]);
        assert!(matches!(result, Err(Error::PacketAllocation(_))));
    }

    #[test]
    fn test_timestamp_ordering() {
        let a = Timestamp::new(1, 999_999);
        let b = Timestamp::new(2, 0);
        assert!(a < b);
        assert!(Timestamp::new(2, 1) > b);
        assert_eq!(b.to_string(), "2.000000");
    }
}
