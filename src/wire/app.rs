//! The iwab application header.
//!
//! 22 bytes, little-endian, padded to keep the payload start stable:
//!
//! ```text
//! offset  field      size
//! 0       version    1     currently 0
//! 1       length     2     payload bytes
//! 3       seq        4     monotonic across primary sends
//! 7       timestamp  8     µs since the sender's stream epoch
//! 15      retry      1     0 on the primary, 1 on its retransmission
//! 16      pad        6
//! ```

/// Encoded header size.
pub const LEN: usize = 22;

/// Protocol version stamped on every frame.
pub const VERSION: u8 = 0;

/// Decoded application header.
///
/// `seq` is strictly monotonic across distinct primary sends and only
/// wraps at 2^32; a retry shares its primary's `seq` and `timestamp` and
/// differs only in `retry`. Zero is reserved as the receiver's
/// "uninitialised" sentinel, so senders count from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IwabHeader {
    pub version: u8,
    pub length: u16,
    pub seq: u32,
    pub timestamp: u64,
    pub retry: u8,
}

impl IwabHeader {
    /// Encode into a wire buffer. Pad bytes are written as zero.
    pub fn write(&self, out: &mut [u8; LEN]) {
        out[0] = self.version;
        out[1..3].copy_from_slice(&self.length.to_le_bytes());
        out[3..7].copy_from_slice(&self.seq.to_le_bytes());
        out[7..15].copy_from_slice(&self.timestamp.to_le_bytes());
        out[15] = self.retry;
        out[16..LEN].fill(0);
    }

    /// Decode from a buffer of at least [`LEN`] bytes.
    pub fn parse(buf: &[u8]) -> Self {
        Self {
            version: buf[0],
            length: u16::from_le_bytes([buf[1], buf[2]]),
            seq: u32::from_le_bytes([buf[3], buf[4], buf[5], buf[6]]),
            timestamp: u64::from_le_bytes([
                buf[7], buf[8], buf[9], buf[10], buf[11], buf[12], buf[13], buf[14],
            ]),
            retry: buf[15],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_parse_roundtrip() {
        let hdr = IwabHeader {
            version: VERSION,
            length: 1400,
            seq: 0xdead_beef,
            timestamp: 0x0123_4567_89ab_cdef,
            retry: 1,
        };
        let mut buf = [0xffu8; LEN];
        hdr.write(&mut buf);
        assert_eq!(IwabHeader::parse(&buf), hdr);
        // padding got cleared
        assert_eq!(&buf[16..], &[0u8; 6]);
    }

    #[test]
    fn test_little_endian_layout() {
        let hdr = IwabHeader {
            version: 0,
            length: 0x0102,
            seq: 0x03040506,
            timestamp: 0x0708090a0b0c0d0e,
            retry: 0,
        };
        let mut buf = [0u8; LEN];
        hdr.write(&mut buf);
        assert_eq!(buf[1], 0x02); // length LSB first
        assert_eq!(buf[2], 0x01);
        assert_eq!(buf[3], 0x06); // seq LSB first
        assert_eq!(buf[7], 0x0e); // timestamp LSB first
    }
}
