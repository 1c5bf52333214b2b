//! Frame encoding and decoding between the relay and the datagram link.
//!
//! Every payload that crosses the relay carries a fixed [`HEADER_SIZE`]-byte
//! header, so the frame on the relay is exactly `HEADER_SIZE` bytes longer
//! than the payload on the datagram link.
//!
//! Wire format (8 bytes + payload):
//! ```text
//! +---------+--------+------------+------------------+-----------+
//! | Version | Flags  | Reserved   | Payload Length   | Payload   |
//! | 1 byte  | 1 byte | 2 bytes    | 4 bytes (BE32)   | N bytes   |
//! +---------+--------+------------+------------------+-----------+
//! ```
//!
//! Decoding only checks the frame length. Header fields and payload are
//! passed through as-is.

use crate::core::{DEFAULT_DATAGRAM_MTU, FRAME_VERSION, FrameError, HEADER_SIZE};

/// Frame flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameFlags(u8);

impl FrameFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// Final frame of a session (sent with the reliable hint).
    pub const FINAL: Self = Self(0x01);

    /// Create flags from a raw byte.
    pub fn from_byte(byte: u8) -> Self {
        Self(byte)
    }

    /// Get the raw byte value.
    pub fn as_byte(self) -> u8 {
        self.0
    }

    /// Check if FINAL is set.
    pub fn is_final(self) -> bool {
        self.0 & 0x01 != 0
    }

    /// Set FINAL.
    pub fn with_final(self) -> Self {
        Self(self.0 | 0x01)
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Format version.
    pub version: u8,
    /// Flags.
    pub flags: FrameFlags,
    /// Payload length as written by the sender.
    pub payload_len: u32,
}

impl FrameHeader {
    /// Header for a payload of `payload_len` bytes.
    pub fn new(flags: FrameFlags, payload_len: u32) -> Self {
        Self {
            version: FRAME_VERSION,
            flags,
            payload_len,
        }
    }

    /// Serialize to bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0] = self.version;
        buf[1] = self.flags.as_byte();
        buf[4..8].copy_from_slice(&self.payload_len.to_be_bytes());
        buf
    }

    /// Parse from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FrameError> {
        if bytes.len() < HEADER_SIZE {
            return Err(FrameError::TooShort {
                expected: HEADER_SIZE,
                actual: bytes.len(),
            });
        }

        Ok(Self {
            version: bytes[0],
            flags: FrameFlags::from_byte(bytes[1]),
            payload_len: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        })
    }
}

/// Encoder/decoder bound to a maximum frame size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketFramer {
    max_frame_size: usize,
}

impl Default for PacketFramer {
    fn default() -> Self {
        Self::new(DEFAULT_DATAGRAM_MTU)
    }
}

impl PacketFramer {
    /// Create a framer whose frames never exceed `max_frame_size` bytes.
    pub const fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Maximum encoded frame size.
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Largest payload that can be encoded.
    pub fn max_payload_size(&self) -> usize {
        self.max_frame_size.saturating_sub(HEADER_SIZE)
    }

    /// Encode a payload with no flags.
    pub fn encode(&self, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
        self.encode_into(payload, FrameFlags::NONE, &mut frame)?;
        Ok(frame)
    }

    /// Encode a payload into `out`, replacing its contents.
    ///
    /// `out` is left empty on error.
    pub fn encode_into(
        &self,
        payload: &[u8],
        flags: FrameFlags,
        out: &mut Vec<u8>,
    ) -> Result<(), FrameError> {
        out.clear();

        let size = HEADER_SIZE + payload.len();
        if size > self.max_frame_size {
            return Err(FrameError::ExceedsMtu {
                size,
                mtu: self.max_frame_size,
            });
        }

        // Bounded by max_frame_size above, which is far below u32::MAX in practice.
        let payload_len = u32::try_from(payload.len()).map_err(|_| FrameError::ExceedsMtu {
            size,
            mtu: self.max_frame_size,
        })?;

        out.reserve(size);
        out.extend_from_slice(&FrameHeader::new(flags, payload_len).to_bytes());
        out.extend_from_slice(payload);
        Ok(())
    }

    /// Decode a frame, returning the payload.
    pub fn decode<'a>(&self, frame: &'a [u8]) -> Result<&'a [u8], FrameError> {
        self.decode_frame(frame).map(|(_, payload)| payload)
    }

    /// Decode a frame, returning the header and the payload.
    pub fn decode_frame<'a>(&self, frame: &'a [u8]) -> Result<(FrameHeader, &'a [u8]), FrameError> {
        let header = FrameHeader::from_bytes(frame)?;
        if frame.len() > self.max_frame_size {
            return Err(FrameError::ExceedsMtu {
                size: frame.len(),
                mtu: self.max_frame_size,
            });
        }
        Ok((header, &frame[HEADER_SIZE..]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_length_is_payload_plus_header() {
        let framer = PacketFramer::default();
        let frame = framer.encode(&[1, 2, 3]).unwrap();
        assert_eq!(frame.len(), 3 + HEADER_SIZE);
        assert_eq!(framer.decode(&frame).unwrap(), &[1, 2, 3]);
    }

    #[test]
    fn test_header_layout() {
        let framer = PacketFramer::default();
        let mut frame = Vec::new();
        framer
            .encode_into(&[0xAA; 5], FrameFlags::NONE.with_final(), &mut frame)
            .unwrap();

        assert_eq!(&frame[..HEADER_SIZE], &[FRAME_VERSION, 0x01, 0, 0, 0, 0, 0, 5]);

        let (header, payload) = framer.decode_frame(&frame).unwrap();
        assert!(header.flags.is_final());
        assert_eq!(header.payload_len, 5);
        assert_eq!(payload, &[0xAA; 5]);
    }

    #[test]
    fn test_empty_payload() {
        let framer = PacketFramer::default();
        let frame = framer.encode(&[]).unwrap();
        assert_eq!(frame.len(), HEADER_SIZE);
        assert!(framer.decode(&frame).unwrap().is_empty());
    }

    #[test]
    fn test_decode_too_short() {
        let framer = PacketFramer::default();
        let err = framer.decode(&[1, 0, 0]).unwrap_err();
        assert_eq!(
            err,
            FrameError::TooShort {
                expected: HEADER_SIZE,
                actual: 3
            }
        );
    }

    #[test]
    fn test_encode_exceeds_mtu() {
        let framer = PacketFramer::new(64);
        assert!(framer.encode(&[0u8; 56]).is_ok());

        let err = framer.encode(&[0u8; 57]).unwrap_err();
        assert_eq!(err, FrameError::ExceedsMtu { size: 65, mtu: 64 });
    }

    #[test]
    fn test_encode_into_clears_on_error() {
        let framer = PacketFramer::new(16);
        let mut out = vec![9u8; 4];
        assert!(framer.encode_into(&[0u8; 32], FrameFlags::NONE, &mut out).is_err());
        assert!(out.is_empty());
    }

    #[test]
    fn test_decode_exceeds_mtu() {
        let framer = PacketFramer::new(16);
        let err = framer.decode(&[0u8; 17]).unwrap_err();
        assert_eq!(err, FrameError::ExceedsMtu { size: 17, mtu: 16 });
    }

    #[test]
    fn test_decode_does_not_validate_header_fields() {
        let framer = PacketFramer::default();
        // Unknown version, stray flags, wrong length field: still decodes.
        let frame = [0xFF, 0xFE, 0xAB, 0xCD, 0, 0, 0, 99, 7, 7];
        assert_eq!(framer.decode(&frame).unwrap(), &[7, 7]);
    }

    #[test]
    fn test_max_payload_size() {
        assert_eq!(PacketFramer::default().max_payload_size(), DEFAULT_DATAGRAM_MTU - HEADER_SIZE);
        assert_eq!(PacketFramer::new(4).max_payload_size(), 0);
    }
}
