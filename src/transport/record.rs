//! Protocol record carried inside each encrypted frame.
//!
//! Wire format (plaintext, before encryption):
//! ```text
//! +-----------+------------------+--------------------+-------------+
//! | Direction | Timestamp        | Timestamp Reply    | Payload     |
//! | 1 byte    | 2 bytes (BE16)   | 2 bytes (BE16)     | rest        |
//! +-----------+------------------+--------------------+-------------+
//! ```
//!
//! A timestamp reply of [`TIMESTAMP_NONE`] means the sender has not seen a
//! recent peer timestamp.

use thiserror::Error;

use crate::core::{DIRECTION_TO_CLIENT, DIRECTION_TO_SERVER, RECORD_HEADER_SIZE, TIMESTAMP_NONE};

/// Which way a record travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Client to server.
    ToServer,
    /// Server to client.
    ToClient,
}

impl Direction {
    /// Parse a direction marker.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            DIRECTION_TO_SERVER => Some(Self::ToServer),
            DIRECTION_TO_CLIENT => Some(Self::ToClient),
            _ => None,
        }
    }

    /// Wire marker for this direction.
    pub fn as_byte(self) -> u8 {
        match self {
            Self::ToServer => DIRECTION_TO_SERVER,
            Self::ToClient => DIRECTION_TO_CLIENT,
        }
    }

    /// The direction of records flowing the other way.
    pub fn reverse(self) -> Self {
        match self {
            Self::ToServer => Self::ToClient,
            Self::ToClient => Self::ToServer,
        }
    }
}

/// Errors decoding a decrypted record.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// Record shorter than its fixed header.
    #[error("record too short: expected at least {expected} bytes, got {actual}")]
    TooShort {
        /// Minimum expected size.
        expected: usize,
        /// Actual size received.
        actual: usize,
    },

    /// Unknown direction marker.
    #[error("invalid direction marker: 0x{0:02x}")]
    InvalidDirection(u8),
}

/// A decoded protocol record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Direction of travel.
    pub direction: Direction,
    /// Sender's 16-bit wrapping timestamp.
    pub timestamp: u16,
    /// Echo of the peer's timestamp, if any.
    pub timestamp_reply: Option<u16>,
    /// Opaque application payload.
    pub payload: Vec<u8>,
}

impl Record {
    /// Create a new record.
    pub fn new(
        direction: Direction,
        timestamp: u16,
        timestamp_reply: Option<u16>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            direction,
            timestamp,
            timestamp_reply,
            payload,
        }
    }

    /// Serialize to plaintext bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(RECORD_HEADER_SIZE + self.payload.len());
        buf.push(self.direction.as_byte());
        buf.extend_from_slice(&self.timestamp.to_be_bytes());
        buf.extend_from_slice(&self.timestamp_reply.unwrap_or(TIMESTAMP_NONE).to_be_bytes());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Parse from plaintext bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RecordError> {
        let Some((header, payload)) = bytes.split_first_chunk::<RECORD_HEADER_SIZE>() else {
            return Err(RecordError::TooShort {
                expected: RECORD_HEADER_SIZE,
                actual: bytes.len(),
            });
        };

        let direction =
            Direction::from_byte(header[0]).ok_or(RecordError::InvalidDirection(header[0]))?;
        let timestamp = u16::from_be_bytes([header[1], header[2]]);
        let reply = u16::from_be_bytes([header[3], header[4]]);

        Ok(Self {
            direction,
            timestamp,
            timestamp_reply: (reply != TIMESTAMP_NONE).then_some(reply),
            payload: payload.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_markers() {
        assert_eq!(Direction::from_byte(0x00), Some(Direction::ToServer));
        assert_eq!(Direction::from_byte(0x01), Some(Direction::ToClient));
        assert_eq!(Direction::from_byte(0x02), None);
        assert_eq!(Direction::ToServer.reverse(), Direction::ToClient);
    }

    #[test]
    fn test_record_layout() {
        let record = Record::new(Direction::ToClient, 0x1234, Some(0xABCD), b"hi".to_vec());
        assert_eq!(
            record.to_bytes(),
            vec![0x01, 0x12, 0x34, 0xAB, 0xCD, b'h', b'i']
        );
        assert_eq!(Record::from_bytes(&record.to_bytes()).unwrap(), record);
    }

    #[test]
    fn test_no_reply_uses_sentinel() {
        let record = Record::new(Direction::ToServer, 7, None, Vec::new());
        let bytes = record.to_bytes();
        assert_eq!(&bytes[3..5], &[0xFF, 0xFF]);
        assert_eq!(Record::from_bytes(&bytes).unwrap().timestamp_reply, None);
    }

    #[test]
    fn test_too_short() {
        assert_eq!(
            Record::from_bytes(&[0x00, 0x01]),
            Err(RecordError::TooShort {
                expected: RECORD_HEADER_SIZE,
                actual: 2,
            })
        );
    }

    #[test]
    fn test_invalid_direction() {
        assert_eq!(
            Record::from_bytes(&[0x7F, 0, 0, 0, 0]),
            Err(RecordError::InvalidDirection(0x7F))
        );
    }
}
