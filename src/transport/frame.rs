//! Length-prefixed framing over a byte stream.
//!
//! Wire format:
//! ```text
//! +--------------------+---------------------------------+
//! | Length             | Ciphertext                      |
//! | 4 bytes (BE32)     | Length bytes                    |
//! +--------------------+---------------------------------+
//! ```
//!
//! Both directions enforce the same maximum: outgoing payloads are checked
//! before the length field is computed, incoming length fields are checked
//! before the accumulator is allowed to grow toward them.

use thiserror::Error;

use crate::core::{FRAME_HEADER_SIZE, MAX_FRAME_SIZE};

/// Errors that can occur while framing or deframing.
///
/// Every variant is a protocol violation: the stream cannot be resynchronized
/// once one has been observed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Outgoing payload exceeds the maximum frame size.
    #[error("payload too large: {size} bytes exceeds maximum of {max}")]
    PayloadTooLarge {
        /// Size of the rejected payload.
        size: usize,
        /// Maximum frame size.
        max: usize,
    },

    /// Incoming length prefix exceeds the maximum frame size.
    #[error("frame too large: peer declared {declared} bytes, maximum is {max}")]
    FrameTooLarge {
        /// Length declared by the peer.
        declared: u32,
        /// Maximum frame size.
        max: usize,
    },

    /// Buffered bytes would exceed one maximal frame plus its header.
    #[error("receive buffer overflow: {buffered} buffered + {incoming} incoming exceeds {limit}")]
    ReceiveBufferOverflow {
        /// Bytes already held.
        buffered: usize,
        /// Bytes offered.
        incoming: usize,
        /// Hard cap on the accumulator.
        limit: usize,
    },
}

/// Build a frame around `payload` using the default maximum.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    encode_frame_with_max(payload, MAX_FRAME_SIZE)
}

/// Build a frame around `payload`, rejecting anything above `max_frame_size`.
pub fn encode_frame_with_max(payload: &[u8], max_frame_size: usize) -> Result<Vec<u8>, FrameError> {
    let size = payload.len();
    if size > max_frame_size {
        return Err(FrameError::PayloadTooLarge {
            size,
            max: max_frame_size,
        });
    }
    // Validated above; a max wider than the length field is a config error.
    let len = u32::try_from(size).map_err(|_| FrameError::PayloadTooLarge {
        size,
        max: u32::MAX as usize,
    })?;

    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + size);
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Incremental frame decoder.
///
/// Holds at most `max_frame_size + FRAME_HEADER_SIZE` bytes at any time.
#[derive(Debug, Clone)]
pub struct FrameAccumulator {
    buf: Vec<u8>,
    max_frame_size: usize,
}

impl Default for FrameAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameAccumulator {
    /// Create an accumulator enforcing [`MAX_FRAME_SIZE`].
    pub fn new() -> Self {
        Self::with_max_frame_size(MAX_FRAME_SIZE)
    }

    /// Create an accumulator enforcing a custom maximum.
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_frame_size,
        }
    }

    /// The enforced maximum frame size.
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Hard cap on buffered bytes.
    pub fn limit(&self) -> usize {
        self.max_frame_size + FRAME_HEADER_SIZE
    }

    /// Bytes currently buffered.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing is buffered.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// How many more bytes may be appended before hitting the cap.
    pub fn remaining_capacity(&self) -> usize {
        self.limit().saturating_sub(self.buf.len())
    }

    /// Discard everything buffered (e.g. the tail of a dead connection).
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Append bytes read from the stream.
    ///
    /// The cap is checked before anything is copied, whether or not a length
    /// prefix has been seen yet.
    pub fn extend(&mut self, incoming: &[u8]) -> Result<(), FrameError> {
        if self.buf.len() + incoming.len() > self.limit() {
            return Err(FrameError::ReceiveBufferOverflow {
                buffered: self.buf.len(),
                incoming: incoming.len(),
                limit: self.limit(),
            });
        }
        self.buf.extend_from_slice(incoming);
        Ok(())
    }

    /// Pop the next complete payload, if one is buffered.
    ///
    /// Trailing bytes of a following frame stay in the accumulator.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        let Some(declared) = self.declared_len()? else {
            return Ok(None);
        };

        let end = FRAME_HEADER_SIZE + declared;
        if self.buf.len() < end {
            return Ok(None);
        }

        let payload = self.buf[FRAME_HEADER_SIZE..end].to_vec();
        self.buf.drain(..end);
        Ok(Some(payload))
    }

    /// Append `incoming` and pop at most one complete payload.
    pub fn feed(&mut self, incoming: &[u8]) -> Result<Option<Vec<u8>>, FrameError> {
        self.extend(incoming)?;
        self.next_frame()
    }

    /// Bytes still missing before the pending frame is complete.
    ///
    /// Before the length prefix is complete this is the rest of the prefix.
    pub fn bytes_needed(&self) -> Result<usize, FrameError> {
        match self.declared_len()? {
            Some(declared) => Ok((FRAME_HEADER_SIZE + declared).saturating_sub(self.buf.len())),
            None => Ok(FRAME_HEADER_SIZE - self.buf.len()),
        }
    }

    /// Parse and validate the length prefix, if fully buffered.
    fn declared_len(&self) -> Result<Option<usize>, FrameError> {
        let Some(prefix) = self.buf.first_chunk::<FRAME_HEADER_SIZE>() else {
            return Ok(None);
        };

        let declared = u32::from_be_bytes(*prefix);
        // Compare in the wide type; never narrow the maximum.
        if u64::from(declared) > self.max_frame_size as u64 {
            return Err(FrameError::FrameTooLarge {
                declared,
                max: self.max_frame_size,
            });
        }
        Ok(Some(declared as usize))
    }
}
