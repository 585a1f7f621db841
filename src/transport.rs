//! Transport seam between the AVDTP core and the L2CAP layer below it.
//!
//! The core never talks to L2CAP directly. Everything it needs from the
//! layer below is a single primitive: deliver these bytes reliably, in
//! order, to channel C. Segmentation, channel lifecycle, and retransmission
//! all live on the other side of [`SignalingTransport`].

/// L2CAP Channel Identifier (CID)
///
/// Signaling channels for AVDTP are dynamically allocated
/// (0x0040-0xFFFF).
pub type ChannelId = u16;

/// Transport-send failures, reported unmodified to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// The addressed channel is not open
    ChannelClosed,
    /// The transport cannot accept the payload right now
    BufferFull,
}

impl core::fmt::Display for TransportError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ChannelClosed => write!(f, "L2CAP channel closed"),
            Self::BufferFull => write!(f, "Transport buffer full"),
        }
    }
}

/// Send primitive for signaling PDUs.
///
/// Implementations must guarantee in-order, reliable delivery to the
/// addressed channel. The core never retries a send: a failed send is
/// reported to the caller and the protocol state machine advances
/// regardless.
pub trait SignalingTransport {
    /// Deliver `payload` to the channel identified by `channel_id`.
    ///
    /// Returns the number of bytes handed to the channel.
    ///
    /// # Errors
    /// Returns a [`TransportError`] when the channel cannot take the
    /// payload. The core treats this as a diagnostic, not a retry trigger.
    fn send(&self, channel_id: ChannelId, payload: &[u8]) -> Result<usize, TransportError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::{ChannelId, SignalingTransport, TransportError};
    use core::cell::{Cell, RefCell};
    use heapless::Vec;

    /// A PDU captured by [`RecordingTransport`]
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct SentPdu {
        pub channel_id: ChannelId,
        pub payload: Vec<u8, 128>,
    }

    /// Transport double that records every send for assertion
    pub struct RecordingTransport {
        pub sent: RefCell<Vec<SentPdu, 8>>,
        pub failing: Cell<bool>,
    }

    impl RecordingTransport {
        pub fn new() -> Self {
            Self {
                sent: RefCell::new(Vec::new()),
                failing: Cell::new(false),
            }
        }

        pub fn sent_count(&self) -> usize {
            self.sent.borrow().len()
        }

        pub fn last_sent(&self) -> Option<SentPdu> {
            self.sent.borrow().last().cloned()
        }
    }

    impl SignalingTransport for RecordingTransport {
        fn send(&self, channel_id: ChannelId, payload: &[u8]) -> Result<usize, TransportError> {
            if self.failing.get() {
                return Err(TransportError::ChannelClosed);
            }
            let len = payload.len();
            let payload = Vec::from_slice(payload).map_err(|()| TransportError::BufferFull)?;
            self.sent
                .borrow_mut()
                .push(SentPdu {
                    channel_id,
                    payload,
                })
                .map_err(|_| TransportError::BufferFull)?;
            Ok(len)
        }
    }
}
