//! `Streambird` Constants
//!
//! This module contains all the constants used throughout the `Streambird`
//! library. These constants define capacity limits for the allocation-free
//! data structures and Bluetooth-specific protocol parameters.

/// Maximum number of locally advertised stream endpoints
pub const MAX_STREAM_ENDPOINTS: usize = 4;

/// Maximum number of remote SEPs tracked per stream endpoint
pub const MAX_REMOTE_SEPS: usize = 4;

/// Number of defined AVDTP service categories
pub const MAX_SERVICE_CATEGORIES: usize = 8;

/// Maximum number of simultaneous signaling connections
pub const MAX_SIGNALING_CONNECTIONS: usize = 4;

/// Maximum stored length of codec-specific information in a media codec record
pub const MAX_CODEC_INFO_LENGTH: usize = 32;

/// Maximum stored length of a content protection scheme value
pub const MAX_CONTENT_PROTECTION_VALUE_LENGTH: usize = 16;

/// Maximum transport sessions in a multiplexing record (media, reporting, recovery)
pub const MAX_TRANSPORT_SESSIONS: usize = 3;

/// Size of the buffer a signaling response is encoded into
pub const SIGNALING_BUFFER_SIZE: usize = 128;

/// Maximum accepted size of an incoming signaling PDU
pub const MAX_SIGNALING_PDU_SIZE: usize = 128;

/// Depth of the incoming-signal and drive queues
pub const MAX_PENDING_SIGNALS: usize = 8;

/// AVDTP runs over L2CAP PSM 0x0019
pub const AVDTP_PSM: u16 = 0x0019;

/// Trailing bytes appended to every capabilities response.
///
/// Not part of any service category record. Carried for wire compatibility
/// with the peer stacks the protocol was interoperability-tested against;
/// pending verification against the AVDTP specification.
pub const CAPABILITIES_RESPONSE_TRAILER: [u8; 4] = [0x04, 0x02, 0x02, 0x00];
