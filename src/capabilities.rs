//! AVDTP Service Capability Records
//!
//! A stream endpoint advertises and negotiates its features as a sequence
//! of service-capability records. On the wire each record is a category
//! byte, a one-byte body length, and a category-specific body. This module
//! defines the capability types and the pack/unpack codec for the record
//! bodies.

use crate::constants::{
    MAX_CODEC_INFO_LENGTH, MAX_CONTENT_PROTECTION_VALUE_LENGTH, MAX_SERVICE_CATEGORIES,
    MAX_TRANSPORT_SESSIONS,
};
use heapless::Vec;

/// Capability codec errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CapabilityError {
    /// Encoding would exceed the destination buffer capacity
    BufferOverflow,
    /// A record's declared length exceeds the remaining buffer, or its body
    /// is shorter than the category requires
    TruncatedRecord,
    /// A field holds a value outside its defined range
    InvalidValue,
    /// A variable-length field exceeds the crate's storage capacity
    CapacityExceeded,
    /// A record body longer than the one-byte length prefix can describe
    BodyTooLarge,
}

impl core::fmt::Display for CapabilityError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::BufferOverflow => write!(f, "Capability encoding exceeds buffer capacity"),
            Self::TruncatedRecord => write!(f, "Capability record truncated"),
            Self::InvalidValue => write!(f, "Capability field value out of range"),
            Self::CapacityExceeded => write!(f, "Capability value exceeds storage capacity"),
            Self::BodyTooLarge => write!(f, "Capability body exceeds one-byte length prefix"),
        }
    }
}

/// AVDTP Service Categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ServiceCategory {
    /// Basic media transport
    MediaTransport = 0x01,
    /// RTCP-style reporting channel
    Reporting = 0x02,
    /// Packet loss recovery
    Recovery = 0x03,
    /// Content protection scheme
    ContentProtection = 0x04,
    /// RFC 2508 header compression
    HeaderCompression = 0x05,
    /// Transport session multiplexing
    Multiplexing = 0x06,
    /// Media codec
    MediaCodec = 0x07,
    /// Sink-side delay reporting
    DelayReporting = 0x08,
}

impl ServiceCategory {
    /// All categories in ascending wire order
    pub const ALL: [Self; MAX_SERVICE_CATEGORIES] = [
        Self::MediaTransport,
        Self::Reporting,
        Self::Recovery,
        Self::ContentProtection,
        Self::HeaderCompression,
        Self::Multiplexing,
        Self::MediaCodec,
        Self::DelayReporting,
    ];

    /// Convert from raw byte value
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::MediaTransport),
            0x02 => Some(Self::Reporting),
            0x03 => Some(Self::Recovery),
            0x04 => Some(Self::ContentProtection),
            0x05 => Some(Self::HeaderCompression),
            0x06 => Some(Self::Multiplexing),
            0x07 => Some(Self::MediaCodec),
            0x08 => Some(Self::DelayReporting),
            _ => None,
        }
    }
}

/// Set of registered service categories, one bit per category value
///
/// Bit positions match the numeric category values (bit 1 for
/// `MediaTransport` through bit 8 for `DelayReporting`), so the raw mask
/// is wire-meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CategorySet(u16);

impl CategorySet {
    /// Empty set
    #[must_use]
    pub const fn new() -> Self {
        Self(0)
    }

    /// Raw bitmask
    #[must_use]
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Build from a raw bitmask
    #[must_use]
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    /// Whether `category` is registered
    #[must_use]
    pub const fn contains(self, category: ServiceCategory) -> bool {
        self.0 & (1 << category as u16) != 0
    }

    /// Register `category`
    pub fn insert(&mut self, category: ServiceCategory) {
        self.0 |= 1 << category as u16;
    }

    /// Whether no category is registered
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Registered categories in ascending category order
    pub fn iter(self) -> impl Iterator<Item = ServiceCategory> {
        ServiceCategory::ALL
            .iter()
            .copied()
            .filter(move |category| self.contains(*category))
    }
}

impl FromIterator<ServiceCategory> for CategorySet {
    fn from_iter<I: IntoIterator<Item = ServiceCategory>>(iter: I) -> Self {
        let mut set = Self::new();
        for category in iter {
            set.insert(category);
        }
        set
    }
}

/// Media Types (upper nibble of the media codec record)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum MediaType {
    /// Audio media
    Audio = 0x00,
    /// Video media
    Video = 0x01,
    /// Multimedia media
    Multimedia = 0x02,
}

impl MediaType {
    /// Convert from raw nibble value
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Audio),
            0x01 => Some(Self::Video),
            0x02 => Some(Self::Multimedia),
            _ => None,
        }
    }
}

/// Recovery capability body: recovery type plus window limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RecoveryCapabilities {
    /// Recovery scheme (0x01 = RFC 2733)
    pub recovery_type: u8,
    /// Maximum recovery window size
    pub max_recovery_window_size: u8,
    /// Maximum number of media packets covered by one recovery packet
    pub max_number_media_packets: u8,
}

/// Content protection capability body
///
/// The scheme type travels LSB first; the remainder of the record is an
/// opaque scheme-specific value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentProtectionCapabilities {
    /// Content protection scheme (e.g. 0x0002 = SCMS-T)
    pub cp_type: u16,
    /// Scheme-specific data
    pub value: Vec<u8, MAX_CONTENT_PROTECTION_VALUE_LENGTH>,
}

/// Header compression capability flags, packed into bits 7/6/5 of one byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HeaderCompressionCapabilities {
    /// Compression available on the back channel
    pub back_channel: bool,
    /// Compression available on the media channel
    pub media: bool,
    /// Compression available on the recovery channel
    pub recovery: bool,
}

/// One multiplexed transport session: session identifier and the TCID it
/// is carried on, each occupying bits 7-3 of its byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransportSession {
    /// Transport session identifier (5 bits)
    pub session_id: u8,
    /// Transport channel identifier (5 bits)
    pub tcid: u8,
}

/// Multiplexing capability body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiplexingCapabilities {
    /// Whether adaptation-layer fragmentation is offered (bit 7)
    pub fragmentation: bool,
    /// Multiplexed sessions, in media/reporting/recovery order
    pub sessions: Vec<TransportSession, MAX_TRANSPORT_SESSIONS>,
}

/// Media codec capability body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaCodecCapabilities {
    /// Media type carried by the codec
    pub media_type: MediaType,
    /// Codec identifier (0x00 = SBC)
    pub codec_type: u8,
    /// Codec-specific information element
    pub codec_info: Vec<u8, MAX_CODEC_INFO_LENGTH>,
}

impl MediaCodecCapabilities {
    /// Build a media codec capability from a codec-specific info slice
    ///
    /// # Errors
    /// Returns `CapabilityError::CapacityExceeded` if `codec_info` is
    /// longer than [`MAX_CODEC_INFO_LENGTH`].
    pub fn new(
        media_type: MediaType,
        codec_type: u8,
        codec_info: &[u8],
    ) -> Result<Self, CapabilityError> {
        Ok(Self {
            media_type,
            codec_type,
            codec_info: Vec::from_slice(codec_info)
                .map_err(|()| CapabilityError::CapacityExceeded)?,
        })
    }
}

/// One service capability, tagged by its category
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCapability {
    /// Basic media transport (no body)
    MediaTransport,
    /// Reporting channel (no body)
    Reporting,
    /// Packet loss recovery
    Recovery(RecoveryCapabilities),
    /// Content protection
    ContentProtection(ContentProtectionCapabilities),
    /// Header compression
    HeaderCompression(HeaderCompressionCapabilities),
    /// Transport multiplexing
    Multiplexing(MultiplexingCapabilities),
    /// Media codec
    MediaCodec(MediaCodecCapabilities),
    /// Delay reporting (no body)
    DelayReporting,
}

impl ServiceCapability {
    /// The category tag of this capability
    #[must_use]
    pub fn category(&self) -> ServiceCategory {
        match self {
            Self::MediaTransport => ServiceCategory::MediaTransport,
            Self::Reporting => ServiceCategory::Reporting,
            Self::Recovery(_) => ServiceCategory::Recovery,
            Self::ContentProtection(_) => ServiceCategory::ContentProtection,
            Self::HeaderCompression(_) => ServiceCategory::HeaderCompression,
            Self::Multiplexing(_) => ServiceCategory::Multiplexing,
            Self::MediaCodec(_) => ServiceCategory::MediaCodec,
            Self::DelayReporting => ServiceCategory::DelayReporting,
        }
    }
}

fn push_byte<const N: usize>(buffer: &mut Vec<u8, N>, value: u8) -> Result<(), CapabilityError> {
    buffer.push(value).map_err(|_| CapabilityError::BufferOverflow)
}

/// Pack one capability as a length-prefixed record body into `buffer`
///
/// Writes the one-byte body length followed by the category-specific body.
/// The category byte itself is written by the caller, which also decides
/// record ordering. Returns the number of bytes written (length byte plus
/// body). On error the buffer is restored to its previous length.
///
/// # Errors
/// Returns `CapabilityError::BufferOverflow` when `buffer` cannot hold the
/// record.
pub fn pack<const N: usize>(
    buffer: &mut Vec<u8, N>,
    capability: &ServiceCapability,
) -> Result<usize, CapabilityError> {
    let start = buffer.len();
    let written = pack_body(buffer, capability);
    match written {
        Ok(()) => {
            let body_len = buffer.len() - start - 1;
            if body_len > usize::from(u8::MAX) {
                buffer.truncate(start);
                return Err(CapabilityError::BodyTooLarge);
            }
            buffer[start] = body_len as u8;
            Ok(buffer.len() - start)
        }
        Err(e) => {
            buffer.truncate(start);
            Err(e)
        }
    }
}

fn pack_body<const N: usize>(
    buffer: &mut Vec<u8, N>,
    capability: &ServiceCapability,
) -> Result<(), CapabilityError> {
    // Length byte first, patched in by the caller once the body is known
    push_byte(buffer, 0)?;
    match capability {
        ServiceCapability::MediaTransport
        | ServiceCapability::Reporting
        | ServiceCapability::DelayReporting => {}
        ServiceCapability::Recovery(recovery) => {
            push_byte(buffer, recovery.recovery_type)?;
            push_byte(buffer, recovery.max_recovery_window_size)?;
            push_byte(buffer, recovery.max_number_media_packets)?;
        }
        ServiceCapability::ContentProtection(cp) => {
            push_byte(buffer, (cp.cp_type & 0x00FF) as u8)?;
            push_byte(buffer, (cp.cp_type >> 8) as u8)?;
            buffer
                .extend_from_slice(&cp.value)
                .map_err(|()| CapabilityError::BufferOverflow)?;
        }
        ServiceCapability::HeaderCompression(hc) => {
            push_byte(
                buffer,
                (u8::from(hc.back_channel) << 7)
                    | (u8::from(hc.media) << 6)
                    | (u8::from(hc.recovery) << 5),
            )?;
        }
        ServiceCapability::Multiplexing(mux) => {
            push_byte(buffer, u8::from(mux.fragmentation) << 7)?;
            for session in &mux.sessions {
                push_byte(buffer, (session.session_id & 0x1F) << 3)?;
                push_byte(buffer, (session.tcid & 0x1F) << 3)?;
            }
        }
        ServiceCapability::MediaCodec(codec) => {
            push_byte(buffer, (codec.media_type as u8) << 4)?;
            push_byte(buffer, codec.codec_type)?;
            buffer
                .extend_from_slice(&codec.codec_info)
                .map_err(|()| CapabilityError::BufferOverflow)?;
        }
    }
    Ok(())
}

/// Unpack a sequence of (category, length, body) records
///
/// Consumes `packet` exactly: every record's declared length must fit the
/// remaining bytes, and the final record must end at the buffer end.
/// Records with a category this stack does not know are skipped whole;
/// a duplicated category replaces the earlier instance.
///
/// # Errors
/// Returns `CapabilityError::TruncatedRecord` when a record header or
/// declared body does not fit, and `CapabilityError::CapacityExceeded`
/// when a variable-length field exceeds its bounded storage.
pub fn unpack(
    packet: &[u8],
) -> Result<Vec<ServiceCapability, MAX_SERVICE_CATEGORIES>, CapabilityError> {
    let mut capabilities: Vec<ServiceCapability, MAX_SERVICE_CATEGORIES> = Vec::new();
    let mut pos = 0;

    while pos < packet.len() {
        if packet.len() - pos < 2 {
            return Err(CapabilityError::TruncatedRecord);
        }
        let raw_category = packet[pos];
        let body_len = packet[pos + 1] as usize;
        pos += 2;
        if body_len > packet.len() - pos {
            return Err(CapabilityError::TruncatedRecord);
        }
        let body = &packet[pos..pos + body_len];
        pos += body_len;

        let Some(category) = ServiceCategory::from_u8(raw_category) else {
            warn!("skipping unknown service category {}", raw_category);
            continue;
        };

        let capability = unpack_body(category, body)?;
        if let Some(slot) = capabilities
            .iter_mut()
            .find(|existing| existing.category() == category)
        {
            *slot = capability;
        } else {
            capabilities
                .push(capability)
                .map_err(|_| CapabilityError::CapacityExceeded)?;
        }
    }

    Ok(capabilities)
}

fn unpack_body(category: ServiceCategory, body: &[u8]) -> Result<ServiceCapability, CapabilityError> {
    match category {
        ServiceCategory::MediaTransport => Ok(ServiceCapability::MediaTransport),
        ServiceCategory::Reporting => Ok(ServiceCapability::Reporting),
        ServiceCategory::DelayReporting => Ok(ServiceCapability::DelayReporting),
        ServiceCategory::Recovery => {
            if body.len() < 3 {
                return Err(CapabilityError::TruncatedRecord);
            }
            Ok(ServiceCapability::Recovery(RecoveryCapabilities {
                recovery_type: body[0],
                max_recovery_window_size: body[1],
                max_number_media_packets: body[2],
            }))
        }
        ServiceCategory::ContentProtection => {
            if body.len() < 2 {
                return Err(CapabilityError::TruncatedRecord);
            }
            Ok(ServiceCapability::ContentProtection(
                ContentProtectionCapabilities {
                    cp_type: u16::from(body[0]) | (u16::from(body[1]) << 8),
                    value: Vec::from_slice(&body[2..])
                        .map_err(|()| CapabilityError::CapacityExceeded)?,
                },
            ))
        }
        ServiceCategory::HeaderCompression => {
            if body.is_empty() {
                return Err(CapabilityError::TruncatedRecord);
            }
            Ok(ServiceCapability::HeaderCompression(
                HeaderCompressionCapabilities {
                    back_channel: body[0] & 0x80 != 0,
                    media: body[0] & 0x40 != 0,
                    recovery: body[0] & 0x20 != 0,
                },
            ))
        }
        ServiceCategory::Multiplexing => {
            if body.is_empty() {
                return Err(CapabilityError::TruncatedRecord);
            }
            let entries = &body[1..];
            if entries.len() % 2 != 0 {
                return Err(CapabilityError::TruncatedRecord);
            }
            let mut sessions = Vec::new();
            for pair in entries.chunks_exact(2) {
                sessions
                    .push(TransportSession {
                        session_id: pair[0] >> 3,
                        tcid: pair[1] >> 3,
                    })
                    .map_err(|_| CapabilityError::CapacityExceeded)?;
            }
            Ok(ServiceCapability::Multiplexing(MultiplexingCapabilities {
                fragmentation: body[0] & 0x80 != 0,
                sessions,
            }))
        }
        ServiceCategory::MediaCodec => {
            if body.len() < 2 {
                return Err(CapabilityError::TruncatedRecord);
            }
            Ok(ServiceCapability::MediaCodec(MediaCodecCapabilities {
                media_type: MediaType::from_u8(body[0] >> 4)
                    .ok_or(CapabilityError::InvalidValue)?,
                codec_type: body[1],
                codec_info: Vec::from_slice(&body[2..])
                    .map_err(|()| CapabilityError::CapacityExceeded)?,
            }))
        }
    }
}
