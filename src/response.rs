//! AVDTP Signaling Response Encoder
//!
//! Builds the fixed-shape response PDUs the acceptor emits and hands them
//! to the transport. All builders return the transport result unmodified;
//! none of them retry.

use crate::AvdtpError;
use crate::capabilities::{CapabilityError, ServiceCategory, pack};
use crate::constants::{CAPABILITIES_RESPONSE_TRAILER, SIGNALING_BUFFER_SIZE};
use crate::endpoint::StreamEndpointSep;
use crate::signaling::{MessageType, PacketType, SignalId, header_byte};
use crate::transport::{ChannelId, SignalingTransport};
use heapless::Vec;

/// Send a GET_CAPABILITIES / GET_ALL_CAPABILITIES accept response.
///
/// The body carries one record per registered service category in
/// ascending category order, followed by the fixed response trailer.
/// With `pack_all` unset the delay reporting record is omitted: basic
/// GET_CAPABILITIES predates delay reporting, and only the ALL variant
/// reports it.
///
/// # Errors
/// Returns `AvdtpError::Capability` if the response exceeds the signaling
/// buffer, or `AvdtpError::Transport` if the send fails.
pub fn send_capabilities_response<T: SignalingTransport>(
    transport: &T,
    channel_id: ChannelId,
    transaction_label: u8,
    sep: &StreamEndpointSep,
    pack_all: bool,
) -> Result<usize, AvdtpError> {
    let mut command: Vec<u8, SIGNALING_BUFFER_SIZE> = Vec::new();
    let signal = if pack_all {
        SignalId::GetAllCapabilities
    } else {
        SignalId::GetCapabilities
    };

    push(&mut command, header_byte(
        transaction_label,
        PacketType::Single,
        MessageType::ResponseAccept,
    ))?;
    push(&mut command, signal as u8)?;

    for category in sep.registered_service_categories.iter() {
        if category == ServiceCategory::DelayReporting && !pack_all {
            continue;
        }
        let Some(capability) = sep.capability(category) else {
            continue;
        };
        push(&mut command, category as u8)?;
        pack(&mut command, capability).map_err(AvdtpError::Capability)?;
    }

    command
        .extend_from_slice(&CAPABILITIES_RESPONSE_TRAILER)
        .map_err(|()| AvdtpError::Capability(CapabilityError::BufferOverflow))?;

    transport
        .send(channel_id, &command)
        .map_err(AvdtpError::Transport)
}

/// Send a 2-byte accept response for `signal`
///
/// # Errors
/// Returns `AvdtpError::Transport` if the send fails.
pub fn send_accept_response<T: SignalingTransport>(
    transport: &T,
    channel_id: ChannelId,
    signal: SignalId,
    transaction_label: u8,
) -> Result<usize, AvdtpError> {
    let command = [
        header_byte(
            transaction_label,
            PacketType::Single,
            MessageType::ResponseAccept,
        ),
        signal as u8,
    ];
    transport
        .send(channel_id, &command)
        .map_err(AvdtpError::Transport)
}

/// Send a 2-byte general reject echoing the offending signal identifier
///
/// # Errors
/// Returns `AvdtpError::Transport` if the send fails.
pub fn send_reject_response<T: SignalingTransport>(
    transport: &T,
    channel_id: ChannelId,
    signal_identifier: u8,
    transaction_label: u8,
) -> Result<usize, AvdtpError> {
    let command = [
        header_byte(
            transaction_label,
            PacketType::Single,
            MessageType::GeneralReject,
        ),
        signal_identifier,
    ];
    transport
        .send(channel_id, &command)
        .map_err(AvdtpError::Transport)
}

fn push(
    command: &mut Vec<u8, SIGNALING_BUFFER_SIZE>,
    value: u8,
) -> Result<(), AvdtpError> {
    command
        .push(value)
        .map_err(|_| AvdtpError::Capability(CapabilityError::BufferOverflow))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{MediaCodecCapabilities, MediaType, ServiceCapability};
    use crate::transport::testing::RecordingTransport;

    const CID: ChannelId = 0x0041;

    fn audio_sink_sep() -> StreamEndpointSep {
        let mut sep = StreamEndpointSep::new(1);
        sep.register(ServiceCapability::MediaTransport);
        sep.register(ServiceCapability::MediaCodec(
            MediaCodecCapabilities::new(MediaType::Audio, 0x00, &[0x3F, 0xFF, 0x02, 0x35]).unwrap(),
        ));
        sep
    }

    #[test]
    fn test_capabilities_response_layout() {
        let transport = RecordingTransport::new();
        let sep = audio_sink_sep();

        send_capabilities_response(&transport, CID, 0x05, &sep, false).unwrap();

        let pdu = transport.last_sent().unwrap();
        assert_eq!(pdu.channel_id, CID);
        // Accept header with echoed label, GET_CAPABILITIES identifier
        assert_eq!(pdu.payload[0], 0x52);
        assert_eq!(pdu.payload[1], SignalId::GetCapabilities as u8);
        // Media transport record: zero-length body
        assert_eq!(&pdu.payload[2..4], [0x01, 0x00]);
        // Media codec record: media type, codec type, four info bytes
        assert_eq!(
            &pdu.payload[4..12],
            [0x07, 0x06, 0x00, 0x00, 0x3F, 0xFF, 0x02, 0x35]
        );
        // Fixed trailer closes the response
        assert_eq!(&pdu.payload[12..], CAPABILITIES_RESPONSE_TRAILER);
    }

    #[test]
    fn test_all_capabilities_response_uses_all_identifier() {
        let transport = RecordingTransport::new();
        let sep = audio_sink_sep();

        send_capabilities_response(&transport, CID, 0x00, &sep, true).unwrap();

        let pdu = transport.last_sent().unwrap();
        assert_eq!(pdu.payload[1], SignalId::GetAllCapabilities as u8);
    }

    #[test]
    fn test_delay_reporting_only_in_all_capabilities() {
        let mut sep = audio_sink_sep();
        sep.register(ServiceCapability::DelayReporting);

        let transport = RecordingTransport::new();
        send_capabilities_response(&transport, CID, 0x00, &sep, false).unwrap();
        let basic = transport.last_sent().unwrap();
        assert!(!basic.payload[2..].windows(2).any(|w| w == [0x08, 0x00]));

        send_capabilities_response(&transport, CID, 0x00, &sep, true).unwrap();
        let all = transport.last_sent().unwrap();
        assert!(all.payload[2..].windows(2).any(|w| w == [0x08, 0x00]));
        assert_eq!(all.payload.len(), basic.payload.len() + 2);
    }

    #[test]
    fn test_accept_response_shape() {
        let transport = RecordingTransport::new();
        send_accept_response(&transport, CID, SignalId::Open, 0x09).unwrap();

        let pdu = transport.last_sent().unwrap();
        assert_eq!(&pdu.payload[..], [0x92, 0x06]);
    }

    #[test]
    fn test_reject_response_shape() {
        let transport = RecordingTransport::new();
        send_reject_response(&transport, CID, 0x1F, 0x03).unwrap();

        let pdu = transport.last_sent().unwrap();
        assert_eq!(&pdu.payload[..], [0x31, 0x1F]);
    }

    #[test]
    fn test_send_failure_is_propagated() {
        let transport = RecordingTransport::new();
        transport.failing.set(true);

        let result = send_accept_response(&transport, CID, SignalId::Start, 0x00);
        assert!(matches!(result, Err(AvdtpError::Transport(_))));
        assert_eq!(transport.sent_count(), 0);
    }
}
