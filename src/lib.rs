#![no_std]
#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![allow(dead_code, clippy::unused_async)]

// This mod must go first, so that the others see its macros
mod fmt;

pub mod acceptor;
pub mod api;
pub mod capabilities;
pub mod constants;
pub mod endpoint;
pub mod processor;
pub mod response;
pub mod signaling;
pub mod transport;

use crate::capabilities::CapabilityError;
use crate::constants::{
    MAX_PENDING_SIGNALS, MAX_SIGNALING_CONNECTIONS, MAX_SIGNALING_PDU_SIZE, MAX_STREAM_ENDPOINTS,
};
use crate::endpoint::{SignalingConnection, StreamEndpoint, StreamEndpointId};
use crate::signaling::SignalingHeader;
use crate::transport::{ChannelId, SignalingTransport, TransportError};
use embassy_sync::channel::Channel;
use embassy_sync::{
    blocking_mutex::raw::CriticalSectionRawMutex,
    mutex::{MappedMutexGuard, Mutex, MutexGuard},
};
use heapless::{FnvIndexMap, Vec};

pub(crate) static SIGNALING_CHANNEL: Channel<
    CriticalSectionRawMutex,
    IncomingSignal,
    MAX_PENDING_SIGNALS,
> = Channel::new();

pub(crate) static DRIVE_CHANNEL: Channel<CriticalSectionRawMutex, DriveRequest, MAX_PENDING_SIGNALS> =
    Channel::new();

/// Global `AvdtpStack`, initialized by client at runtime
pub(crate) static AVDTP_STACK: Mutex<CriticalSectionRawMutex, Option<AvdtpStack>> =
    Mutex::new(None);

/// Initialize the global `AvdtpStack`.
///
/// This function must be called before using any API functions or spawning
/// the processor tasks. Stream endpoints and signaling connections are
/// registered afterwards through the [`api`] module.
///
/// # Errors
///
/// This function will return an error if the `AvdtpStack` has already been
/// initialized.
///
/// # Example
///
/// ```rust,no_run
/// use streambird::init_avdtp_stack;
///
/// # async fn example() -> Result<(), &'static str> {
/// init_avdtp_stack().await?;
/// # Ok(())
/// # }
/// ```
pub async fn init_avdtp_stack() -> Result<(), &'static str> {
    let mut guard = AVDTP_STACK.lock().await;
    if guard.is_some() {
        return Err("AvdtpStack already initialized");
    }
    *guard = Some(AvdtpStack::new());
    Ok(())
}

/// Get a locked reference to the global `AvdtpStack`.
///
/// Returns a mapped mutex guard that provides direct access to the stack.
/// Primarily intended for the processor tasks; application code should use
/// the functions in the [`api`] module instead.
///
/// # Errors
///
/// This function will return an error if the `AvdtpStack` has not been
/// initialized.
///
/// # Panics
///
/// This function panics if the mutex guard cannot be mapped (should never
/// happen in practice).
pub async fn avdtp_stack<'a>()
-> Result<MappedMutexGuard<'a, CriticalSectionRawMutex, AvdtpStack>, &'static str> {
    let guard = AVDTP_STACK.lock().await;
    if guard.is_none() {
        return Err("AvdtpStack not initialized");
    }
    Ok(MutexGuard::map(guard, |opt| opt.as_mut().unwrap()))
}

/// AVDTP errors with detailed error information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AvdtpError {
    /// The stack has not been initialized yet
    NotInitialized,
    /// A PDU is too short to carry the expected structure
    InsufficientData,
    /// An incoming PDU exceeds the signaling buffer
    PduTooLarge,
    /// Capability codec failure
    Capability(CapabilityError),
    /// Transport-send failure, propagated unmodified
    Transport(TransportError),
    /// No room for another locally advertised stream endpoint
    TooManyEndpoints,
    /// No room for another remote SEP on this endpoint
    TooManyRemoteSeps,
    /// No room for another signaling connection
    TooManyConnections,
    /// No stream endpoint is advertised under the addressed SEID
    EndpointNotFound,
    /// No signaling connection is registered for the channel
    ConnectionNotFound,
}

impl core::fmt::Display for AvdtpError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotInitialized => write!(f, "AvdtpStack not initialized"),
            Self::InsufficientData => write!(f, "Signaling PDU too short"),
            Self::PduTooLarge => write!(f, "Signaling PDU exceeds buffer capacity"),
            Self::Capability(e) => write!(f, "Capability codec error: {e}"),
            Self::Transport(e) => write!(f, "Transport error: {e}"),
            Self::TooManyEndpoints => write!(f, "Stream endpoint table full"),
            Self::TooManyRemoteSeps => write!(f, "Remote SEP table full"),
            Self::TooManyConnections => write!(f, "Signaling connection table full"),
            Self::EndpointNotFound => write!(f, "No stream endpoint for SEID"),
            Self::ConnectionNotFound => write!(f, "No signaling connection for channel"),
        }
    }
}

impl From<CapabilityError> for AvdtpError {
    fn from(error: CapabilityError) -> Self {
        Self::Capability(error)
    }
}

impl From<TransportError> for AvdtpError {
    fn from(error: TransportError) -> Self {
        Self::Transport(error)
    }
}

/// An incoming signaling PDU handed over by the L2CAP layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingSignal {
    /// Signaling channel the PDU arrived on
    pub channel_id: ChannelId,
    /// Raw PDU bytes, signaling header included
    pub payload: Vec<u8, MAX_SIGNALING_PDU_SIZE>,
}

/// One pending act step, queued when a decide step accepted a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DriveRequest {
    /// Signaling channel the response goes out on
    pub channel_id: ChannelId,
    /// SEID of the local endpoint with pending work
    pub local_seid: StreamEndpointId,
}

/// Shared AVDTP acceptor state: the advertised stream endpoints and the
/// per-channel signaling connections
#[derive(Debug)]
pub struct AvdtpStack {
    /// Locally advertised stream endpoints
    endpoints: Vec<StreamEndpoint, MAX_STREAM_ENDPOINTS>,
    /// Signaling connections keyed by L2CAP channel id
    connections: FnvIndexMap<ChannelId, SignalingConnection, MAX_SIGNALING_CONNECTIONS>,
}

impl AvdtpStack {
    /// Create an empty stack
    #[must_use]
    pub fn new() -> Self {
        Self {
            endpoints: Vec::new(),
            connections: FnvIndexMap::new(),
        }
    }

    /// Advertise a stream endpoint
    ///
    /// # Errors
    /// Returns `AvdtpError::TooManyEndpoints` when the endpoint table is
    /// full.
    pub fn register_endpoint(&mut self, endpoint: StreamEndpoint) -> Result<(), AvdtpError> {
        self.endpoints
            .push(endpoint)
            .map_err(|_| AvdtpError::TooManyEndpoints)
    }

    /// Register a signaling connection for `channel_id`
    ///
    /// # Errors
    /// Returns `AvdtpError::TooManyConnections` when the connection table
    /// is full.
    pub fn register_connection(&mut self, channel_id: ChannelId) -> Result<(), AvdtpError> {
        if self.connections.contains_key(&channel_id) {
            return Ok(());
        }
        self.connections
            .insert(channel_id, SignalingConnection::new(channel_id))
            .map(|_| ())
            .map_err(|_| AvdtpError::TooManyConnections)
    }

    /// Get stream endpoint by SEID
    #[must_use]
    pub fn endpoint(&self, seid: StreamEndpointId) -> Option<&StreamEndpoint> {
        self.endpoints.iter().find(|ep| ep.local_seid() == seid)
    }

    /// Get mutable stream endpoint by SEID
    pub fn endpoint_mut(&mut self, seid: StreamEndpointId) -> Option<&mut StreamEndpoint> {
        self.endpoints.iter_mut().find(|ep| ep.local_seid() == seid)
    }

    /// Get the signaling connection for a channel
    #[must_use]
    pub fn connection(&self, channel_id: ChannelId) -> Option<&SignalingConnection> {
        self.connections.get(&channel_id)
    }

    /// Run the decide phase for an incoming signaling PDU.
    ///
    /// Parses the signaling header, routes the command to the stream
    /// endpoint addressed by the ACP SEID, and consumes it. Commands that
    /// cannot be routed (no SEID byte, or no endpoint advertised under the
    /// SEID) are dropped with a diagnostic.
    ///
    /// Returns the drive request for the single act step the command
    /// queued, if any.
    ///
    /// # Errors
    /// Returns `AvdtpError::InsufficientData` for a PDU shorter than the
    /// signaling header and `AvdtpError::TooManyConnections` when a new
    /// signaling channel cannot be tracked.
    pub fn handle_signaling(
        &mut self,
        signal: &IncomingSignal,
    ) -> Result<Option<DriveRequest>, AvdtpError> {
        let header = SignalingHeader::from_bytes(&signal.payload)?;

        let Some(seid) = signal.payload.get(2).map(|byte| byte >> 2) else {
            warn!("signaling PDU without SEID, dropping");
            return Ok(None);
        };

        self.register_connection(signal.channel_id)?;
        let connection = self
            .connections
            .get_mut(&signal.channel_id)
            .ok_or(AvdtpError::ConnectionNotFound)?;

        let Some(endpoint) = self
            .endpoints
            .iter_mut()
            .find(|ep| ep.local_seid() == seid)
        else {
            warn!("no stream endpoint advertised under SEID {}", seid);
            return Ok(None);
        };

        if acceptor::decide(endpoint, connection, &header, &signal.payload) {
            Ok(Some(DriveRequest {
                channel_id: signal.channel_id,
                local_seid: seid,
            }))
        } else {
            Ok(None)
        }
    }

    /// Run the act phase for one queued drive request.
    ///
    /// Returns `true` when a response was handed to the transport.
    ///
    /// # Errors
    /// Returns `AvdtpError::ConnectionNotFound` / `EndpointNotFound` when
    /// the request no longer resolves, and propagates encode and transport
    /// failures from the act step.
    pub fn drive<T: SignalingTransport>(
        &mut self,
        transport: &T,
        request: DriveRequest,
    ) -> Result<bool, AvdtpError> {
        let connection = self
            .connections
            .get_mut(&request.channel_id)
            .ok_or(AvdtpError::ConnectionNotFound)?;
        let endpoint = self
            .endpoints
            .iter_mut()
            .find(|ep| ep.local_seid() == request.local_seid)
            .ok_or(AvdtpError::EndpointNotFound)?;

        acceptor::act(transport, connection, endpoint)
    }
}

impl Default for AvdtpStack {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{MediaCodecCapabilities, MediaType, ServiceCapability};
    use crate::endpoint::{AcceptorState, StreamEndpointSep, StreamEndpointState};
    use crate::signaling::{MessageType, PacketType, SignalId, header_byte};
    use crate::transport::testing::RecordingTransport;

    const CID: ChannelId = 0x0040;

    fn stack_with_endpoint(seid: StreamEndpointId) -> AvdtpStack {
        let mut sep = StreamEndpointSep::new(seid);
        sep.register(ServiceCapability::MediaTransport);
        sep.register(ServiceCapability::MediaCodec(
            MediaCodecCapabilities::new(MediaType::Audio, 0x00, &[0x3F, 0xFF]).unwrap(),
        ));
        let mut stack = AvdtpStack::new();
        stack.register_endpoint(StreamEndpoint::new(sep)).unwrap();
        stack
    }

    fn signal(channel_id: ChannelId, bytes: &[u8]) -> IncomingSignal {
        IncomingSignal {
            channel_id,
            payload: Vec::from_slice(bytes).unwrap(),
        }
    }

    #[test]
    fn test_stack_registration_limits() {
        let mut stack = AvdtpStack::new();
        for seid in 1..=4 {
            stack
                .register_endpoint(StreamEndpoint::new(StreamEndpointSep::new(seid)))
                .unwrap();
        }
        assert_eq!(
            stack.register_endpoint(StreamEndpoint::new(StreamEndpointSep::new(5))),
            Err(AvdtpError::TooManyEndpoints)
        );
        assert!(stack.endpoint(3).is_some());
        assert!(stack.endpoint(5).is_none());
    }

    #[test]
    fn test_register_connection_is_idempotent() {
        let mut stack = AvdtpStack::new();
        stack.register_connection(CID).unwrap();
        stack.register_connection(CID).unwrap();
        assert!(stack.connection(CID).is_some());
    }

    #[test]
    fn test_handle_signaling_queues_one_drive_request() {
        let mut stack = stack_with_endpoint(1);
        let pdu = [
            header_byte(0x05, PacketType::Single, MessageType::Command),
            SignalId::GetCapabilities as u8,
            1 << 2,
        ];

        let request = stack.handle_signaling(&signal(CID, &pdu)).unwrap().unwrap();
        assert_eq!(request.channel_id, CID);
        assert_eq!(request.local_seid, 1);
        assert_eq!(
            stack.endpoint(1).unwrap().acceptor_state,
            AcceptorState::AnswerGetCapabilities
        );
        // The requester's label is staged for the response
        assert_eq!(stack.connection(CID).unwrap().acceptor_transaction_label, 0x05);
    }

    #[test]
    fn test_handle_signaling_drops_unroutable_pdu() {
        let mut stack = stack_with_endpoint(1);

        // Addressed to a SEID nothing is advertised under
        let pdu = [
            header_byte(0x00, PacketType::Single, MessageType::Command),
            SignalId::GetCapabilities as u8,
            9 << 2,
        ];
        assert_eq!(stack.handle_signaling(&signal(CID, &pdu)).unwrap(), None);

        // Too short to carry a SEID
        let pdu = [
            header_byte(0x00, PacketType::Single, MessageType::Command),
            SignalId::Discover as u8,
        ];
        assert_eq!(stack.handle_signaling(&signal(CID, &pdu)).unwrap(), None);
    }

    #[test]
    fn test_handle_signaling_rejects_header_fragment() {
        let mut stack = stack_with_endpoint(1);
        assert_eq!(
            stack.handle_signaling(&signal(CID, &[0x00])),
            Err(AvdtpError::InsufficientData)
        );
    }

    #[test]
    fn test_decide_then_drive_round() {
        let mut stack = stack_with_endpoint(1);
        let transport = RecordingTransport::new();

        let pdu = [
            header_byte(0x02, PacketType::Single, MessageType::Command),
            SignalId::GetAllCapabilities as u8,
            1 << 2,
        ];
        let request = stack.handle_signaling(&signal(CID, &pdu)).unwrap().unwrap();

        assert!(stack.drive(&transport, request).unwrap());
        assert_eq!(transport.sent_count(), 1);
        let sent = transport.last_sent().unwrap();
        assert_eq!(sent.channel_id, CID);
        assert_eq!(sent.payload[1], SignalId::GetAllCapabilities as u8);
        assert_eq!(
            stack.endpoint(1).unwrap().acceptor_state,
            AcceptorState::Idle
        );
    }

    #[test]
    fn test_configuration_binds_endpoint_to_channel() {
        let mut stack = stack_with_endpoint(1);
        let transport = RecordingTransport::new();

        let pdu = [
            header_byte(0x01, PacketType::Single, MessageType::Command),
            SignalId::SetConfiguration as u8,
            1 << 2,
            6 << 2,
            0x01, // media transport, zero-length body
            0x00,
        ];
        let request = stack.handle_signaling(&signal(CID, &pdu)).unwrap().unwrap();
        assert!(stack.drive(&transport, request).unwrap());

        let endpoint = stack.endpoint(1).unwrap();
        assert_eq!(endpoint.state, StreamEndpointState::Configured);
        assert_eq!(endpoint.connection, Some(CID));
        assert_eq!(endpoint.active_remote_sep().unwrap().seid, 6);
    }
}
