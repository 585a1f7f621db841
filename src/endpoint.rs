//! Stream Endpoint and Signaling Connection Model
//!
//! The persistent state the acceptor state machine reads and mutates: the
//! locally advertised SEP, the remote SEPs learned through configuration
//! commands, and the per-channel signaling connection bookkeeping.

use crate::AvdtpError;
use crate::capabilities::{CategorySet, ServiceCapability, ServiceCategory};
use crate::constants::{MAX_REMOTE_SEPS, MAX_SERVICE_CATEGORIES};
use crate::transport::ChannelId;
use heapless::Vec;

/// Stream Endpoint Identifier (SEID, 6 significant bits on the wire)
pub type StreamEndpointId = u8;

/// Lifecycle stage of a stream endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StreamEndpointState {
    /// No configuration negotiated
    Idle,
    /// Configuration accepted, media transport not yet requested
    Configured,
    /// OPEN accepted, waiting for the peer's media L2CAP channel
    WaitingForMediaL2cap,
    /// Media transport established
    Opened,
    /// Media packets flowing
    Streaming,
}

/// State of the acceptor configuration sub-state machine
///
/// `Answer*` states carry exactly one pending response; the driving layer
/// must perform one act step per decide step that queued work. A peer that
/// stalls mid-exchange leaves the machine parked in a non-idle state;
/// recovery timeouts belong to the driving layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AcceptorState {
    /// No exchange in progress
    Idle,
    /// GET_CAPABILITIES response pending
    AnswerGetCapabilities,
    /// GET_ALL_CAPABILITIES response pending
    AnswerGetAllCapabilities,
    /// SET_CONFIGURATION accept pending
    AnswerSetConfiguration,
    /// General reject pending for an unsupported command
    RejectUnknownCommand,
    /// Configuration acknowledged, waiting for OPEN
    Configured,
    /// OPEN accept pending (or sent, waiting for START)
    AnswerOpenStream,
    /// START accept pending
    AnswerStartStream,
}

/// A stream endpoint's capability set: its SEID, the registered service
/// categories, and one capability slot per registered category
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StreamEndpointSep {
    /// Stream endpoint identifier
    pub seid: StreamEndpointId,
    /// Bitmask of registered service categories
    pub registered_service_categories: CategorySet,
    /// Capability payload per registered category
    pub capabilities: Vec<ServiceCapability, MAX_SERVICE_CATEGORIES>,
}

impl StreamEndpointSep {
    /// Create an empty SEP for `seid`
    #[must_use]
    pub fn new(seid: StreamEndpointId) -> Self {
        Self {
            seid,
            registered_service_categories: CategorySet::new(),
            capabilities: Vec::new(),
        }
    }

    /// Register a capability, replacing an earlier one of the same category
    pub fn register(&mut self, capability: ServiceCapability) {
        let category = capability.category();
        self.registered_service_categories.insert(category);
        if let Some(slot) = self
            .capabilities
            .iter_mut()
            .find(|existing| existing.category() == category)
        {
            *slot = capability;
        } else {
            // One slot per category, so the bounded vec cannot run out
            self.capabilities.push(capability).ok();
        }
    }

    /// The registered capability for `category`, if any
    #[must_use]
    pub fn capability(&self, category: ServiceCategory) -> Option<&ServiceCapability> {
        self.capabilities
            .iter()
            .find(|capability| capability.category() == category)
    }
}

/// A locally advertised stream endpoint and its negotiation state
///
/// Created once at stack initialization for each streaming capability this
/// device exposes, then mutated exclusively by the acceptor state machine
/// and the stream lifecycle events above it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEndpoint {
    /// Lifecycle stage
    pub state: StreamEndpointState,
    /// Acceptor sub-state machine state
    pub acceptor_state: AcceptorState,
    /// This endpoint's advertised SEP
    pub sep: StreamEndpointSep,
    /// Remote SEPs learned from configuration commands, keyed by SEID
    pub remote_seps: Vec<StreamEndpointSep, MAX_REMOTE_SEPS>,
    /// Index of the remote SEP under active negotiation
    pub remote_sep_index: Option<usize>,
    /// Signaling channel bound when configuration was accepted
    pub connection: Option<ChannelId>,
    /// Signal identifier staged for the next general reject
    pub unknown_signal_identifier: Option<u8>,
}

impl StreamEndpoint {
    /// Create a new idle stream endpoint advertising `sep`
    #[must_use]
    pub fn new(sep: StreamEndpointSep) -> Self {
        Self {
            state: StreamEndpointState::Idle,
            acceptor_state: AcceptorState::Idle,
            sep,
            remote_seps: Vec::new(),
            remote_sep_index: None,
            connection: None,
            unknown_signal_identifier: None,
        }
    }

    /// SEID this endpoint is advertised under
    #[must_use]
    pub fn local_seid(&self) -> StreamEndpointId {
        self.sep.seid
    }

    /// Store a remote SEP and make it the active negotiation target.
    ///
    /// Updates the entry with a matching SEID, or inserts a new one.
    ///
    /// # Errors
    /// Returns `AvdtpError::TooManyRemoteSeps` when the bounded table is
    /// full and no entry matches.
    pub fn store_remote_sep(&mut self, sep: StreamEndpointSep) -> Result<(), AvdtpError> {
        if let Some(index) = self
            .remote_seps
            .iter()
            .position(|existing| existing.seid == sep.seid)
        {
            self.remote_seps[index] = sep;
            self.remote_sep_index = Some(index);
            return Ok(());
        }

        self.remote_seps
            .push(sep)
            .map_err(|_| AvdtpError::TooManyRemoteSeps)?;
        self.remote_sep_index = Some(self.remote_seps.len() - 1);
        Ok(())
    }

    /// The remote SEP currently under negotiation
    #[must_use]
    pub fn active_remote_sep(&self) -> Option<&StreamEndpointSep> {
        self.remote_sep_index
            .and_then(|index| self.remote_seps.get(index))
    }

    /// Mark the media transport channel established.
    ///
    /// Called by the layer managing media L2CAP channels once the peer's
    /// transport channel for this endpoint is up; advances
    /// `WaitingForMediaL2cap` to `Opened` so a subsequent START can be
    /// accepted.
    pub fn media_transport_connected(&mut self) {
        if self.state == StreamEndpointState::WaitingForMediaL2cap {
            self.state = StreamEndpointState::Opened;
        }
    }
}

/// Per-signaling-channel connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SignalingConnection {
    /// L2CAP channel carrying the signaling exchange
    pub l2cap_signaling_cid: ChannelId,
    /// Transaction label to echo in the next acceptor response
    pub acceptor_transaction_label: u8,
}

impl SignalingConnection {
    /// Create connection state for a signaling channel
    #[must_use]
    pub fn new(l2cap_signaling_cid: ChannelId) -> Self {
        Self {
            l2cap_signaling_cid,
            acceptor_transaction_label: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{MediaCodecCapabilities, MediaType};

    fn codec_capability(codec_type: u8) -> ServiceCapability {
        ServiceCapability::MediaCodec(
            MediaCodecCapabilities::new(MediaType::Audio, codec_type, &[0x21]).unwrap(),
        )
    }

    #[test]
    fn test_sep_registration() {
        let mut sep = StreamEndpointSep::new(1);
        assert!(sep.registered_service_categories.is_empty());

        sep.register(ServiceCapability::MediaTransport);
        sep.register(codec_capability(0x00));

        assert!(
            sep.registered_service_categories
                .contains(ServiceCategory::MediaTransport)
        );
        assert!(
            sep.registered_service_categories
                .contains(ServiceCategory::MediaCodec)
        );
        assert!(sep.capability(ServiceCategory::MediaCodec).is_some());
        assert!(sep.capability(ServiceCategory::Recovery).is_none());
    }

    #[test]
    fn test_sep_register_replaces_same_category() {
        let mut sep = StreamEndpointSep::new(1);
        sep.register(codec_capability(0x00));
        sep.register(codec_capability(0x02));

        assert_eq!(sep.capabilities.len(), 1);
        assert_eq!(
            sep.capability(ServiceCategory::MediaCodec),
            Some(&codec_capability(0x02))
        );
    }

    #[test]
    fn test_endpoint_creation() {
        let endpoint = StreamEndpoint::new(StreamEndpointSep::new(3));
        assert_eq!(endpoint.state, StreamEndpointState::Idle);
        assert_eq!(endpoint.acceptor_state, AcceptorState::Idle);
        assert_eq!(endpoint.local_seid(), 3);
        assert!(endpoint.remote_seps.is_empty());
        assert!(endpoint.active_remote_sep().is_none());
    }

    #[test]
    fn test_store_remote_sep_inserts_then_updates() {
        let mut endpoint = StreamEndpoint::new(StreamEndpointSep::new(1));

        let mut first = StreamEndpointSep::new(4);
        first.register(ServiceCapability::MediaTransport);
        endpoint.store_remote_sep(first).unwrap();
        assert_eq!(endpoint.remote_sep_index, Some(0));
        assert_eq!(endpoint.remote_seps.len(), 1);

        let mut other = StreamEndpointSep::new(5);
        other.register(ServiceCapability::Reporting);
        endpoint.store_remote_sep(other).unwrap();
        assert_eq!(endpoint.remote_sep_index, Some(1));
        assert_eq!(endpoint.remote_seps.len(), 2);

        let mut updated = StreamEndpointSep::new(4);
        updated.register(codec_capability(0x00));
        endpoint.store_remote_sep(updated).unwrap();
        assert_eq!(endpoint.remote_sep_index, Some(0));
        assert_eq!(endpoint.remote_seps.len(), 2);
        assert!(
            endpoint.remote_seps[0]
                .capability(ServiceCategory::MediaCodec)
                .is_some()
        );
    }

    #[test]
    fn test_store_remote_sep_full_table() {
        let mut endpoint = StreamEndpoint::new(StreamEndpointSep::new(1));
        for seid in 10..14 {
            endpoint.store_remote_sep(StreamEndpointSep::new(seid)).unwrap();
        }
        assert_eq!(
            endpoint.store_remote_sep(StreamEndpointSep::new(20)),
            Err(AvdtpError::TooManyRemoteSeps)
        );
        // A matching SEID still updates in place
        endpoint.store_remote_sep(StreamEndpointSep::new(12)).unwrap();
        assert_eq!(endpoint.remote_sep_index, Some(2));
    }

    #[test]
    fn test_media_transport_connected_guards_state() {
        let mut endpoint = StreamEndpoint::new(StreamEndpointSep::new(1));
        endpoint.media_transport_connected();
        assert_eq!(endpoint.state, StreamEndpointState::Idle);

        endpoint.state = StreamEndpointState::WaitingForMediaL2cap;
        endpoint.media_transport_connected();
        assert_eq!(endpoint.state, StreamEndpointState::Opened);
    }
}
