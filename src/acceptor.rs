//! Acceptor Stream Configuration Sub-State Machine
//!
//! The responder half of AVDTP stream negotiation, split into two phases:
//!
//! * [`decide`] consumes an incoming signaling command and records the
//!   pending transition. It never touches the transport.
//! * [`act`] performs exactly one side effect (encoding and sending the
//!   response PDU) and advances to the next stable state.
//!
//! The split keeps packet parsing free of transport effects and makes the
//! send point the single place where retry or backpressure logic could be
//! added. The driving layer must pair them: one act step per decide step
//! that returned `true`.

use crate::AvdtpError;
use crate::capabilities::unpack;
use crate::endpoint::{
    AcceptorState, SignalingConnection, StreamEndpoint, StreamEndpointSep, StreamEndpointState,
};
use crate::response::{send_accept_response, send_capabilities_response, send_reject_response};
use crate::signaling::{SignalId, SignalingHeader};
use crate::transport::SignalingTransport;

/// Consume a signaling command addressed to `endpoint`.
///
/// Dispatches on the current acceptor state crossed with the signal
/// identifier and records the resulting transition. `packet` is the full
/// PDU including the signaling header.
///
/// Returns `true` iff a transition was recorded that requires one
/// subsequent [`act`] step.
pub fn decide(
    endpoint: &mut StreamEndpoint,
    connection: &mut SignalingConnection,
    header: &SignalingHeader,
    packet: &[u8],
) -> bool {
    match endpoint.acceptor_state {
        AcceptorState::Idle => match header.signal() {
            Some(SignalId::GetAllCapabilities) => {
                debug!("acceptor: answering GET_ALL_CAPABILITIES");
                connection.acceptor_transaction_label = header.transaction_label;
                endpoint.acceptor_state = AcceptorState::AnswerGetAllCapabilities;
                true
            }
            Some(SignalId::GetCapabilities) => {
                debug!("acceptor: answering GET_CAPABILITIES");
                connection.acceptor_transaction_label = header.transaction_label;
                endpoint.acceptor_state = AcceptorState::AnswerGetCapabilities;
                true
            }
            Some(SignalId::SetConfiguration) => {
                decide_set_configuration(endpoint, connection, header, packet)
            }
            _ => {
                warn!(
                    "acceptor: rejecting unsupported signal {}",
                    header.signal_identifier
                );
                stage_reject(endpoint, connection, header.transaction_label, header.signal_identifier);
                true
            }
        },
        AcceptorState::Configured => match header.signal() {
            Some(SignalId::Open) if endpoint.state == StreamEndpointState::Configured => {
                debug!("acceptor: answering OPEN");
                connection.acceptor_transaction_label = header.transaction_label;
                endpoint.acceptor_state = AcceptorState::AnswerOpenStream;
                true
            }
            _ => {
                debug!(
                    "acceptor: signal {} not handled while configured",
                    header.signal_identifier
                );
                false
            }
        },
        AcceptorState::AnswerOpenStream => match header.signal() {
            Some(SignalId::Start) if endpoint.state == StreamEndpointState::Opened => {
                debug!("acceptor: answering START");
                connection.acceptor_transaction_label = header.transaction_label;
                endpoint.acceptor_state = AcceptorState::AnswerStartStream;
                true
            }
            _ => {
                debug!(
                    "acceptor: signal {} not handled while opening",
                    header.signal_identifier
                );
                false
            }
        },
        _ => false,
    }
}

/// Parse a SET_CONFIGURATION payload and stage the accept.
///
/// Layout: header byte, signal identifier, ACP SEID, INT SEID, capability
/// records. A payload that does not parse stages a general reject instead
/// of corrupting the remote SEP table.
fn decide_set_configuration(
    endpoint: &mut StreamEndpoint,
    connection: &mut SignalingConnection,
    header: &SignalingHeader,
    packet: &[u8],
) -> bool {
    if packet.len() < 4 {
        warn!("acceptor: SET_CONFIGURATION too short");
        stage_reject(endpoint, connection, header.transaction_label, header.signal_identifier);
        return true;
    }

    let mut sep = StreamEndpointSep::new(packet[3] >> 2);
    match unpack(&packet[4..]) {
        Ok(capabilities) => {
            for capability in capabilities {
                sep.register(capability);
            }
            match endpoint.store_remote_sep(sep) {
                Ok(()) => {
                    debug!("acceptor: answering SET_CONFIGURATION");
                    connection.acceptor_transaction_label = header.transaction_label;
                    endpoint.acceptor_state = AcceptorState::AnswerSetConfiguration;
                }
                Err(_) => {
                    warn!("acceptor: remote SEP table full");
                    stage_reject(
                        endpoint,
                        connection,
                        header.transaction_label,
                        header.signal_identifier,
                    );
                }
            }
            true
        }
        Err(_) => {
            warn!("acceptor: SET_CONFIGURATION capabilities malformed");
            stage_reject(endpoint, connection, header.transaction_label, header.signal_identifier);
            true
        }
    }
}

fn stage_reject(
    endpoint: &mut StreamEndpoint,
    connection: &mut SignalingConnection,
    transaction_label: u8,
    signal_identifier: u8,
) {
    connection.acceptor_transaction_label = transaction_label;
    endpoint.unknown_signal_identifier = Some(signal_identifier);
    endpoint.acceptor_state = AcceptorState::RejectUnknownCommand;
}

/// Perform the one pending side effect for `endpoint`.
///
/// Sends the response recorded by the preceding [`decide`] step and
/// advances to the next stable state. The state transition happens before
/// the send result is examined: a failed send is reported but never
/// retried, and never holds the machine in a pending state.
///
/// Returns `Ok(true)` when a response was handed to the transport and
/// `Ok(false)` when nothing was pending.
///
/// # Errors
/// Returns `AvdtpError::Transport` when the transport rejects the send,
/// or `AvdtpError::Capability` when the response cannot be encoded.
pub fn act<T: SignalingTransport>(
    transport: &T,
    connection: &mut SignalingConnection,
    endpoint: &mut StreamEndpoint,
) -> Result<bool, AvdtpError> {
    match endpoint.acceptor_state {
        AcceptorState::Idle | AcceptorState::Configured => Ok(false),
        AcceptorState::AnswerGetCapabilities => {
            debug!("acceptor: sending capabilities response");
            endpoint.acceptor_state = AcceptorState::Idle;
            send_capabilities_response(
                transport,
                connection.l2cap_signaling_cid,
                connection.acceptor_transaction_label,
                &endpoint.sep,
                false,
            )?;
            Ok(true)
        }
        AcceptorState::AnswerGetAllCapabilities => {
            debug!("acceptor: sending all-capabilities response");
            endpoint.acceptor_state = AcceptorState::Idle;
            send_capabilities_response(
                transport,
                connection.l2cap_signaling_cid,
                connection.acceptor_transaction_label,
                &endpoint.sep,
                true,
            )?;
            Ok(true)
        }
        AcceptorState::AnswerSetConfiguration => {
            debug!("acceptor: stream configured");
            endpoint.acceptor_state = AcceptorState::Configured;
            endpoint.connection = Some(connection.l2cap_signaling_cid);
            endpoint.state = StreamEndpointState::Configured;
            send_accept_response(
                transport,
                connection.l2cap_signaling_cid,
                SignalId::SetConfiguration,
                connection.acceptor_transaction_label,
            )?;
            Ok(true)
        }
        AcceptorState::RejectUnknownCommand => {
            endpoint.acceptor_state = AcceptorState::Idle;
            let signal_identifier = endpoint.unknown_signal_identifier.take().unwrap_or(0);
            debug!("acceptor: sending general reject for {}", signal_identifier);
            send_reject_response(
                transport,
                connection.l2cap_signaling_cid,
                signal_identifier,
                connection.acceptor_transaction_label,
            )?;
            Ok(true)
        }
        AcceptorState::AnswerOpenStream => {
            debug!("acceptor: waiting for media transport channel");
            // Sub-machine stays here: the same state accepts the START that
            // follows once the media channel is up
            endpoint.state = StreamEndpointState::WaitingForMediaL2cap;
            send_accept_response(
                transport,
                connection.l2cap_signaling_cid,
                SignalId::Open,
                connection.acceptor_transaction_label,
            )?;
            Ok(true)
        }
        AcceptorState::AnswerStartStream => {
            debug!("acceptor: streaming");
            endpoint.state = StreamEndpointState::Streaming;
            send_accept_response(
                transport,
                connection.l2cap_signaling_cid,
                SignalId::Start,
                connection.acceptor_transaction_label,
            )?;
            Ok(true)
        }
    }
}
