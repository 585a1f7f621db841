//! `Streambird` API Functions
//!
//! This module provides the public API functions for wiring the AVDTP
//! acceptor into an application: registering the stream endpoints the
//! device advertises, registering signaling channels, and feeding incoming
//! signaling PDUs to the processor tasks. These functions use static
//! channels and the global stack and are designed to be called from
//! application code.
//!
//! # Usage
//!
//! ```rust,no_run
//! use streambird::api::{deliver_signaling_packet, register_stream_endpoint};
//! use streambird::endpoint::{StreamEndpoint, StreamEndpointSep};
//!
//! # async fn example() -> Result<(), streambird::AvdtpError> {
//! // Advertise a local endpoint
//! let sep = StreamEndpointSep::new(1);
//! register_stream_endpoint(StreamEndpoint::new(sep)).await?;
//!
//! // Hand a signaling PDU from the L2CAP layer to the stack
//! deliver_signaling_packet(0x0040, &[0x00, 0x02, 0x04]).await?;
//! # Ok(())
//! # }
//! ```

use crate::endpoint::{AcceptorState, StreamEndpoint, StreamEndpointId, StreamEndpointState};
use crate::transport::ChannelId;
use crate::{AvdtpError, IncomingSignal, SIGNALING_CHANNEL, avdtp_stack};
use heapless::Vec;

/// Advertise a stream endpoint on the global stack.
///
/// # Errors
///
/// Returns an error if the stack is not initialized or the endpoint table
/// is full.
pub async fn register_stream_endpoint(endpoint: StreamEndpoint) -> Result<(), AvdtpError> {
    avdtp_stack()
        .await
        .map_err(|_| AvdtpError::NotInitialized)?
        .register_endpoint(endpoint)
}

/// Register a signaling connection for an L2CAP channel.
///
/// Optional: the processor also tracks channels on their first PDU. Use
/// this when the channel should be known before traffic arrives.
///
/// # Errors
///
/// Returns an error if the stack is not initialized or the connection
/// table is full.
pub async fn register_signaling_connection(channel_id: ChannelId) -> Result<(), AvdtpError> {
    avdtp_stack()
        .await
        .map_err(|_| AvdtpError::NotInitialized)?
        .register_connection(channel_id)
}

/// Hand an incoming signaling PDU to the processor tasks.
///
/// The caller owns reassembly: `packet` must be one complete signaling
/// PDU, header included.
///
/// # Errors
///
/// Returns `AvdtpError::PduTooLarge` if the PDU exceeds the signaling
/// buffer.
pub async fn deliver_signaling_packet(
    channel_id: ChannelId,
    packet: &[u8],
) -> Result<(), AvdtpError> {
    let payload = Vec::from_slice(packet).map_err(|()| AvdtpError::PduTooLarge)?;
    SIGNALING_CHANNEL
        .sender()
        .send(IncomingSignal {
            channel_id,
            payload,
        })
        .await;
    Ok(())
}

/// Current lifecycle and acceptor state of a stream endpoint.
///
/// # Errors
///
/// Returns an error if the stack is not initialized or no endpoint is
/// advertised under `seid`.
pub async fn endpoint_state(
    seid: StreamEndpointId,
) -> Result<(StreamEndpointState, AcceptorState), AvdtpError> {
    let stack = avdtp_stack().await.map_err(|_| AvdtpError::NotInitialized)?;
    let endpoint = stack.endpoint(seid).ok_or(AvdtpError::EndpointNotFound)?;
    Ok((endpoint.state, endpoint.acceptor_state))
}

/// Notify the stack that the media transport channel for `seid` is up.
///
/// Advances an endpoint waiting on its media L2CAP channel to `Opened` so
/// the peer's START can be accepted.
///
/// # Errors
///
/// Returns an error if the stack is not initialized or no endpoint is
/// advertised under `seid`.
pub async fn media_transport_connected(seid: StreamEndpointId) -> Result<(), AvdtpError> {
    let mut stack = avdtp_stack().await.map_err(|_| AvdtpError::NotInitialized)?;
    let endpoint = stack
        .endpoint_mut(seid)
        .ok_or(AvdtpError::EndpointNotFound)?;
    endpoint.media_transport_connected();
    Ok(())
}
