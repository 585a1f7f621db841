//! Processor Tasks - Signaling decide pass and acceptor act pass
//!
//! This module contains the two processing tasks that drive the acceptor
//! state machine. Both share the global `AvdtpStack` via a mutex.
//!
//! * **Signaling Processor**: consumes incoming signaling PDUs, runs the
//!   side-effect-free decide phase, and queues one drive request per
//!   accepted command.
//! * **Acceptor Driver**: consumes drive requests and runs the act phase,
//!   which performs the single corresponding response send.
//!
//! Splitting the phases over two tasks preserves the core contract: at
//! most one response per decide/act pair, and no transport effects while a
//! PDU is being parsed.
//!
//! # Usage
//!
//! ```rust,no_run
//! use streambird::processor;
//! use streambird::transport::{ChannelId, SignalingTransport, TransportError};
//!
//! struct L2capGlue;
//!
//! impl SignalingTransport for L2capGlue {
//!     fn send(&self, _channel_id: ChannelId, payload: &[u8]) -> Result<usize, TransportError> {
//!         // hand the bytes to the L2CAP channel
//!         Ok(payload.len())
//!     }
//! }
//!
//! static TRANSPORT: L2capGlue = L2capGlue;
//!
//! # async fn example() {
//! processor::run(&TRANSPORT).await;
//! # }
//! ```

use crate::transport::SignalingTransport;
use crate::{DRIVE_CHANNEL, SIGNALING_CHANNEL, avdtp_stack};

async fn signaling_processor() -> ! {
    let receiver = SIGNALING_CHANNEL.receiver();
    let driver = DRIVE_CHANNEL.sender();

    loop {
        let signal = receiver.receive().await;
        debug!(
            "[SIGNALING] PDU on channel {}, {} bytes",
            signal.channel_id,
            signal.payload.len()
        );

        let request = match avdtp_stack().await {
            Ok(mut stack) => match stack.handle_signaling(&signal) {
                Ok(request) => request,
                Err(e) => {
                    warn!("[SIGNALING] dropping PDU: {}", e);
                    None
                }
            },
            Err(e) => {
                error!("[SIGNALING] AvdtpStack not initialized: {}", e);
                None
            }
        };

        if let Some(request) = request {
            driver.send(request).await;
        }
    }
}

async fn acceptor_driver<T: SignalingTransport + 'static>(transport: &'static T) -> ! {
    let receiver = DRIVE_CHANNEL.receiver();

    loop {
        let request = receiver.receive().await;
        debug!(
            "[DRIVER] act for SEID {} on channel {}",
            request.local_seid, request.channel_id
        );

        match avdtp_stack().await {
            Ok(mut stack) => {
                // Fire-and-forget: the state machine has already advanced,
                // a failed send is diagnostic only
                if let Err(e) = stack.drive(transport, request) {
                    warn!("[DRIVER] response send failed: {}", e);
                }
            }
            Err(e) => error!("[DRIVER] AvdtpStack not initialized: {}", e),
        }
    }
}

/// Run the AVDTP acceptor processor tasks
///
/// Initializes the global stack and runs the signaling processor and the
/// acceptor driver side by side. Stream endpoints can be registered via
/// [`crate::api`] once this is running (or the stack can be initialized
/// beforehand with [`crate::init_avdtp_stack`]).
///
/// # Panics
///
/// This function will panic if the AVDTP stack has already been
/// initialized.
pub async fn run<T: SignalingTransport + 'static>(transport: &'static T) {
    crate::init_avdtp_stack()
        .await
        .expect("Failed to initialize AVDTP stack");

    embassy_futures::select::select(signaling_processor(), acceptor_driver(transport)).await;
}
