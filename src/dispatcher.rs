//! Inbound event handling for producer sessions.
//!
//! The session reader task reports every decoded frame, decode failure and
//! end-of-stream to an [`InboundHandler`]. Producers register the
//! [`ResponseDispatcher`], which resolves the session's registered
//! correlation slot. Handlers run on I/O tasks: they must return promptly and
//! must never wait on the slot they resolve.

use std::{fmt, io};

use crate::{error::BridgeError, session::Session};

/// Callbacks invoked by a session's reader task.
pub trait InboundHandler<F>: Send + Sync + 'static {
    /// A complete frame was decoded.
    fn on_frame(&self, session: &Session<F>, frame: F);

    /// Reading or decoding failed; the session is about to close.
    fn on_error(&self, session: &Session<F>, error: io::Error);

    /// The peer closed the stream; the session is about to close.
    fn on_closed(&self, session: &Session<F>);
}

/// Resolves the registered correlation slot from inbound events.
///
/// The single-slot model has no request identifier on the wire: the next
/// frame a session produces belongs to whichever request is registered at
/// that moment. A frame arriving while no request is pending is discarded.
#[derive(Clone, Copy, Debug, Default)]
pub struct ResponseDispatcher;

impl<F> InboundHandler<F> for ResponseDispatcher
where
    F: fmt::Debug + Send + 'static,
{
    fn on_frame(&self, session: &Session<F>, frame: F) {
        match session.pending_slot() {
            Some(slot) => {
                let slot_id = slot.id();
                if !slot.resolve(frame) {
                    tracing::debug!(
                        session = session.id().as_u64(),
                        slot_id,
                        "discarding frame for settled request"
                    );
                }
            }
            None => {
                tracing::debug!(
                    session = session.id().as_u64(),
                    ?frame,
                    "discarding frame with no registered request"
                );
            }
        }
    }

    fn on_error(&self, session: &Session<F>, error: io::Error) {
        if let Some(slot) = session.pending_slot() {
            slot.fail(BridgeError::Io(error));
        } else {
            log::warn!(
                "session read failed with no pending request: session={}, error={error}",
                session.id()
            );
        }
    }

    fn on_closed(&self, session: &Session<F>) {
        if let Some(slot) = session.pending_slot() {
            slot.fail(BridgeError::NoResponse);
        }
    }
}
