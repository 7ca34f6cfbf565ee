//! Handler traits invoked by consumer sessions.

use std::net::SocketAddr;

use crate::{error::BoxError, session::SessionId};

/// An inbound frame together with where it came from.
#[derive(Debug)]
pub struct Request<F> {
    /// Decoded frame.
    pub payload: F,
    /// Consumer session that read the frame.
    pub session_id: SessionId,
    /// Remote end of the session.
    pub peer_addr: SocketAddr,
}

/// Processes one inbound frame and optionally produces a reply.
///
/// Handlers run on the blocking thread pool and may block. A session does
/// not read its next frame until the handler has returned and any reply has
/// been written, so frames on one session are handled in order.
///
/// Closures of the shape `Fn(Request<F>) -> Result<Option<F>, BoxError>`
/// implement this trait.
pub trait Handler<F>: Send + Sync + 'static {
    /// Handle `request`, returning the reply to write, if any.
    ///
    /// # Errors
    ///
    /// Any error is reported to the consumer's [`ExceptionHandler`].
    fn handle(&self, request: Request<F>) -> Result<Option<F>, BoxError>;
}

impl<F, Func> Handler<F> for Func
where
    Func: Fn(Request<F>) -> Result<Option<F>, BoxError> + Send + Sync + 'static,
{
    fn handle(&self, request: Request<F>) -> Result<Option<F>, BoxError> { self(request) }
}

/// Failure raised while handling an inbound frame.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The handler returned an error.
    #[error("handler failed: {0}")]
    Failed(#[source] BoxError),
    /// The handler panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),
}

/// Receives handler failures and may turn them into a fault reply.
///
/// Closures of the shape `Fn(&HandlerError, SessionId) -> Option<F>`
/// implement this trait.
pub trait ExceptionHandler<F>: Send + Sync + 'static {
    /// Inspect `error`; a returned frame is written back as the reply.
    fn on_error(&self, error: &HandlerError, session: SessionId) -> Option<F>;
}

impl<F, Func> ExceptionHandler<F> for Func
where
    Func: Fn(&HandlerError, SessionId) -> Option<F> + Send + Sync + 'static,
{
    fn on_error(&self, error: &HandlerError, session: SessionId) -> Option<F> {
        self(error, session)
    }
}

/// Exception handler that never replies. Failures are still logged by the
/// consumer.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoFaultReply;

impl<F> ExceptionHandler<F> for NoFaultReply {
    fn on_error(&self, _error: &HandlerError, _session: SessionId) -> Option<F> { None }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_are_handlers() {
        let echo = |request: Request<String>| Ok::<_, BoxError>(Some(request.payload.to_uppercase()));
        let reply = Handler::handle(
            &echo,
            Request {
                payload: "ping".to_owned(),
                session_id: SessionId::from(1),
                peer_addr: "127.0.0.1:1".parse().expect("addr"),
            },
        )
        .expect("handler ok");
        assert_eq!(reply.as_deref(), Some("PING"));
    }

    #[test]
    fn closures_are_exception_handlers() {
        let fault = |error: &HandlerError, _: SessionId| Some(format!("fault: {error}"));
        let reply = fault.on_error(&HandlerError::Panicked("boom".into()), SessionId::from(2));
        assert_eq!(reply.as_deref(), Some("fault: handler panicked: boom"));
        assert_eq!(
            ExceptionHandler::<String>::on_error(
                &NoFaultReply,
                &HandlerError::Panicked("boom".into()),
                SessionId::from(2)
            ),
            None
        );
    }
}
