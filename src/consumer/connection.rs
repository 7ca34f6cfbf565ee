//! Per-session dispatch loop for consumers.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use log::{error, warn};
use tokio_util::{
    codec::{FramedRead, FramedWrite},
    sync::CancellationToken,
};

use super::{
    handler::{ExceptionHandler, Handler, HandlerError, Request},
    registry::SessionRegistry,
};
use crate::{
    codec::Codec,
    config::EndpointConfig,
    metrics::{self, Direction},
    panic::format_panic,
    session::SessionId,
    transport::Connection,
};

/// State shared by every session of one consumer.
pub(super) struct ConsumerContext<C: Codec> {
    pub codec: C,
    pub config: EndpointConfig,
    pub handler: Arc<dyn Handler<C::Frame>>,
    pub exceptions: Arc<dyn ExceptionHandler<C::Frame>>,
    pub registry: SessionRegistry,
}

/// What the loop does after a frame has been handled.
#[derive(Debug, PartialEq, Eq)]
enum Next {
    Read,
    Close,
}

/// Serve one accepted connection until the peer leaves, the session is
/// closed by policy or `shutdown` fires.
pub(super) async fn serve_session<C: Codec>(
    connection: Connection,
    context: Arc<ConsumerContext<C>>,
    shutdown: CancellationToken,
) {
    let id = SessionId::next();
    let peer_addr = connection.peer_addr;
    let close = shutdown.child_token();
    let _guard = context.registry.insert(id, peer_addr, close.clone());
    metrics::inc_consumer_sessions();
    tracing::debug!(session = id.as_u64(), %peer_addr, "consumer session open");

    let mut reader = FramedRead::new(connection.reader, context.codec.decoder());
    let mut writer = FramedWrite::new(connection.writer, context.codec.encoder());
    loop {
        let next = tokio::select! {
            biased;
            () = close.cancelled() => break,
            next = reader.next() => next,
        };
        let frame = match next {
            Some(Ok(frame)) => frame,
            Some(Err(e)) => {
                warn!("consumer decode failed: session={id}, peer_addr={peer_addr}, error={e}");
                break;
            }
            None => break,
        };
        if context.config.trace_frames {
            tracing::debug!(session = id.as_u64(), ?frame, "frame received");
        }
        metrics::inc_frames(Direction::Inbound);

        let reply = invoke(&context, Request {
            payload: frame,
            session_id: id,
            peer_addr,
        })
        .await;
        if reply_step(&context.config, id, reply, &mut writer).await == Next::Close {
            break;
        }
    }

    if let Err(e) = writer.close().await {
        tracing::debug!(session = id.as_u64(), error = %e, "consumer session shutdown failed");
    }
    metrics::dec_consumer_sessions();
    tracing::debug!(session = id.as_u64(), "consumer session closed");
}

/// Run the handler on the blocking pool, routing failures through the
/// exception handler.
async fn invoke<C: Codec>(context: &Arc<ConsumerContext<C>>, request: Request<C::Frame>) -> Option<C::Frame> {
    let id = request.session_id;
    let handler = Arc::clone(&context.handler);
    let outcome = match tokio::task::spawn_blocking(move || handler.handle(request)).await {
        Ok(Ok(reply)) => return reply,
        Ok(Err(e)) => HandlerError::Failed(e),
        Err(join) if join.is_panic() => {
            metrics::inc_handler_panics();
            let message = format_panic(join.into_panic()).to_string();
            error!("consumer handler panicked: session={id}, panic={message}");
            HandlerError::Panicked(message)
        }
        Err(join) => HandlerError::Failed(join.to_string().into()),
    };
    context
        .config
        .handler_error_log_level
        .log(format_args!("consumer handler failed: session={id}, error={outcome}"));
    context.exceptions.on_error(&outcome, id)
}

async fn reply_step<F, W>(
    config: &EndpointConfig,
    id: SessionId,
    reply: Option<F>,
    writer: &mut W,
) -> Next
where
    F: std::fmt::Debug,
    W: futures::Sink<F, Error = std::io::Error> + Unpin,
{
    if !config.sync {
        return if config.disconnect_after_complete { Next::Close } else { Next::Read };
    }
    let Some(reply) = reply else {
        config
            .no_reply_log_level
            .log(format_args!("consumer produced no reply: session={id}"));
        return if config.disconnect_on_no_reply { Next::Close } else { Next::Read };
    };
    if config.trace_frames {
        tracing::debug!(session = id.as_u64(), frame = ?reply, "writing reply");
    }
    if let Err(e) = writer.send(reply).await {
        warn!("consumer reply write failed: session={id}, error={e}");
        return Next::Close;
    }
    metrics::inc_frames(Direction::Outbound);
    if config.disconnect_after_complete { Next::Close } else { Next::Read }
}
