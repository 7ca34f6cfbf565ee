//! Reader, writer and supervisor tasks behind an open session.
//!
//! A fourth task bounds the flush: once close() starts, queued writes get
//! the session's drain timeout before the transport is dropped.

use std::{
    fmt,
    sync::{Arc, Weak},
    time::Duration,
};

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::{
    codec::{Decoder, Encoder, FramedRead, FramedWrite},
    sync::CancellationToken,
    task::TaskTracker,
};

use super::{Session, SessionInner, SessionOptions};
use crate::{
    codec::Codec,
    dispatcher::InboundHandler,
    metrics::{self, Direction},
    transport::{BoxReader, BoxWriter, Connection},
};

/// Start the I/O tasks for a freshly connected session.
///
/// Must be called from inside the runtime that should drive the session.
pub(super) fn spawn<C, F>(
    inner: &Arc<SessionInner<F>>,
    connection: Connection,
    codec: &C,
    inbound: Arc<dyn InboundHandler<F>>,
    outbound: mpsc::UnboundedReceiver<F>,
    options: SessionOptions,
) where
    C: Codec<Frame = F>,
    F: fmt::Debug + Send + 'static,
{
    let id = inner.id.as_u64();
    let tracker = TaskTracker::new();
    let shutdown = inner.shutdown.clone();

    tracker.spawn(bound_drain(
        inner.closing.clone(),
        shutdown.clone(),
        options.drain_timeout,
        id,
    ));
    tracker.spawn(write_frames(
        FramedWrite::new(connection.writer, codec.encoder()),
        outbound,
        shutdown.clone(),
        id,
        options.trace_frames,
    ));
    tracker.spawn(read_frames(
        FramedRead::new(connection.reader, codec.decoder()),
        Arc::downgrade(inner),
        inbound,
        shutdown,
        options.trace_frames,
    ));
    tracker.close();

    let weak = Arc::downgrade(inner);
    tokio::spawn(async move {
        tracker.wait().await;
        if let Some(inner) = weak.upgrade() {
            inner.mark_closed();
        }
        tracing::debug!(session = id, "session closed");
    });
}

async fn write_frames<E, F>(
    mut sink: FramedWrite<BoxWriter, E>,
    mut outbound: mpsc::UnboundedReceiver<F>,
    shutdown: CancellationToken,
    id: u64,
    trace: bool,
) where
    E: Encoder<F, Error = std::io::Error> + Unpin,
    F: fmt::Debug,
{
    loop {
        let next = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            next = outbound.recv() => next,
        };
        // `None` means close() dropped the sender and the queue is drained.
        let Some(frame) = next else { break };
        if trace {
            tracing::debug!(session = id, ?frame, "writing frame");
        }
        let sent = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            sent = sink.send(frame) => sent,
        };
        if let Err(e) = sent {
            log::warn!("session write failed: session={id}, error={e}");
            break;
        }
        metrics::inc_frames(Direction::Outbound);
    }
    if !shutdown.is_cancelled() {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => {}
            closed = sink.close() => {
                if let Err(e) = closed {
                    log::debug!("session shutdown failed: session={id}, error={e}");
                }
            }
        }
    }
    shutdown.cancel();
}

/// Abandon the flush if it outlives `limit` after close() was called.
async fn bound_drain(
    closing: CancellationToken,
    shutdown: CancellationToken,
    limit: Duration,
    id: u64,
) {
    tokio::select! {
        biased;
        () = shutdown.cancelled() => return,
        () = closing.cancelled() => {}
    }
    tokio::select! {
        biased;
        () = shutdown.cancelled() => {}
        () = tokio::time::sleep(limit) => {
            log::warn!("session flush exceeded drain timeout, dropping transport: session={id}");
            shutdown.cancel();
        }
    }
}

async fn read_frames<D, F>(
    mut stream: FramedRead<BoxReader, D>,
    session: Weak<SessionInner<F>>,
    inbound: Arc<dyn InboundHandler<F>>,
    shutdown: CancellationToken,
    trace: bool,
) where
    D: Decoder<Item = F, Error = std::io::Error> + Unpin,
    F: fmt::Debug + Send + 'static,
{
    loop {
        let next = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            next = stream.next() => next,
        };
        let Some(inner) = session.upgrade() else { break };
        let session = Session::from_inner(inner);
        match next {
            Some(Ok(frame)) => {
                if trace {
                    tracing::debug!(session = session.id().as_u64(), ?frame, "frame received");
                }
                metrics::inc_frames(Direction::Inbound);
                inbound.on_frame(&session, frame);
            }
            Some(Err(e)) => {
                tracing::debug!(session = session.id().as_u64(), error = %e, "session read failed");
                inbound.on_error(&session, e);
                let _ = session.close();
                break;
            }
            None => {
                tracing::debug!(session = session.id().as_u64(), "peer closed session");
                inbound.on_closed(&session);
                let _ = session.close();
                break;
            }
        }
    }
    shutdown.cancel();
}
