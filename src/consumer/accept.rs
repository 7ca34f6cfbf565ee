//! Accept loop for consumers.

use std::sync::Arc;

use futures::FutureExt;
use log::{error, warn};
use tokio::time::sleep;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use super::{
    backoff::BackoffConfig,
    connection::{ConsumerContext, serve_session},
};
use crate::{codec::Codec, panic::format_panic, transport::Acceptor};

/// Accept connections until `shutdown` fires, serving each on its own task.
///
/// Accept failures are logged and retried after an exponentially growing
/// delay; they never end the loop.
pub(super) async fn accept_loop<C: Codec>(
    acceptor: Box<dyn Acceptor>,
    context: Arc<ConsumerContext<C>>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    backoff: BackoffConfig,
) {
    let backoff = backoff.normalized();
    let mut delay = backoff.initial_delay;
    loop {
        let accepted = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            accepted = acceptor.accept() => accepted,
        };
        match accepted {
            Ok(connection) => {
                delay = backoff.initial_delay;
                let peer_addr = connection.peer_addr;
                let task = std::panic::AssertUnwindSafe(serve_session(
                    connection,
                    Arc::clone(&context),
                    shutdown.clone(),
                ))
                .catch_unwind();
                tracker.spawn(async move {
                    if let Err(panic) = task.await {
                        let panic_msg = format_panic(panic);
                        error!("consumer session panicked: panic={panic_msg}, peer_addr={peer_addr}");
                    }
                });
            }
            Err(e) => {
                let local_addr = acceptor.local_addr().ok();
                warn!("accept error: error={e:?}, local_addr={local_addr:?}");
                tokio::select! {
                    biased;
                    () = shutdown.cancelled() => break,
                    () = sleep(delay) => {}
                }
                delay = backoff.next_delay(delay);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        net::SocketAddr,
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use async_trait::async_trait;

    use super::*;
    use crate::{
        codec::TextLineCodec,
        config::EndpointConfig,
        consumer::{
            handler::{NoFaultReply, Request},
            registry::SessionRegistry,
        },
        error::BoxError,
        transport::Connection,
    };

    struct FailingAcceptor {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Acceptor for FailingAcceptor {
        async fn accept(&self) -> io::Result<Connection> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(io::Error::other("accept failed"))
        }

        fn local_addr(&self) -> io::Result<SocketAddr> { Ok("127.0.0.1:0".parse().expect("addr")) }
    }

    fn context() -> Arc<ConsumerContext<TextLineCodec>> {
        Arc::new(ConsumerContext {
            codec: TextLineCodec::new(),
            config: EndpointConfig::default(),
            handler: Arc::new(|_: Request<String>| Ok::<Option<String>, BoxError>(None)),
            exceptions: Arc::new(NoFaultReply),
            registry: SessionRegistry::default(),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn accept_failures_back_off_exponentially() {
        let calls = Arc::new(AtomicUsize::new(0));
        let shutdown = CancellationToken::new();
        let task = tokio::spawn(accept_loop(
            Box::new(FailingAcceptor {
                calls: Arc::clone(&calls),
            }),
            context(),
            shutdown.clone(),
            TaskTracker::new(),
            BackoffConfig::default(),
        ));

        // Failures at 0, 10, 30, 70 and 150 ms.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        shutdown.cancel();
        task.await.expect("accept loop exits on shutdown");
    }
}
