//! The "sleepy" consumer: request `N` sleeps `N` ms and answers
//! `Slept N ms`.

use std::{future::Future, thread, time::Duration};

use tokio::runtime::{Builder, Runtime};
use wirebridge::{
    BoxError,
    Consumer,
    EndpointConfig,
    codec::TextLineCodec,
    consumer::Request,
};

/// Handler implementing the sleepy protocol.
///
/// # Errors
///
/// Fails when the payload is not a number of milliseconds.
pub fn sleepy_reply(request: Request<String>) -> Result<Option<String>, BoxError> {
    let millis: u64 = request.payload.trim().parse()?;
    thread::sleep(Duration::from_millis(millis));
    Ok(Some(format!("Slept {millis} ms")))
}

/// A sleepy consumer on its own runtime, bound to an ephemeral port.
pub struct SleepyConsumer {
    consumer: Option<Consumer<TextLineCodec>>,
    address: String,
    runtime: Runtime,
}

impl SleepyConsumer {
    /// Start with the default endpoint configuration.
    pub fn start() -> Self { Self::with_config(EndpointConfig::default()) }

    /// Start with `config`.
    pub fn with_config(config: EndpointConfig) -> Self {
        let runtime = Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("sleepy-consumer")
            .enable_all()
            .build()
            .expect("build consumer runtime");
        let consumer = runtime
            .block_on(
                Consumer::builder(TextLineCodec::new())
                    .config(config)
                    .bind("127.0.0.1:0", sleepy_reply),
            )
            .expect("bind sleepy consumer");
        let address = consumer.local_addr().to_string();
        Self {
            consumer: Some(consumer),
            address,
            runtime,
        }
    }

    /// Address producers should connect to.
    pub fn address(&self) -> &str { &self.address }

    /// The running consumer.
    pub fn consumer(&self) -> &Consumer<TextLineCodec> {
        self.consumer.as_ref().expect("consumer running")
    }

    /// Run `future` on the consumer's runtime.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output { self.runtime.block_on(future) }
}

impl Drop for SleepyConsumer {
    fn drop(&mut self) {
        if let Some(consumer) = self.consumer.take() {
            self.runtime.block_on(consumer.shutdown());
        }
    }
}
