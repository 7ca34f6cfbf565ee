//! Consumer dispatch, reply and failure policies.

use std::{
    io::{BufRead, BufReader, Write},
    net::TcpStream,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use rstest::rstest;
use serial_test::serial;
use tokio::runtime::Runtime;
use wirebridge::{
    BoxError,
    Consumer,
    EndpointConfig,
    LogLevel,
    SessionId,
    codec::TextLineCodec,
    consumer::{HandlerError, Request},
};
use wirebridge_testing::{LoggerHandle, logger};

struct Client {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

impl Client {
    fn connect(consumer: &Consumer<TextLineCodec>) -> Self {
        let stream = TcpStream::connect(consumer.local_addr()).expect("connect");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("read timeout");
        let reader = BufReader::new(stream.try_clone().expect("clone stream"));
        Self { stream, reader }
    }

    fn send(&mut self, line: &str) {
        self.stream
            .write_all(format!("{line}\n").as_bytes())
            .expect("write");
    }

    /// Next line, or `None` once the consumer has closed the session.
    fn recv(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.reader.read_line(&mut line).expect("read") {
            0 => None,
            _ => Some(line.trim_end().to_owned()),
        }
    }
}

fn echo(request: Request<String>) -> Result<Option<String>, BoxError> {
    match request.payload.as_str() {
        "silent" => Ok(None),
        "fail" => Err("refused".into()),
        "panic" => panic!("handler exploded"),
        other => Ok(Some(format!("echo {other}"))),
    }
}

fn bind(runtime: &Runtime, config: EndpointConfig) -> Consumer<TextLineCodec> {
    runtime
        .block_on(
            Consumer::builder(TextLineCodec::new())
                .config(config)
                .exception_handler(|error: &HandlerError, _: SessionId| Some(format!("fault: {error}")))
                .bind("127.0.0.1:0", echo),
        )
        .expect("bind consumer")
}

fn runtime() -> Runtime { Runtime::new().expect("runtime") }

#[test]
fn replies_are_written_in_order() {
    let runtime = runtime();
    let consumer = bind(&runtime, EndpointConfig::default());
    let mut client = Client::connect(&consumer);
    client.send("a");
    client.send("b");
    assert_eq!(client.recv().as_deref(), Some("echo a"));
    assert_eq!(client.recv().as_deref(), Some("echo b"));
}

#[rstest]
#[case("fail", "fault: handler failed: refused")]
#[case("panic", "fault: handler panicked: handler exploded")]
fn handler_failures_become_fault_replies(#[case] payload: &str, #[case] expected: &str) {
    let runtime = runtime();
    let consumer = bind(&runtime, EndpointConfig::default());
    let mut client = Client::connect(&consumer);
    client.send(payload);
    assert_eq!(client.recv().as_deref(), Some(expected));
    client.send("again");
    assert_eq!(client.recv().as_deref(), Some("echo again"));
}

#[test]
fn failure_without_fault_reply_counts_as_no_reply() {
    let runtime = runtime();
    let consumer = runtime
        .block_on(Consumer::bind("127.0.0.1:0", TextLineCodec::new(), echo))
        .expect("bind");
    let mut client = Client::connect(&consumer);
    client.send("fail");
    assert_eq!(client.recv(), None);
}

#[rstest]
#[serial]
fn missing_reply_is_logged_and_closes_session(mut logger: LoggerHandle) {
    let runtime = runtime();
    let consumer = bind(&runtime, EndpointConfig::default());
    let mut client = Client::connect(&consumer);
    client.send("silent");
    assert_eq!(client.recv(), None);
    assert!(logger.contains(log::Level::Warn, "consumer produced no reply"));
}

#[rstest]
#[serial]
fn missing_reply_keeps_session_when_configured(mut logger: LoggerHandle) {
    let runtime = runtime();
    let consumer = bind(
        &runtime,
        EndpointConfig::default()
            .with_disconnect_on_no_reply(false)
            .with_no_reply_log_level(LogLevel::Info),
    );
    let mut client = Client::connect(&consumer);
    client.send("silent");
    client.send("next");
    assert_eq!(client.recv().as_deref(), Some("echo next"));
    assert!(logger.contains(log::Level::Info, "consumer produced no reply"));
}

#[test]
fn disconnect_after_complete_closes_after_reply() {
    let runtime = runtime();
    let consumer = bind(
        &runtime,
        EndpointConfig::default().with_disconnect_after_complete(true),
    );
    let mut client = Client::connect(&consumer);
    client.send("once");
    assert_eq!(client.recv().as_deref(), Some("echo once"));
    assert_eq!(client.recv(), None);
}

#[test]
fn one_way_endpoint_never_replies() {
    let runtime = runtime();
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let consumer = runtime
        .block_on(
            Consumer::builder(TextLineCodec::new())
                .config(EndpointConfig::default().with_sync(false))
                .bind("127.0.0.1:0", move |_: Request<String>| {
                    seen.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, BoxError>(Some("ignored".to_owned()))
                }),
        )
        .expect("bind");
    let mut client = Client::connect(&consumer);
    client.send("one");
    client.send("two");
    client
        .stream
        .set_read_timeout(Some(Duration::from_millis(200)))
        .expect("read timeout");
    let mut line = String::new();
    assert!(client.reader.read_line(&mut line).is_err(), "unexpected reply: {line}");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn sessions_can_be_listed_and_closed() {
    let runtime = runtime();
    let consumer = bind(&runtime, EndpointConfig::default());
    let mut client = Client::connect(&consumer);
    client.send("hi");
    assert_eq!(client.recv().as_deref(), Some("echo hi"));

    let sessions = consumer.active_sessions();
    assert_eq!(sessions.len(), 1);
    assert!(consumer.session_peer(sessions[0]).is_some());
    assert!(consumer.close_session(sessions[0]));
    assert_eq!(client.recv(), None);

    let deadline = Instant::now() + Duration::from_secs(2);
    while !consumer.active_sessions().is_empty() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(consumer.active_sessions().is_empty());
}

#[test]
fn shutdown_closes_sessions() {
    let runtime = runtime();
    let consumer = bind(&runtime, EndpointConfig::default());
    let mut client = Client::connect(&consumer);
    client.send("hi");
    assert_eq!(client.recv().as_deref(), Some("echo hi"));
    runtime.block_on(consumer.shutdown());
    assert_eq!(client.recv(), None);
    assert!(TcpStream::connect(consumer.local_addr()).is_err());
}
