//! Producer behaviour when the transport or the peer misbehaves.

use std::{
    io::Write,
    net::TcpListener,
    sync::mpsc,
    thread,
    time::{Duration, Instant},
};

use rstest::rstest;
use wirebridge::{
    BridgeError,
    EndpointConfig,
    Envelope,
    IoPool,
    Producer,
    SessionState,
    codec::TextLineCodec,
};
use wirebridge_testing::{io_pool, read_line, spawn_peer};

fn dead_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let address = listener.local_addr().expect("local addr").to_string();
    drop(listener);
    address
}

fn build(address: &str, config: EndpointConfig) -> Result<Producer<TextLineCodec>, BridgeError> {
    Producer::builder(address, TextLineCodec::new())
        .config(config)
        .io_threads(1)
        .build()
}

#[test]
fn peer_hanging_up_yields_no_response() {
    let (address, peer) = spawn_peer(|stream| {
        assert_eq!(read_line(&stream), "hello");
        drop(stream);
    });
    let producer = build(&address, EndpointConfig::default()).expect("build");
    let err = producer
        .request(Envelope::request("hello".to_owned()))
        .expect_err("peer closed without replying");
    assert!(matches!(err, BridgeError::NoResponse));
    assert_eq!(producer.session_state(), SessionState::Closed);
    peer.join().expect("join peer");
}

#[test]
fn undecodable_reply_yields_io_error() {
    let (address, peer) = spawn_peer(|mut stream| {
        read_line(&stream);
        stream.write_all(&[0xff, 0xfe, b'\n']).expect("write");
        std::thread::sleep(Duration::from_millis(100));
    });
    let producer = build(&address, EndpointConfig::default()).expect("build");
    let err = producer
        .request(Envelope::request("hello".to_owned()))
        .expect_err("invalid UTF-8");
    assert!(matches!(err, BridgeError::Io(e) if e.kind() == std::io::ErrorKind::InvalidData));
    peer.join().expect("join peer");
}

#[test]
fn eager_session_creation_fails_build() {
    let err = build(
        &dead_address(),
        EndpointConfig::default().with_lazy_session_creation(false),
    )
    .expect_err("nothing listening");
    assert!(matches!(err, BridgeError::ConnectFailed { .. }));
}

#[rstest]
fn eager_session_is_open_after_build(io_pool: IoPool) {
    let (address, peer) = spawn_peer(|stream| {
        assert_eq!(read_line(&stream), "ping");
        (&stream).write_all(b"pong\n").expect("write");
        read_line(&stream);
    });
    let producer = Producer::builder(address, TextLineCodec::new())
        .config(EndpointConfig::default().with_lazy_session_creation(false))
        .io_pool(io_pool)
        .build()
        .expect("build");
    assert_eq!(producer.session_state(), SessionState::Open);
    assert_eq!(
        producer
            .request(Envelope::request("ping".to_owned()))
            .expect("reply"),
        "pong"
    );
    producer.stop();
    peer.join().expect("join peer");
}

#[test]
fn lazy_connect_failure_is_not_a_timeout() {
    let producer = build(
        &dead_address(),
        EndpointConfig::default().with_timeout(Duration::from_millis(50)),
    )
    .expect("lazy build");
    let err = producer
        .request(Envelope::request("1".to_owned()))
        .expect_err("connect fails");
    assert!(matches!(err, BridgeError::ConnectFailed { .. }));
}

#[test]
fn session_is_reused_across_requests() {
    let (address, peer) = spawn_peer(|stream| {
        for reply in [b"one\n", b"two\n"] {
            read_line(&stream);
            (&stream).write_all(reply).expect("write");
        }
        read_line(&stream);
    });
    let producer = build(&address, EndpointConfig::default()).expect("build");
    let first = producer
        .request(Envelope::request("a".to_owned()))
        .expect("first");
    let id = producer.session().expect("session").id();
    let second = producer
        .request(Envelope::request("b".to_owned()))
        .expect("second");
    assert_eq!((first.as_str(), second.as_str()), ("one", "two"));
    assert_eq!(producer.session().expect("session").id(), id);
    drop(producer);
    peer.join().expect("join peer");
}

/// Hold the accepted connection open without reading until told to stop.
fn stalled_peer() -> (String, mpsc::Sender<()>, thread::JoinHandle<()>) {
    let (release, parked) = mpsc::channel::<()>();
    let (address, peer) = spawn_peer(move |stream| {
        let _ = parked.recv();
        drop(stream);
    });
    (address, release, peer)
}

#[test]
fn timeout_returns_while_peer_stops_reading() {
    let (address, release, peer) = stalled_peer();
    let producer = build(
        &address,
        EndpointConfig::default().with_timeout(Duration::from_millis(200)),
    )
    .expect("build");

    let (done, outcome) = mpsc::channel();
    let caller = thread::spawn(move || {
        let started = Instant::now();
        let result = producer.request(Envelope::request("x".repeat(64 * 1024 * 1024)));
        done.send((result, started.elapsed(), producer.session_state()))
            .expect("report outcome");
    });
    let (result, elapsed, state) = outcome
        .recv_timeout(Duration::from_secs(3))
        .expect("request returned within 3s of a 200ms deadline");
    assert!(matches!(result, Err(BridgeError::Timeout(_))));
    assert!(elapsed < Duration::from_secs(2), "returned late: {elapsed:?}");
    assert_eq!(state, SessionState::Closed);

    caller.join().expect("join caller");
    release.send(()).expect("release peer");
    peer.join().expect("join peer");
}

#[test]
fn close_after_send_is_bounded_by_drain_timeout() {
    let (address, release, peer) = stalled_peer();
    let producer = build(
        &address,
        EndpointConfig::default()
            .with_connect_timeout(Duration::from_millis(200))
            .with_disconnect_after_complete(true),
    )
    .expect("build");

    let started = Instant::now();
    producer
        .send(Envelope::one_way("x".repeat(64 * 1024 * 1024)))
        .expect("frame queued");
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(producer.session_state(), SessionState::Closed);

    release.send(()).expect("release peer");
    peer.join().expect("join peer");
}
