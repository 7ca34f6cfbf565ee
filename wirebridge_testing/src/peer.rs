//! Scripted raw TCP peers.

use std::{
    io::{BufRead, BufReader},
    net::{TcpListener, TcpStream},
    thread::{self, JoinHandle},
};

/// Bind an ephemeral port and run `script` on the first accepted stream.
///
/// Returns the address to connect to and the peer thread.
pub fn spawn_peer<S>(script: S) -> (String, JoinHandle<()>)
where
    S: FnOnce(TcpStream) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind peer");
    let address = listener.local_addr().expect("peer address").to_string();
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept peer connection");
        script(stream);
    });
    (address, handle)
}

/// Read one `\n`-terminated line, without the terminator.
pub fn read_line(stream: &TcpStream) -> String {
    let mut line = String::new();
    BufReader::new(stream)
        .read_line(&mut line)
        .expect("read line from producer");
    line.trim_end_matches(['\r', '\n']).to_owned()
}
