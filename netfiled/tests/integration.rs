//! End-to-end tests driving a real `Server` over real `TcpStream`s.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::Ordering;
use std::time::Duration;

use libnetfiled::config::{parse_toml_config, Config};
use libnetfiled::Server;

struct Harness {
    addr: SocketAddr,
    stop: std::sync::Arc<std::sync::atomic::AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
    _dir: tempfile::TempDir,
}

impl Harness {
    fn start() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let server = Server::bind(config).unwrap();
        let addr = server.local_addr().unwrap();
        let stop = server.stop_handle();
        let handle = std::thread::spawn(move || server.run().unwrap());
        Harness { addr, stop, handle: Some(handle), _dir: dir }
    }

    fn connect(&self) -> Client {
        let stream = TcpStream::connect(self.addr).unwrap();
        let reader = BufReader::new(stream.try_clone().unwrap());
        Client { stream, reader }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        std::thread::sleep(Duration::from_millis(150));
        if let Some(h) = self.handle.take() {
            h.join().ok();
        }
    }
}

struct Client {
    stream: TcpStream,
    reader: BufReader<TcpStream>,
}

impl Client {
    fn send(&mut self, line: &str) {
        self.stream.write_all(line.as_bytes()).unwrap();
        self.stream.write_all(b"\n").unwrap();
    }

    fn recv_line(&mut self) -> String {
        let mut line = String::new();
        self.reader.read_line(&mut line).unwrap();
        line.trim_end_matches('\n').to_string()
    }

    fn login(&mut self, user: &str, pwd: &str) {
        self.send(&format!("login {user}"));
        self.send(&format!("pass {pwd}"));
    }
}

fn test_config(base: &std::path::Path) -> Config {
    let toml = parse_toml_config(&format!(
        "base = {:?}\nport = 0\n\n[users]\nalice = \"hunter2\"\n",
        base.display(),
    ))
    .unwrap();
    toml.into_config(std::path::Path::new(".")).unwrap()
}

#[test]
fn login_then_whoami_then_w_reports_one_session() {
    let harness = Harness::start();
    let mut client = harness.connect();
    client.login("alice", "hunter2");
    client.send("whoami");
    assert_eq!(client.recv_line(), "alice");
    client.send("w");
    assert_eq!(client.recv_line(), "alice");
}

#[test]
fn commands_before_login_are_rejected() {
    let harness = Harness::start();
    let mut client = harness.connect();
    client.send("whoami");
    assert!(client.recv_line().starts_with("Error:"));
}

#[test]
fn bad_password_resets_to_anonymous_but_keeps_connection_open() {
    let harness = Harness::start();
    let mut client = harness.connect();
    client.send("login alice");
    client.send("pass wrongpwd");
    assert!(client.recv_line().starts_with("Error:"));

    // The connection survives; a fresh login still works.
    client.login("alice", "hunter2");
    client.send("whoami");
    assert_eq!(client.recv_line(), "alice");
}

#[test]
fn mkdir_cd_rm_round_trip() {
    let harness = Harness::start();
    let mut client = harness.connect();
    client.login("alice", "hunter2");

    client.send("mkdir proj");
    client.send("cd proj");
    client.send("ls");
    // no error from mkdir/cd, and `ls` on an empty dir produces nothing
    // before the next prompt; probe with whoami as a synchronization
    // point instead of asserting on absence of output.
    client.send("whoami");
    assert_eq!(client.recv_line(), "alice");

    client.send("cd ..");
    client.send("rm proj");
    client.send("cd proj");
    assert!(client.recv_line().starts_with("Error:"));
}

#[test]
fn escaping_the_sandbox_with_dotdot_is_access_denied() {
    let harness = Harness::start();
    let mut client = harness.connect();
    client.login("alice", "hunter2");
    client.send("cd ../../etc");
    assert_eq!(client.recv_line(), "Error: access denied.");
}

#[test]
fn path_longer_than_limit_is_rejected() {
    let harness = Harness::start();
    let mut client = harness.connect();
    client.login("alice", "hunter2");
    let long = "a".repeat(libnetfiled::path::MAX_CANONICAL_LEN + 1);
    client.send(&format!("mkdir {long}"));
    assert_eq!(client.recv_line(), "Error: path too long.");
}

#[test]
fn unknown_command_is_reported() {
    let harness = Harness::start();
    let mut client = harness.connect();
    client.login("alice", "hunter2");
    client.send("frobnicate");
    assert_eq!(client.recv_line(), "Error: command not found: frobnicate");
}

#[test]
fn put_then_get_round_trips_file_contents() {
    let harness = Harness::start();
    let mut client = harness.connect();
    client.login("alice", "hunter2");

    let payload = b"the quick brown fox";
    client.send(&format!("put data.bin {}", payload.len()));
    let reply = client.recv_line();
    let port: u16 = reply
        .strip_prefix("put port: ")
        .unwrap()
        .split(" path:")
        .next()
        .unwrap()
        .parse()
        .unwrap();
    let mut xfer = TcpStream::connect((harness.addr.ip(), port)).unwrap();
    xfer.write_all(payload).unwrap();
    drop(xfer);
    std::thread::sleep(Duration::from_millis(100));

    client.send("get data.bin");
    let reply = client.recv_line();
    let port: u16 = reply
        .strip_prefix("get port: ")
        .unwrap()
        .split(" size:")
        .next()
        .unwrap()
        .parse()
        .unwrap();
    let mut xfer = TcpStream::connect((harness.addr.ip(), port)).unwrap();
    let mut received = Vec::new();
    xfer.read_to_end(&mut received).unwrap();
    assert_eq!(received, payload);
}

#[test]
fn exit_closes_the_connection() {
    let harness = Harness::start();
    let mut client = harness.connect();
    client.login("alice", "hunter2");
    client.send("exit");
    std::thread::sleep(Duration::from_millis(150));
    let mut buf = [0u8; 1];
    let n = client.stream.read(&mut buf).unwrap_or(0);
    assert_eq!(n, 0, "connection should be closed after exit");
}
