//! End-to-end checks of the serving loop over a Unix socket.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use rstest::{fixture, rstest};

use crate::bootstrap::{Server, bootstrap_with};
use crate::dispatch::{Reply, status};
use crate::process::run_daemon_with;
use crate::token_api::BUILTIN_PLUGINS;

use super::support::{RecordingHealthReporter, TestConfigLoader};

struct Client {
    reader: BufReader<UnixStream>,
    writer: UnixStream,
}

impl Client {
    fn connect(loader: &TestConfigLoader) -> Self {
        let stream = UnixStream::connect(loader.socket_path()).expect("connect");
        stream
            .set_read_timeout(Some(Duration::from_secs(2)))
            .expect("read timeout");
        Self {
            writer: stream.try_clone().expect("clone stream"),
            reader: BufReader::new(stream),
        }
    }

    fn call(&mut self, server: &Server, line: &str) -> Reply {
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .expect("send call");
        for _ in 0..4 {
            server.turn().expect("turn");
        }
        let mut reply = String::new();
        self.reader.read_line(&mut reply).expect("read reply");
        serde_json::from_str(reply.trim_end()).expect("decode reply")
    }
}

fn listening(loader: &TestConfigLoader) -> Server {
    let reporter = Arc::new(RecordingHealthReporter::default());
    bootstrap_with(loader, reporter, BUILTIN_PLUGINS)
        .expect("bootstrap")
        .listen()
        .expect("listen")
}

#[fixture]
fn loader() -> TestConfigLoader {
    TestConfigLoader::new()
}

#[rstest]
fn sessions_survive_across_calls(loader: TestConfigLoader) {
    let server = listening(&loader);
    let mut client = Client::connect(&loader);

    let created = client.call(&server, r#"{"api":"token","verb":"create"}"#);
    assert!(created.is_success(), "{created:?}");
    let token = created.session.expect("created token");

    let login = format!(r#"{{"api":"token","verb":"login","session":"{token}"}}"#);
    assert!(client.call(&server, &login).is_success());
    let checked = client.call(
        &server,
        &format!(r#"{{"api":"token","verb":"check","session":"{token}"}}"#),
    );
    let response = checked.response.expect("check response");
    assert_eq!(response["loa"], 1);

    let again = client.call(&server, &login);
    assert_eq!(again.status, status::INSUFFICIENT_ASSURANCE);
}

#[rstest]
fn idle_turns_purge_expired_sessions() {
    let loader = TestConfigLoader::new().with_session_timeout(1);
    let server = listening(&loader);
    let mut client = Client::connect(&loader);

    let created = client.call(&server, r#"{"api":"token","verb":"create","session":"idle"}"#);
    assert!(created.is_success(), "{created:?}");

    std::thread::sleep(Duration::from_millis(1100));
    while server.turn().expect("turn") == binder_reactor::WaitOutcome::Dispatched {}
    assert_eq!(server.session_count(), 0);

    let refused = client.call(&server, r#"{"api":"token","verb":"check","session":"idle"}"#);
    assert_eq!(refused.status, status::UNAUTHORIZED);
}

#[rstest]
fn run_returns_once_shutdown_is_requested(loader: TestConfigLoader) {
    let shutdown = AtomicBool::new(true);
    let reporter = Arc::new(RecordingHealthReporter::default());

    run_daemon_with(&loader, reporter, &shutdown, BUILTIN_PLUGINS).expect("run daemon");
    assert!(!loader.socket_path().exists(), "socket file is removed");
}
