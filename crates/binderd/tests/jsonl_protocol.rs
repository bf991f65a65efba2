//! Drives a listening binder through its public API over a Unix socket.

use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::time::Duration;

use binder_config::{Config, SocketEndpoint};
use binderd::dispatch::status;
use binderd::token_api::BUILTIN_PLUGINS;
use binderd::{Reply, Server, StaticConfigLoader, StructuredHealthReporter, bootstrap_with};
use rstest::{fixture, rstest};
use tempfile::TempDir;

struct Binder {
    _dir: TempDir,
    server: Server,
    reader: BufReader<UnixStream>,
    writer: UnixStream,
}

impl Binder {
    fn send(&mut self, line: &str) -> Reply {
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .expect("send call");
        for _ in 0..4 {
            self.server.turn().expect("reactor turn");
        }
        let mut reply = String::new();
        self.reader.read_line(&mut reply).expect("read reply");
        serde_json::from_str(reply.trim_end()).expect("decode reply")
    }
}

#[fixture]
fn binder() -> Binder {
    start(None)
}

fn start(initial_token: Option<&str>) -> Binder {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("binderd.sock");
    let config = Config {
        listen: SocketEndpoint::unix(path.to_str().expect("utf8 path")),
        poll_interval_ms: 20,
        initial_token: initial_token.map(str::to_owned),
        ..Config::default()
    };
    let server = bootstrap_with(
        &StaticConfigLoader::new(config),
        Arc::new(StructuredHealthReporter::new()),
        BUILTIN_PLUGINS,
    )
    .expect("bootstrap")
    .listen()
    .expect("listen");

    let stream = UnixStream::connect(&path).expect("connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(2)))
        .expect("read timeout");
    Binder {
        _dir: dir,
        server,
        writer: stream.try_clone().expect("clone stream"),
        reader: BufReader::new(stream),
    }
}

#[rstest]
fn session_lifecycle_over_the_socket(mut binder: Binder) {
    let created = binder.send(r#"{"api":"token","verb":"create","session":"alpha"}"#);
    assert_eq!(created.status, status::SUCCESS);
    assert_eq!(created.session.as_deref(), Some("alpha"));

    let duplicate = binder.send(r#"{"api":"token","verb":"create","session":"alpha"}"#);
    assert_eq!(duplicate.status, "session-exists");

    let raised = binder.send(
        r#"{"api":"token","verb":"assurance","session":"alpha","args":{"level":"2"}}"#,
    );
    assert!(raised.is_success(), "{raised:?}");

    let logout = binder.send(r#"{"api":"token","verb":"logout","session":"alpha"}"#);
    assert!(logout.is_success(), "{logout:?}");
    assert_eq!(logout.session, None);

    let closed = binder.send(r#"{"api":"token","verb":"check","session":"alpha"}"#);
    assert_eq!(closed.status, status::UNAUTHORIZED);
}

#[rstest]
#[case::unknown_api(r#"{"api":"nope","verb":"ping"}"#, "unknown-api")]
#[case::unknown_verb(r#"{"api":"token","verb":"nope"}"#, "unknown-verb")]
#[case::malformed("{\"api\":", status::BAD_REQUEST)]
#[case::missing_verb(r#"{"api":"token"}"#, status::BAD_REQUEST)]
fn failures_keep_the_connection_open(mut binder: Binder, #[case] line: &str, #[case] expected: &str) {
    assert_eq!(binder.send(line).status, expected);
    assert!(binder.send(r#"{"api":"TOKEN","verb":"Ping"}"#).is_success());
}

#[test]
fn configured_initial_token_guards_session_creation() {
    let mut binder = start(Some("s3cret"));

    let refused = binder.send(r#"{"api":"token","verb":"create","session":"alpha"}"#);
    assert_eq!(refused.status, status::UNAUTHORIZED);

    let created = binder.send(
        r#"{"api":"token","verb":"create","session":"alpha","args":{"token":"s3cret"}}"#,
    );
    assert!(created.is_success(), "{created:?}");
    assert_eq!(created.session.as_deref(), Some("alpha"));
    assert!(binder.send(r#"{"api":"token","verb":"check","session":"alpha"}"#).is_success());
}
