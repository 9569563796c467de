//! Integration tests for the mimikeepass daemon
//!
//! These run a real daemon on a socket in a tempdir and talk to it through
//! the public client and through raw framed connections.

use keepass::config::DatabaseConfig;
use keepass::db::{Entry as KpEntry, Value};
use keepass::{Database, DatabaseKey};
use mimikeepass_api::{EntryQuery, Request, GET_ENTRY_METHOD};
use mimikeepass_daemon::{acquire_listeners, Daemon, SocketGuard};
use mimikeepass_ipc::{Client, FramedStream};
use mimikeepass_store::{KeepassStore, StoreSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::{UnixListener, UnixStream};
use tokio::task::JoinHandle;

fn write_database(path: &Path, password: &str, entries: &[(&str, &str, &str, &str)]) {
    let mut db = Database::new(DatabaseConfig::default());
    for (title, url, username, entry_password) in entries {
        let mut entry = KpEntry::new();
        entry
            .fields
            .insert("Title".to_string(), Value::Unprotected((*title).into()));
        entry
            .fields
            .insert("URL".to_string(), Value::Unprotected((*url).into()));
        entry.fields.insert(
            "UserName".to_string(),
            Value::Unprotected((*username).into()),
        );
        entry.fields.insert(
            "Password".to_string(),
            Value::Unprotected((*entry_password).into()),
        );
        db.root.entries.push(entry);
    }
    let key = DatabaseKey::new().with_password(password);
    db.save(&mut std::fs::File::create(path).unwrap(), key).unwrap();
}

struct TestDaemon {
    _dir: TempDir,
    socket_path: PathBuf,
    guard: SocketGuard,
    task: JoinHandle<()>,
}

fn start_daemon(idle: Option<Duration>) -> TestDaemon {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("db.kdbx");
    write_database(
        &db_path,
        "pw",
        &[("Mail", "https://mail.example", "alice", "s3cret")],
    );

    let store = KeepassStore::open(&db_path, "pw").unwrap();
    let daemon = Daemon::new(StoreSet::new(vec![store]), idle);

    let socket_path = dir.path().join("mimikeepass.sock");
    let (listeners, guard) = acquire_listeners(Some(&socket_path)).unwrap();

    let task = tokio::spawn(async move {
        daemon.run(listeners).await.unwrap();
    });

    TestDaemon {
        _dir: dir,
        socket_path,
        guard,
        task,
    }
}

async fn raw_connection(socket_path: &Path) -> FramedStream<UnixStream> {
    FramedStream::new(UnixStream::connect(socket_path).await.unwrap())
}

#[tokio::test]
async fn end_to_end_lookup_and_idle_shutdown() {
    let daemon = start_daemon(Some(Duration::from_secs(1)));

    let mut client = Client::connect(Some(&daemon.socket_path)).await.unwrap();
    let found = client
        .get_password(EntryQuery {
            username: Some("alice".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(found.as_deref(), Some("s3cret"));

    let missing = client
        .get_password(EntryQuery {
            username: Some("bob".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(missing, None);

    // Last connection closes; one idle second later the accept loop returns.
    drop(client);
    tokio::time::timeout(Duration::from_secs(5), daemon.task)
        .await
        .expect("daemon did not shut down after idle timeout")
        .unwrap();

    drop(daemon.guard);
    assert!(!daemon.socket_path.exists(), "socket file not removed");
}

#[tokio::test]
async fn live_connection_holds_off_idle_shutdown() {
    let daemon = start_daemon(Some(Duration::from_millis(300)));

    // An open but quiet connection keeps the daemon alive past the timeout.
    let _open = raw_connection(&daemon.socket_path).await;
    tokio::time::sleep(Duration::from_millis(800)).await;
    assert!(!daemon.task.is_finished());

    daemon.task.abort();
}

#[tokio::test]
async fn idle_disabled_daemon_keeps_running() {
    let daemon = start_daemon(None);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!daemon.task.is_finished());

    daemon.task.abort();
}

#[tokio::test]
async fn oneway_request_gets_no_response() {
    let daemon = start_daemon(None);
    let mut conn = raw_connection(&daemon.socket_path).await;

    // A oneway request that would match, followed by a request that won't:
    // the only frame coming back must be the `null` for the second one.
    let mut oneway = Request::get_entry(EntryQuery {
        username: Some("alice".into()),
        ..Default::default()
    });
    oneway.oneway = true;
    conn.send(&serde_json::to_vec(&oneway).unwrap()).await.unwrap();

    let followup = Request::get_entry(EntryQuery {
        username: Some("bob".into()),
        ..Default::default()
    });
    conn.send(&serde_json::to_vec(&followup).unwrap())
        .await
        .unwrap();

    let frame = conn.recv().await.unwrap().unwrap();
    let value: serde_json::Value = serde_json::from_slice(&frame).unwrap();
    assert!(value.is_null());

    daemon.task.abort();
}

#[tokio::test]
async fn unknown_method_gets_structured_error_and_connection_survives() {
    let daemon = start_daemon(None);
    let mut conn = raw_connection(&daemon.socket_path).await;

    conn.send(br#"{"method": "fr.urdhr.mimikeepass.Nope", "parameters": {}}"#)
        .await
        .unwrap();
    let frame = conn.recv().await.unwrap().unwrap();
    let value: serde_json::Value = serde_json::from_slice(&frame).unwrap();
    assert!(value["error"].as_str().unwrap().contains("Nope"));

    // Same connection still serves lookups
    let request = Request::get_entry(EntryQuery {
        username: Some("alice".into()),
        ..Default::default()
    });
    conn.send(&serde_json::to_vec(&request).unwrap()).await.unwrap();
    let frame = conn.recv().await.unwrap().unwrap();
    let value: serde_json::Value = serde_json::from_slice(&frame).unwrap();
    assert_eq!(value["password"], "s3cret");

    daemon.task.abort();
}

#[tokio::test]
async fn malformed_request_closes_only_that_connection() {
    let daemon = start_daemon(None);

    let mut bad = raw_connection(&daemon.socket_path).await;
    bad.send(b"this is not json").await.unwrap();
    assert!(bad.recv().await.unwrap().is_none(), "expected EOF");

    // The daemon itself is unharmed
    let mut client = Client::connect(Some(&daemon.socket_path)).await.unwrap();
    let found = client
        .get_password(EntryQuery {
            username: Some("alice".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(found.as_deref(), Some("s3cret"));

    daemon.task.abort();
}

#[tokio::test]
async fn get_entry_method_name_is_the_varlink_interface() {
    // The wire method is part of the stable surface; a rename would strand
    // every deployed client.
    assert_eq!(GET_ENTRY_METHOD, "fr.urdhr.mimikeepass.GetEntry");
}

#[tokio::test]
async fn multiple_listeners_all_serve() {
    let dir = TempDir::new().unwrap();
    let db_path = dir.path().join("db.kdbx");
    write_database(
        &db_path,
        "pw",
        &[("Mail", "https://mail.example", "alice", "s3cret")],
    );
    let store = KeepassStore::open(&db_path, "pw").unwrap();
    let daemon = Daemon::new(StoreSet::new(vec![store]), None);

    let path_a = dir.path().join("a.sock");
    let path_b = dir.path().join("b.sock");
    let listeners = vec![
        UnixListener::bind(&path_a).unwrap(),
        UnixListener::bind(&path_b).unwrap(),
    ];
    let task = tokio::spawn(async move { daemon.run(listeners).await.unwrap() });

    for path in [&path_a, &path_b] {
        let mut client = Client::connect(Some(path)).await.unwrap();
        let found = client
            .get_password(EntryQuery {
                username: Some("alice".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(found.as_deref(), Some("s3cret"));
    }

    task.abort();
}
