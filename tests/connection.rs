mod support;
use support::{init_logger, rand_data, Reply, SimulatedTv, Startup};

use samsung_frame::{BlockingConnection, Command, Connection, ConnectionState, Frame};

use serde_json::json;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tokio::time::timeout;

use std::time::Duration;

const ENDPOINT: &str = "samsung.remote.control";

fn token_path() -> std::path::PathBuf {
    std::env::temp_dir().join(format!("tv-token-{}.txt", rand_data::string(12)))
}

fn echo(msg: &serde_json::Value) -> Vec<Reply> {
    vec![Reply::Frame(json!({"event": "echo", "data": msg["params"].clone()}))]
}

#[tokio::test]
async fn token_saved_to_file() {
    init_logger();
    let token = rand_data::token();
    let tv = SimulatedTv::silent(Startup::Connect(Some(token.clone()))).await;
    let path = token_path();

    let mut conn = Connection::new(tv.config().with_token_file(&path), ENDPOINT);
    assert_eq!(conn.state(), ConnectionState::Closed);
    conn.open().await.unwrap();
    assert_eq!(conn.state(), ConnectionState::Ready);

    assert_eq!(conn.token().unwrap(), Some(token.clone()));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), token);
    conn.close().await.unwrap();
    let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn name_sent_in_query() {
    init_logger();
    let tv = SimulatedTv::silent(Startup::Connect(None)).await;
    let mut conn = Connection::new(tv.config().with_name("Frame Test"), ENDPOINT);
    conn.open().await.unwrap();

    // base64 of "Frame Test"
    assert_eq!(
        tv.uris(),
        vec!["/api/v2/channels/samsung.remote.control?name=RnJhbWUgVGVzdA==".to_string()]
    );
    conn.close().await.unwrap();
}

#[tokio::test]
async fn unauthorized() {
    init_logger();
    let tv = SimulatedTv::silent(Startup::Frames(vec![
        json!({"event": "ms.channel.unauthorized", "data": {}}),
    ]))
    .await;
    let mut conn = Connection::new(tv.config(), ENDPOINT);

    let e = conn.open().await.unwrap_err();
    assert!(e.is_unauthorized(), "{}", e);
    assert!(!conn.is_alive());
}

#[tokio::test]
async fn unexpected_startup_event() {
    init_logger();
    let tv = SimulatedTv::silent(Startup::Frames(vec![
        json!({"event": "ms.channel.timeOut", "data": {}}),
    ]))
    .await;
    let mut conn = Connection::new(tv.config(), ENDPOINT);

    let e = conn.open().await.unwrap_err();
    assert!(e.is_connection_failure());
    assert!(!e.is_unauthorized());
    assert_eq!(conn.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn housekeeping_before_connect_is_skipped() {
    init_logger();
    let tv = SimulatedTv::silent(Startup::Frames(vec![
        json!({"event": "ed.edenTV.update", "data": {"update_type": "ed.edenApp.update"}}),
        json!({"event": "ms.voiceApp.hide"}),
        json!({"event": "ms.channel.connect", "data": {"token": 12345678}}),
        json!({"event": "ms.channel.ready", "data": {}}),
    ]))
    .await;

    let mut conn = Connection::new(tv.config(), "com.samsung.art-app").with_ready_event("ms.channel.ready");
    conn.open().await.unwrap();
    assert_eq!(conn.token().unwrap().as_deref(), Some("12345678"));
    conn.close().await.unwrap();
}

#[tokio::test]
async fn missing_ready_event() {
    init_logger();
    let tv = SimulatedTv::silent(Startup::Connect(None)).await;
    let config = tv.config().with_timeout(Some(Duration::from_millis(300)));
    let mut conn = Connection::new(config, "com.samsung.art-app").with_ready_event("ms.channel.ready");

    assert!(conn.open().await.unwrap_err().is_timeout());
}

#[tokio::test]
async fn send_and_recv() {
    init_logger();
    let tv = SimulatedTv::start(Startup::Connect(None), echo).await;
    let mut conn = Connection::new(tv.config(), ENDPOINT);

    let command = Command::remote_control(json!({"Cmd": "Click", "DataOfCmd": "KEY_HOME"}));
    conn.send(&command, None).await.unwrap();
    let frame = conn.recv().await.unwrap();
    assert_eq!(frame.event(), "echo");
    assert_eq!(frame.data()["DataOfCmd"], "KEY_HOME");

    let received = tv.received();
    assert_eq!(received[0]["method"], "ms.remote.control");

    // a sleep sends nothing
    conn.send(&Command::sleep(Duration::from_millis(10)), None).await.unwrap();
    assert_eq!(tv.received().len(), 1);
    conn.close().await.unwrap();
}

#[tokio::test]
async fn listening_forwards_frames() {
    init_logger();
    let tv = SimulatedTv::start(Startup::Connect(None), echo).await;
    let mut conn = Connection::new(tv.config(), ENDPOINT);

    let (tx, mut rx) = mpsc::unbounded_channel();
    conn.start_listening(move |frame: Frame| {
        let _ = tx.send(frame);
    })
    .await
    .unwrap();
    assert_eq!(conn.state(), ConnectionState::Listening);
    assert!(conn.recv().await.is_err());
    assert!(conn.start_listening(|_: Frame| {}).await.is_err());

    let sender = conn.sender().unwrap();
    for key in &["KEY_1", "KEY_2"] {
        let command = Command::remote_control(json!({"DataOfCmd": key}));
        sender.send(&command, Some(Duration::ZERO)).await.unwrap();
    }
    for key in &["KEY_1", "KEY_2"] {
        let frame = timeout(Duration::from_secs(2), rx.recv()).await.unwrap().unwrap();
        assert_eq!(frame.data()["DataOfCmd"], *key);
    }

    conn.close().await.unwrap();
    assert_eq!(conn.state(), ConnectionState::Closed);
    conn.close().await.unwrap();
}

#[tokio::test]
async fn unreachable_tv() {
    init_logger();
    let config = support::test_config(1);
    let mut conn = Connection::new(config, ENDPOINT);
    assert!(conn.open().await.is_err());
    assert_eq!(conn.state(), ConnectionState::Closed);
}

#[test]
fn blocking_connection() {
    init_logger();
    let rt = Runtime::new().unwrap();
    let token = rand_data::token();
    let tv = rt.block_on(SimulatedTv::start(Startup::Connect(Some(token.clone())), echo));

    let mut conn = BlockingConnection::new(tv.config(), ENDPOINT);
    conn.open().unwrap();
    assert_eq!(conn.token().unwrap(), Some(token));

    let command = Command::remote_control(json!({"DataOfCmd": "KEY_MENU"}));
    conn.send(&command, None).unwrap();
    assert_eq!(conn.recv().unwrap().data()["DataOfCmd"], "KEY_MENU");

    let (tx, rx) = std::sync::mpsc::channel();
    conn.start_listening(move |frame: Frame| {
        let _ = tx.send(frame);
    })
    .unwrap();
    assert_eq!(conn.state(), ConnectionState::Listening);

    conn.send(&Command::remote_control(json!({"DataOfCmd": "KEY_EXIT"})), None)
        .unwrap();
    let frame = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(frame.data()["DataOfCmd"], "KEY_EXIT");

    conn.close().unwrap();
    assert_eq!(conn.state(), ConnectionState::Closed);
    conn.close().unwrap();
}

#[test]
fn blocking_unauthorized() {
    init_logger();
    let rt = Runtime::new().unwrap();
    let tv = rt.block_on(SimulatedTv::silent(Startup::Frames(vec![
        json!({"event": "ms.channel.unauthorized"}),
    ])));

    let mut conn = BlockingConnection::new(tv.config(), ENDPOINT);
    assert!(conn.open().unwrap_err().is_unauthorized());
}
