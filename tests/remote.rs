mod support;
use support::{init_logger, Reply, SimulatedTv, Startup};

use samsung_frame::{BlockingRemote, Frame, KeyAction, Remote};

use serde_json::{json, Value};
use tokio::runtime::Runtime;
use tokio::time::sleep;

use std::time::Duration;

fn apps_tv(msg: &Value) -> Vec<Reply> {
    if msg["params"]["event"] != "ed.installedApp.get" {
        return Vec::new();
    }
    vec![Reply::Frame(json!({
        "event": "ed.installedApp.get",
        "data": {"data": [
            {"appId": "111299001912", "app_type": 2, "name": "YouTube"},
            {"appId": "3201907018807", "app_type": 2, "name": "Netflix"},
        ]},
    }))]
}

fn remote_params(tv: &SimulatedTv) -> Vec<Value> {
    tv.received()
        .into_iter()
        .filter(|msg| msg["method"] == "ms.remote.control")
        .map(|msg| msg["params"].clone())
        .collect()
}

#[tokio::test]
async fn keys_and_cursor() {
    init_logger();
    let tv = SimulatedTv::silent(Startup::Connect(None)).await;
    let mut remote = Remote::new(tv.config()).unwrap();

    remote.send_key("KEY_VOLUP", 3, None, KeyAction::Click).await.unwrap();
    remote.hold_key("KEY_POWER", Duration::from_millis(50)).await.unwrap();
    remote.move_cursor(10, -5, Duration::from_millis(250)).await.unwrap();
    sleep(Duration::from_millis(200)).await;

    let params = remote_params(&tv);
    assert_eq!(params.len(), 6);
    assert!(params[..3]
        .iter()
        .all(|p| p["Cmd"] == "Click" && p["DataOfCmd"] == "KEY_VOLUP"));
    assert_eq!(params[3]["Cmd"], "Press");
    assert_eq!(params[4]["Cmd"], "Release");
    assert_eq!(params[4]["DataOfCmd"], "KEY_POWER");
    assert_eq!(params[5]["Cmd"], "Move");
    assert_eq!(params[5]["Position"], json!({"x": 10, "y": -5, "Time": "250"}));
    assert_eq!(params[5]["TypeOfRemote"], "ProcessMouseDevice");

    remote.close().await.unwrap();
}

#[tokio::test]
async fn launch_apps() {
    init_logger();
    let tv = SimulatedTv::silent(Startup::Connect(None)).await;
    let mut remote = Remote::new(tv.config()).unwrap();

    remote.run_app("3201907018807", "DEEP_LINK", "").await.unwrap();
    remote.open_browser("https://example.com").await.unwrap();
    sleep(Duration::from_millis(200)).await;

    let launches: Vec<Value> = tv
        .received()
        .into_iter()
        .filter(|msg| msg["params"]["event"] == "ed.apps.launch")
        .collect();
    assert_eq!(launches.len(), 2);
    assert_eq!(launches[0]["method"], "ms.channel.emit");
    assert_eq!(launches[0]["params"]["data"]["appId"], "3201907018807");
    assert_eq!(launches[0]["params"]["data"]["action_type"], "DEEP_LINK");
    assert_eq!(launches[1]["params"]["data"]["appId"], "org.tizen.browser");
    assert_eq!(launches[1]["params"]["data"]["metaTag"], "https://example.com");
}

#[tokio::test]
async fn app_list_direct_read() {
    init_logger();
    let tv = SimulatedTv::start(Startup::Connect(None), apps_tv).await;
    let mut remote = Remote::new(tv.config()).unwrap();

    let apps = remote.app_list().await.unwrap().unwrap();
    assert_eq!(apps.len(), 2);
    assert_eq!(apps[1]["name"], "Netflix");
}

#[tokio::test]
async fn app_list_while_listening() {
    init_logger();
    let tv = SimulatedTv::start(Startup::Connect(None), apps_tv).await;
    let mut remote = Remote::new(tv.config()).unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    remote
        .start_listening(move |frame: Frame| {
            let _ = tx.send(frame.event().to_string());
        })
        .await
        .unwrap();

    let apps = remote.app_list().await.unwrap().unwrap();
    assert_eq!(apps[0]["name"], "YouTube");
    // the caller's listener still sees the frame
    assert_eq!(rx.recv().await.unwrap(), "ed.installedApp.get");
    remote.close().await.unwrap();
}

#[tokio::test]
async fn app_list_unsupported() {
    init_logger();
    let tv = SimulatedTv::start(Startup::Connect(None), |msg| {
        if msg["params"]["event"] == "ed.installedApp.get" {
            vec![Reply::Frame(json!({"event": "ms.error", "data": {"message": "unsupported"}}))]
        } else {
            Vec::new()
        }
    })
    .await;
    let mut remote = Remote::new(tv.config()).unwrap();

    assert_eq!(remote.app_list().await.unwrap(), None);
}

#[test]
fn blocking_remote() {
    init_logger();
    let rt = Runtime::new().unwrap();
    let tv = rt.block_on(SimulatedTv::start(Startup::Connect(None), apps_tv));
    let mut remote = BlockingRemote::new(tv.config()).unwrap();

    remote.send_key("KEY_HOME", 1, None, KeyAction::default()).unwrap();
    let apps = remote.app_list().unwrap().unwrap();
    assert_eq!(apps.len(), 2);

    remote.start_listening(|_: Frame| {}).unwrap();
    let apps = remote.app_list().unwrap().unwrap();
    assert_eq!(apps[1]["appId"], "3201907018807");

    remote.close().unwrap();
    assert_eq!(remote_params(&tv)[0]["DataOfCmd"], "KEY_HOME");
}
