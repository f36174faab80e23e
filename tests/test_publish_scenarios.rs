//! End-to-end publish behaviour through the bridge controller
//!
//! Each test drives a started bridge with transport events and subscription
//! batches, then checks what reached the transport and the provider sinks.


use serde_json::json;
use signalk_iot_bridge::source::Update;
use signalk_iot_bridge::testing::{ChannelSource, MockConnector, RecordingReporter};
use signalk_iot_bridge::transport::TransportEvent;
use signalk_iot_bridge::BridgeController;
use std::sync::Arc;
use test_helpers::{allow_list, settle, test_config, Harness, TEST_BROKER};

fn sending() -> String {
    format!("Connected to {TEST_BROKER}. Sending data")
}

fn not_sending(state: &str) -> String {
    format!("Connected to {TEST_BROKER}. Not sending data while {state}")
}

#[tokio::test]
async fn test_nothing_is_published_before_connect() {
    let mut h = Harness::started(&test_config()).await;

    h.source
        .deliver(vec![Update::new("navigation.speedOverGround", json!(4.2))])
        .await;
    settle().await;

    assert!(h.connector.published().is_empty());
    h.bridge.stop().await;
}

#[tokio::test]
async fn test_switch_to_disallowed_state_stops_publishing() {
    let mut config = test_config();
    config.bridge.allow_list = allow_list(&["default", "anchored"]);
    let mut h = Harness::started(&config).await;

    h.connector.emit(TransportEvent::Connected).await;
    h.source
        .deliver(vec![Update::new("navigation.speedOverGround", json!(0.1))])
        .await;
    settle().await;
    assert_eq!(h.published_topics(), vec!["navigation/speedOverGround"]);
    assert_eq!(h.reporter.last_status(), Some(sending()));

    h.source
        .deliver(vec![
            Update::new("navigation.state", json!("sailing")),
            Update::new("navigation.speedOverGround", json!(6.3)),
        ])
        .await;
    settle().await;

    // neither the state update nor the speed that followed it went out
    assert_eq!(h.published_topics(), vec!["navigation/speedOverGround"]);
    assert_eq!(h.reporter.last_status(), Some(not_sending("sailing")));

    h.bridge.stop().await;
}

#[tokio::test]
async fn test_single_topic_mode_publishes_everything_on_one_topic() {
    let mut config = test_config();
    config.bridge.single_topic_mode = true;
    let mut h = Harness::started(&config).await;

    h.connector.emit(TransportEvent::Connected).await;
    h.source
        .deliver(vec![
            Update::new("navigation.speedOverGround", json!(5.1)),
            Update::new(
                "navigation.position",
                json!({"latitude": 59.9, "longitude": 10.7}),
            ),
        ])
        .await;
    settle().await;

    assert_eq!(
        h.connector.published(),
        vec![
            ("signalk".to_string(), "5.1".to_string()),
            (
                "signalk".to_string(),
                r#"{"latitude":59.9,"longitude":10.7}"#.to_string()
            ),
        ]
    );
    h.bridge.stop().await;
}

#[tokio::test]
async fn test_payloads_are_single_json_values() {
    let mut h = Harness::started(&test_config()).await;

    h.connector.emit(TransportEvent::Connected).await;
    h.source
        .deliver(vec![
            Update::new("navigation.speedThroughWater", json!(12.5)),
            Update::new("environment.mode", json!("anchored")),
        ])
        .await;
    settle().await;

    assert_eq!(
        h.connector.published(),
        vec![
            ("navigation/speedThroughWater".to_string(), "12.5".to_string()),
            ("environment/mode".to_string(), "\"anchored\"".to_string()),
        ]
    );
    assert!(h
        .reporter
        .debugs()
        .contains(&"PUB navigation/speedThroughWater 12.5".to_string()));
    h.bridge.stop().await;
}

#[tokio::test]
async fn test_state_change_while_offline_is_announced_on_reconnect() {
    let mut h = Harness::started(&test_config()).await;

    h.connector.emit(TransportEvent::Connected).await;
    h.connector.emit(TransportEvent::Offline).await;
    settle().await;
    assert_eq!(h.reporter.last_status().as_deref(), Some("Offline"));
    let statuses_while_offline = h.reporter.statuses().len();

    h.source
        .deliver(vec![Update::new("navigation.state", json!("moored"))])
        .await;
    settle().await;
    assert_eq!(h.reporter.statuses().len(), statuses_while_offline);

    h.connector
        .emit(TransportEvent::Reconnecting { attempt: 1 })
        .await;
    h.connector.emit(TransportEvent::Connected).await;
    settle().await;

    assert_eq!(h.reporter.last_status(), Some(not_sending("moored")));
    h.bridge.stop().await;
}

#[tokio::test]
async fn test_repeated_state_does_not_re_announce() {
    let mut h = Harness::started(&test_config()).await;
    h.connector.emit(TransportEvent::Connected).await;

    h.source
        .deliver(vec![Update::new("navigation.state", json!("motoring"))])
        .await;
    settle().await;
    let count = h.reporter.statuses().len();

    h.source
        .deliver(vec![Update::new("navigation.state", json!("motoring"))])
        .await;
    settle().await;

    assert_eq!(h.reporter.statuses().len(), count);
    assert_eq!(h.reporter.last_status(), Some(sending()));
    h.bridge.stop().await;
}

#[tokio::test]
async fn test_unlisted_state_is_accepted() {
    let mut config = test_config();
    config.bridge.allow_list = allow_list(&["default", "fishing"]);
    let mut h = Harness::started(&config).await;
    h.connector.emit(TransportEvent::Connected).await;

    h.source
        .deliver(vec![
            Update::new("navigation.state", json!("fishing")),
            Update::new("environment.water.temperature", json!(287.4)),
        ])
        .await;
    settle().await;

    assert_eq!(h.published_topics(), vec!["environment/water/temperature"]);
    h.bridge.stop().await;
}

#[tokio::test]
async fn test_publish_failure_does_not_abort_batch() {
    let connector = MockConnector::with_publish_failure();
    let reporter = Arc::new(RecordingReporter::new());
    let mut bridge = BridgeController::new(connector.clone(), reporter.clone());
    let mut source = ChannelSource::new();
    bridge.start(&test_config(), &mut source).await.unwrap();

    connector.emit(TransportEvent::Connected).await;
    source
        .deliver(vec![
            Update::new("navigation.speedOverGround", json!(1.0)),
            Update::new("navigation.state", json!("moored")),
        ])
        .await;
    settle().await;

    assert!(reporter.last_error().unwrap().contains("navigation/speedOverGround"));
    // the state update behind the failed publish was still processed
    assert_eq!(reporter.last_status(), Some(not_sending("moored")));
    bridge.stop().await;
}

#[tokio::test]
async fn test_transport_and_subscription_errors_reach_error_sink() {
    let mut h = Harness::started(&test_config()).await;

    h.connector
        .emit(TransportEvent::Error("certificate rejected".to_string()))
        .await;
    settle().await;
    assert!(h
        .reporter
        .last_error()
        .unwrap()
        .contains("certificate rejected"));

    h.source.deliver_error("delta stream closed").await;
    settle().await;
    assert!(h
        .reporter
        .last_error()
        .unwrap()
        .contains("delta stream closed"));

    // errors never touch the status text
    assert!(!h
        .reporter
        .statuses()
        .iter()
        .any(|s| s.contains("rejected") || s.contains("closed")));
    h.bridge.stop().await;
}

#[tokio::test]
async fn test_invalid_updates_are_dropped_individually() {
    let mut h = Harness::started(&test_config()).await;
    h.connector.emit(TransportEvent::Connected).await;

    h.source
        .deliver(vec![
            Update::new("", json!(1)),
            Update::new("navigation.state", json!(42)),
            Update::new("navigation.headingTrue", json!(3.1)),
        ])
        .await;
    settle().await;

    assert_eq!(h.published_topics(), vec!["navigation/headingTrue"]);
    h.bridge.stop().await;
}
