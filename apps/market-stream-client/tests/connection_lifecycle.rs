//! Connection Lifecycle Integration Tests
//!
//! Connect, reconnect with backoff, heartbeat timeout, explicit disconnect,
//! offline handling and destroy, driven through the in-memory connector.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::time::Duration;

use serde_json::json;
use tokio::time::Instant;

use common::{ChannelConnector, drain_events, test_config, wait_for};
use market_stream_client::{
    ClientError, ConnectionState, EventTopic, SendOutcome, StreamClient, StreamEvent, close_codes,
};

#[tokio::test(start_paused = true)]
async fn connect_emits_connected_and_opens_transport() {
    let (connector, mut server) = ChannelConnector::new();
    let client = StreamClient::new(test_config(), connector.clone());
    let mut events = client.events();

    client.connect().await.unwrap();
    let _conn = server.accept().await;

    assert_eq!(client.state(), ConnectionState::Connected);
    let event = wait_for(&mut events, |e| matches!(e, StreamEvent::Connected { .. })).await;
    let StreamEvent::Connected { connection_id } = event else {
        unreachable!()
    };
    assert!(uuid::Uuid::parse_str(&connection_id).is_ok());
}

#[tokio::test(start_paused = true)]
async fn connect_when_connected_is_noop() {
    let (connector, mut server) = ChannelConnector::new();
    let client = StreamClient::new(test_config(), connector.clone());

    client.connect().await.unwrap();
    let _conn = server.accept().await;
    client.connect().await.unwrap();

    assert_eq!(connector.connect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn connect_while_connecting_is_rejected() {
    let (connector, mut server) = ChannelConnector::new();
    connector.set_delay(Duration::from_secs(5));
    let client = StreamClient::new(test_config(), connector.clone());

    let first = {
        let client = client.clone();
        tokio::spawn(async move { client.connect().await })
    };
    while client.state() != ConnectionState::Connecting {
        tokio::task::yield_now().await;
    }

    assert_eq!(
        client.connect().await,
        Err(ClientError::ConnectionInProgress)
    );
    assert_eq!(first.await.unwrap(), Ok(()));
    let _conn = server.accept().await;
}

#[tokio::test(start_paused = true)]
async fn server_close_schedules_backoff_reconnect() {
    let (connector, mut server) = ChannelConnector::new();
    let client = StreamClient::new(test_config(), connector.clone());
    let mut events = client.events();

    client.connect().await.unwrap();
    let conn = server.accept().await;
    conn.close(close_codes::ABNORMAL, "upstream restart");

    let disconnected =
        wait_for(&mut events, |e| matches!(e, StreamEvent::Disconnected { .. })).await;
    assert_eq!(
        disconnected,
        StreamEvent::Disconnected {
            code: close_codes::ABNORMAL,
            reason: "upstream restart".to_string(),
        }
    );

    let reconnecting =
        wait_for(&mut events, |e| matches!(e, StreamEvent::Reconnecting { .. })).await;
    let StreamEvent::Reconnecting { attempt, delay } = reconnecting else {
        unreachable!()
    };
    assert_eq!(attempt, 1);
    assert!(delay >= Duration::from_secs(1));
    assert!(delay <= Duration::from_millis(1200));

    let start = Instant::now();
    let _conn = server.accept().await;
    assert!(start.elapsed() >= Duration::from_secs(1));

    wait_for(&mut events, |e| matches!(e, StreamEvent::Connected { .. })).await;
    assert_eq!(client.metrics().reconnect_count, 1);
    assert_eq!(connector.connect_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn transport_error_is_reported_but_not_fatal() {
    let (connector, mut server) = ChannelConnector::new();
    let client = StreamClient::new(test_config(), connector.clone());
    let mut events = client.events();

    client.connect().await.unwrap();
    let conn = server.accept().await;
    conn.fail("tls alert");

    let error = wait_for(&mut events, |e| matches!(e, StreamEvent::Error { .. })).await;
    assert_eq!(
        error,
        StreamEvent::Error {
            message: "tls alert".to_string()
        }
    );
    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(client.metrics().error_count, 1);
}

#[tokio::test(start_paused = true)]
async fn missed_pong_forces_immediate_reconnect() {
    let (connector, mut server) = ChannelConnector::new();
    let client = StreamClient::new(test_config(), connector.clone());
    let mut events = client.events();

    let start = Instant::now();
    client.connect().await.unwrap();
    let mut conn = server.accept().await;

    let ping = conn.recv_json().await;
    assert_eq!(ping["type"], "ping");
    assert!(ping["timestamp"].is_i64());
    assert!(start.elapsed() >= Duration::from_secs(30));
    assert!(start.elapsed() < Duration::from_secs(31));

    // No pong
    let (code, _) = conn.expect_close().await;
    assert_eq!(code, close_codes::HEARTBEAT_TIMEOUT);

    let _replacement = server.accept().await;
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(40));
    assert!(elapsed < Duration::from_secs(41));

    let seen = drain_events(&mut events);
    assert!(seen.contains(&StreamEvent::Disconnected {
        code: close_codes::HEARTBEAT_TIMEOUT,
        reason: "heartbeat timeout".to_string(),
    }));
    assert!(
        !seen
            .iter()
            .any(|e| matches!(e, StreamEvent::Reconnecting { .. }))
    );
    assert_eq!(client.metrics().reconnect_count, 1);
}

#[tokio::test(start_paused = true)]
async fn answered_ping_keeps_connection() {
    let (connector, mut server) = ChannelConnector::new();
    let client = StreamClient::new(test_config(), connector.clone());

    client.connect().await.unwrap();
    let mut conn = server.accept().await;

    for _ in 0..3 {
        let ping = conn.recv_json().await;
        assert_eq!(ping["type"], "ping");
        conn.send_json(&json!({"type": "pong", "timestamp": ping["timestamp"]}));
    }

    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(connector.connect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn disconnect_closes_cleanly_without_reconnect() {
    let (connector, mut server) = ChannelConnector::new();
    let client = StreamClient::new(test_config(), connector.clone());
    let mut events = client.events();

    client.connect().await.unwrap();
    let mut conn = server.accept().await;

    client.disconnect().unwrap();

    let (code, _) = conn.expect_close().await;
    assert_eq!(code, close_codes::NORMAL);
    wait_for(&mut events, |e| {
        matches!(e, StreamEvent::Disconnected { code, .. } if *code == close_codes::NORMAL)
    })
    .await;

    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(connector.connect_count(), 1);
    assert!(
        !drain_events(&mut events)
            .iter()
            .any(|e| matches!(e, StreamEvent::Reconnecting { .. }))
    );
}

#[tokio::test(start_paused = true)]
async fn gives_up_after_max_attempts() {
    let (connector, mut server) = ChannelConnector::new();
    let mut config = test_config();
    config.reconnect.max_attempts = 2;
    let client = StreamClient::new(config, connector.clone());
    let mut events = client.events();

    connector.set_refusing(true);
    let result = client.connect().await;
    assert!(matches!(result, Err(ClientError::ConnectFailed(_))));

    let exhausted = wait_for(&mut events, |e| {
        matches!(e, StreamEvent::MaxReconnectAttemptsReached { .. })
    })
    .await;
    assert_eq!(
        exhausted,
        StreamEvent::MaxReconnectAttemptsReached { attempts: 2 }
    );
    assert_eq!(connector.connect_count(), 3);
    assert_eq!(client.metrics().reconnect_count, 2);
    assert_eq!(client.state(), ConnectionState::Disconnected);

    // Stays down until the owner connects again
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(connector.connect_count(), 3);

    connector.set_refusing(false);
    client.connect().await.unwrap();
    let _conn = server.accept().await;
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn reconnect_delays_grow() {
    let (connector, _server) = ChannelConnector::new();
    let mut config = test_config();
    config.reconnect.max_attempts = 4;
    let client = StreamClient::new(config, connector.clone());
    let mut events = client.events();

    connector.set_refusing(true);
    let _ = client.connect().await;

    let mut delays = Vec::new();
    for _ in 0..4 {
        let event = wait_for(&mut events, |e| matches!(e, StreamEvent::Reconnecting { .. })).await;
        if let StreamEvent::Reconnecting { delay, .. } = event {
            delays.push(delay);
        }
    }

    for (attempt, delay) in delays.iter().enumerate() {
        let base = Duration::from_secs(1 << attempt);
        assert!(*delay >= base, "attempt {attempt}: {delay:?}");
        assert!(*delay <= base.mul_f64(1.2), "attempt {attempt}: {delay:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn offline_closes_and_suppresses_reconnect() {
    let (connector, mut server) = ChannelConnector::new();
    let client = StreamClient::new(test_config(), connector.clone());
    let mut events = client.events();

    client.connect().await.unwrap();
    let mut conn = server.accept().await;

    client.set_online(false).unwrap();

    wait_for(&mut events, |e| matches!(e, StreamEvent::Offline)).await;
    let (code, _) = conn.expect_close().await;
    assert_eq!(code, close_codes::GOING_OFFLINE);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(connector.connect_count(), 1);
    assert_eq!(client.state(), ConnectionState::Disconnected);

    client.set_online(true).unwrap();
    let _conn = server.accept().await;
    wait_for(&mut events, |e| matches!(e, StreamEvent::Connected { .. })).await;
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn destroy_releases_everything() {
    let (connector, mut server) = ChannelConnector::new();
    let client = StreamClient::new(test_config(), connector.clone());

    client.subscribe_to_keys(["AAPL"]).unwrap();
    client.on(EventTopic::Connected, |_| {});
    client.connect().await.unwrap();
    let mut conn = server.accept().await;
    let _subscribe = conn.recv_json().await;

    client.destroy().await.unwrap();

    let (code, _) = conn.expect_close().await;
    assert_eq!(code, close_codes::GOING_AWAY);
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(client.metrics().messages_sent, 0);

    assert_eq!(client.connect().await, Err(ClientError::Destroyed));
    assert_eq!(client.subscriptions().await, Err(ClientError::Destroyed));
    assert_eq!(client.delta("AAPL").await, Err(ClientError::Destroyed));
    assert_eq!(
        client.send(json!({"type": "order"})).await,
        Err(ClientError::Destroyed)
    );
    assert_eq!(client.disconnect(), Err(ClientError::Destroyed));

    // No timers survive
    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(connector.connect_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn send_reports_queued_then_sent() {
    let (connector, mut server) = ChannelConnector::new();
    let client = StreamClient::new(test_config(), connector.clone());

    assert_eq!(
        client.send(json!({"n": 1})).await,
        Ok(SendOutcome::Queued)
    );

    client.connect().await.unwrap();
    let mut conn = server.accept().await;
    assert_eq!(conn.recv_json().await, json!({"n": 1}));

    assert_eq!(client.send(json!({"n": 2})).await, Ok(SendOutcome::Sent));
    assert_eq!(conn.recv_json().await, json!({"n": 2}));
}

#[tokio::test(start_paused = true)]
async fn panicking_handler_does_not_stop_client() {
    let (connector, mut server) = ChannelConnector::new();
    let client = StreamClient::new(test_config(), connector.clone());
    let mut events = client.events();

    client.on(EventTopic::Connected, |_| panic!("consumer bug"));

    assert_eq!(client.connect().await, Ok(()));
    let mut conn = server.accept().await;
    wait_for(&mut events, |e| matches!(e, StreamEvent::Connected { .. })).await;

    client.subscribe_to_keys(["AAPL"]).unwrap();
    assert_eq!(
        conn.recv_json().await,
        json!({"type": "subscribe", "keys": ["AAPL"]})
    );
    assert_eq!(client.subscriptions().await.unwrap().len(), 1);
    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(client.metrics().error_count, 1);
}
