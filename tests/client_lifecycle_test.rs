//! Client lifecycle tests that run without platform access

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mirage_client::{
    Client, ClientConfig, ConnectionStatus, Error, EventHandlers, RetryPolicy, StreamState,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn unreachable_dev_config() -> ClientConfig {
    let mut config = ClientConfig::new("");
    // Reserved port; connection is refused immediately
    config.dev.signaling_url = Some("ws://127.0.0.1:1".to_string());
    config.dev.session_id = Some("dev-session".to_string());
    config.retry = RetryPolicy {
        max_retries: 0,
        ..RetryPolicy::default()
    };
    config
}

#[tokio::test]
async fn test_fresh_client_is_disconnected_and_idle() {
    let client = Client::with_api_key("mk_test").unwrap();
    assert_eq!(client.status().await, ConnectionStatus::Disconnected);
    assert_eq!(client.stream_state().await, StreamState::Idle);
    assert!(client.session().await.is_none());
}

#[tokio::test]
async fn test_stream_commands_fail_while_disconnected() {
    let client = Client::with_api_key("mk_test").unwrap();

    for result in [
        client.start_stream("A cat", true).await.map(|_| ()),
        client.interact("Pet the cat").await.map(|_| ()),
        client.end_stream().await,
    ] {
        let err = result.unwrap_err();
        assert!(matches!(err, Error::Connection(_)), "got: {}", err);
    }
}

#[tokio::test]
async fn test_disconnect_without_connection_is_noop() {
    let client = Client::with_api_key("mk_test").unwrap();
    client.disconnect().await.unwrap();
    client.disconnect().await.unwrap();
    assert_eq!(client.status().await, ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn test_failed_connect_reports_status_transitions() {
    init_tracing();
    let client = Client::new(unreachable_dev_config()).unwrap();

    let transitions = Arc::new(std::sync::Mutex::new(Vec::new()));
    let seen = transitions.clone();
    let handlers = EventHandlers::new().on_status_change(move |status, _detail| {
        seen.lock().unwrap().push(status);
    });

    let err = client.connect(handlers).await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(client.status().await, ConnectionStatus::Failed);

    let transitions = transitions.lock().unwrap().clone();
    assert_eq!(
        transitions,
        vec![
            ConnectionStatus::Authenticating,
            ConnectionStatus::Connecting,
            ConnectionStatus::Failed,
        ]
    );
}

#[tokio::test]
async fn test_retry_budget_consumed_before_failing() {
    let mut config = unreachable_dev_config();
    init_tracing();
    config.retry = RetryPolicy {
        max_retries: 2,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(20),
        backoff_multiplier: 2.0,
    };
    let client = Client::new(config).unwrap();

    let retries = Arc::new(AtomicUsize::new(0));
    let counter = retries.clone();
    let handlers = EventHandlers::new().on_error(move |_error, fatal| {
        if !fatal {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    let err = client.connect(handlers).await.unwrap_err();
    assert!(err.is_retryable());
    // max_retries = 2 means two non-fatal retry notifications before failing
    assert_eq!(retries.load(Ordering::SeqCst), 2);
    assert_eq!(client.status().await, ConnectionStatus::Failed);
}

#[tokio::test]
async fn test_concurrent_connect_rejected_and_disconnect_cancels() {
    init_tracing();

    // A server that accepts sockets but never answers keeps the handshake
    // in flight for as long as the test needs.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let mut sockets = Vec::new();
        loop {
            if let Ok((socket, _)) = listener.accept().await {
                sockets.push(socket);
            }
        }
    });

    let mut config = ClientConfig::new("");
    config.dev.signaling_url = Some(format!("ws://{}", addr));
    config.dev.session_id = Some("dev-session".to_string());
    config.retry = RetryPolicy {
        max_retries: 0,
        ..RetryPolicy::default()
    };

    let client = Arc::new(Client::new(config).unwrap());
    let connecting = client.clone();
    let first = tokio::spawn(async move { connecting.connect(EventHandlers::new()).await });

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(client.status().await.is_busy());
    // The session assignment is only held while a connection is in progress
    assert!(client.session().await.is_some());

    // A second connect while the first is in flight is rejected
    let err = client.connect(EventHandlers::new()).await.unwrap_err();
    assert!(matches!(err, Error::Connection(_)), "got: {}", err);
    assert!(err.to_string().contains("already"));

    // Disconnect cancels the in-flight handshake
    client.disconnect().await.unwrap();
    assert!(first.await.unwrap().is_err());
    assert_eq!(client.status().await, ConnectionStatus::Disconnected);
    assert!(client.session().await.is_none());

    server.abort();
}

#[tokio::test]
async fn test_reconnect_allowed_after_failure() {
    let client = Client::new(unreachable_dev_config()).unwrap();

    client.connect(EventHandlers::new()).await.unwrap_err();
    assert_eq!(client.status().await, ConnectionStatus::Failed);

    // A new connect attempt is legal from the failed state
    client.connect(EventHandlers::new()).await.unwrap_err();
    assert_eq!(client.status().await, ConnectionStatus::Failed);
}

#[test]
fn test_invalid_configs_rejected() {
    assert!(Client::new(ClientConfig::new("")).is_err());

    let mut config = ClientConfig::new("mk_test");
    config.dev.signaling_url = Some("ws://localhost:8787".to_string());
    // dev session id missing
    assert!(Client::new(config).is_err());

    let mut config = ClientConfig::new("mk_test");
    config.api_url = "not-a-url".to_string();
    assert!(Client::new(config).is_err());
}
