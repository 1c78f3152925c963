//! End-to-end tests of the stream command protocol over a captured sink
//!
//! Drives the public protocol API with real wire-format JSON on both sides,
//! standing in for the data channels.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;

use mirage_client::channels::{
    CommandMessage, CommandOutcome, CommandProtocol, CommandSink, StreamEvent,
};
use mirage_client::{Error, Result, StreamState};

/// Sink that records every payload as text
struct CaptureSink {
    sent: Mutex<Vec<String>>,
}

impl CaptureSink {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
        })
    }

    async fn last_sent(&self) -> String {
        self.sent.lock().await.last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl CommandSink for CaptureSink {
    async fn send(&self, payload: Bytes) -> Result<()> {
        let text = String::from_utf8(payload.to_vec())
            .map_err(|e| Error::Serialization(e.to_string()))?;
        self.sent.lock().await.push(text);
        Ok(())
    }
}

async fn streamer_says(protocol: &CommandProtocol, json: &str) {
    let event = StreamEvent::from_json(json).unwrap();
    protocol.handle_event(&event).await;
}

#[tokio::test]
async fn test_full_stream_lifecycle() {
    let protocol = CommandProtocol::new();
    let sink = CaptureSink::new();
    protocol.attach_sink(sink.clone()).await;

    // Start
    let ack = protocol
        .send_command(CommandMessage::InteractiveStreamStart {
            prompt: "A cat sitting on a windowsill".to_string(),
            portrait: true,
        })
        .await
        .unwrap();
    assert!(sink.last_sent().await.contains("interactive_stream_start"));
    assert_eq!(protocol.stream_state().await, StreamState::Starting);

    streamer_says(
        &protocol,
        r#"{"type":"stream_started","stream_id":"stream-42"}"#,
    )
    .await;
    assert_eq!(
        ack.await.unwrap().unwrap(),
        CommandOutcome::Started {
            stream_id: "stream-42".to_string()
        }
    );
    assert_eq!(protocol.stream_state().await, StreamState::Active);

    // Interact
    let ack = protocol
        .send_command(CommandMessage::Update {
            prompt: "Pet the cat".to_string(),
        })
        .await
        .unwrap();
    assert!(sink.last_sent().await.contains(r#""type":"update""#));

    streamer_says(
        &protocol,
        r#"{"type":"update_acknowledged","prompt":"Pet the cat"}"#,
    )
    .await;
    assert_eq!(
        ack.await.unwrap().unwrap(),
        CommandOutcome::Acknowledged {
            prompt: "Pet the cat".to_string()
        }
    );

    // End
    let ack = protocol
        .send_command(CommandMessage::InteractiveStreamEnd)
        .await
        .unwrap();
    assert!(sink.last_sent().await.contains("interactive_stream_end"));
    assert_eq!(protocol.stream_state().await, StreamState::Ending);

    streamer_says(&protocol, r#"{"type":"stream_ended"}"#).await;
    assert_eq!(ack.await.unwrap().unwrap(), CommandOutcome::Ended);
    assert_eq!(protocol.stream_state().await, StreamState::Ended);
}

#[tokio::test]
async fn test_stream_error_then_restart() {
    let protocol = CommandProtocol::new();
    let sink = CaptureSink::new();
    protocol.attach_sink(sink.clone()).await;

    let ack = protocol
        .send_command(CommandMessage::InteractiveStreamStart {
            prompt: String::new(),
            portrait: false,
        })
        .await
        .unwrap();

    streamer_says(
        &protocol,
        r#"{"type":"interactive_stream_error","reason":"gpu_oom","message":"Out of memory"}"#,
    )
    .await;

    let err = ack.await.unwrap().unwrap_err();
    assert!(err.is_stream());
    assert_eq!(protocol.stream_state().await, StreamState::Errored);

    // A new stream is the recovery path after an error
    let ack = protocol
        .send_command(CommandMessage::InteractiveStreamStart {
            prompt: "Try again".to_string(),
            portrait: false,
        })
        .await
        .unwrap();
    streamer_says(
        &protocol,
        r#"{"type":"stream_started","stream_id":"stream-43"}"#,
    )
    .await;
    assert!(matches!(
        ack.await.unwrap().unwrap(),
        CommandOutcome::Started { .. }
    ));
}

#[tokio::test]
async fn test_commands_gated_by_stream_state() {
    let protocol = CommandProtocol::new();
    let sink = CaptureSink::new();
    protocol.attach_sink(sink.clone()).await;

    // No interaction or end before the stream is active
    assert!(protocol
        .send_command(CommandMessage::Update {
            prompt: "too early".to_string(),
        })
        .await
        .is_err());
    assert!(protocol
        .send_command(CommandMessage::InteractiveStreamEnd)
        .await
        .is_err());
    assert!(sink.sent.lock().await.is_empty());

    // While starting, no second start and no interaction
    let _ack = protocol
        .send_command(CommandMessage::InteractiveStreamStart {
            prompt: String::new(),
            portrait: true,
        })
        .await
        .unwrap();
    assert!(protocol
        .send_command(CommandMessage::InteractiveStreamStart {
            prompt: String::new(),
            portrait: true,
        })
        .await
        .is_err());
    assert_eq!(sink.sent.lock().await.len(), 1);
}

#[tokio::test]
async fn test_reset_returns_to_idle_and_fails_pending() {
    let protocol = CommandProtocol::new();
    let sink = CaptureSink::new();
    protocol.attach_sink(sink.clone()).await;

    let ack = protocol
        .send_command(CommandMessage::InteractiveStreamStart {
            prompt: String::new(),
            portrait: true,
        })
        .await
        .unwrap();

    protocol.reset("Connection lost").await;

    let err = ack.await.unwrap().unwrap_err();
    assert!(err.is_stream());
    assert_eq!(protocol.stream_state().await, StreamState::Idle);

    // Sink is detached until the next connection attaches one
    let err = protocol
        .send_command(CommandMessage::InteractiveStreamStart {
            prompt: String::new(),
            portrait: true,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DataChannel(_)));
}
