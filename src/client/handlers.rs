//! Application callback registration

use crate::types::{ConnectionStatus, VideoFrame};
use crate::Error;

/// Callbacks invoked by the client's event loop
///
/// All slots are optional; unset ones are skipped. Callbacks run on the
/// client's event loop and must not block, so heavy work should be handed off
/// to the application's own tasks.
#[derive(Default)]
pub struct EventHandlers {
    pub(crate) on_connected: Option<Box<dyn Fn() + Send + Sync>>,
    pub(crate) on_disconnected: Option<Box<dyn Fn() + Send + Sync>>,
    pub(crate) on_video_frame: Option<Box<dyn Fn(VideoFrame) + Send + Sync>>,
    pub(crate) on_stream_started: Option<Box<dyn Fn(&str) + Send + Sync>>,
    pub(crate) on_stream_ended: Option<Box<dyn Fn() + Send + Sync>>,
    pub(crate) on_interact_acknowledged: Option<Box<dyn Fn(&str) + Send + Sync>>,
    pub(crate) on_stream_error: Option<Box<dyn Fn(&str, &str) + Send + Sync>>,
    pub(crate) on_error: Option<Box<dyn Fn(&Error, bool) + Send + Sync>>,
    pub(crate) on_status_change: Option<Box<dyn Fn(ConnectionStatus, Option<&str>) + Send + Sync>>,
}

impl EventHandlers {
    /// Create an empty handler set
    pub fn new() -> Self {
        Self::default()
    }

    /// Called when the connection is established (including after reconnect)
    pub fn on_connected(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_connected = Some(Box::new(f));
        self
    }

    /// Called when the client disconnects cleanly
    pub fn on_disconnected(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_disconnected = Some(Box::new(f));
        self
    }

    /// Called for every video frame received from the stream
    pub fn on_video_frame(mut self, f: impl Fn(VideoFrame) + Send + Sync + 'static) -> Self {
        self.on_video_frame = Some(Box::new(f));
        self
    }

    /// Called when the streamer confirms the stream started; receives the stream id
    pub fn on_stream_started(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_stream_started = Some(Box::new(f));
        self
    }

    /// Called when the stream ends
    pub fn on_stream_ended(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_stream_ended = Some(Box::new(f));
        self
    }

    /// Called when an interaction is acknowledged; receives the echoed prompt
    pub fn on_interact_acknowledged(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_interact_acknowledged = Some(Box::new(f));
        self
    }

    /// Called when the streamer reports a stream error; receives reason and message
    pub fn on_stream_error(mut self, f: impl Fn(&str, &str) + Send + Sync + 'static) -> Self {
        self.on_stream_error = Some(Box::new(f));
        self
    }

    /// Called on connection errors; the flag marks fatal (no further retries)
    pub fn on_error(mut self, f: impl Fn(&Error, bool) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Called on every connection status transition, with an optional detail
    pub fn on_status_change(
        mut self,
        f: impl Fn(ConnectionStatus, Option<&str>) + Send + Sync + 'static,
    ) -> Self {
        self.on_status_change = Some(Box::new(f));
        self
    }

    pub(crate) fn emit_connected(&self) {
        if let Some(f) = &self.on_connected {
            f();
        }
    }

    pub(crate) fn emit_disconnected(&self) {
        if let Some(f) = &self.on_disconnected {
            f();
        }
    }

    pub(crate) fn emit_video_frame(&self, frame: VideoFrame) {
        if let Some(f) = &self.on_video_frame {
            f(frame);
        }
    }

    pub(crate) fn emit_stream_started(&self, stream_id: &str) {
        if let Some(f) = &self.on_stream_started {
            f(stream_id);
        }
    }

    pub(crate) fn emit_stream_ended(&self) {
        if let Some(f) = &self.on_stream_ended {
            f();
        }
    }

    pub(crate) fn emit_interact_acknowledged(&self, prompt: &str) {
        if let Some(f) = &self.on_interact_acknowledged {
            f(prompt);
        }
    }

    pub(crate) fn emit_stream_error(&self, reason: &str, message: &str) {
        if let Some(f) = &self.on_stream_error {
            f(reason, message);
        }
    }

    pub(crate) fn emit_error(&self, error: &Error, fatal: bool) {
        if let Some(f) = &self.on_error {
            f(error, fatal);
        }
    }

    pub(crate) fn emit_status_change(&self, status: ConnectionStatus, detail: Option<&str>) {
        if let Some(f) = &self.on_status_change {
            f(status, detail);
        }
    }
}
