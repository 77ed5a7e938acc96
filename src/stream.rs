//! Server-push notification stream: SSE framing plus the reconnecting
//! consumer loop.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use crate::api::Backend;
use crate::error::{ClientError, ClientResult};
use crate::notify::NotificationEvent;
use crate::session::SessionEvent;

pub const INITIAL_BACKOFF: Duration = Duration::from_millis(1000);
pub const MAX_BACKOFF: Duration = Duration::from_millis(15_000);

/// Reconnect delay. Doubles per failure up to `MAX_BACKOFF`; any decoded
/// message puts it back to `INITIAL_BACKOFF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    current: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            current: INITIAL_BACKOFF,
        }
    }
}

impl Backoff {
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Record a failure; returns how long to wait before reconnecting.
    pub fn on_failure(&mut self) -> Duration {
        let wait = self.current;
        self.current = (self.current * 2).min(MAX_BACKOFF);
        wait
    }

    pub fn reset(&mut self) {
        self.current = INITIAL_BACKOFF;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamState {
    Connecting,
    Connected,
    Disconnected { wait: Duration, reason: String },
}

impl StreamState {
    pub fn label(&self) -> &'static str {
        match self {
            StreamState::Connecting => "connecting",
            StreamState::Connected => "live",
            StreamState::Disconnected { .. } => "offline",
        }
    }
}

/// Incremental `text/event-stream` decoder. Feed it raw chunks; it hands back
/// the `data` payload of every completed frame.
#[derive(Debug, Default)]
pub struct SseParser {
    line_buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseParser {
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut frames = Vec::new();
        self.line_buffer.extend_from_slice(chunk);
        while let Some(newline_index) = self.line_buffer.iter().position(|byte| *byte == b'\n') {
            let mut line = self.line_buffer.drain(..=newline_index).collect::<Vec<_>>();
            line.pop();
            if matches!(line.last(), Some(b'\r')) {
                line.pop();
            }
            if let Some(frame) = self.line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    fn line(&mut self, line: &[u8]) -> Option<String> {
        if line.is_empty() {
            if self.data.is_empty() {
                return None;
            }
            return Some(std::mem::take(&mut self.data).join("\n"));
        }
        if line.starts_with(b":") {
            return None;
        }
        let text = String::from_utf8_lossy(line);
        let (field, value) = match text.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (text.as_ref(), ""),
        };
        if field == "data" {
            self.data.push(value.to_string());
        }
        None
    }
}

/// Runs until the session hangs up. Every failure is reported as a
/// `Disconnected` state carrying the wait before the next attempt.
pub async fn run_notification_stream(backend: Arc<dyn Backend>, events: UnboundedSender<SessionEvent>) {
    let mut backoff = Backoff::default();
    loop {
        if events.send(SessionEvent::Stream(StreamState::Connecting)).is_err() {
            return;
        }
        let reason = match consume(backend.as_ref(), &events, &mut backoff).await {
            Ok(()) => ClientError::StreamClosed("server ended the stream".into()),
            Err(err) => err,
        };
        if events.is_closed() {
            return;
        }
        let wait = backoff.on_failure();
        let state = StreamState::Disconnected {
            wait,
            reason: reason.to_string(),
        };
        if events.send(SessionEvent::Stream(state)).is_err() {
            return;
        }
        tokio::time::sleep(wait).await;
    }
}

async fn consume(
    backend: &dyn Backend,
    events: &UnboundedSender<SessionEvent>,
    backoff: &mut Backoff,
) -> ClientResult<()> {
    let mut stream = backend.notification_stream().await?;
    info!("notification stream connected");
    events
        .send(SessionEvent::Stream(StreamState::Connected))
        .map_err(|_| ClientError::StreamClosed("session gone".into()))?;

    let mut parser = SseParser::default();
    while let Some(chunk) = stream.next().await {
        for frame in parser.feed(&chunk?) {
            match serde_json::from_str::<NotificationEvent>(&frame) {
                Ok(event) => {
                    backoff.reset();
                    events
                        .send(SessionEvent::Notification(Box::new(event)))
                        .map_err(|_| ClientError::StreamClosed("session gone".into()))?;
                }
                Err(err) => debug!(%err, "skipping undecodable notification frame"),
            }
        }
    }
    Ok(())
}
