//! The two periodic pollers (proactive messages, mood behavior) and the
//! paced queue that drips proactive lines into the chat transcript.

use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::UnboundedSender;

use crate::api::Backend;
use crate::session::SessionEvent;
use crate::tasks::{TaskKey, TaskRegistry};

const TYPING_BASE_MS: u64 = 800;
const TYPING_PER_CHAR_MS: u64 = 15;

/// Delay before the `index`-th line of a batch shows up.
pub fn typing_delay(index: usize, message: &str) -> Duration {
    let chars = message.chars().count() as u64;
    Duration::from_millis(index as u64 * (TYPING_BASE_MS + chars * TYPING_PER_CHAR_MS))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacedLine {
    pub due: Instant,
    pub text: String,
}

/// Lines waiting for their typing delay to elapse, in due order.
#[derive(Debug, Default)]
pub struct PacedQueue {
    lines: VecDeque<PacedLine>,
}

impl PacedQueue {
    pub fn schedule(&mut self, batch: &[String], now: Instant) {
        for (i, text) in batch.iter().enumerate() {
            let due = now + typing_delay(i, text);
            let pos = self.lines.iter().position(|l| l.due > due).unwrap_or(self.lines.len());
            self.lines.insert(
                pos,
                PacedLine {
                    due,
                    text: text.clone(),
                },
            );
        }
    }

    pub fn drain_due(&mut self, now: Instant) -> Vec<String> {
        let mut out = Vec::new();
        while self.lines.front().is_some_and(|l| l.due <= now) {
            if let Some(line) = self.lines.pop_front() {
                out.push(line.text);
            }
        }
        out
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.lines.front().map(|l| l.due)
    }

    pub fn last_due(&self) -> Option<Instant> {
        self.lines.back().map(|l| l.due)
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

fn keep_going(events: &UnboundedSender<SessionEvent>) -> ControlFlow<()> {
    if events.is_closed() {
        ControlFlow::Break(())
    } else {
        ControlFlow::Continue(())
    }
}

/// `GET /api/proactive` every `period`; non-empty answers go to the session.
pub fn spawn_proactive_poller(
    registry: &mut TaskRegistry<TaskKey>,
    backend: Arc<dyn Backend>,
    events: UnboundedSender<SessionEvent>,
    period: Duration,
) {
    registry.spawn_periodic(TaskKey::ProactivePoller, period, move || {
        let backend = backend.clone();
        let events = events.clone();
        async move {
            let event = match backend.proactive().await {
                Ok(response) if response.messages.is_empty() => None,
                Ok(response) => Some(SessionEvent::Proactive(response)),
                Err(error) => Some(SessionEvent::Failure {
                    context: "proactive poll",
                    error,
                }),
            };
            if let Some(event) = event {
                let _ = events.send(event);
            }
            keep_going(&events)
        }
    });
}

/// `GET /api/behavior` every `period`. A failed tick is reported and skipped.
pub fn spawn_behavior_poller(
    registry: &mut TaskRegistry<TaskKey>,
    backend: Arc<dyn Backend>,
    events: UnboundedSender<SessionEvent>,
    period: Duration,
) {
    registry.spawn_periodic(TaskKey::BehaviorPoller, period, move || {
        let backend = backend.clone();
        let events = events.clone();
        async move {
            let event = match backend.behavior().await {
                Ok(response) => SessionEvent::Behavior(response),
                Err(error) => SessionEvent::Failure {
                    context: "behavior poll",
                    error,
                },
            };
            let _ = events.send(event);
            keep_going(&events)
        }
    });
}
