//! Image generation jobs: submission with retry, one poller per job id, and
//! the progress cards shown inline in the chat.

use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use crate::api::{Backend, ImageJob, ImageJobRequest, JobStatus};
use crate::error::ClientResult;
use crate::session::SessionEvent;
use crate::tasks::{TaskKey, TaskRegistry};

pub const SUBMIT_ATTEMPTS: u32 = 4;
pub const SUBMIT_BACKOFF_STEP: Duration = Duration::from_millis(600);
pub const POLL_INTERVAL: Duration = Duration::from_millis(1200);

pub const PHASE_LABELS: &[&str] = &[
    "Sketching the idea",
    "Blocking in shapes",
    "Laying down colour",
    "Adding details",
    "Final touches",
];

const FALLBACK_ERROR: &str = "The drawing did not work out this time";

/// Which label fits `progress` (0..=100) out of `len` phases.
pub fn phase_index(progress: f32, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    let ratio = progress.clamp(0.0, 100.0) / 100.0;
    ((ratio * len as f32).floor() as usize).min(len - 1)
}

pub fn phase_text(job: &ImageJob, labels: &[&str]) -> String {
    match job.message.as_deref().map(str::trim) {
        Some(message) if !message.is_empty() => message.to_string(),
        _ => labels
            .get(phase_index(job.progress, labels.len()))
            .map(|l| l.to_string())
            .unwrap_or_default(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CardState {
    Submitting,
    Running { progress: f32, phase: String },
    Done { url: String, message: Option<String> },
    Failed { error: String },
}

impl CardState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CardState::Done { .. } | CardState::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobCard {
    pub id: u64,
    pub prompt: String,
    pub chat_id: Option<String>,
    pub job_id: Option<String>,
    pub state: CardState,
}

#[derive(Debug, Default)]
pub struct JobCards {
    cards: BTreeMap<u64, JobCard>,
    next_id: u64,
}

impl JobCards {
    pub fn create(&mut self, prompt: &str, chat_id: Option<String>) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        self.cards.insert(
            id,
            JobCard {
                id,
                prompt: prompt.to_string(),
                chat_id,
                job_id: None,
                state: CardState::Submitting,
            },
        );
        id
    }

    pub fn get(&self, id: u64) -> Option<&JobCard> {
        self.cards.get(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &JobCard> {
        self.cards.values()
    }

    pub fn submitted(&mut self, id: u64, job_id: &str) -> bool {
        let Some(card) = self.cards.get_mut(&id) else {
            return false;
        };
        card.job_id = Some(job_id.to_string());
        card.state = CardState::Running {
            progress: 0.0,
            phase: PHASE_LABELS[0].to_string(),
        };
        true
    }

    pub fn fail(&mut self, id: u64, error: impl Into<String>) {
        if let Some(card) = self.cards.get_mut(&id) {
            card.state = CardState::Failed { error: error.into() };
        }
    }

    /// Fold a poll result into the card. Returns true once the job is over.
    pub fn apply(&mut self, id: u64, job: &ImageJob) -> bool {
        let Some(card) = self.cards.get_mut(&id) else {
            return true;
        };
        if card.state.is_terminal() {
            return true;
        }
        card.state = match job.status {
            JobStatus::Pending | JobStatus::Running => CardState::Running {
                progress: job.progress.clamp(0.0, 100.0),
                phase: phase_text(job, PHASE_LABELS),
            },
            JobStatus::Done => match job.result.url.clone() {
                Some(url) => CardState::Done {
                    url,
                    message: job.result.dasha_message.clone(),
                },
                None => CardState::Failed {
                    error: FALLBACK_ERROR.to_string(),
                },
            },
            JobStatus::Error => CardState::Failed {
                error: job
                    .result
                    .dasha_message
                    .clone()
                    .or_else(|| job.result.error.clone())
                    .or_else(|| job.message.clone())
                    .unwrap_or_else(|| FALLBACK_ERROR.to_string()),
            },
        };
        card.state.is_terminal()
    }
}

/// Submit with linear backoff: wait `600ms × attempt` after each failure,
/// give up after `SUBMIT_ATTEMPTS`.
pub async fn submit_with_retry(backend: &dyn Backend, request: &ImageJobRequest) -> ClientResult<String> {
    let mut attempt = 1;
    loop {
        match backend.submit_image_job(request).await {
            Ok(job_id) => return Ok(job_id),
            Err(err) if attempt >= SUBMIT_ATTEMPTS => return Err(err),
            Err(err) => {
                debug!(attempt, %err, "image job submit failed, retrying");
                tokio::time::sleep(SUBMIT_BACKOFF_STEP * attempt).await;
                attempt += 1;
            }
        }
    }
}

pub fn spawn_submission(
    registry: &mut TaskRegistry<TaskKey>,
    backend: Arc<dyn Backend>,
    events: UnboundedSender<SessionEvent>,
    card: u64,
    request: ImageJobRequest,
) {
    registry.spawn(TaskKey::ImageSubmit(card), async move {
        let event = match submit_with_retry(backend.as_ref(), &request).await {
            Ok(job_id) => {
                info!(card, %job_id, "image job accepted");
                SessionEvent::JobSubmitted { card, job_id }
            }
            Err(error) => SessionEvent::JobSubmitFailed { card, error },
        };
        let _ = events.send(event);
    });
}

/// One poller per job id; a second call for the same id replaces the first.
/// Poll errors are skipped, only a terminal status ends the loop.
pub fn spawn_job_poller(
    registry: &mut TaskRegistry<TaskKey>,
    backend: Arc<dyn Backend>,
    events: UnboundedSender<SessionEvent>,
    card: u64,
    job_id: String,
) {
    let key = TaskKey::ImageJob(job_id.clone());
    registry.spawn_periodic(key, POLL_INTERVAL, move || {
        let backend = backend.clone();
        let events = events.clone();
        let job_id = job_id.clone();
        async move {
            let polled = backend.image_job(&job_id).await;
            match polled {
                Ok(job) => {
                    let terminal = job.status.is_terminal();
                    let sent = events.send(SessionEvent::JobUpdate { card, job_id, job });
                    if terminal || sent.is_err() {
                        return ControlFlow::Break(());
                    }
                }
                Err(err) => debug!(%job_id, %err, "image job poll failed"),
            }
            if events.is_closed() {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        }
    });
}
