//! Scripted in-memory backend for tests. Each queue is consumed front to
//! back; an empty queue answers with a harmless default.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::api::*;
use crate::error::{ClientError, ClientResult};
use crate::icons::IconPositions;

type StreamScript = ClientResult<Vec<ClientResult<Vec<u8>>>>;

#[derive(Default)]
pub struct FakeState {
    pub status: ServerStatus,
    pub settings: RemoteSettings,
    pub saved_settings: Vec<RemoteSettings>,
    pub icon_positions: IconPositions,
    pub saved_positions: Vec<IconPositions>,
    pub hidden_icons: Vec<String>,
    pub saved_hidden: Vec<Vec<String>>,
    pub desktop_plugins: Vec<DesktopPlugin>,
    pub catalog: Vec<CatalogEntry>,
    pub plugin_commands: Vec<(String, PluginCommand)>,
    pub plugin_windows: HashMap<String, PluginWindowData>,
    pub chats: Vec<ChatSummary>,
    pub chat_records: HashMap<String, ChatRecord>,
    pub deleted_chats: Vec<String>,
    pub next_chat_id: u32,
    pub chat_replies: VecDeque<ClientResult<ChatReply>>,
    pub sent_chats: Vec<ChatRequest>,
    pub streams: VecDeque<StreamScript>,
    pub stream_connects: usize,
    pub proactive: VecDeque<ClientResult<ProactiveResponse>>,
    pub behavior: VecDeque<ClientResult<BehaviorResponse>>,
    pub submit_results: VecDeque<ClientResult<String>>,
    pub submit_calls: usize,
    pub jobs: HashMap<String, VecDeque<ClientResult<ImageJob>>>,
    pub job_polls: usize,
    pub music_queue: QueueSnapshot,
    pub saved_queues: Vec<QueueSnapshot>,
    pub resolved: HashMap<String, Track>,
    pub listens: Vec<Track>,
    pub system_info_calls: usize,
    /// Held before answering window content fetches.
    pub content_delay: Option<Duration>,
}

#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<FakeState>,
}

impl FakeBackend {
    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    async fn content_delay(&self) {
        let delay = self.state().content_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn status(&self) -> ClientResult<ServerStatus> {
        Ok(self.state().status.clone())
    }

    async fn settings(&self) -> ClientResult<RemoteSettings> {
        self.content_delay().await;
        Ok(self.state().settings.clone())
    }

    async fn save_settings(&self, settings: &RemoteSettings) -> ClientResult<()> {
        let mut state = self.state();
        state.settings = settings.clone();
        state.saved_settings.push(settings.clone());
        Ok(())
    }

    async fn icon_positions(&self) -> ClientResult<IconPositions> {
        Ok(self.state().icon_positions.clone())
    }

    async fn save_icon_positions(&self, positions: &IconPositions) -> ClientResult<()> {
        self.state().saved_positions.push(positions.clone());
        Ok(())
    }

    async fn hidden_icons(&self) -> ClientResult<Vec<String>> {
        Ok(self.state().hidden_icons.clone())
    }

    async fn save_hidden_icons(&self, hidden: &[String]) -> ClientResult<()> {
        self.state().saved_hidden.push(hidden.to_vec());
        Ok(())
    }

    async fn desktop_plugins(&self) -> ClientResult<Vec<DesktopPlugin>> {
        Ok(self.state().desktop_plugins.clone())
    }

    async fn plugin_catalog(&self) -> ClientResult<Vec<CatalogEntry>> {
        self.content_delay().await;
        Ok(self.state().catalog.clone())
    }

    async fn plugin_command(&self, plugin_id: &str, command: PluginCommand) -> ClientResult<()> {
        self.state().plugin_commands.push((plugin_id.to_string(), command));
        Ok(())
    }

    async fn plugin_window(&self, plugin_id: &str) -> ClientResult<PluginWindowData> {
        self.content_delay().await;
        self.state()
            .plugin_windows
            .get(plugin_id)
            .cloned()
            .ok_or_else(|| ClientError::rejected(format!("/api/plugins/{plugin_id}/window"), "Not found"))
    }

    async fn chats(&self) -> ClientResult<Vec<ChatSummary>> {
        Ok(self.state().chats.clone())
    }

    async fn chat(&self, chat_id: &str) -> ClientResult<ChatRecord> {
        self.state()
            .chat_records
            .get(chat_id)
            .cloned()
            .ok_or_else(|| ClientError::Status {
                endpoint: format!("/api/chats/{chat_id}"),
                status: 404,
            })
    }

    async fn new_chat(&self) -> ClientResult<String> {
        let mut state = self.state();
        state.next_chat_id += 1;
        Ok(format!("chat-{}", state.next_chat_id))
    }

    async fn delete_chat(&self, chat_id: &str) -> ClientResult<()> {
        self.state().deleted_chats.push(chat_id.to_string());
        Ok(())
    }

    async fn send_chat(&self, request: ChatRequest) -> ClientResult<ChatReply> {
        let mut state = self.state();
        state.sent_chats.push(request);
        state.chat_replies.pop_front().unwrap_or_else(|| Ok(ChatReply::default()))
    }

    async fn notification_stream(&self) -> ClientResult<ByteStream> {
        let script = {
            let mut state = self.state();
            state.stream_connects += 1;
            state.streams.pop_front()
        };
        match script {
            Some(Ok(chunks)) => Ok(stream::iter(chunks).boxed()),
            Some(Err(err)) => Err(err),
            None => Ok(stream::pending().boxed()),
        }
    }

    async fn proactive(&self) -> ClientResult<ProactiveResponse> {
        self.state()
            .proactive
            .pop_front()
            .unwrap_or_else(|| Ok(ProactiveResponse::default()))
    }

    async fn behavior(&self) -> ClientResult<BehaviorResponse> {
        self.state()
            .behavior
            .pop_front()
            .unwrap_or_else(|| Ok(BehaviorResponse::default()))
    }

    async fn submit_image_job(&self, _request: &ImageJobRequest) -> ClientResult<String> {
        let mut state = self.state();
        state.submit_calls += 1;
        let calls = state.submit_calls;
        state
            .submit_results
            .pop_front()
            .unwrap_or_else(|| Ok(format!("job-{calls}")))
    }

    async fn image_job(&self, job_id: &str) -> ClientResult<ImageJob> {
        let mut state = self.state();
        state.job_polls += 1;
        state
            .jobs
            .get_mut(job_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| {
                Ok(ImageJob {
                    status: JobStatus::Running,
                    ..ImageJob::default()
                })
            })
    }

    async fn music_queue(&self) -> ClientResult<QueueSnapshot> {
        self.content_delay().await;
        Ok(self.state().music_queue.clone())
    }

    async fn save_music_queue(&self, queue: &QueueSnapshot) -> ClientResult<()> {
        self.state().saved_queues.push(queue.clone());
        Ok(())
    }

    async fn resolve_track(&self, query: &str) -> ClientResult<Option<Track>> {
        Ok(self.state().resolved.get(query).cloned())
    }

    async fn listen(&self, track: &Track) -> ClientResult<()> {
        self.state().listens.push(track.clone());
        Ok(())
    }

    async fn system_info(&self) -> ClientResult<SystemInfo> {
        self.content_delay().await;
        self.state().system_info_calls += 1;
        Ok(SystemInfo {
            cpu_percent: Some(12.5),
            memory_percent: Some(40.0),
            disk_percent: Some(70.0),
        })
    }
}
