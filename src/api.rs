//! The backend contract: wire types plus the `Backend` trait the session talks
//! through. `HttpBackend` is the reqwest implementation.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::debug;

use crate::error::{ClientError, ClientResult};
use crate::icons::IconPositions;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const ERROR_BODY_LIMIT: usize = 240;

// ── Wire types ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmStatus {
    pub available: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerStatus {
    pub version: String,
    pub brain: bool,
    pub memory: bool,
    pub plugins: bool,
    pub llm: LlmStatus,
}

/// Server-side settings. Only the keys the desktop reads are typed; the rest
/// ride along untouched so a save never drops them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_pack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attention_enabled: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DesktopPlugin {
    pub id: String,
    pub icon: String,
    pub title: String,
    pub has_window: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogEntry {
    pub id: String,
    pub name: String,
    pub description: String,
    pub version: String,
    pub icon: String,
    pub installed: bool,
    pub update_available: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginCommand {
    Install,
    Uninstall,
    Update,
}

impl PluginCommand {
    pub fn verb(self) -> &'static str {
        match self {
            PluginCommand::Install => "install",
            PluginCommand::Uninstall => "uninstall",
            PluginCommand::Update => "update",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginWindowData {
    pub manifest: Value,
    pub data: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSummary {
    pub id: String,
    pub created: String,
    pub preview: String,
    pub message_count: usize,
    pub source: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatRecordMessage {
    pub role: String,
    pub content: String,
    pub timestamp: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatRecord {
    pub id: String,
    pub created: String,
    pub source: Option<String>,
    pub messages: Vec<ChatRecordMessage>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct NewChat {
    pub chat_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageAttachment {
    pub file_name: String,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

impl ImageAttachment {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let mime = image_mime(&file_name);
        Self {
            file_name,
            mime,
            bytes,
        }
    }
}

fn image_mime(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        _ => "image/jpeg",
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub content: String,
    pub chat_id: Option<String>,
    pub image: Option<ImageAttachment>,
}

#[derive(Serialize)]
struct ChatJsonBody<'a> {
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    chat_id: Option<&'a str>,
}

/// `draw_request` arrives either as a bare prompt or as `{prompt, style}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum DrawRequest {
    Prompt(String),
    Spec {
        prompt: String,
        #[serde(default)]
        style: Option<String>,
    },
}

impl DrawRequest {
    pub fn prompt(&self) -> &str {
        match self {
            DrawRequest::Prompt(p) => p,
            DrawRequest::Spec { prompt, .. } => prompt,
        }
    }

    pub fn style(&self) -> Option<&str> {
        match self {
            DrawRequest::Prompt(_) => None,
            DrawRequest::Spec { style, .. } => style.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ChatReply {
    pub response: Option<String>,
    pub messages: Vec<String>,
    pub chat_id: Option<String>,
    pub draw_request: Option<DrawRequest>,
}

impl ChatReply {
    /// Assistant lines in display order; `messages` wins over `response`.
    pub fn lines(&self) -> Vec<String> {
        if !self.messages.is_empty() {
            return self.messages.clone();
        }
        self.response.iter().filter(|r| !r.is_empty()).cloned().collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProactiveBatch {
    pub messages: Vec<String>,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProactiveResponse {
    pub messages: Vec<ProactiveBatch>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MoodSnapshot {
    pub mood: String,
    pub mood_emoji: String,
    pub energy: f32,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BehaviorHints {
    pub desktop_mischief: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct BehaviorResponse {
    pub behavior: BehaviorHints,
    pub state: MoodSnapshot,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImageJobRequest {
    pub prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ImageJobTicket {
    pub job_id: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Done,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ImageJobResult {
    pub url: Option<String>,
    pub dasha_message: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ImageJob {
    pub status: JobStatus,
    pub progress: f32,
    pub message: Option<String>,
    pub result: ImageJobResult,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
struct ImageJobEnvelope {
    job: ImageJob,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Track {
    pub title: String,
    pub source: String,
    pub play_url: String,
    pub open_url: String,
    pub cover: String,
    pub duration_sec: u32,
}

/// Queue as persisted by the server; `index` is -1 when nothing is selected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSnapshot {
    pub tracks: Vec<Track>,
    pub index: i64,
}

impl Default for QueueSnapshot {
    fn default() -> Self {
        Self {
            tracks: Vec::new(),
            index: -1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
struct ResolvedTrack {
    track: Option<Track>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemInfo {
    pub cpu_percent: Option<f32>,
    pub memory_percent: Option<f32>,
    pub disk_percent: Option<f32>,
}

/// Raw bytes of the server-push stream, chunked however the transport likes.
pub type ByteStream = BoxStream<'static, ClientResult<Vec<u8>>>;

// ── Backend ─────────────────────────────────────────────────────────────────

#[async_trait]
pub trait Backend: Send + Sync {
    async fn status(&self) -> ClientResult<ServerStatus>;
    async fn settings(&self) -> ClientResult<RemoteSettings>;
    async fn save_settings(&self, settings: &RemoteSettings) -> ClientResult<()>;

    async fn icon_positions(&self) -> ClientResult<IconPositions>;
    async fn save_icon_positions(&self, positions: &IconPositions) -> ClientResult<()>;
    async fn hidden_icons(&self) -> ClientResult<Vec<String>>;
    async fn save_hidden_icons(&self, hidden: &[String]) -> ClientResult<()>;

    async fn desktop_plugins(&self) -> ClientResult<Vec<DesktopPlugin>>;
    async fn plugin_catalog(&self) -> ClientResult<Vec<CatalogEntry>>;
    async fn plugin_command(&self, plugin_id: &str, command: PluginCommand) -> ClientResult<()>;
    async fn plugin_window(&self, plugin_id: &str) -> ClientResult<PluginWindowData>;

    async fn chats(&self) -> ClientResult<Vec<ChatSummary>>;
    async fn chat(&self, chat_id: &str) -> ClientResult<ChatRecord>;
    async fn new_chat(&self) -> ClientResult<String>;
    async fn delete_chat(&self, chat_id: &str) -> ClientResult<()>;
    async fn send_chat(&self, request: ChatRequest) -> ClientResult<ChatReply>;

    async fn notification_stream(&self) -> ClientResult<ByteStream>;
    async fn proactive(&self) -> ClientResult<ProactiveResponse>;
    async fn behavior(&self) -> ClientResult<BehaviorResponse>;

    async fn submit_image_job(&self, request: &ImageJobRequest) -> ClientResult<String>;
    async fn image_job(&self, job_id: &str) -> ClientResult<ImageJob>;

    async fn music_queue(&self) -> ClientResult<QueueSnapshot>;
    async fn save_music_queue(&self, queue: &QueueSnapshot) -> ClientResult<()>;
    async fn resolve_track(&self, query: &str) -> ClientResult<Option<Track>>;
    async fn listen(&self, track: &Track) -> ClientResult<()>;

    async fn system_info(&self) -> ClientResult<SystemInfo>;
}

// ── HTTP implementation ─────────────────────────────────────────────────────

pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> ClientResult<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ClientError::transport(base_url, e))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let response = self
            .client
            .get(self.url(path))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| ClientError::transport(path, e))?;
        decode(path, response).await
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> ClientResult<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.url(path))
            .timeout(REQUEST_TIMEOUT)
            .json(body)
            .send()
            .await
            .map_err(|e| ClientError::transport(path, e))?;
        decode(path, response).await
    }

    fn upload(&self, path: &str, form: Form) -> reqwest::RequestBuilder {
        self.client
            .post(self.url(path))
            .timeout(REQUEST_TIMEOUT)
            .multipart(form)
    }

    /// POST whose answer is a bare `{status: ok}`.
    async fn post_ack<B: Serialize + ?Sized + Sync>(&self, path: &str, body: &B) -> ClientResult<()> {
        let _: Value = self.post_json(path, body).await?;
        Ok(())
    }
}

async fn checked(path: &str, response: reqwest::Response) -> ClientResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    debug!(path, %status, body = %truncate(&body), "backend error response");
    if status.is_client_error() {
        if let Some(message) = error_message(&body) {
            return Err(ClientError::rejected(path, message));
        }
    }
    Err(ClientError::Status {
        endpoint: path.to_string(),
        status: status.as_u16(),
    })
}

async fn decode<T: DeserializeOwned>(path: &str, response: reqwest::Response) -> ClientResult<T> {
    let response = checked(path, response).await?;
    let body = response
        .text()
        .await
        .map_err(|e| ClientError::transport(path, e))?;
    serde_json::from_str(&body).map_err(|e| ClientError::decode(path, e))
}

fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value.get("error")?.as_str().map(str::to_string)
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(ERROR_BODY_LIMIT) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn status(&self) -> ClientResult<ServerStatus> {
        self.get_json("/api/status").await
    }

    async fn settings(&self) -> ClientResult<RemoteSettings> {
        self.get_json("/api/settings").await
    }

    async fn save_settings(&self, settings: &RemoteSettings) -> ClientResult<()> {
        self.post_ack("/api/settings", settings).await
    }

    async fn icon_positions(&self) -> ClientResult<IconPositions> {
        self.get_json("/api/desktop/icons").await
    }

    async fn save_icon_positions(&self, positions: &IconPositions) -> ClientResult<()> {
        self.post_ack("/api/desktop/icons", positions).await
    }

    async fn hidden_icons(&self) -> ClientResult<Vec<String>> {
        self.get_json("/api/desktop/hidden-icons").await
    }

    async fn save_hidden_icons(&self, hidden: &[String]) -> ClientResult<()> {
        self.post_ack("/api/desktop/hidden-icons", hidden).await
    }

    async fn desktop_plugins(&self) -> ClientResult<Vec<DesktopPlugin>> {
        self.get_json("/api/plugins/desktop").await
    }

    async fn plugin_catalog(&self) -> ClientResult<Vec<CatalogEntry>> {
        self.get_json("/api/plugins/catalog").await
    }

    async fn plugin_command(&self, plugin_id: &str, command: PluginCommand) -> ClientResult<()> {
        let path = format!("/api/plugins/{plugin_id}/{}", command.verb());
        self.post_ack(&path, &Value::Object(Map::new())).await
    }

    async fn plugin_window(&self, plugin_id: &str) -> ClientResult<PluginWindowData> {
        let path = format!("/api/plugins/{plugin_id}/window");
        let raw: Value = self.get_json(&path).await?;
        if let Some(message) = raw.get("error").and_then(Value::as_str) {
            return Err(ClientError::rejected(path, message));
        }
        serde_json::from_value(raw).map_err(|e| ClientError::decode(path, e))
    }

    async fn chats(&self) -> ClientResult<Vec<ChatSummary>> {
        self.get_json("/api/chats").await
    }

    async fn chat(&self, chat_id: &str) -> ClientResult<ChatRecord> {
        self.get_json(&format!("/api/chats/{chat_id}")).await
    }

    async fn new_chat(&self) -> ClientResult<String> {
        let created: NewChat = self.post_json("/api/chats/new", &Map::new()).await?;
        Ok(created.chat_id)
    }

    async fn delete_chat(&self, chat_id: &str) -> ClientResult<()> {
        let path = format!("/api/chats/{chat_id}");
        let response = self
            .client
            .delete(self.url(&path))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| ClientError::transport(&path, e))?;
        checked(&path, response).await.map(|_| ())
    }

    async fn send_chat(&self, request: ChatRequest) -> ClientResult<ChatReply> {
        const PATH: &str = "/api/chat";
        let Some(image) = request.image else {
            let body = ChatJsonBody {
                content: &request.content,
                chat_id: request.chat_id.as_deref(),
            };
            return self.post_json(PATH, &body).await;
        };

        let part = Part::bytes(image.bytes)
            .file_name(image.file_name)
            .mime_str(image.mime)
            .map_err(|e| ClientError::transport(PATH, e))?;
        let mut form = Form::new().text("content", request.content).part("image", part);
        if let Some(chat_id) = request.chat_id {
            form = form.text("chat_id", chat_id);
        }
        let response = self
            .upload(PATH, form)
            .send()
            .await
            .map_err(|e| ClientError::transport(PATH, e))?;
        decode(PATH, response).await
    }

    async fn notification_stream(&self) -> ClientResult<ByteStream> {
        const PATH: &str = "/api/notifications/stream";
        let response = self
            .client
            .get(self.url(PATH))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| ClientError::transport(PATH, e))?;
        let response = checked(PATH, response).await?;
        let stream = response.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|e| ClientError::StreamClosed(e.to_string()))
        });
        Ok(stream.boxed())
    }

    async fn proactive(&self) -> ClientResult<ProactiveResponse> {
        self.get_json("/api/proactive").await
    }

    async fn behavior(&self) -> ClientResult<BehaviorResponse> {
        self.get_json("/api/behavior").await
    }

    async fn submit_image_job(&self, request: &ImageJobRequest) -> ClientResult<String> {
        const PATH: &str = "/api/images/jobs";
        let ticket: ImageJobTicket = self.post_json(PATH, request).await?;
        if ticket.job_id.is_empty() {
            return Err(ClientError::decode(PATH, "missing job_id"));
        }
        Ok(ticket.job_id)
    }

    async fn image_job(&self, job_id: &str) -> ClientResult<ImageJob> {
        let envelope: ImageJobEnvelope = self.get_json(&format!("/api/images/jobs/{job_id}")).await?;
        Ok(envelope.job)
    }

    async fn music_queue(&self) -> ClientResult<QueueSnapshot> {
        self.get_json("/api/music/queue").await
    }

    async fn save_music_queue(&self, queue: &QueueSnapshot) -> ClientResult<()> {
        self.post_ack("/api/music/queue", queue).await
    }

    async fn resolve_track(&self, query: &str) -> ClientResult<Option<Track>> {
        let resolved: ResolvedTrack = self
            .post_json("/api/music/resolve", &serde_json::json!({ "query": query }))
            .await?;
        Ok(resolved.track)
    }

    async fn listen(&self, track: &Track) -> ClientResult<()> {
        self.post_ack("/api/music/listen", &serde_json::json!({ "track": track }))
            .await
    }

    async fn system_info(&self) -> ClientResult<SystemInfo> {
        self.get_json("/api/system/info").await
    }
}
