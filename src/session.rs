//! The session controller. It owns every piece of client state and is the
//! only thing that mutates it. Background tasks report back through
//! `SessionEvent`s, which are applied in arrival order by `handle_event`.

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use crate::actions::{Action, Command};
use crate::api::{
    Backend, BehaviorResponse, CatalogEntry, ChatRecord, ChatReply, ChatRequest, ChatSummary,
    DesktopPlugin, ImageAttachment, ImageJob, ImageJobRequest, PluginCommand, PluginWindowData,
    ProactiveResponse, QueueSnapshot, RemoteSettings, ServerStatus, SystemInfo, Track,
};
use crate::catalog::{builtin_spec, desktop_icon_ids, plugin_spec, ContentSource, WindowId, WindowSpec};
use crate::chat::ChatState;
use crate::choreography::{choreograph, wants_mischief, Mood, Step};
use crate::config::{update_config, ClientConfig, THEMES};
use crate::error::{ClientError, ClientResult};
use crate::geometry::Viewport;
use crate::icons::{DesktopIcon, IconLayout, IconPositions};
use crate::jobs::{spawn_job_poller, spawn_submission, JobCards};
use crate::notify::{NotificationEvent, SystemNotifier, ToastStack, DEFAULT_SYSTEM_NOTIFICATION_MS};
use crate::player::PlayerQueue;
use crate::pollers::{spawn_behavior_poller, spawn_proactive_poller, PacedQueue};
use crate::stream::{run_notification_stream, StreamState};
use crate::tasks::{TaskKey, TaskRegistry};
use crate::wm::{OpenOutcome, WindowManager};

pub const MONITOR_REFRESH: Duration = Duration::from_secs(3);
const PERSONA_TITLE: &str = "🌸 Daria";
const PERSONA_ICON: &str = "💕";

/// Session clock. Goes through tokio so paused-time tests see it move.
pub fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

/// Body of a window once its fetch resolved.
#[derive(Debug)]
pub enum WindowContent {
    Chats(Vec<ChatSummary>),
    Settings(RemoteSettings),
    Catalog(Vec<CatalogEntry>),
    MusicQueue(QueueSnapshot),
    SystemInfo(SystemInfo),
    Plugin(PluginWindowData),
}

#[derive(Debug)]
pub enum SessionEvent {
    Stream(StreamState),
    Notification(Box<NotificationEvent>),
    Proactive(ProactiveResponse),
    Behavior(BehaviorResponse),
    Status(ServerStatus),
    Settings(RemoteSettings),
    Layout { positions: IconPositions, hidden: ClientResult<Vec<String>> },
    DesktopPlugins(Vec<DesktopPlugin>),
    Chats(Vec<ChatSummary>),
    /// First content for a freshly opened window.
    WindowContent { window: WindowId, content: ClientResult<WindowContent> },
    /// Periodic refresh of a window that is already up.
    WindowRefresh { window: WindowId, content: WindowContent },
    ChatLoaded(ChatRecord),
    ChatCreated(String),
    ChatReply { sent_to: Option<String>, text: String, result: ClientResult<ChatReply> },
    JobSubmitted { card: u64, job_id: String },
    JobSubmitFailed { card: u64, error: ClientError },
    JobUpdate { card: u64, job_id: String, job: ImageJob },
    TrackResolved { query: String, track: Option<Track> },
    PluginCommandDone { plugin: String, command: PluginCommand },
    Failure { context: &'static str, error: ClientError },
}

fn or_failure<T>(context: &'static str, result: ClientResult<T>, ok: impl FnOnce(T) -> SessionEvent) -> SessionEvent {
    match result {
        Ok(value) => ok(value),
        Err(error) => SessionEvent::Failure { context, error },
    }
}

fn ack(context: &'static str, result: ClientResult<()>) -> Option<SessionEvent> {
    result.err().map(|error| SessionEvent::Failure { context, error })
}

pub struct Session {
    config: ClientConfig,
    backend: Arc<dyn Backend>,
    notifier: Box<dyn SystemNotifier>,
    events_tx: UnboundedSender<SessionEvent>,
    events_rx: UnboundedReceiver<SessionEvent>,
    tasks: TaskRegistry<TaskKey>,
    rng: StdRng,

    wm: WindowManager,
    icons: IconLayout,
    toasts: ToastStack,
    chat: ChatState,
    player: PlayerQueue,
    jobs: JobCards,
    paced: PacedQueue,
    layout_loaded: bool,

    mood: Mood,
    mood_emoji: String,
    status: Option<ServerStatus>,
    stream_state: StreamState,
    settings: Option<RemoteSettings>,
    desktop_plugins: Vec<DesktopPlugin>,
    catalog: Vec<CatalogEntry>,
    system_info: Option<SystemInfo>,
    plugin_data: HashMap<WindowId, PluginWindowData>,
    files_path: Option<String>,
    wallpaper: Option<String>,
    last_error: Option<String>,
}

impl Session {
    pub fn new(
        config: ClientConfig,
        backend: Arc<dyn Backend>,
        notifier: Box<dyn SystemNotifier>,
        rng: StdRng,
        viewport: Viewport,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut wm = WindowManager::new(viewport, config.mobile_breakpoint_px);
        wm.set_force_mobile(config.force_mobile);
        let mut session = Self {
            config,
            backend,
            notifier,
            events_tx,
            events_rx,
            tasks: TaskRegistry::new(),
            rng,
            wm,
            icons: IconLayout::new(viewport),
            toasts: ToastStack::default(),
            chat: ChatState::default(),
            player: PlayerQueue::default(),
            jobs: JobCards::default(),
            paced: PacedQueue::default(),
            layout_loaded: false,
            mood: Mood::default(),
            mood_emoji: String::new(),
            status: None,
            stream_state: StreamState::Connecting,
            settings: None,
            desktop_plugins: Vec::new(),
            catalog: Vec::new(),
            system_info: None,
            plugin_data: HashMap::new(),
            files_path: None,
            wallpaper: None,
            last_error: None,
        };
        session.rebuild_icons();
        session
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Kick off the initial loads, the notification stream and both pollers.
    pub fn start(&mut self) {
        info!(server = %self.config.server_url, "session starting");
        self.spawn_fetch(|b| async move { Some(or_failure("status", b.status().await, SessionEvent::Status)) });
        self.spawn_fetch(|b| async move { Some(or_failure("settings", b.settings().await, SessionEvent::Settings)) });
        self.spawn_fetch(|b| async move {
            let positions = match b.icon_positions().await {
                Ok(p) => p,
                Err(error) => return Some(SessionEvent::Failure { context: "icon positions", error }),
            };
            let hidden = b.hidden_icons().await;
            Some(SessionEvent::Layout { positions, hidden })
        });
        self.refresh_desktop_plugins();
        self.spawn_fetch(|b| async move { Some(or_failure("chat list", b.chats().await, SessionEvent::Chats)) });

        let backend = self.backend.clone();
        let events = self.events_tx.clone();
        self.tasks
            .spawn(TaskKey::NotificationStream, run_notification_stream(backend, events));
        spawn_proactive_poller(
            &mut self.tasks,
            self.backend.clone(),
            self.events_tx.clone(),
            self.config.proactive_interval(),
        );
        spawn_behavior_poller(
            &mut self.tasks,
            self.backend.clone(),
            self.events_tx.clone(),
            self.config.behavior_interval(),
        );
    }

    pub fn shutdown(&mut self) {
        info!(tasks = self.tasks.len(), "session shutting down");
        self.tasks.cancel_all();
    }

    fn spawn_fetch<F, Fut>(&self, job: F)
    where
        F: FnOnce(Arc<dyn Backend>) -> Fut,
        Fut: Future<Output = Option<SessionEvent>> + Send + 'static,
    {
        let events = self.events_tx.clone();
        let fut = job(self.backend.clone());
        tokio::spawn(async move {
            if let Some(event) = fut.await {
                let _ = events.send(event);
            }
        });
    }

    fn report_failure(&mut self, context: &str, error: &dyn Display) {
        warn!(context, %error, "backend call failed");
        self.last_error = Some(format!("{context}: {error}"));
    }

    // ── Event loop ────────────────────────────────────────────────────────────

    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events_rx.recv().await
    }

    /// Apply everything already queued; returns how many events were handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Time-driven housekeeping: expire toasts and effects, release paced
    /// proactive lines, forget finished tasks.
    pub fn tick(&mut self) {
        let now = now();
        self.toasts.expire(now);
        self.wm.expire_effects(now);
        for line in self.paced.drain_due(now) {
            self.chat.push_assistant(line);
        }
        self.tasks.prune();
    }

    pub fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Stream(state) => {
                if let StreamState::Disconnected { wait, reason } = &state {
                    let context = format!("notification stream (retry in {}ms)", wait.as_millis());
                    self.report_failure(&context, reason);
                }
                self.stream_state = state;
            }
            SessionEvent::Notification(event) => self.on_notification(*event),
            SessionEvent::Proactive(response) => self.on_proactive(response),
            SessionEvent::Behavior(response) => self.on_behavior(response),
            SessionEvent::Status(status) => self.status = Some(status),
            SessionEvent::Settings(settings) => self.apply_settings(settings),
            SessionEvent::Layout { positions, hidden } => {
                let hidden = hidden.unwrap_or_else(|error| {
                    self.report_failure("hidden icons", &error);
                    Vec::new()
                });
                self.icons.load_hidden(hidden);
                self.icons.load_positions(positions);
                self.layout_loaded = true;
            }
            SessionEvent::DesktopPlugins(plugins) => {
                self.desktop_plugins = plugins;
                self.rebuild_icons();
            }
            SessionEvent::Chats(list) => self.chat.set_list(list),
            SessionEvent::WindowContent { window, content } => self.on_window_content(window, content),
            SessionEvent::WindowRefresh { window, content } => {
                if self.wm.contains(&window) {
                    self.apply_content(&window, content);
                }
            }
            SessionEvent::ChatLoaded(record) => self.chat.load(record),
            SessionEvent::ChatCreated(chat_id) => self.chat.start_new(chat_id),
            SessionEvent::ChatReply { sent_to, text, result } => match result {
                Ok(reply) => {
                    self.chat.apply_reply(sent_to.as_deref(), &text, &reply);
                    if let Some(draw) = &reply.draw_request {
                        self.start_draw(draw.prompt(), draw.style());
                    }
                }
                Err(error) => {
                    self.report_failure("chat", &error);
                    self.chat.send_failed(&error.to_string());
                }
            },
            SessionEvent::JobSubmitted { card, job_id } => {
                if self.jobs.submitted(card, &job_id) {
                    spawn_job_poller(
                        &mut self.tasks,
                        self.backend.clone(),
                        self.events_tx.clone(),
                        card,
                        job_id,
                    );
                }
            }
            SessionEvent::JobSubmitFailed { card, error } => {
                self.report_failure("image job submit", &error);
                self.jobs.fail(card, format!("Could not start drawing: {error}"));
            }
            SessionEvent::JobUpdate { card, job_id, job } => {
                if self.jobs.apply(card, &job) {
                    debug!(%job_id, status = ?job.status, "image job finished");
                    self.tasks.cancel(&TaskKey::ImageJob(job_id));
                }
            }
            SessionEvent::TrackResolved { query, track } => match track {
                Some(track) => {
                    let started = self.player.enqueue(track).cloned();
                    if let Some(track) = started {
                        self.report_listen(track);
                    }
                    self.persist_queue();
                }
                None => {
                    let toast = NotificationEvent::local("Player", format!("Nothing found for \"{query}\""), "🎵", "toast");
                    self.toasts.push(toast, now());
                }
            },
            SessionEvent::PluginCommandDone { plugin, command } => {
                info!(%plugin, command = command.verb(), "plugin command done");
                if command == PluginCommand::Uninstall {
                    self.close_window(&WindowId::plugin(&plugin));
                }
                self.refresh_desktop_plugins();
                if self.wm.contains(&WindowId::new("plugins")) {
                    self.spawn_fetch(|b| async move {
                        Some(match b.plugin_catalog().await {
                            Ok(list) => SessionEvent::WindowRefresh {
                                window: WindowId::new("plugins"),
                                content: WindowContent::Catalog(list),
                            },
                            Err(error) => SessionEvent::Failure { context: "plugin catalog", error },
                        })
                    });
                }
            }
            SessionEvent::Failure { context, error } if error.is_transient() => {
                debug!(context, %error, "transient backend failure");
                self.last_error = Some(format!("{context}: {error}"));
            }
            SessionEvent::Failure { context, error } => self.report_failure(context, &error),
        }
    }

    // ── Commands ──────────────────────────────────────────────────────────────

    /// Apply a front-end command. Returns false when it referred to something
    /// that does not exist.
    pub fn execute(&mut self, command: Command) -> bool {
        let now = now();
        match command {
            Command::OpenWindow(id) => self.open_window(&id),
            Command::OpenPluginWindow(plugin) => self.open_plugin_window(&plugin),
            Command::FocusWindow(id) => self.wm.focus(&id, now),
            Command::MinimizeWindow(id) => self.wm.minimize(&id),
            Command::ToggleMaximize(id) => self.wm.toggle_maximize(&id),
            Command::CloseWindow(id) => self.close_window(&id),
            Command::TaskbarClick(id) => self.wm.activate_from_taskbar(&id, now),
            Command::BeginMove { window, x, y } => {
                self.wm.focus(&window, now);
                self.wm.begin_move(&window, x, y)
            }
            Command::BeginResize { window, corner, x, y } => {
                self.wm.focus(&window, now);
                self.wm.begin_resize(&window, corner, x, y)
            }
            Command::DragTo { x, y } => {
                self.wm.drag_to(x, y);
                true
            }
            Command::EndDrag => self.wm.end_drag().is_some(),
            Command::DropIcon { icon, x, y } => match self.icons.drop_icon(&icon, x, y) {
                Some(_) => {
                    self.persist_icons();
                    true
                }
                None => false,
            },
            Command::HideIcon(icon) => {
                let hidden = self.icons.hide(&icon);
                self.persist_hidden();
                hidden
            }
            Command::TidyDesktop => {
                self.tidy_desktop();
                true
            }
            Command::ClickToast(key) => match self.toasts.dismiss(key) {
                Some(toast) => {
                    self.run_action(toast.event.parsed_action());
                    true
                }
                None => false,
            },
            Command::SendMessage { text, image } => self.send_message(text, image),
            Command::Draw { prompt } => {
                let prompt = prompt.trim();
                if prompt.is_empty() {
                    return false;
                }
                self.start_draw(prompt, None);
                true
            }
            Command::NewChat => {
                self.spawn_fetch(|b| async move {
                    Some(or_failure("new chat", b.new_chat().await, SessionEvent::ChatCreated))
                });
                true
            }
            Command::SelectChat(chat_id) => {
                self.spawn_fetch(|b| async move {
                    Some(or_failure("load chat", b.chat(&chat_id).await, SessionEvent::ChatLoaded))
                });
                true
            }
            Command::DeleteChat(chat_id) => {
                self.chat.remove(&chat_id);
                self.spawn_fetch(|b| async move { ack("delete chat", b.delete_chat(&chat_id).await) });
                true
            }
            Command::PlayerNext => {
                let next = self.player.index().map_or(0, |i| i + 1);
                self.play(|p| p.seek(next).cloned())
            }
            Command::PlayerSeek(index) => self.play(|p| p.seek(index).cloned()),
            Command::PlayerTrackEnded => self.play(|p| p.on_ended().cloned()),
            Command::PlayerEnqueue(query) => {
                let query = query.trim().to_string();
                if query.is_empty() {
                    return false;
                }
                self.spawn_fetch(|b| async move {
                    Some(match b.resolve_track(&query).await {
                        Ok(track) => SessionEvent::TrackResolved { query, track },
                        Err(error) => SessionEvent::Failure { context: "resolve track", error },
                    })
                });
                true
            }
            Command::InstallPlugin(plugin) => self.plugin_command(plugin, PluginCommand::Install),
            Command::UninstallPlugin(plugin) => self.plugin_command(plugin, PluginCommand::Uninstall),
            Command::UpdatePlugin(plugin) => self.plugin_command(plugin, PluginCommand::Update),
            Command::ToggleAttention => self.toggle_attention(),
            Command::Run(action) => self.run_action(action),
        }
    }

    pub fn run_action(&mut self, action: Action) -> bool {
        match action {
            Action::OpenChat => self.open_window(&WindowId::new("chat")),
            Action::OpenCalendar => self.open_window(&WindowId::new("calendar")),
            Action::OpenWindow(id) => self.open_window(&id),
            Action::OpenFile(path) => {
                self.files_path = Some(path);
                self.open_window(&WindowId::new("files"))
            }
            Action::None => false,
            Action::Unknown(tag) => {
                debug!(%tag, "ignoring unknown notification action");
                false
            }
        }
    }

    // ── Windows ───────────────────────────────────────────────────────────────

    pub fn open_window(&mut self, id: &WindowId) -> bool {
        if let Some(plugin) = id.plugin_id() {
            return self.open_plugin_window(plugin);
        }
        let Some(spec) = builtin_spec(id) else {
            debug!(%id, "open_window: unknown id");
            return false;
        };
        self.open_with_spec(id.clone(), &spec)
    }

    pub fn open_plugin_window(&mut self, plugin_id: &str) -> bool {
        let Some(plugin) = self.desktop_plugins.iter().find(|p| p.id == plugin_id) else {
            debug!(plugin_id, "open_plugin_window: plugin not on the desktop");
            return false;
        };
        let spec = plugin_spec(&plugin.title, &plugin.icon);
        self.open_with_spec(WindowId::plugin(plugin_id), &spec)
    }

    fn open_with_spec(&mut self, id: WindowId, spec: &WindowSpec) -> bool {
        match self.wm.open(id.clone(), spec, now()) {
            OpenOutcome::Reused => {}
            OpenOutcome::Created(ContentSource::Template) => self.init_window(&id),
            OpenOutcome::Created(source) => self.load_content(id, source),
        }
        true
    }

    fn load_content(&mut self, window: WindowId, source: ContentSource) {
        debug!(%window, ?source, "loading window content");
        self.spawn_fetch(move |b| async move {
            let content = match source {
                ContentSource::ChatHistory => b.chats().await.map(WindowContent::Chats),
                ContentSource::Settings => b.settings().await.map(WindowContent::Settings),
                ContentSource::PluginCatalog => b.plugin_catalog().await.map(WindowContent::Catalog),
                ContentSource::MusicQueue => b.music_queue().await.map(WindowContent::MusicQueue),
                ContentSource::SystemInfo => b.system_info().await.map(WindowContent::SystemInfo),
                ContentSource::PluginWindow => match window.plugin_id() {
                    Some(plugin) => b.plugin_window(plugin).await.map(WindowContent::Plugin),
                    None => Err(ClientError::rejected(window.as_str(), "not a plugin window")),
                },
                ContentSource::Template => return None,
            };
            Some(SessionEvent::WindowContent { window, content })
        });
    }

    fn on_window_content(&mut self, window: WindowId, content: ClientResult<WindowContent>) {
        if !self.wm.contains(&window) {
            debug!(%window, "dropping content for a closed window");
            return;
        }
        match content {
            Ok(content) => self.apply_content(&window, content),
            Err(error) => self.report_failure("window content", &error),
        }
        self.wm.mark_loaded(&window);
        self.init_window(&window);
    }

    fn apply_content(&mut self, window: &WindowId, content: WindowContent) {
        match content {
            WindowContent::Chats(list) => self.chat.set_list(list),
            WindowContent::Settings(settings) => self.apply_settings(settings),
            WindowContent::Catalog(list) => self.catalog = list,
            WindowContent::MusicQueue(snapshot) => self.player = PlayerQueue::from_snapshot(snapshot),
            WindowContent::SystemInfo(info) => self.system_info = Some(info),
            WindowContent::Plugin(data) => {
                self.plugin_data.insert(window.clone(), data);
            }
        }
    }

    /// Per-window setup once the body is in place.
    fn init_window(&mut self, window: &WindowId) {
        match window.as_str() {
            "monitor" => {
                let backend = self.backend.clone();
                let events = self.events_tx.clone();
                let id = window.clone();
                self.tasks.spawn_periodic(
                    TaskKey::Window(window.clone(), "metrics"),
                    MONITOR_REFRESH,
                    move || {
                        let backend = backend.clone();
                        let events = events.clone();
                        let window = id.clone();
                        async move {
                            let polled = backend.system_info().await;
                            let event = match polled {
                                Ok(info) => SessionEvent::WindowRefresh {
                                    window,
                                    content: WindowContent::SystemInfo(info),
                                },
                                Err(error) => SessionEvent::Failure { context: "system info", error },
                            };
                            if events.send(event).is_err() {
                                ControlFlow::Break(())
                            } else {
                                ControlFlow::Continue(())
                            }
                        }
                    },
                );
            }
            "chat" => {
                if let Some(chat_id) = self.chat.current_id().map(str::to_string) {
                    self.spawn_fetch(|b| async move {
                        Some(or_failure("load chat", b.chat(&chat_id).await, SessionEvent::ChatLoaded))
                    });
                }
            }
            _ => {}
        }
    }

    /// Remove the window, its taskbar entry and every timer scoped to it.
    pub fn close_window(&mut self, id: &WindowId) -> bool {
        if self.wm.close(id).is_none() {
            return false;
        }
        let cancelled = self.tasks.cancel_where(|key| key.window() == Some(id));
        if cancelled > 0 {
            debug!(%id, cancelled, "cancelled window timers");
        }
        self.plugin_data.remove(id);
        if id.is("chat") {
            self.paced.clear();
        }
        true
    }

    /// Resize the desktop. Icons pushed off the grid are re-settled; the
    /// repaired layout is saved once the server's layout has been loaded.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.wm.set_viewport(viewport);
        if self.icons.set_viewport(viewport) && self.layout_loaded {
            self.persist_icons();
        }
    }

    // ── Desktop icons ─────────────────────────────────────────────────────────

    fn rebuild_icons(&mut self) {
        let mut icons: Vec<DesktopIcon> = desktop_icon_ids()
            .filter_map(|id| {
                builtin_spec(&id).map(|spec| DesktopIcon {
                    id,
                    label: spec.title,
                    glyph: spec.icon,
                })
            })
            .collect();
        icons.extend(self.desktop_plugins.iter().map(|p| DesktopIcon {
            id: WindowId::plugin(&p.id),
            label: p.title.clone(),
            glyph: p.icon.clone(),
        }));
        self.icons.set_icons(icons);
    }

    pub fn tidy_desktop(&mut self) {
        self.icons.tidy();
        self.persist_icons();
    }

    fn persist_icons(&self) {
        let positions = self.icons.positions().clone();
        self.spawn_fetch(|b| async move { ack("save icon positions", b.save_icon_positions(&positions).await) });
    }

    fn persist_hidden(&self) {
        let hidden = self.icons.hidden();
        self.spawn_fetch(|b| async move { ack("save hidden icons", b.save_hidden_icons(&hidden).await) });
    }

    fn refresh_desktop_plugins(&self) {
        self.spawn_fetch(|b| async move {
            Some(or_failure("desktop plugins", b.desktop_plugins().await, SessionEvent::DesktopPlugins))
        });
    }

    // ── Notifications ─────────────────────────────────────────────────────────

    fn on_notification(&mut self, event: NotificationEvent) {
        let now = now();
        debug!(id = event.id, kind = %event.kind, "notification");
        if event.wants_native(self.config.system_notifications) {
            let timeout = Duration::from_millis(event.duration.unwrap_or(DEFAULT_SYSTEM_NOTIFICATION_MS));
            self.notifier.notify(&event.title, &event.message, timeout);
        }
        if let Some(window) = event.open_window.as_deref().filter(|w| !w.is_empty()) {
            self.open_window(&WindowId::new(window));
        }
        if let Some(wallpaper) = &event.wallpaper {
            self.wallpaper = Some(wallpaper.clone());
        }
        if event.tidy_desktop {
            self.tidy_desktop();
        }
        self.toasts.push(event, now);
    }

    // ── Pollers ───────────────────────────────────────────────────────────────

    fn on_proactive(&mut self, response: ProactiveResponse) {
        let chat_open = self.wm.contains(&WindowId::new("chat"));
        for batch in response.messages {
            let Some(first) = batch.messages.first() else {
                continue;
            };
            let kind = if batch.kind.is_empty() { "proactive" } else { batch.kind.as_str() };
            let toast = NotificationEvent::local(PERSONA_TITLE, first.clone(), PERSONA_ICON, kind)
                .with_action("open_chat");
            self.on_notification(toast);
            if chat_open {
                let start = self.paced.last_due().map_or(now(), |due| due.max(now()));
                self.paced.schedule(&batch.messages, start);
            }
        }
    }

    fn on_behavior(&mut self, response: BehaviorResponse) {
        let now = now();
        self.mood = Mood::parse(&response.state.mood);
        self.mood_emoji = response.state.mood_emoji;
        if wants_mischief(&self.mood, &response.behavior) {
            if let Some((icon, pos)) = self.icons.relocate_random(&mut self.rng) {
                debug!(%icon, x = pos.x, y = pos.y, "icon mischief");
                self.persist_icons();
            }
        }
        let steps = choreograph(
            &self.mood,
            &self.wm,
            now,
            self.config.stale_window_after(),
            &mut self.rng,
        );
        for step in steps {
            match step {
                Step::Shake(id) => {
                    self.wm.shake(&id, now);
                }
                Step::Nudge { window, dx, dy } => {
                    self.wm.move_by(&window, dx, dy);
                }
                Step::Focus(id) => {
                    self.wm.focus(&id, now);
                }
                Step::Open(id) => {
                    self.open_window(&id);
                }
                Step::Resize { window, dw, dh } => {
                    self.wm.resize_by(&window, dw, dh);
                }
                Step::Minimize(id) => {
                    self.wm.minimize(&id);
                }
            }
        }
    }

    // ── Chat & images ─────────────────────────────────────────────────────────

    fn send_message(&mut self, text: String, image: Option<PathBuf>) -> bool {
        let text = text.trim().to_string();
        if let Some(prompt) = text.strip_prefix("/draw ") {
            let prompt = prompt.trim().to_string();
            return self.execute(Command::Draw { prompt });
        }
        if text.is_empty() && image.is_none() {
            return false;
        }
        self.chat.begin_send(&text, image.as_deref());
        let sent_to = self.chat.current_id().map(str::to_string);
        self.spawn_fetch(|b| async move {
            let attachment = match image {
                Some(path) => match tokio::fs::read(&path).await {
                    Ok(bytes) => {
                        let name = path
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_else(|| "image.jpg".into());
                        Some(ImageAttachment::new(name, bytes))
                    }
                    Err(err) => {
                        let error = ClientError::rejected(path.display().to_string(), err.to_string());
                        return Some(SessionEvent::ChatReply { sent_to, text, result: Err(error) });
                    }
                },
                None => None,
            };
            let request = ChatRequest {
                content: text.clone(),
                chat_id: sent_to.clone(),
                image: attachment,
            };
            let result = b.send_chat(request).await;
            Some(SessionEvent::ChatReply { sent_to, text, result })
        });
        true
    }

    fn start_draw(&mut self, prompt: &str, style: Option<&str>) {
        let chat_id = self.chat.current_id().map(str::to_string);
        let card = self.jobs.create(prompt, chat_id.clone());
        self.chat.push_job_card(card);
        let request = ImageJobRequest {
            prompt: prompt.to_string(),
            style: style.map(str::to_string),
            chat_id,
        };
        info!(card, prompt, "starting image job");
        spawn_submission(&mut self.tasks, self.backend.clone(), self.events_tx.clone(), card, request);
    }

    // ── Player ────────────────────────────────────────────────────────────────

    fn play<F>(&mut self, pick: F) -> bool
    where
        F: FnOnce(&mut PlayerQueue) -> Option<Track>,
    {
        let Some(track) = pick(&mut self.player) else {
            return false;
        };
        self.report_listen(track);
        self.persist_queue();
        true
    }

    fn report_listen(&self, track: Track) {
        self.spawn_fetch(|b| async move { ack("listen", b.listen(&track).await) });
    }

    fn persist_queue(&self) {
        let snapshot = self.player.snapshot();
        self.spawn_fetch(|b| async move { ack("save music queue", b.save_music_queue(&snapshot).await) });
    }

    // ── Plugins & settings ────────────────────────────────────────────────────

    fn plugin_command(&mut self, plugin: String, command: PluginCommand) -> bool {
        if plugin.is_empty() {
            return false;
        }
        self.spawn_fetch(move |b| async move {
            Some(match b.plugin_command(&plugin, command).await {
                Ok(()) => SessionEvent::PluginCommandDone { plugin, command },
                Err(error) => SessionEvent::Failure { context: "plugin command", error },
            })
        });
        true
    }

    fn apply_settings(&mut self, settings: RemoteSettings) {
        let known = |t: &&str| THEMES.iter().any(|(name, _)| name.eq_ignore_ascii_case(t));
        if let Some(theme) = settings.theme.as_deref().filter(known) {
            update_config(|cfg| cfg.theme = theme.to_string());
        }
        self.settings = Some(settings);
    }

    fn toggle_attention(&mut self) -> bool {
        let Some(settings) = self.settings.as_mut() else {
            debug!("settings not loaded yet; attention toggle ignored");
            return false;
        };
        settings.attention_enabled = Some(!settings.attention_enabled.unwrap_or(true));
        let snapshot = settings.clone();
        self.spawn_fetch(|b| async move { ack("save settings", b.save_settings(&snapshot).await) });
        true
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn wm(&self) -> &WindowManager {
        &self.wm
    }

    pub fn icons(&self) -> &IconLayout {
        &self.icons
    }

    pub fn toasts(&self) -> &ToastStack {
        &self.toasts
    }

    pub fn chat(&self) -> &ChatState {
        &self.chat
    }

    pub fn player(&self) -> &PlayerQueue {
        &self.player
    }

    pub fn jobs(&self) -> &JobCards {
        &self.jobs
    }

    pub fn tasks(&self) -> &TaskRegistry<TaskKey> {
        &self.tasks
    }

    pub fn mood(&self) -> &Mood {
        &self.mood
    }

    pub fn mood_emoji(&self) -> &str {
        &self.mood_emoji
    }

    pub fn status(&self) -> Option<&ServerStatus> {
        self.status.as_ref()
    }

    pub fn stream_state(&self) -> &StreamState {
        &self.stream_state
    }

    pub fn settings(&self) -> Option<&RemoteSettings> {
        self.settings.as_ref()
    }

    pub fn desktop_plugins(&self) -> &[DesktopPlugin] {
        &self.desktop_plugins
    }

    pub fn catalog(&self) -> &[CatalogEntry] {
        &self.catalog
    }

    pub fn system_info(&self) -> Option<&SystemInfo> {
        self.system_info.as_ref()
    }

    pub fn plugin_data(&self, id: &WindowId) -> Option<&PluginWindowData> {
        self.plugin_data.get(id)
    }

    pub fn files_path(&self) -> Option<&str> {
        self.files_path.as_deref()
    }

    pub fn wallpaper(&self) -> Option<&str> {
        self.wallpaper.as_deref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.tasks.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{BehaviorHints, ChatReply, DrawRequest, ImageJobResult, JobStatus, MoodSnapshot, ProactiveBatch};
    use crate::jobs::CardState;
    use crate::chat::MessageBody;
    use crate::icons::{IconPos, GRID_CELL_W, GRID_MARGIN};
    use crate::notify::NullNotifier;
    use crate::testing::FakeBackend;
    use rand::SeedableRng;
    use std::sync::Mutex;

    #[derive(Default, Clone)]
    struct RecordingNotifier {
        shown: Arc<Mutex<Vec<String>>>,
    }

    impl SystemNotifier for RecordingNotifier {
        fn notify(&self, title: &str, _message: &str, _timeout: Duration) {
            if let Ok(mut shown) = self.shown.lock() {
                shown.push(title.to_string());
            }
        }
    }

    fn session_with(backend: Arc<FakeBackend>, config: ClientConfig, notifier: Box<dyn SystemNotifier>) -> Session {
        Session::new(
            config,
            backend,
            notifier,
            StdRng::seed_from_u64(42),
            Viewport::new(1280, 800),
        )
    }

    fn session(backend: Arc<FakeBackend>) -> Session {
        session_with(backend, ClientConfig::default(), Box::new(NullNotifier))
    }

    /// Let spawned fetches run, then apply whatever they posted. Repeats so
    /// follow-up fetches triggered by an event also land.
    async fn settle(session: &mut Session) {
        for _ in 0..4 {
            for _ in 0..16 {
                tokio::task::yield_now().await;
            }
            session.pump();
        }
    }

    /// Like `settle`, but also waits (in real time) for work parked on the
    /// blocking pool, such as `tokio::fs` reads.
    async fn settle_until(session: &mut Session, done: impl Fn(&Session) -> bool) {
        for _ in 0..200 {
            settle(session).await;
            if done(session) {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("session never settled");
    }

    fn id(name: &str) -> WindowId {
        WindowId::new(name)
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_windows_are_a_no_op() {
        let mut s = session(Arc::new(FakeBackend::default()));
        assert!(!s.execute(Command::OpenWindow(id("nope"))));
        assert!(!s.execute(Command::OpenPluginWindow("ghost".into())));
        assert!(!s.execute(Command::CloseWindow(id("chat"))));
        assert!(s.wm().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn opening_chat_loads_the_chat_list_once() {
        let backend = Arc::new(FakeBackend::default());
        backend.state().chats = vec![ChatSummary {
            id: "c1".into(),
            ..ChatSummary::default()
        }];
        let mut s = session(backend);
        s.execute(Command::OpenWindow(id("chat")));
        s.execute(Command::OpenWindow(id("chat")));
        settle(&mut s).await;
        assert_eq!(s.wm().len(), 1);
        assert_eq!(s.wm().taskbar().len(), 1);
        assert_eq!(s.chat().list().len(), 1);
        assert_eq!(
            s.wm().get(&id("chat")).unwrap().content_state,
            crate::wm::ContentState::Loaded
        );
    }

    #[tokio::test(start_paused = true)]
    async fn late_content_for_a_closed_window_is_dropped() {
        let backend = Arc::new(FakeBackend::default());
        backend.state().content_delay = Some(Duration::from_secs(1));
        let mut s = session(backend);
        s.execute(Command::OpenWindow(id("settings")));
        assert!(s.execute(Command::CloseWindow(id("settings"))));
        tokio::time::sleep(Duration::from_secs(2)).await;
        settle(&mut s).await;
        assert!(!s.wm().contains(&id("settings")));
        assert!(s.settings().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn closing_the_monitor_stops_its_metrics_timer() {
        let backend = Arc::new(FakeBackend::default());
        let mut s = session(backend.clone());
        s.execute(Command::OpenWindow(id("monitor")));
        settle(&mut s).await;
        let key = TaskKey::Window(id("monitor"), "metrics");
        assert!(s.tasks().is_active(&key));

        tokio::time::sleep(MONITOR_REFRESH * 2 + Duration::from_millis(100)).await;
        settle(&mut s).await;
        let calls = backend.state().system_info_calls;
        assert_eq!(calls, 3);
        assert!(s.system_info().is_some());

        s.execute(Command::CloseWindow(id("monitor")));
        assert!(!s.tasks().is_active(&key));
        tokio::time::sleep(MONITOR_REFRESH * 3).await;
        settle(&mut s).await;
        assert_eq!(backend.state().system_info_calls, calls);
    }

    #[tokio::test(start_paused = true)]
    async fn taskbar_follows_open_order_and_live_windows() {
        let mut s = session(Arc::new(FakeBackend::default()));
        for name in ["files", "terminal", "browser", "games"] {
            s.execute(Command::OpenWindow(id(name)));
        }
        s.execute(Command::CloseWindow(id("terminal")));
        s.execute(Command::MinimizeWindow(id("games")));
        let order: Vec<_> = s.wm().taskbar().iter().map(|t| t.id.to_string()).collect();
        assert_eq!(order, vec!["files", "browser", "games"]);
        assert_eq!(s.wm().len(), 3);
        assert!(s.execute(Command::TaskbarClick(id("games"))));
        assert_eq!(s.wm().focused_id(), Some(&id("games")));
    }

    #[tokio::test(start_paused = true)]
    async fn chat_with_image_renders_locally_then_draws() {
        let backend = Arc::new(FakeBackend::default());
        {
            let mut state = backend.state();
            state.chat_replies.push_back(Ok(ChatReply {
                response: Some("Cute! Want me to draw one?".into()),
                chat_id: Some("c7".into()),
                draw_request: Some(DrawRequest::Prompt("a fluffy cat".into())),
                ..ChatReply::default()
            }));
            for _ in 0..3 {
                state
                    .submit_results
                    .push_back(Err(ClientError::transport("/api/images/jobs", "busy")));
            }
            state.submit_results.push_back(Ok("job-cat".into()));
            let polls = state.jobs.entry("job-cat".into()).or_default();
            polls.push_back(Ok(ImageJob {
                status: JobStatus::Running,
                progress: 50.0,
                ..ImageJob::default()
            }));
            polls.push_back(Ok(ImageJob {
                status: JobStatus::Done,
                progress: 100.0,
                result: ImageJobResult {
                    url: Some("/generated/cat.png".into()),
                    dasha_message: Some("Done!".into()),
                    error: None,
                },
                ..ImageJob::default()
            }));
        }
        let image = std::env::temp_dir().join("daria-session-test.png");
        std::fs::write(&image, b"\x89PNG").unwrap();

        let mut s = session(backend.clone());
        s.execute(Command::OpenWindow(id("chat")));
        s.execute(Command::SendMessage {
            text: "look at my cat".into(),
            image: Some(image.clone()),
        });
        let bodies: Vec<_> = s.chat().current().messages.iter().map(|m| m.body.clone()).collect();
        assert_eq!(bodies[0], MessageBody::Text("look at my cat".into()));
        assert_eq!(bodies[1], MessageBody::Image(image.display().to_string()));

        settle_until(&mut s, |s| !s.chat().is_waiting()).await;
        assert_eq!(s.chat().current_id(), Some("c7"));
        let sent = backend.state().sent_chats.clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].image.as_ref().unwrap().mime, "image/png");
        let card = s.jobs().iter().next().unwrap().id;
        assert_eq!(s.jobs().get(card).unwrap().state, CardState::Submitting);

        // Three failed submits: 600 + 1200 + 1800 ms of backoff.
        tokio::time::sleep(Duration::from_millis(3700)).await;
        settle(&mut s).await;
        let pollers = s
            .tasks()
            .active_keys()
            .into_iter()
            .filter(|k| matches!(k, TaskKey::ImageJob(_)))
            .count();
        assert_eq!(pollers, 1);
        assert_eq!(backend.state().submit_calls, 4);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        settle(&mut s).await;
        assert_eq!(
            s.jobs().get(card).unwrap().state,
            CardState::Done {
                url: "/generated/cat.png".into(),
                message: Some("Done!".into())
            }
        );
        assert!(!s.tasks().is_active(&TaskKey::ImageJob("job-cat".into())));
        let _ = std::fs::remove_file(image);
    }

    #[tokio::test(start_paused = true)]
    async fn draw_card_fails_after_every_submit_is_rejected() {
        let backend = Arc::new(FakeBackend::default());
        {
            let mut state = backend.state();
            for _ in 0..4 {
                state
                    .submit_results
                    .push_back(Err(ClientError::transport("/api/images/jobs", "busy")));
            }
        }
        let mut s = session(backend.clone());
        s.execute(Command::OpenWindow(id("chat")));
        settle(&mut s).await;
        assert!(s.execute(Command::Draw { prompt: "a sleepy fox".into() }));
        settle(&mut s).await;
        let card = s.jobs().iter().next().unwrap().id;
        assert_eq!(s.jobs().get(card).unwrap().state, CardState::Submitting);

        // 600 + 1200 + 1800 ms between the four attempts.
        tokio::time::sleep(Duration::from_millis(3700)).await;
        settle(&mut s).await;
        assert_eq!(backend.state().submit_calls, 4);
        match &s.jobs().get(card).unwrap().state {
            CardState::Failed { error } => assert!(error.starts_with("Could not start drawing"), "{error}"),
            other => panic!("expected a failed card, got {other:?}"),
        }
        assert!(!s.tasks().active_keys().iter().any(|k| matches!(k, TaskKey::ImageJob(_))));
        assert!(s.last_error().is_some_and(|e| e.starts_with("image job submit")));
    }

    #[tokio::test(start_paused = true)]
    async fn toast_click_runs_its_action_and_native_respects_silence() {
        let notifier = RecordingNotifier::default();
        let shown = notifier.shown.clone();
        let config = ClientConfig {
            system_notifications: true,
            ..ClientConfig::default()
        };
        let mut s = session_with(Arc::new(FakeBackend::default()), config, Box::new(notifier));

        let loud = NotificationEvent::local("Song", "new track", "🎵", "info").with_action("open_window:player");
        let quiet = NotificationEvent::local("Quiet", "psst", "💬", "toast");
        s.handle_event(SessionEvent::Notification(Box::new(loud)));
        s.handle_event(SessionEvent::Notification(Box::new(quiet)));
        assert_eq!(s.toasts().len(), 2);
        assert_eq!(shown.lock().unwrap().clone(), vec!["Song".to_string()]);

        let key = s.toasts().iter().next().unwrap().key;
        assert!(s.execute(Command::ClickToast(key)));
        assert!(s.wm().contains(&id("player")));
        assert_eq!(s.toasts().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn notification_hints_open_windows_and_tidy() {
        let mut s = session(Arc::new(FakeBackend::default()));
        let mut event = NotificationEvent::local("t", "m", "✨", "info");
        event.open_window = Some("calendar".into());
        event.wallpaper = Some("/static/wallpapers/sakura.jpg".into());
        event.tidy_desktop = true;
        s.handle_event(SessionEvent::Notification(Box::new(event)));
        assert!(s.wm().contains(&id("calendar")));
        assert_eq!(s.wallpaper(), Some("/static/wallpapers/sakura.jpg"));
        let mut cells: Vec<_> = s.icons().positions().values().map(|p| (p.x, p.y)).collect();
        let total = cells.len();
        cells.sort();
        cells.dedup();
        assert_eq!(cells.len(), total);
    }

    #[tokio::test(start_paused = true)]
    async fn angry_mood_shakes_one_window_and_respects_mischief_switch() {
        let backend = Arc::new(FakeBackend::default());
        let mut s = session(backend.clone());
        s.execute(Command::OpenWindow(id("files")));
        s.execute(Command::OpenWindow(id("settings")));
        settle(&mut s).await;
        let before = s.icons().positions().clone();

        s.handle_event(SessionEvent::Behavior(BehaviorResponse {
            behavior: BehaviorHints {
                desktop_mischief: Some(false),
                ..BehaviorHints::default()
            },
            state: MoodSnapshot {
                mood: "angry".into(),
                ..MoodSnapshot::default()
            },
        }));
        let shaking: Vec<_> = s
            .wm()
            .windows()
            .filter(|w| w.effect.is_some())
            .map(|w| w.id.to_string())
            .collect();
        assert_eq!(shaking, vec!["files".to_string()]);
        assert_eq!(s.icons().positions(), &before);
        assert_eq!(s.mood(), &Mood::Angry);

        tokio::time::sleep(Duration::from_millis(200)).await;
        s.tick();
        assert!(s.wm().windows().all(|w| w.effect.is_none()));
    }

    #[tokio::test(start_paused = true)]
    async fn playful_mood_moves_an_icon_and_saves_the_layout() {
        let backend = Arc::new(FakeBackend::default());
        let mut s = session(backend.clone());
        s.handle_event(SessionEvent::Behavior(BehaviorResponse {
            state: MoodSnapshot {
                mood: "playful".into(),
                ..MoodSnapshot::default()
            },
            ..BehaviorResponse::default()
        }));
        settle(&mut s).await;
        assert_eq!(backend.state().saved_positions.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn proactive_lines_are_paced_into_an_open_chat() {
        let mut s = session(Arc::new(FakeBackend::default()));
        s.execute(Command::OpenWindow(id("chat")));
        settle(&mut s).await;
        s.handle_event(SessionEvent::Proactive(ProactiveResponse {
            messages: vec![ProactiveBatch {
                messages: vec!["hey".into(), "are you there?".into()],
                kind: "care".into(),
            }],
        }));
        assert_eq!(s.toasts().len(), 1);
        s.tick();
        assert_eq!(s.chat().current().messages.len(), 1);
        // second line: 1 * (800 + 14 * 15) = 1010ms
        tokio::time::sleep(Duration::from_millis(1000)).await;
        s.tick();
        assert_eq!(s.chat().current().messages.len(), 1);
        tokio::time::sleep(Duration::from_millis(20)).await;
        s.tick();
        assert_eq!(s.chat().current().messages.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn closing_chat_drops_lines_still_waiting_to_be_typed() {
        let mut s = session(Arc::new(FakeBackend::default()));
        s.execute(Command::OpenWindow(id("chat")));
        settle(&mut s).await;
        s.handle_event(SessionEvent::Proactive(ProactiveResponse {
            messages: vec![ProactiveBatch {
                messages: vec!["hey".into(), "are you there?".into()],
                kind: "care".into(),
            }],
        }));
        s.tick();
        assert_eq!(s.chat().current().messages.len(), 1);

        assert!(s.execute(Command::CloseWindow(id("chat"))));
        assert!(s.paced.is_empty());
        tokio::time::sleep(Duration::from_millis(1100)).await;
        s.tick();
        assert_eq!(s.chat().current().messages.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_an_icon_persists_and_avoids_collisions() {
        let backend = Arc::new(FakeBackend::default());
        let mut s = session(backend.clone());
        let chat_pos = s.icons().position("chat").unwrap();
        assert!(s.execute(Command::DropIcon {
            icon: "files".into(),
            x: chat_pos.x + 5,
            y: chat_pos.y + 5,
        }));
        assert_ne!(s.icons().position("files"), Some(chat_pos));
        settle(&mut s).await;
        assert_eq!(backend.state().saved_positions.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shrinking_the_desktop_saves_the_repaired_layout_once_loaded() {
        let backend = Arc::new(FakeBackend::default());
        let mut s = session(backend.clone());
        s.set_viewport(Viewport::new(800, 440));
        settle(&mut s).await;
        assert!(backend.state().saved_positions.is_empty());

        s.handle_event(SessionEvent::Layout {
            positions: IconPositions::new(),
            hidden: Ok(Vec::new()),
        });
        s.set_viewport(Viewport::new(416, 440));
        settle(&mut s).await;
        let saved = backend.state().saved_positions.clone();
        assert_eq!(saved.len(), 1);
        assert!(saved[0].values().all(|pos| pos.x < GRID_MARGIN + 4 * GRID_CELL_W));
        assert_eq!(&saved[0], s.icons().positions());

        s.set_viewport(Viewport::new(416, 440));
        settle(&mut s).await;
        assert_eq!(backend.state().saved_positions.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn hidden_icon_failure_is_reported_and_positions_still_load() {
        let mut s = session(Arc::new(FakeBackend::default()));
        let chat = IconPos { x: GRID_MARGIN + GRID_CELL_W, y: GRID_MARGIN };
        s.handle_event(SessionEvent::Layout {
            positions: IconPositions::from([("chat".to_string(), chat)]),
            hidden: Err(ClientError::transport("/api/desktop/hidden-icons", "down")),
        });
        assert_eq!(s.icons().position("chat"), Some(chat));
        assert_eq!(s.icons().icons().len(), 10);
        assert!(s.last_error().is_some_and(|e| e.starts_with("hidden icons")));
    }

    #[tokio::test(start_paused = true)]
    async fn player_reports_listens_and_persists_the_queue() {
        let backend = Arc::new(FakeBackend::default());
        backend.state().resolved.insert(
            "lofi".into(),
            Track {
                title: "Lofi Beats".into(),
                ..Track::default()
            },
        );
        let mut s = session(backend.clone());
        s.execute(Command::PlayerEnqueue("lofi".into()));
        settle(&mut s).await;
        assert_eq!(s.player().index(), Some(0));
        assert_eq!(backend.state().listens.len(), 1);
        assert!(!s.execute(Command::PlayerTrackEnded));
        assert!(!backend.state().saved_queues.is_empty());
    }
}
