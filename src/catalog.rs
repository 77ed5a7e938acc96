//! Window ids and the static table of built-in windows.

use serde::{Deserialize, Serialize};
use std::fmt;

const PLUGIN_PREFIX: &str = "plugin:";

/// Logical window key: a built-in name like `chat`, or `plugin:<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(String);

impl WindowId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn plugin(plugin_id: &str) -> Self {
        Self(format!("{PLUGIN_PREFIX}{plugin_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn plugin_id(&self) -> Option<&str> {
        self.0.strip_prefix(PLUGIN_PREFIX)
    }

    pub fn is(&self, name: &str) -> bool {
        self.0 == name
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WindowId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// How a window gets its body once the frame is up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentSource {
    /// Rendered from local state; ready immediately.
    Template,
    ChatHistory,
    Settings,
    PluginCatalog,
    MusicQueue,
    SystemInfo,
    PluginWindow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSpec {
    pub icon: String,
    pub title: String,
    pub width: i32,
    pub height: i32,
    pub content: ContentSource,
    pub desktop_icon: bool,
}

struct BuiltinWindow {
    id: &'static str,
    icon: &'static str,
    title: &'static str,
    width: i32,
    height: i32,
    content: ContentSource,
    desktop_icon: bool,
}

const BUILTIN_WINDOWS: &[BuiltinWindow] = &[
    BuiltinWindow { id: "chat", icon: "💬", title: "Chat", width: 520, height: 600, content: ContentSource::ChatHistory, desktop_icon: true },
    BuiltinWindow { id: "files", icon: "📁", title: "Files", width: 640, height: 460, content: ContentSource::Template, desktop_icon: true },
    BuiltinWindow { id: "terminal", icon: "⌨", title: "Terminal", width: 620, height: 400, content: ContentSource::Template, desktop_icon: true },
    BuiltinWindow { id: "browser", icon: "🌐", title: "Browser", width: 800, height: 560, content: ContentSource::Template, desktop_icon: true },
    BuiltinWindow { id: "player", icon: "🎵", title: "Player", width: 420, height: 520, content: ContentSource::MusicQueue, desktop_icon: true },
    BuiltinWindow { id: "games", icon: "🎮", title: "Games", width: 480, height: 420, content: ContentSource::Template, desktop_icon: true },
    BuiltinWindow { id: "calendar", icon: "📅", title: "Calendar", width: 460, height: 420, content: ContentSource::Template, desktop_icon: true },
    BuiltinWindow { id: "plugins", icon: "🧩", title: "Plugin Store", width: 600, height: 500, content: ContentSource::PluginCatalog, desktop_icon: true },
    BuiltinWindow { id: "monitor", icon: "📊", title: "System Monitor", width: 380, height: 260, content: ContentSource::SystemInfo, desktop_icon: true },
    BuiltinWindow { id: "settings", icon: "⚙", title: "Settings", width: 480, height: 520, content: ContentSource::Settings, desktop_icon: true },
];

pub fn builtin_spec(id: &WindowId) -> Option<WindowSpec> {
    BUILTIN_WINDOWS
        .iter()
        .find(|w| w.id == id.as_str())
        .map(|w| WindowSpec {
            icon: w.icon.to_string(),
            title: w.title.to_string(),
            width: w.width,
            height: w.height,
            content: w.content,
            desktop_icon: w.desktop_icon,
        })
}

pub fn builtin_ids() -> impl Iterator<Item = WindowId> {
    BUILTIN_WINDOWS.iter().map(|w| WindowId::new(w.id))
}

pub fn desktop_icon_ids() -> impl Iterator<Item = WindowId> {
    BUILTIN_WINDOWS
        .iter()
        .filter(|w| w.desktop_icon)
        .map(|w| WindowId::new(w.id))
}

pub const PLUGIN_WINDOW_WIDTH: i32 = 560;
pub const PLUGIN_WINDOW_HEIGHT: i32 = 460;

pub fn plugin_spec(title: &str, icon: &str) -> WindowSpec {
    WindowSpec {
        icon: icon.to_string(),
        title: title.to_string(),
        width: PLUGIN_WINDOW_WIDTH,
        height: PLUGIN_WINDOW_HEIGHT,
        content: ContentSource::PluginWindow,
        desktop_icon: true,
    }
}
