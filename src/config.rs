use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{OnceLock, RwLock};
use std::time::Duration;

// ── Paths ─────────────────────────────────────────────────────────────────────

pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("daria")
}

pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("daria")
}

pub fn default_config_file() -> PathBuf {
    config_dir().join("client.json")
}

pub fn default_log_file() -> PathBuf {
    data_dir().join("daria-desktop.log")
}

// ── JSON helpers ──────────────────────────────────────────────────────────────

pub fn load_json<T: for<'de> Deserialize<'de> + Default>(path: &Path) -> T {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

pub fn save_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(data)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))
}

// ── Client config ─────────────────────────────────────────────────────────────

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:7777";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub server_url: String,
    pub proactive_interval_secs: u64,
    pub behavior_interval_secs: u64,
    /// Windows unfocused for longer than this are fair game for the
    /// sleepy-mood minimizer.
    pub stale_window_minutes: u64,
    /// Permission to raise native notifications.
    pub system_notifications: bool,
    pub mobile_breakpoint_px: i32,
    pub force_mobile: bool,
    pub theme: String,
    pub log_filter: String,
    pub log_file: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            proactive_interval_secs: 30,
            behavior_interval_secs: 60,
            stale_window_minutes: 20,
            system_notifications: false,
            mobile_breakpoint_px: 768,
            force_mobile: false,
            theme: "Pink".to_string(),
            log_filter: "daria_desktop=info".to_string(),
            log_file: None,
        }
    }
}

impl ClientConfig {
    pub fn proactive_interval(&self) -> Duration {
        Duration::from_secs(self.proactive_interval_secs.max(1))
    }

    pub fn behavior_interval(&self) -> Duration {
        Duration::from_secs(self.behavior_interval_secs.max(1))
    }

    pub fn stale_window_after(&self) -> Duration {
        Duration::from_secs(self.stale_window_minutes.saturating_mul(60))
    }

    pub fn log_path(&self) -> PathBuf {
        self.log_file.clone().unwrap_or_else(default_log_file)
    }

    /// Environment wins over the file.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("DARIA_SERVER_URL") {
            let url = url.trim();
            if !url.is_empty() {
                self.server_url = url.to_string();
            }
        }
        if let Ok(filter) = std::env::var("DARIA_LOG") {
            if !filter.trim().is_empty() {
                self.log_filter = filter.trim().to_string();
            }
        }
        self.server_url = self.server_url.trim_end_matches('/').to_string();
    }
}

pub fn load_config(path: &Path) -> ClientConfig {
    let mut cfg: ClientConfig = load_json(path);
    cfg.apply_env();
    cfg
}

// ── Global config ─────────────────────────────────────────────────────────────

static CLIENT_CONFIG: OnceLock<RwLock<ClientConfig>> = OnceLock::new();

fn config_lock() -> &'static RwLock<ClientConfig> {
    CLIENT_CONFIG.get_or_init(|| RwLock::new(ClientConfig::default()))
}

pub fn get_config() -> ClientConfig {
    config_lock()
        .read()
        .map(|g| g.clone())
        .unwrap_or_default()
}

pub fn set_config(cfg: ClientConfig) {
    if let Ok(mut guard) = config_lock().write() {
        *guard = cfg;
    }
}

pub fn update_config<F: FnOnce(&mut ClientConfig)>(f: F) {
    if let Ok(mut guard) = config_lock().write() {
        f(&mut guard);
    }
}

// ── Themes ────────────────────────────────────────────────────────────────────

use ratatui::style::Color;

pub const THEMES: &[(&str, Color)] = &[
    ("Pink", Color::LightMagenta),
    ("Dark", Color::White),
    ("Blue", Color::LightBlue),
    ("Green", Color::Green),
    ("Amber", Color::Yellow),
];

pub fn theme_color(name: &str) -> Color {
    THEMES
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, c)| *c)
        .unwrap_or(Color::LightMagenta)
}

pub fn current_theme_color() -> Color {
    theme_color(&get_config().theme)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let cfg: ClientConfig =
            serde_json::from_str(r#"{"server_url":"http://daria.local:9000"}"#).unwrap();
        assert_eq!(cfg.server_url, "http://daria.local:9000");
        assert_eq!(cfg.proactive_interval(), Duration::from_secs(30));
        assert_eq!(cfg.behavior_interval(), Duration::from_secs(60));
        assert_eq!(cfg.stale_window_after(), Duration::from_secs(20 * 60));
    }

    #[test]
    fn unknown_theme_uses_pink() {
        assert_eq!(theme_color("nope"), Color::LightMagenta);
        assert_eq!(theme_color("blue"), Color::LightBlue);
    }

    #[test]
    fn save_then_load_keeps_custom_values() {
        let dir = std::env::temp_dir().join(format!("daria-cfg-{}", std::process::id()));
        let path = dir.join("client.json");
        let cfg = ClientConfig {
            stale_window_minutes: 5,
            system_notifications: true,
            ..ClientConfig::default()
        };
        save_json(&path, &cfg).unwrap();
        let loaded: ClientConfig = load_json(&path);
        assert_eq!(loaded.stale_window_minutes, 5);
        assert!(loaded.system_notifications);
        let _ = std::fs::remove_dir_all(dir);
    }
}
