//! Typed actions and commands.
//!
//! `Action` is what a notification asks for (`open_chat`,
//! `open_window:<id>`, ...). `Command` is everything the front-end can ask the
//! session to do. Both are dispatched by `Session::execute`.

use serde_json::Value;
use std::path::PathBuf;

use crate::catalog::WindowId;
use crate::geometry::ResizeCorner;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    OpenChat,
    OpenCalendar,
    OpenWindow(WindowId),
    OpenFile(String),
    None,
    Unknown(String),
}

impl Action {
    pub fn parse(tag: Option<&str>, data: Option<&Value>) -> Self {
        let Some(tag) = tag.map(str::trim).filter(|t| !t.is_empty()) else {
            return Action::None;
        };
        let (kind, arg) = match tag.split_once(':') {
            Some((kind, arg)) => (kind, Some(arg.trim())),
            None => (tag, None),
        };
        let data_str = |key: &str| {
            data.and_then(|d| d.get(key))
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        match kind {
            "open_chat" => Action::OpenChat,
            "open_calendar" => Action::OpenCalendar,
            "open_window" => match arg.map(str::to_string).or_else(|| data_str("window")) {
                Some(id) if !id.is_empty() => Action::OpenWindow(WindowId::new(id)),
                _ => Action::Unknown(tag.to_string()),
            },
            "open_file" => match arg.map(str::to_string).or_else(|| data_str("path")) {
                Some(path) if !path.is_empty() => Action::OpenFile(path),
                _ => Action::Unknown(tag.to_string()),
            },
            _ => Action::Unknown(tag.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    OpenWindow(WindowId),
    OpenPluginWindow(String),
    FocusWindow(WindowId),
    MinimizeWindow(WindowId),
    ToggleMaximize(WindowId),
    CloseWindow(WindowId),
    TaskbarClick(WindowId),
    BeginMove { window: WindowId, x: i32, y: i32 },
    BeginResize { window: WindowId, corner: ResizeCorner, x: i32, y: i32 },
    DragTo { x: i32, y: i32 },
    EndDrag,
    DropIcon { icon: String, x: i32, y: i32 },
    HideIcon(String),
    TidyDesktop,
    ClickToast(u64),
    SendMessage { text: String, image: Option<PathBuf> },
    Draw { prompt: String },
    NewChat,
    SelectChat(String),
    DeleteChat(String),
    PlayerNext,
    PlayerSeek(usize),
    PlayerTrackEnded,
    PlayerEnqueue(String),
    InstallPlugin(String),
    UninstallPlugin(String),
    UpdatePlugin(String),
    ToggleAttention,
    Run(Action),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_tagged_strings() {
        assert_eq!(Action::parse(Some("open_chat"), None), Action::OpenChat);
        assert_eq!(Action::parse(Some("open_calendar"), None), Action::OpenCalendar);
        assert_eq!(
            Action::parse(Some("open_window:player"), None),
            Action::OpenWindow(WindowId::new("player"))
        );
        assert_eq!(
            Action::parse(Some("open_file:notes/today.md"), None),
            Action::OpenFile("notes/today.md".into())
        );
    }

    #[test]
    fn falls_back_to_action_data() {
        let data = json!({"window": "games", "path": "a.txt"});
        assert_eq!(
            Action::parse(Some("open_window"), Some(&data)),
            Action::OpenWindow(WindowId::new("games"))
        );
        assert_eq!(
            Action::parse(Some("open_file"), Some(&data)),
            Action::OpenFile("a.txt".into())
        );
    }

    #[test]
    fn empty_and_unknown_tags() {
        assert_eq!(Action::parse(None, None), Action::None);
        assert_eq!(Action::parse(Some("  "), None), Action::None);
        assert_eq!(
            Action::parse(Some("dance"), None),
            Action::Unknown("dance".into())
        );
        assert_eq!(
            Action::parse(Some("open_window:"), None),
            Action::Unknown("open_window:".into())
        );
    }
}
