//! Chat transcript and chat list. Thin state; the session does the I/O.

use std::path::Path;

use crate::api::{ChatRecord, ChatReply, ChatSummary};

const PREVIEW_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatSource {
    #[default]
    Local,
    Telegram,
}

impl ChatSource {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("telegram") => ChatSource::Telegram,
            _ => ChatSource::Local,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    fn parse(raw: &str) -> Self {
        match raw {
            "user" => Role::User,
            "system" => Role::System,
            _ => Role::Assistant,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Text(String),
    /// Local path for an attachment, URL for something the server made.
    Image(String),
    /// Inline progress card of an image job.
    JobCard(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub body: MessageBody,
}

impl ChatMessage {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            body: MessageBody::Text(text.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatSession {
    /// `None` until the server assigns an id on first send.
    pub id: Option<String>,
    pub source: ChatSource,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Default)]
pub struct ChatState {
    current: ChatSession,
    list: Vec<ChatSummary>,
    in_flight: usize,
}

fn preview(text: &str) -> String {
    text.chars().take(PREVIEW_CHARS).collect()
}

impl ChatState {
    pub fn current(&self) -> &ChatSession {
        &self.current
    }

    pub fn current_id(&self) -> Option<&str> {
        self.current.id.as_deref()
    }

    pub fn list(&self) -> &[ChatSummary] {
        &self.list
    }

    pub fn is_waiting(&self) -> bool {
        self.in_flight > 0
    }

    pub fn set_list(&mut self, list: Vec<ChatSummary>) {
        self.list = list;
    }

    /// Render the outgoing message right away, before the request leaves.
    pub fn begin_send(&mut self, text: &str, image: Option<&Path>) {
        if !text.is_empty() {
            self.current.messages.push(ChatMessage::text(Role::User, text));
        }
        if let Some(path) = image {
            self.current.messages.push(ChatMessage {
                role: Role::User,
                body: MessageBody::Image(path.display().to_string()),
            });
        }
        self.in_flight += 1;
    }

    /// Fold a reply in. `sent_to` is the chat id the request went out with.
    /// Returns false when the user has since moved to another chat and the
    /// transcript was left alone.
    pub fn apply_reply(&mut self, sent_to: Option<&str>, sent_text: &str, reply: &ChatReply) -> bool {
        self.in_flight = self.in_flight.saturating_sub(1);
        let lines = reply.lines();
        let target = reply.chat_id.as_deref().or(sent_to);

        let visible = match (self.current.id.as_deref(), target) {
            (None, _) => true,
            (Some(current), Some(target)) => current == target,
            (Some(_), None) => sent_to.is_none(),
        };
        if visible {
            if self.current.id.is_none() {
                self.current.id = target.map(str::to_string);
            }
            self.current
                .messages
                .extend(lines.iter().map(|l| ChatMessage::text(Role::Assistant, l.clone())));
        }
        if let Some(target) = target {
            self.touch_list(target, sent_text, 1 + lines.len());
        }
        visible
    }

    pub fn send_failed(&mut self, reason: &str) {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.current
            .messages
            .push(ChatMessage::text(Role::System, format!("Message not delivered: {reason}")));
    }

    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.current.messages.push(ChatMessage::text(Role::Assistant, text));
    }

    pub fn push_job_card(&mut self, card: u64) {
        self.current.messages.push(ChatMessage {
            role: Role::Assistant,
            body: MessageBody::JobCard(card),
        });
    }

    /// Existing entries are updated where they stand; a chat the list has
    /// never seen goes on top.
    fn touch_list(&mut self, chat_id: &str, first_text: &str, added: usize) {
        if let Some(entry) = self.list.iter_mut().find(|c| c.id == chat_id) {
            entry.message_count += added;
            if entry.preview.is_empty() {
                entry.preview = preview(first_text);
            }
            return;
        }
        self.list.insert(
            0,
            ChatSummary {
                id: chat_id.to_string(),
                created: chrono::Local::now().to_rfc3339(),
                preview: preview(first_text),
                message_count: added,
                source: Some("local".into()),
            },
        );
    }

    pub fn load(&mut self, record: ChatRecord) {
        let messages = record
            .messages
            .into_iter()
            .flat_map(|m| {
                let role = Role::parse(&m.role);
                let mut out = Vec::with_capacity(2);
                if !m.content.is_empty() {
                    out.push(ChatMessage::text(role, m.content));
                }
                if let Some(url) = m.image_url {
                    out.push(ChatMessage {
                        role,
                        body: MessageBody::Image(url),
                    });
                }
                out
            })
            .collect();
        self.current = ChatSession {
            id: Some(record.id),
            source: ChatSource::parse(record.source.as_deref()),
            messages,
        };
    }

    pub fn start_new(&mut self, chat_id: String) {
        self.current = ChatSession {
            id: Some(chat_id.clone()),
            ..ChatSession::default()
        };
        self.touch_list(&chat_id, "", 0);
    }

    pub fn remove(&mut self, chat_id: &str) {
        self.list.retain(|c| c.id != chat_id);
        if self.current.id.as_deref() == Some(chat_id) {
            self.current = ChatSession::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ChatRecordMessage;

    fn summary(id: &str) -> ChatSummary {
        ChatSummary {
            id: id.into(),
            preview: format!("about {id}"),
            message_count: 2,
            ..ChatSummary::default()
        }
    }

    fn reply(chat_id: &str, lines: &[&str]) -> ChatReply {
        ChatReply {
            messages: lines.iter().map(|s| s.to_string()).collect(),
            chat_id: Some(chat_id.into()),
            ..ChatReply::default()
        }
    }

    #[test]
    fn outgoing_message_and_image_render_before_the_reply() {
        let mut chat = ChatState::default();
        chat.begin_send("look at this", Some(Path::new("/tmp/cat.png")));
        assert!(chat.is_waiting());
        let bodies: Vec<_> = chat.current().messages.iter().map(|m| m.body.clone()).collect();
        assert_eq!(
            bodies,
            vec![
                MessageBody::Text("look at this".into()),
                MessageBody::Image("/tmp/cat.png".into()),
            ]
        );
    }

    #[test]
    fn reply_sequence_is_appended_and_adopts_the_chat_id() {
        let mut chat = ChatState::default();
        chat.begin_send("hi", None);
        assert!(chat.apply_reply(None, "hi", &reply("c9", &["hey!", "how was your day?"])));
        assert_eq!(chat.current_id(), Some("c9"));
        assert_eq!(chat.current().messages.len(), 3);
        assert!(!chat.is_waiting());
    }

    #[test]
    fn list_updates_in_place_and_new_chats_go_on_top() {
        let mut chat = ChatState::default();
        chat.set_list(vec![summary("a"), summary("b"), summary("c")]);
        chat.load(ChatRecord {
            id: "b".into(),
            ..ChatRecord::default()
        });
        chat.begin_send("again", None);
        chat.apply_reply(Some("b"), "again", &reply("b", &["sure"]));
        let ids: Vec<_> = chat.list().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(chat.list()[1].message_count, 4);

        chat.remove("b");
        chat.begin_send("fresh start", None);
        chat.apply_reply(None, "fresh start", &reply("z", &["welcome"]));
        let ids: Vec<_> = chat.list().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["z", "a", "c"]);
        assert_eq!(chat.list()[0].preview, "fresh start");
    }

    #[test]
    fn reply_for_a_chat_the_user_left_does_not_touch_the_transcript() {
        let mut chat = ChatState::default();
        chat.load(ChatRecord {
            id: "a".into(),
            ..ChatRecord::default()
        });
        chat.begin_send("question", None);
        chat.load(ChatRecord {
            id: "b".into(),
            messages: vec![ChatRecordMessage {
                role: "assistant".into(),
                content: "old".into(),
                ..ChatRecordMessage::default()
            }],
            ..ChatRecord::default()
        });
        assert!(!chat.apply_reply(Some("a"), "question", &reply("a", &["answer"])));
        assert_eq!(chat.current().messages.len(), 1);
    }

    #[test]
    fn loading_a_record_keeps_images_and_source() {
        let mut chat = ChatState::default();
        chat.load(ChatRecord {
            id: "t1".into(),
            source: Some("telegram".into()),
            messages: vec![ChatRecordMessage {
                role: "user".into(),
                content: "see".into(),
                image_url: Some("/uploads/x.jpg".into()),
                ..ChatRecordMessage::default()
            }],
            ..ChatRecord::default()
        });
        assert_eq!(chat.current().source, ChatSource::Telegram);
        assert_eq!(chat.current().messages.len(), 2);
        assert_eq!(chat.current().messages[0].role, Role::User);
    }
}
