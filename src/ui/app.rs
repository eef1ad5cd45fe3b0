//! State the chat screen draws from.
//!
//! The view never reads the session controller directly while a turn is
//! running; it is fed [`SessionEvent`]s and keeps its own copy of the
//! conversation.

use std::path::PathBuf;

use crate::core::annotations::SideChannel;
use crate::core::avatar::expression_image;
use crate::core::config::settings::AvatarSettings;
use crate::core::message::Message;
use crate::core::session::{SessionEvent, SessionState};

pub struct ChatView {
    pub transcript: Vec<Message>,
    pub side_channel: SideChannel,
    pub state: SessionState,
    pub backend_key: String,
    pub backend_name: String,
    pub user_label: String,
    pub input: String,
    /// Rows scrolled up from the bottom of the transcript.
    pub scroll_from_bottom: u16,
    pub status: Option<String>,
    pub busy: bool,
    pub exit_requested: bool,
    avatar: AvatarSettings,
    /// Events for turns up to and including this id are stale.
    ignore_through: u64,
}

impl ChatView {
    pub fn new(backend_key: &str, backend_name: &str, user_label: &str, avatar: AvatarSettings) -> Self {
        Self {
            transcript: Vec::new(),
            side_channel: SideChannel::default(),
            state: SessionState::AwaitingUserInput,
            backend_key: backend_key.to_string(),
            backend_name: backend_name.to_string(),
            user_label: user_label.to_string(),
            input: String::new(),
            scroll_from_bottom: 0,
            status: None,
            busy: false,
            exit_requested: false,
            avatar,
            ignore_through: 0,
        }
    }

    /// Applies one event; returns whether it was for the current turn.
    pub fn apply_event(&mut self, event: SessionEvent) -> bool {
        if event.turn() <= self.ignore_through {
            return false;
        }

        match event {
            SessionEvent::State { state, .. } => self.state = state,
            SessionEvent::Render {
                conversation,
                side_channel,
                ..
            } => {
                self.transcript = conversation;
                if let Some(side_channel) = side_channel {
                    self.side_channel = side_channel;
                }
            }
            SessionEvent::TurnFinished { cancelled, .. } => {
                self.busy = false;
                self.state = SessionState::AwaitingUserInput;
                if cancelled {
                    self.status = Some("Stopped".to_string());
                }
            }
        }
        true
    }

    /// Starts over after the conversation was cleared or the backend changed.
    /// Events from turns up to `last_turn` are dropped from now on.
    pub fn reset(&mut self, last_turn: u64, backend_key: &str, backend_name: &str) {
        self.ignore_through = last_turn;
        self.transcript.clear();
        self.side_channel = SideChannel::default();
        self.state = SessionState::AwaitingUserInput;
        self.backend_key = backend_key.to_string();
        self.backend_name = backend_name.to_string();
        self.scroll_from_bottom = 0;
        self.busy = false;
    }

    /// Takes the typed text if there is something to send.
    pub fn take_input(&mut self) -> Option<String> {
        let text = self.input.trim().to_string();
        if text.is_empty() {
            return None;
        }
        self.input.clear();
        self.scroll_from_bottom = 0;
        self.status = None;
        Some(text)
    }

    pub fn avatar_path(&self) -> PathBuf {
        expression_image(&self.avatar, &self.side_channel)
    }

    pub fn user_avatar_path(&self) -> &std::path::Path {
        &self.avatar.user_avatar
    }

    pub fn scroll_up(&mut self, rows: u16) {
        self.scroll_from_bottom = self.scroll_from_bottom.saturating_add(rows);
    }

    pub fn scroll_down(&mut self, rows: u16) {
        self.scroll_from_bottom = self.scroll_from_bottom.saturating_sub(rows);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view() -> ChatView {
        ChatView::new(
            "simple",
            "Simple",
            "Phoenix",
            AvatarSettings {
                user_avatar: PathBuf::from("user.png"),
                ema_avatar: PathBuf::from("ema.png"),
                expression_images_dir: PathBuf::from("/nonexistent"),
            },
        )
    }

    fn render(turn: u64, text: &str) -> SessionEvent {
        SessionEvent::Render {
            turn,
            conversation: vec![Message::user(text)],
            side_channel: Some(SideChannel {
                expression: "smile".to_string(),
                action: "wave".to_string(),
            }),
            finished: true,
        }
    }

    #[test]
    fn render_events_replace_transcript_and_side_channel() {
        let mut view = view();
        view.busy = true;
        assert!(view.apply_event(render(1, "hi")));
        assert_eq!(view.transcript, vec![Message::user("hi")]);
        assert_eq!(view.side_channel.expression, "smile");

        view.apply_event(SessionEvent::TurnFinished {
            turn: 1,
            cancelled: true,
        });
        assert!(!view.busy);
        assert_eq!(view.status.as_deref(), Some("Stopped"));
    }

    #[test]
    fn events_from_abandoned_turns_are_ignored() {
        let mut view = view();
        view.apply_event(render(1, "old"));
        view.reset(1, "rules", "Rule-based");

        assert!(!view.apply_event(render(1, "late")));
        assert!(view.transcript.is_empty());
        assert_eq!(view.side_channel, SideChannel::default());
        assert_eq!(view.backend_key, "rules");

        assert!(view.apply_event(render(2, "new")));
        assert_eq!(view.transcript.len(), 1);
    }

    #[test]
    fn blank_input_is_not_sent() {
        let mut view = view();
        view.input = "   ".to_string();
        assert_eq!(view.take_input(), None);
        view.input = " hello ".to_string();
        assert_eq!(view.take_input().as_deref(), Some("hello"));
        assert!(view.input.is_empty());
    }

    #[test]
    fn avatar_falls_back_without_generated_images() {
        assert_eq!(view().avatar_path(), PathBuf::from("ema.png"));
    }
}
