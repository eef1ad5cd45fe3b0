//! Drives one conversation: input in, streamed reply out, history committed.
//!
//! The controller owns the backend registry, the displayed transcript and the
//! side channel, and shares the bounded history buffer. Every dispatched turn
//! commits exactly one user message and one assistant message to the buffer
//! so the buffer stays aligned on whole rounds, whatever the backend produced
//! and even when the turn was stopped early.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::annotations::SideChannel;
use crate::core::backend::{BackendRegistry, SegmentStream};
use crate::core::config::settings::Settings;
use crate::core::history::ConversationHistory;
use crate::core::message::{Message, MessageMetadata, TITLE_ERROR, TITLE_INTERRUPTED};
use crate::core::segment::ResponseSegment;
use crate::core::streaming::{RenderConfig, RenderFrame, RenderOutcome, StreamingRenderer};

/// Messages one turn writes to history: the user's and the folded reply.
pub const MESSAGES_PER_TURN: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingUserInput,
    Dispatching,
    Streaming,
    Committing,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, AwaitingUserInput)
                | (AwaitingUserInput, Dispatching)
                | (Dispatching, Streaming)
                | (Dispatching, Committing)
                | (Streaming, Committing)
                | (Committing, Idle)
        ) || next == Idle
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Idle => "idle",
            SessionState::AwaitingUserInput => "ready",
            SessionState::Dispatching => "thinking",
            SessionState::Streaming => "replying",
            SessionState::Committing => "saving",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    UnknownBackend { key: String, available: Vec<String> },
    NoBackends,
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::UnknownBackend { key, available } => write!(
                f,
                "Backend '{key}' is unknown or unavailable (available: {})",
                available.join(", ")
            ),
            SessionError::NoBackends => write!(f, "No backends are available"),
        }
    }
}

impl StdError for SessionError {}

/// What a surface hears about while a turn runs.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    State {
        turn: u64,
        state: SessionState,
    },
    /// The whole conversation so far, including the bubble in progress.
    Render {
        turn: u64,
        conversation: Vec<Message>,
        side_channel: Option<SideChannel>,
        finished: bool,
    },
    TurnFinished {
        turn: u64,
        cancelled: bool,
    },
}

impl SessionEvent {
    pub fn turn(&self) -> u64 {
        match self {
            SessionEvent::State { turn, .. }
            | SessionEvent::Render { turn, .. }
            | SessionEvent::TurnFinished { turn, .. } => *turn,
        }
    }
}

pub type EventSink<'a> = &'a mut (dyn FnMut(SessionEvent) + Send);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub turn: u64,
    pub cancelled: bool,
    /// Bubbles shown for this turn, in order.
    pub bubbles: Vec<Message>,
    /// The assistant message written to the history buffer, if the turn
    /// got far enough to write one.
    pub committed: Option<Message>,
}

pub struct SessionOptions {
    pub backend: String,
    pub actor_label: String,
    pub history_rounds: i64,
    pub messages_per_round: i64,
    pub render: RenderConfig,
}

impl SessionOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            backend: settings.backend.clone(),
            actor_label: settings.username.clone(),
            history_rounds: settings.history_rounds,
            messages_per_round: settings.messages_per_round,
            render: RenderConfig::default().with_delay(settings.streaming_delay),
        }
    }
}

pub struct SessionController {
    registry: BackendRegistry,
    selected: String,
    history: Arc<ConversationHistory>,
    renderer: StreamingRenderer,
    transcript: Vec<Message>,
    side_channel: SideChannel,
    actor_label: String,
    state: SessionState,
    mounted: bool,
    turn: u64,
}

impl SessionController {
    pub fn new(registry: BackendRegistry, options: SessionOptions) -> Result<Self, SessionError> {
        if registry.is_empty() {
            return Err(SessionError::NoBackends);
        }
        if !registry.contains(&options.backend) {
            return Err(unknown_backend(&registry, &options.backend));
        }

        if options.messages_per_round != MESSAGES_PER_TURN {
            warn!(
                requested = options.messages_per_round,
                used = MESSAGES_PER_TURN,
                "a turn always commits one user and one assistant message"
            );
        }

        info!(backend = %options.backend, "session created");
        Ok(Self {
            registry,
            selected: options.backend,
            history: Arc::new(ConversationHistory::new(
                options.history_rounds,
                MESSAGES_PER_TURN,
            )),
            renderer: StreamingRenderer::new(options.render),
            transcript: Vec::new(),
            side_channel: SideChannel::default(),
            actor_label: options.actor_label,
            state: SessionState::Idle,
            mounted: false,
            turn: 0,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn selected_backend(&self) -> &str {
        &self.selected
    }

    pub fn selected_display_name(&self) -> &str {
        self.registry
            .display_name(&self.selected)
            .unwrap_or(&self.selected)
    }

    /// Id of the most recent turn, 0 before the first one.
    pub fn turn(&self) -> u64 {
        self.turn
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// Shared handle on the history buffer.
    pub fn history(&self) -> Arc<ConversationHistory> {
        Arc::clone(&self.history)
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn side_channel(&self) -> &SideChannel {
        &self.side_channel
    }

    pub fn actor_label(&self) -> &str {
        &self.actor_label
    }

    pub fn set_actor_label(&mut self, label: impl Into<String>) {
        self.actor_label = label.into();
    }

    fn transition(&mut self, next: SessionState) {
        if !self.state.can_transition_to(next) {
            warn!(from = ?self.state, to = ?next, "unexpected session transition");
        }
        debug!(from = ?self.state, to = ?next, turn = self.turn, "session state");
        self.state = next;
    }

    fn transition_and_report(&mut self, next: SessionState, sink: &mut (dyn FnMut(SessionEvent) + Send)) {
        self.transition(next);
        sink(SessionEvent::State {
            turn: self.turn,
            state: next,
        });
    }

    /// The surface is ready for input.
    pub fn mount(&mut self) {
        self.mounted = true;
        if self.state == SessionState::Idle {
            self.transition(SessionState::AwaitingUserInput);
        }
    }

    /// Runs one turn to completion or until `cancel` fires.
    ///
    /// The user message enters the history buffer before the backend is
    /// called, and the backend sees the history as it was before that. A turn
    /// whose token is already cancelled touches nothing and only reports that
    /// it finished.
    pub async fn submit(
        &mut self,
        text: &str,
        sink: EventSink<'_>,
        cancel: &CancellationToken,
    ) -> TurnOutcome {
        self.turn += 1;
        let turn = self.turn;
        if cancel.is_cancelled() {
            info!(turn, "turn abandoned before dispatch");
            sink(SessionEvent::TurnFinished {
                turn,
                cancelled: true,
            });
            return TurnOutcome {
                turn,
                cancelled: true,
                bubbles: Vec::new(),
                committed: None,
            };
        }

        if self.state == SessionState::Idle {
            self.transition(SessionState::AwaitingUserInput);
        }
        self.transition_and_report(SessionState::Dispatching, sink);

        let user = Message::user(text);
        let context = self.history.get_recent_messages(None);
        self.history.add_messages([user.clone()]);
        self.transcript.push(user);
        let first_bubble = self.transcript.len();
        let side_channel_before = self.side_channel.clone();
        sink(SessionEvent::Render {
            turn,
            conversation: self.transcript.clone(),
            side_channel: Some(self.side_channel.clone()),
            finished: true,
        });

        let outcome = match self.registry.get_mut(&self.selected) {
            Some(backend) => {
                debug!(backend = %self.selected, turn, "dispatching message");
                let segments: SegmentStream<'_> =
                    backend.respond(text, Some(&context), &self.actor_label);

                if !self.state.can_transition_to(SessionState::Streaming) {
                    warn!(from = ?self.state, "unexpected transition to streaming");
                }
                self.state = SessionState::Streaming;
                debug!(turn, "session state: streaming");
                sink(SessionEvent::State {
                    turn,
                    state: SessionState::Streaming,
                });

                let mut on_frame = |frame: RenderFrame<'_>| {
                    sink(SessionEvent::Render {
                        turn,
                        conversation: frame.conversation.to_vec(),
                        side_channel: frame.side_channel.cloned(),
                        finished: frame.finished,
                    });
                };
                self.renderer
                    .render(
                        segments,
                        &mut self.transcript,
                        &mut self.side_channel,
                        cancel,
                        &mut on_frame,
                    )
                    .await
            }
            None => {
                warn!(backend = %self.selected, "selected backend is missing");
                let segment = ResponseSegment::error(
                    TITLE_ERROR,
                    format!("Unexpected error: backend '{}' is not available", self.selected),
                );
                let bubble = Message {
                    role: segment.role,
                    content: segment.content,
                    metadata: segment.metadata,
                };
                self.transcript.push(bubble.clone());
                sink(SessionEvent::Render {
                    turn,
                    conversation: self.transcript.clone(),
                    side_channel: Some(self.side_channel.clone()),
                    finished: true,
                });
                RenderOutcome::Completed(vec![bubble])
            }
        };

        self.transition_and_report(SessionState::Committing, sink);
        let (cancelled, bubbles, committed) = match outcome {
            RenderOutcome::Completed(bubbles) => {
                let committed = fold_bubbles(&bubbles);
                (false, bubbles, committed)
            }
            RenderOutcome::Cancelled(_) => {
                info!(turn, "turn stopped before completion");
                self.transcript.truncate(first_bubble);
                self.side_channel = side_channel_before;
                let placeholder = Message::assistant("")
                    .with_metadata(Some(MessageMetadata::titled(TITLE_INTERRUPTED)));
                self.transcript.push(placeholder.clone());
                sink(SessionEvent::Render {
                    turn,
                    conversation: self.transcript.clone(),
                    side_channel: Some(self.side_channel.clone()),
                    finished: true,
                });
                (true, Vec::new(), placeholder)
            }
        };
        self.history.add_messages([committed.clone()]);

        self.transition_and_report(SessionState::Idle, sink);
        if self.mounted {
            self.transition(SessionState::AwaitingUserInput);
        }
        sink(SessionEvent::TurnFinished { turn, cancelled });

        TurnOutcome {
            turn,
            cancelled,
            bubbles,
            committed: Some(committed),
        }
    }

    /// Switches to `key`, starting a fresh conversation.
    pub fn select_backend(&mut self, key: &str) -> Result<(), SessionError> {
        if !self.registry.contains(key) {
            return Err(unknown_backend(&self.registry, key));
        }
        info!(from = %self.selected, to = key, "switching backend");
        self.selected = key.to_string();
        self.clear();
        Ok(())
    }

    /// Cycles to the next registered backend.
    pub fn select_next_backend(&mut self) -> Result<&str, SessionError> {
        let next = self
            .registry
            .next_key(&self.selected)
            .map(str::to_string)
            .ok_or(SessionError::NoBackends)?;
        self.select_backend(&next)?;
        Ok(&self.selected)
    }

    /// Forgets the conversation: history, transcript, side channel and the
    /// active backend's own session.
    pub fn clear(&mut self) {
        self.history.clear();
        self.transcript.clear();
        self.side_channel = SideChannel::default();
        if let Some(backend) = self.registry.get_mut(&self.selected) {
            backend.reset();
        }
        self.transition(SessionState::Idle);
        if self.mounted {
            self.transition(SessionState::AwaitingUserInput);
        }
    }
}

fn unknown_backend(registry: &BackendRegistry, key: &str) -> SessionError {
    SessionError::UnknownBackend {
        key: key.to_string(),
        available: registry.keys().into_iter().map(str::to_string).collect(),
    }
}

/// Collapses a turn's bubbles into the single assistant message kept in
/// history. Error metadata wins over ordinary metadata.
fn fold_bubbles(bubbles: &[Message]) -> Message {
    let content = bubbles
        .iter()
        .map(|bubble| bubble.content.as_str())
        .filter(|content| !content.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");
    let metadata = bubbles
        .iter()
        .rev()
        .find(|bubble| bubble.is_error())
        .or_else(|| bubbles.last())
        .and_then(|bubble| bubble.metadata.clone());
    Message::assistant(content).with_metadata(metadata)
}
