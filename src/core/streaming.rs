//! Turns backend segments into incremental display updates.
//!
//! Every non-blank segment becomes one bubble. Its text is revealed one
//! grapheme at a time with a configurable pause between steps, the thinking
//! part (if any) first and wrapped in markers, then the answer. Annotation
//! tags are picked up while the text grows.

use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use unicode_segmentation::UnicodeSegmentation;

use crate::core::annotations::{AnnotationScanner, SideChannel};
use crate::core::message::Message;
use crate::core::segment::ResponseSegment;

pub const DEFAULT_STREAMING_DELAY: Duration = Duration::from_millis(20);

#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Pause between revealed graphemes. Zero disables pacing.
    pub delay: Duration,
    /// Whether to extract `[Key: value]` tags into the side channel.
    pub track_annotations: bool,
    pub thinking_open: String,
    pub thinking_close: String,
    /// Inserted between the thinking part and the answer.
    pub part_separator: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            delay: DEFAULT_STREAMING_DELAY,
            track_annotations: true,
            thinking_open: "*(".to_string(),
            thinking_close: ")*".to_string(),
            part_separator: "\n\n".to_string(),
        }
    }
}

impl RenderConfig {
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Display state of the bubble currently being streamed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderState {
    pub content: String,
    pub side_channel: SideChannel,
    pub finished: bool,
}

/// Steps through one segment's text unit by unit.
///
/// The full bubble text is laid out up front; each step extends the visible
/// prefix to the next unit boundary. A final step marks the bubble finished
/// without adding text.
#[derive(Debug)]
pub struct SegmentStreamer {
    text: String,
    boundaries: Vec<usize>,
    next_unit: usize,
    scanner: Option<AnnotationScanner>,
    state: RenderState,
}

impl SegmentStreamer {
    pub fn new(segment: &ResponseSegment, config: &RenderConfig, side_channel: SideChannel) -> Self {
        let (text, boundaries) = layout_units(segment, config);
        Self {
            text,
            boundaries,
            next_unit: 0,
            scanner: config.track_annotations.then(AnnotationScanner::new),
            state: RenderState {
                content: String::new(),
                side_channel,
                finished: false,
            },
        }
    }

    /// Final text of the bubble once every unit has been revealed.
    pub fn full_text(&self) -> &str {
        &self.text
    }

    pub fn unit_count(&self) -> usize {
        self.boundaries.len()
    }

    pub fn advance(&mut self) -> Option<&RenderState> {
        if self.state.finished {
            return None;
        }

        match self.boundaries.get(self.next_unit) {
            Some(&end) => {
                let start = self.state.content.len();
                self.state.content.push_str(&self.text[start..end]);
                self.next_unit += 1;
                if let Some(scanner) = self.scanner.as_mut() {
                    for annotation in scanner.scan(&self.state.content) {
                        self.state.side_channel.apply(annotation);
                    }
                }
            }
            None => self.state.finished = true,
        }
        Some(&self.state)
    }
}

impl Iterator for SegmentStreamer {
    type Item = RenderState;

    fn next(&mut self) -> Option<RenderState> {
        self.advance().cloned()
    }
}

fn layout_units(segment: &ResponseSegment, config: &RenderConfig) -> (String, Vec<usize>) {
    let mut text = String::new();
    let mut boundaries = Vec::new();

    let thinking = segment.thinking_text();
    if !thinking.is_empty() {
        push_unit(&mut text, &mut boundaries, &config.thinking_open);
        push_graphemes(&mut text, &mut boundaries, thinking);
        let mut closing = config.thinking_close.clone();
        if !segment.content.is_empty() {
            closing.push_str(&config.part_separator);
        }
        push_unit(&mut text, &mut boundaries, &closing);
    }
    push_graphemes(&mut text, &mut boundaries, &segment.content);

    (text, boundaries)
}

fn push_unit(text: &mut String, boundaries: &mut Vec<usize>, unit: &str) {
    if !unit.is_empty() {
        text.push_str(unit);
        boundaries.push(text.len());
    }
}

fn push_graphemes(text: &mut String, boundaries: &mut Vec<usize>, source: &str) {
    for grapheme in source.graphemes(true) {
        push_unit(text, boundaries, grapheme);
    }
}

/// One incremental update: the conversation including the in-progress bubble.
#[derive(Debug, Clone, Copy)]
pub struct RenderFrame<'a> {
    pub conversation: &'a [Message],
    pub side_channel: Option<&'a SideChannel>,
    pub finished: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Every segment was shown; holds the finished bubbles in order.
    Completed(Vec<Message>),
    /// Stopped early. Bubbles finished before the stop are kept in the
    /// conversation; the bubble in progress was removed.
    Cancelled(Vec<Message>),
}

#[derive(Debug, Clone, Default)]
pub struct StreamingRenderer {
    config: RenderConfig,
}

impl StreamingRenderer {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Streams `segments` into `conversation`, reporting each step to `sink`.
    ///
    /// Segments are consumed strictly in order; the next one is not pulled
    /// until the current bubble is finished. Waiting on the backend and the
    /// pacing delay both observe `cancel`.
    pub async fn render<S>(
        &self,
        mut segments: S,
        conversation: &mut Vec<Message>,
        side_channel: &mut SideChannel,
        cancel: &CancellationToken,
        sink: &mut (dyn FnMut(RenderFrame<'_>) + Send),
    ) -> RenderOutcome
    where
        S: Stream<Item = ResponseSegment> + Unpin,
    {
        let first_bubble = conversation.len();

        loop {
            let segment = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return RenderOutcome::Cancelled(conversation[first_bubble..].to_vec());
                }
                next = segments.next() => next,
            };
            let Some(segment) = segment else { break };

            if segment.is_blank() {
                debug!("skipping blank response segment");
                continue;
            }

            let bubble = conversation.len();
            conversation.push(Message {
                role: segment.role,
                content: String::new(),
                metadata: segment.metadata.clone(),
            });

            let mut streamer = SegmentStreamer::new(&segment, &self.config, side_channel.clone());
            while let Some(state) = streamer.advance() {
                if cancel.is_cancelled() {
                    conversation.truncate(bubble);
                    return RenderOutcome::Cancelled(conversation[first_bubble..].to_vec());
                }

                let message = &mut conversation[bubble];
                let shown = message.content.len();
                message.content.push_str(&state.content[shown..]);
                if self.config.track_annotations && state.side_channel != *side_channel {
                    side_channel.clone_from(&state.side_channel);
                }
                let finished = state.finished;

                sink(RenderFrame {
                    conversation: conversation.as_slice(),
                    side_channel: self.config.track_annotations.then_some(&*side_channel),
                    finished,
                });

                if !finished && !self.config.delay.is_zero() {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            conversation.truncate(bubble);
                            return RenderOutcome::Cancelled(conversation[first_bubble..].to_vec());
                        }
                        _ = tokio::time::sleep(self.config.delay) => {}
                    }
                }
            }
        }

        RenderOutcome::Completed(conversation[first_bubble..].to_vec())
    }
}
