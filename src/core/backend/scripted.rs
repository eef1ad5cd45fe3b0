use futures_util::stream::{self, StreamExt};

use crate::core::backend::{ResponseBackend, SegmentStream};
use crate::core::message::Message;
use crate::core::segment::ResponseSegment;

/// Replies with the same segments whatever the user says.
#[derive(Debug, Clone)]
pub struct ScriptedBackend {
    segments: Vec<ResponseSegment>,
}

impl ScriptedBackend {
    pub fn new(segments: Vec<ResponseSegment>) -> Self {
        Self { segments }
    }

    pub fn segments(&self) -> &[ResponseSegment] {
        &self.segments
    }
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new(vec![
            ResponseSegment::answer("[Expression: smile] [Action: wave]\n\nHello! Nice to meet you."),
            ResponseSegment::answer(
                "[Expression: neutral] [Action: none]\n\nWhat would you like to talk about?",
            ),
        ])
    }
}

impl ResponseBackend for ScriptedBackend {
    fn respond<'a>(
        &'a mut self,
        _message: &'a str,
        _context: Option<&'a [Message]>,
        _actor_label: &'a str,
    ) -> SegmentStream<'a> {
        stream::iter(self.segments.iter().cloned()).boxed()
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::annotations::{scan_all, SideChannel};

    #[tokio::test]
    async fn replies_with_fixed_segments() {
        let mut backend = ScriptedBackend::default();
        let first: Vec<ResponseSegment> = backend.respond("anything", None, "Phoenix").collect().await;
        let second: Vec<ResponseSegment> = backend.respond("else", None, "Phoenix").collect().await;

        assert_eq!(first.len(), 2);
        assert_eq!(first, second);

        let mut side_channel = SideChannel::default();
        scan_all(&first[0].content, &mut side_channel);
        assert_eq!(side_channel.expression, "smile");
        assert_eq!(side_channel.action, "wave");

        scan_all(&first[1].content, &mut side_channel);
        assert_eq!(side_channel.expression, "neutral");
        assert_eq!(side_channel.action, "none");
    }

    #[tokio::test]
    async fn empty_script_yields_nothing() {
        let mut backend = ScriptedBackend::new(Vec::new());
        let segments: Vec<ResponseSegment> = backend.respond("hi", None, "Phoenix").collect().await;
        assert!(segments.is_empty());
    }
}
