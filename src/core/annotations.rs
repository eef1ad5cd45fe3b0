//! In-stream `[Key: value]` annotations.
//!
//! Replies may carry tags such as `[Expression: smile]` or `[Action: wave]`
//! anywhere in their text. [`AnnotationScanner`] is fed the growing text of a
//! bubble and reports tags as soon as their closing bracket arrives; text it
//! has already consumed is never rescanned. Malformed or unknown tags are
//! ignored, leaving the side channel untouched.

use memchr::{memchr, memchr2};
use serde::{Deserialize, Serialize};

pub const DEFAULT_EXPRESSION: &str = "neutral";
pub const DEFAULT_ACTION: &str = "none";

/// Expression and action currently shown alongside the transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SideChannel {
    pub expression: String,
    pub action: String,
}

impl Default for SideChannel {
    fn default() -> Self {
        Self {
            expression: DEFAULT_EXPRESSION.to_string(),
            action: DEFAULT_ACTION.to_string(),
        }
    }
}

impl SideChannel {
    pub fn apply(&mut self, annotation: Annotation) {
        match annotation {
            Annotation::Expression(value) => self.expression = value,
            Annotation::Action(value) => self.action = value,
        }
    }

    pub fn emoji(&self) -> &'static str {
        Expression::parse(&self.expression).map_or("💬", Expression::emoji)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Annotation {
    Expression(String),
    Action(String),
}

/// Facial expressions understood by the structured backend and the avatar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Expression {
    Neutral,
    Smile,
    Serious,
    Confused,
    Surprised,
    Sad,
}

impl Expression {
    pub const ALL: [Expression; 6] = [
        Expression::Neutral,
        Expression::Smile,
        Expression::Serious,
        Expression::Confused,
        Expression::Surprised,
        Expression::Sad,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Expression::Neutral => "neutral",
            Expression::Smile => "smile",
            Expression::Serious => "serious",
            Expression::Confused => "confused",
            Expression::Surprised => "surprised",
            Expression::Sad => "sad",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|e| e.as_str().eq_ignore_ascii_case(value))
    }

    pub fn emoji(self) -> &'static str {
        match self {
            Expression::Neutral => "😐",
            Expression::Smile => "😊",
            Expression::Serious => "😤",
            Expression::Confused => "😕",
            Expression::Surprised => "😲",
            Expression::Sad => "😢",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    None,
    Nod,
    Shake,
    Wave,
    Jump,
    Point,
}

impl Action {
    pub const ALL: [Action; 6] = [
        Action::None,
        Action::Nod,
        Action::Shake,
        Action::Wave,
        Action::Jump,
        Action::Point,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::None => "none",
            Action::Nod => "nod",
            Action::Shake => "shake",
            Action::Wave => "wave",
            Action::Jump => "jump",
            Action::Point => "point",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|a| a.as_str().eq_ignore_ascii_case(value))
    }
}

/// Parses the inside of one bracket pair, e.g. `Expression: smile`.
///
/// Keys match case-insensitively; values must be a single word and are
/// lowercased.
pub fn parse_annotation(inner: &str) -> Option<Annotation> {
    let (key, value) = inner.split_once(':')?;
    let value = value.trim_start();
    if value.is_empty() || !value.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }
    let value = value.to_lowercase();

    let key = key.trim();
    if key.eq_ignore_ascii_case("expression") {
        Some(Annotation::Expression(value))
    } else if key.eq_ignore_ascii_case("action") {
        Some(Annotation::Action(value))
    } else {
        None
    }
}

/// Incremental tag scanner over text that only ever grows.
#[derive(Debug, Default, Clone)]
pub struct AnnotationScanner {
    cursor: usize,
}

impl AnnotationScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scans `text` from where the previous call stopped and returns every
    /// tag closed since then, in order.
    ///
    /// An unclosed `[` keeps the cursor parked on it so the tag is picked up
    /// once the rest arrives. `text` must extend the text of earlier calls.
    pub fn scan(&mut self, text: &str) -> Vec<Annotation> {
        let bytes = text.as_bytes();
        let mut found = Vec::new();
        if self.cursor > bytes.len() {
            self.cursor = 0;
        }

        while let Some(offset) = memchr(b'[', &bytes[self.cursor..]) {
            let open = self.cursor + offset;
            let body_start = open + 1;
            match memchr2(b']', b'[', &bytes[body_start..]) {
                None => {
                    self.cursor = open;
                    return found;
                }
                Some(end) if bytes[body_start + end] == b'[' => {
                    // A fresh bracket abandons the unclosed one before it.
                    self.cursor = body_start + end;
                }
                Some(end) => {
                    if let Some(annotation) = parse_annotation(&text[body_start..body_start + end])
                    {
                        found.push(annotation);
                    }
                    self.cursor = body_start + end + 1;
                }
            }
        }

        self.cursor = bytes.len();
        found
    }

    pub fn reset(&mut self) {
        self.cursor = 0;
    }
}

/// Full scan of a finished text; the last tag of each kind wins.
pub fn scan_all(text: &str, side_channel: &mut SideChannel) {
    for annotation in AnnotationScanner::new().scan(text) {
        side_channel.apply(annotation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_chars(text: &str) -> (SideChannel, Vec<SideChannel>) {
        let mut scanner = AnnotationScanner::new();
        let mut side = SideChannel::default();
        let mut history = Vec::new();
        let mut acc = String::new();
        for ch in text.chars() {
            acc.push(ch);
            for annotation in scanner.scan(&acc) {
                side.apply(annotation);
            }
            history.push(side.clone());
        }
        (side, history)
    }

    #[test]
    fn parses_expression_and_action_tags() {
        assert_eq!(
            parse_annotation("Expression: smile"),
            Some(Annotation::Expression("smile".into()))
        );
        assert_eq!(
            parse_annotation("action:WAVE"),
            Some(Annotation::Action("wave".into()))
        );
        assert_eq!(
            parse_annotation("EXPRESSION:   Sad"),
            Some(Annotation::Expression("sad".into()))
        );
    }

    #[test]
    fn rejects_malformed_tags() {
        assert_eq!(parse_annotation("Expression smile"), None);
        assert_eq!(parse_annotation("Expression:"), None);
        assert_eq!(parse_annotation("Expression: big smile"), None);
        assert_eq!(parse_annotation("Mood: happy"), None);
        assert_eq!(parse_annotation("1"), None);
    }

    #[test]
    fn partial_tag_waits_for_closing_bracket() {
        let mut scanner = AnnotationScanner::new();
        assert!(scanner.scan("[Expression: smi").is_empty());
        assert_eq!(
            scanner.scan("[Expression: smile] hi"),
            vec![Annotation::Expression("smile".into())]
        );
        assert!(scanner.scan("[Expression: smile] hi there").is_empty());
    }

    #[test]
    fn streaming_updates_side_channel_without_flicker() {
        let (side, history) = feed_chars("[Expression: smile] hello, more text");
        assert_eq!(side.expression, "smile");
        assert_eq!(side.action, DEFAULT_ACTION);

        let first_smile = history
            .iter()
            .position(|s| s.expression == "smile")
            .expect("tag detected");
        assert!(history[first_smile..].iter().all(|s| s.expression == "smile"));
        assert!(history[..first_smile]
            .iter()
            .all(|s| s.expression == DEFAULT_EXPRESSION));
    }

    #[test]
    fn later_tags_replace_earlier_values() {
        let mut side = SideChannel::default();
        scan_all(
            "[Expression: smile] [Action: wave]\n\nhi [Expression: sad]",
            &mut side,
        );
        assert_eq!(side.expression, "sad");
        assert_eq!(side.action, "wave");
    }

    #[test]
    fn stray_brackets_do_not_hide_real_tags() {
        let mut side = SideChannel::default();
        scan_all("array[0 is [Action: nod] and [] [x]", &mut side);
        assert_eq!(side.action, "nod");
        assert_eq!(side.expression, DEFAULT_EXPRESSION);
    }

    #[test]
    fn multibyte_text_around_tags_is_safe() {
        let (side, _) = feed_chars("[Expression: smile] [Action: wave]\n\n你好，我是Ema。");
        assert_eq!(side.expression, "smile");
        assert_eq!(side.action, "wave");
    }

    #[test]
    fn emoji_falls_back_for_unknown_expressions() {
        let mut side = SideChannel::default();
        assert_eq!(side.emoji(), "😐");
        side.expression = "smile".into();
        assert_eq!(side.emoji(), "😊");
        side.expression = "grumpy".into();
        assert_eq!(side.emoji(), "💬");
    }
}
