use ratatui::{
    style::{Color, Modifier, Style},
    text::{Line, Span},
};
use unicode_width::UnicodeWidthStr;

use crate::core::message::{Message, Role};

/// Builds transcript lines and works out how far they scroll.
pub struct ScrollCalculator;

impl ScrollCalculator {
    pub fn build_display_lines(messages: &[Message], user_label: &str) -> Vec<Line<'static>> {
        let mut lines = Vec::new();
        for msg in messages {
            Self::add_message_lines(&mut lines, msg, user_label);
        }
        lines
    }

    fn add_message_lines(lines: &mut Vec<Line<'static>>, msg: &Message, user_label: &str) {
        match msg.role {
            Role::User => {
                lines.push(Line::from(vec![
                    Span::styled(
                        format!("{user_label}: "),
                        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                    ),
                    Span::styled(msg.content.clone(), Style::default().fg(Color::Cyan)),
                ]));
            }
            Role::Assistant => {
                let title_style = if msg.is_error() {
                    Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
                };
                if let Some(title) = msg.title() {
                    lines.push(Line::from(Span::styled(title.to_string(), title_style)));
                }
                for content_line in msg.content.lines() {
                    lines.push(Line::from(Span::styled(
                        content_line.to_string(),
                        Style::default().fg(Color::White),
                    )));
                }
                if let Some(log) = msg.metadata.as_ref().and_then(|m| m.log.as_deref()) {
                    lines.push(Line::from(Span::styled(
                        log.to_string(),
                        Style::default().fg(Color::DarkGray),
                    )));
                }
            }
        }
        lines.push(Line::from(""));
    }

    /// How many rows `lines` take once word-wrapped to `terminal_width`.
    pub fn calculate_wrapped_line_count(lines: &[Line], terminal_width: u16) -> u16 {
        lines.iter().fold(0u16, |total, line| {
            let text = line.to_string();
            let trimmed = text.trim();
            let rows = if trimmed.is_empty() || terminal_width == 0 {
                1
            } else {
                Self::calculate_word_wrapped_lines(trimmed, terminal_width)
            };
            total.saturating_add(rows)
        })
    }

    fn calculate_word_wrapped_lines(text: &str, terminal_width: u16) -> u16 {
        let width = usize::from(terminal_width);
        let mut current_line_len = 0usize;
        let mut line_count = 1u16;

        for word in text.split_whitespace() {
            let word_len = word.width();
            if current_line_len > 0 && current_line_len + 1 + word_len > width {
                line_count = line_count.saturating_add(1);
                current_line_len = word_len;
            } else {
                if current_line_len > 0 {
                    current_line_len += 1;
                }
                current_line_len += word_len;
            }
            // Words longer than a row spill over onto extra rows.
            while current_line_len > width {
                line_count = line_count.saturating_add(1);
                current_line_len -= width;
            }
        }

        line_count
    }

    /// Offset from the top that shows the last `available_height` rows.
    pub fn calculate_scroll_to_bottom(total_lines: u16, available_height: u16) -> u16 {
        total_lines.saturating_sub(available_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::MessageMetadata;

    #[test]
    fn assistant_bubbles_show_title_and_log() {
        let messages = vec![
            Message::user("hi"),
            Message::assistant("line one\nline two").with_metadata(Some(
                MessageMetadata::titled("💡 Answer").with_log("Model: m"),
            )),
        ];
        let lines = ScrollCalculator::build_display_lines(&messages, "Iris");
        let text: Vec<String> = lines.iter().map(|line| line.to_string()).collect();
        assert_eq!(
            text,
            vec!["Iris: hi", "", "💡 Answer", "line one", "line two", "Model: m", ""]
        );
    }

    #[test]
    fn wrapped_line_count_respects_width() {
        let lines = vec![
            Line::from("aaaa bbbb cccc"),
            Line::from(""),
            Line::from("x"),
        ];
        assert_eq!(ScrollCalculator::calculate_wrapped_line_count(&lines, 9), 4);
        assert_eq!(ScrollCalculator::calculate_wrapped_line_count(&lines, 40), 3);
        assert_eq!(ScrollCalculator::calculate_wrapped_line_count(&lines, 0), 3);
    }

    #[test]
    fn long_words_spill_over() {
        assert_eq!(ScrollCalculator::calculate_word_wrapped_lines("abcdefghij", 4), 3);
    }

    #[test]
    fn scroll_to_bottom_never_underflows() {
        assert_eq!(ScrollCalculator::calculate_scroll_to_bottom(10, 4), 6);
        assert_eq!(ScrollCalculator::calculate_scroll_to_bottom(3, 4), 0);
    }
}
