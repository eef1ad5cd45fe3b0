use ratatui::{
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Wrap},
    Frame,
};
use unicode_width::UnicodeWidthStr;

use crate::core::session::SessionState;
use crate::ui::app::ChatView;
use crate::ui::scroll::ScrollCalculator;

const SIDE_PANEL_WIDTH: u16 = 32;

pub fn ui(f: &mut Frame, view: &ChatView) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(20), Constraint::Length(SIDE_PANEL_WIDTH)])
        .split(f.area());

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(3)])
        .split(columns[0]);

    let lines = ScrollCalculator::build_display_lines(&view.transcript, &view.user_label);
    let available_height = chunks[0].height.saturating_sub(1);
    let total_lines = ScrollCalculator::calculate_wrapped_line_count(&lines, chunks[0].width);
    let bottom = ScrollCalculator::calculate_scroll_to_bottom(total_lines, available_height);
    let scroll_offset = bottom.saturating_sub(view.scroll_from_bottom);

    let title = format!(
        "Ema v{} - {} • {}",
        env!("CARGO_PKG_VERSION"),
        view.backend_name,
        view.state
    );
    let messages_paragraph = Paragraph::new(lines)
        .block(Block::default().title(title))
        .wrap(Wrap { trim: true })
        .scroll((scroll_offset, 0));
    f.render_widget(messages_paragraph, chunks[0]);

    let input_title = match (&view.status, view.busy) {
        (Some(status), _) => format!("{status} (Enter to send, Ctrl+C to quit)"),
        (None, true) => "Replying... (Esc to stop, Ctrl+C to quit)".to_string(),
        (None, false) => {
            "Type your message (Enter to send, Tab to switch backend, Ctrl+L to clear)".to_string()
        }
    };
    let input_style = if view.busy {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default().fg(Color::Cyan)
    };
    let input = Paragraph::new(view.input.as_str())
        .style(input_style)
        .block(Block::default().borders(Borders::ALL).title(input_title));
    f.render_widget(input, chunks[1]);

    let inner_width = chunks[1].width.saturating_sub(2);
    let typed = u16::try_from(view.input.width()).unwrap_or(u16::MAX);
    if view.state != SessionState::Streaming && typed < inner_width {
        f.set_cursor_position((chunks[1].x + 1 + typed, chunks[1].y + 1));
    }

    f.render_widget(side_panel(view), columns[1]);
}

fn side_panel(view: &ChatView) -> Paragraph<'static> {
    let label = Style::default().fg(Color::DarkGray);
    let value = Style::default().add_modifier(Modifier::BOLD);
    let row = |name: &str, text: String| {
        Line::from(vec![
            Span::styled(format!("{name}: "), label),
            Span::styled(text, value),
        ])
    };

    let lines = vec![
        Line::from(Span::styled(
            format!("{}  Ema", view.side_channel.emoji()),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        row("Backend", format!("{} ({})", view.backend_name, view.backend_key)),
        row("Expression", view.side_channel.expression.clone()),
        row("Action", view.side_channel.action.clone()),
        Line::from(""),
        row("Avatar", view.avatar_path().display().to_string()),
        row("You", view.user_avatar_path().display().to_string()),
    ];

    Paragraph::new(lines)
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::LEFT).title("Companion"))
}
