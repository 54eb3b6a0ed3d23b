use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Wrap},
};
use mindmate_core::{ChatMode, Sender};
use crate::app::{App, InputMode};

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.chars().peekable();
    let mut current_text = String::new();

    while let Some(c) = chars.next() {
        if c == '*' && chars.peek() == Some(&'*') {
            // Consume the second *
            chars.next();

            // Find closing **
            let mut bold_text = String::new();
            let mut found_close = false;
            while let Some(c) = chars.next() {
                if c == '*' && chars.peek() == Some(&'*') {
                    chars.next();
                    found_close = true;
                    break;
                }
                bold_text.push(c);
            }

            if found_close && !bold_text.is_empty() {
                if !current_text.is_empty() {
                    spans.push(Span::raw(std::mem::take(&mut current_text)));
                }
                spans.push(Span::styled(
                    bold_text,
                    Style::default().add_modifier(Modifier::BOLD),
                ));
            } else {
                // No closing **, treat as literal
                current_text.push_str("**");
                current_text.push_str(&bold_text);
            }
        } else {
            current_text.push(c);
        }
    }

    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

fn sender_style(sender: Sender) -> Style {
    let color = match sender {
        Sender::You => Color::Cyan,
        Sender::MindMate => Color::Yellow,
        Sender::System => Color::Magenta,
    };
    Style::default().fg(color).add_modifier(Modifier::BOLD)
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, chat, input, footer
    let [header_area, chat_area, input_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);
    render_chat(app, frame, chat_area);
    render_input(app, frame, input_area);
    render_footer(app, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let mut spans = vec![
        Span::styled(" MindMate ", Style::default().fg(Color::Cyan).bold()),
    ];

    // Mode selectors, the active one highlighted
    for (i, mode) in ChatMode::all().into_iter().enumerate() {
        let style = if app.mode == mode {
            Style::default().bg(Color::Cyan).fg(Color::Black).add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::White)
        };
        spans.push(Span::raw(" "));
        spans.push(Span::styled(format!(" F{} {} ", i + 1, mode.display_name()), style));
    }

    if app.recording {
        // Blinks on every tick
        let style = if app.animation_frame == 0 {
            Style::default().fg(Color::White).bg(Color::Red).bold()
        } else {
            Style::default().fg(Color::Red).bold()
        };
        spans.push(Span::raw("  "));
        spans.push(Span::styled(" ● REC ", style));
    }

    spans.push(Span::raw(" "));
    spans.push(Span::styled(
        format!("v{}", env!("CARGO_PKG_VERSION")),
        Style::default().fg(Color::DarkGray),
    ));

    let header = Paragraph::new(Line::from(spans)).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_chat(app: &mut App, frame: &mut Frame, area: Rect) {
    // Store chat area for mouse hit-testing and its inner size for scroll calculations
    app.chat_area = Some(area);
    app.chat_height = area.height.saturating_sub(2);
    app.chat_width = area.width.saturating_sub(2);

    let focused = app.input_mode == InputMode::Normal;
    let border_color = if focused { Color::Cyan } else { Color::DarkGray };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(format!(" {} · {} ", app.mode.display_name(), app.server_url));

    let text = if app.lines.is_empty() {
        Text::from(Span::styled(
            "Connecting to MindMate...",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        let mut lines: Vec<Line> = Vec::new();

        for (i, line) in app.lines.iter().enumerate() {
            let mut label = vec![Span::styled(format!("{}:", line.sender.label()), sender_style(line.sender))];
            if line.is_speakable() {
                let marker_style = if app.selected == Some(i) {
                    Style::default().bg(Color::Yellow).fg(Color::Black)
                } else {
                    Style::default().fg(Color::DarkGray)
                };
                label.push(Span::raw(" "));
                label.push(Span::styled(" ♪ listen ", marker_style));
            }
            lines.push(Line::from(label));

            match line.sender {
                Sender::MindMate => {
                    for text_line in line.text.lines() {
                        lines.push(parse_markdown_line(text_line));
                    }
                }
                Sender::System => {
                    for text_line in line.text.lines() {
                        lines.push(Line::from(Span::styled(
                            text_line.to_string(),
                            Style::default().fg(Color::Magenta).add_modifier(Modifier::ITALIC),
                        )));
                    }
                }
                Sender::You => {
                    for text_line in line.text.lines() {
                        lines.push(Line::from(text_line.to_string()));
                    }
                }
            }
            lines.push(Line::default());
        }

        Text::from(lines)
    };

    let chat = Paragraph::new(text)
        .block(block)
        .wrap(Wrap { trim: true })
        .scroll((app.scroll, 0));

    frame.render_widget(chat, area);
}

fn render_input(app: &App, frame: &mut Frame, area: Rect) {
    let editing = app.input_mode == InputMode::Editing;
    let border_color = if app.recording {
        Color::Red
    } else if editing {
        Color::Yellow
    } else {
        Color::DarkGray
    };

    let title = if app.recording {
        " Recording... (Ctrl+R to stop) "
    } else {
        " Message "
    };
    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title);

    // Inner width = total width - 2 (for borders)
    let inner_width = area.width.saturating_sub(2) as usize;
    let cursor_pos = app.cursor;

    // Scroll horizontally to keep the cursor visible
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let visible_text: String = app.input
        .chars()
        .skip(scroll_offset)
        .take(inner_width)
        .collect();

    let input = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);

    frame.render_widget(input, area);

    // Show cursor when editing
    if editing {
        let cursor_x = (cursor_pos - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let mode_span = match app.input_mode {
        InputMode::Normal => Span::styled(" NORMAL ", Style::default().bg(Color::Blue).fg(Color::White)),
        InputMode::Editing => Span::styled(" TYPE ", Style::default().bg(Color::Yellow).fg(Color::Black)),
    };

    let hints: &[(&str, &str)] = match app.input_mode {
        InputMode::Editing => &[
            ("Enter", "send"),
            ("Ctrl+R", "record"),
            ("F1/F2", "mode"),
            ("Esc", "select"),
            ("Ctrl+C", "quit"),
        ],
        InputMode::Normal => &[
            ("j/k", "select"),
            ("Enter", "listen"),
            ("r", "record"),
            ("1/2", "mode"),
            ("R", "refresh"),
            ("i", "type"),
            ("q", "quit"),
        ],
    };

    let mut spans = vec![mode_span, Span::raw(" ")];
    for (key, label) in hints {
        spans.push(Span::styled(format!(" {} ", key), key_style));
        spans.push(Span::styled(format!(" {} ", label), label_style));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use mindmate_core::view::render_message;
    use mindmate_core::{Message, ViewUpdate};
    use ratatui::{backend::TestBackend, Terminal};

    fn line_text(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn test_markdown_bold_spans() {
        let line = parse_markdown_line("Try **deep breathing** today");
        assert_eq!(line.spans.len(), 3);
        assert_eq!(line.spans[1].content, "deep breathing");
        assert!(line.spans[1].style.add_modifier.contains(Modifier::BOLD));
        assert_eq!(line_text(&line), "Try deep breathing today");
    }

    #[test]
    fn test_markdown_unclosed_bold_is_literal() {
        let line = parse_markdown_line("2 ** 3 is eight");
        assert_eq!(line_text(&line), "2 ** 3 is eight");
    }

    #[test]
    fn test_render_draws_conversation() {
        let mut app = App::new(ChatMode::StudyBuddy, "http://localhost:5000".to_string());
        app.apply(ViewUpdate::Render(render_message(&Message::user("What is CBT?"))));
        app.apply(ViewUpdate::Render(render_message(&Message::assistant("A therapy approach."))));

        let mut terminal = Terminal::new(TestBackend::new(80, 20)).unwrap();
        terminal.draw(|f| render(&mut app, f)).unwrap();

        let buffer = terminal.backend().buffer();
        let screen: String = buffer.content().iter().map(|cell| cell.symbol()).collect();
        assert!(screen.contains("What is CBT?"));
        assert!(screen.contains("A therapy approach."));
        assert!(screen.contains("listen"));
        assert!(screen.contains("F1 Mental Health"));
        assert!(screen.contains("F2 Study Buddy"));
        assert_eq!(app.chat_width, 78);
        assert!(app.chat_area.is_some());
    }
}
