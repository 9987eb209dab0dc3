use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph},
};
use lars_core::{Sender, SessionState, Snapshot, Utterance};
use crate::app::App;

const TITLE: &str = " Chatbot Lars ";
const INPUT_PLACEHOLDER: &str = "Chat met chatbot Lars!";
const SECRET_PLACEHOLDER: &str = "Voer eerst het wachtwoord in...";
const SEND_LABEL: &str = "Verstuur";
const SEND_WIDTH: u16 = 12;

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut rest = text;

    while let Some(start) = rest.find("**") {
        let after = &rest[start + 2..];
        let Some(len) = after.find("**") else {
            break;
        };

        if start > 0 {
            spans.push(Span::raw(rest[..start].to_string()));
        }
        if len > 0 {
            spans.push(Span::styled(
                after[..len].to_string(),
                Style::default().add_modifier(Modifier::BOLD),
            ));
        } else {
            spans.push(Span::raw("****"));
        }
        rest = &after[len + 2..];
    }

    if !rest.is_empty() {
        spans.push(Span::raw(rest.to_string()));
    }

    Line::from(spans)
}

/// Wrap text to fit within a given width, returning multiple lines.
///
/// Breaks on word boundaries, keeps explicit newlines, and splits words
/// longer than the width.
fn wrap_text_to_width(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_string()];
    }

    let mut lines = Vec::new();

    for paragraph in text.lines() {
        let mut current_line = String::new();
        let mut current_len = 0;

        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();

            // Hard-split anything that can never fit on one line
            while word.len() > width {
                if current_len > 0 {
                    lines.push(std::mem::take(&mut current_line));
                    current_len = 0;
                }
                let tail = word.split_off(width);
                lines.push(word.into_iter().collect());
                word = tail;
            }

            let word_len = word.len();
            if word_len == 0 {
                continue;
            }

            if current_len == 0 {
                current_line = word.into_iter().collect();
                current_len = word_len;
            } else if current_len + 1 + word_len <= width {
                current_line.push(' ');
                current_line.extend(word);
                current_len += 1 + word_len;
            } else {
                lines.push(std::mem::take(&mut current_line));
                current_line = word.into_iter().collect();
                current_len = word_len;
            }
        }

        lines.push(current_line);
    }

    if lines.is_empty() {
        lines.push(String::new());
    }

    lines
}

/// Bubble width for a chat pane of `width` columns
fn bubble_width(width: u16) -> usize {
    let width = width as usize;
    (width * 3 / 4).max(10).min(width.max(1))
}

/// Build the chat pane lines: user bubbles on the left, bot bubbles on the right.
///
/// While a reply is pending the last bot bubble is the placeholder and gets
/// an animated ellipsis.
fn chat_lines(snapshot: &Snapshot, width: u16, animation_frame: u8) -> Vec<Line<'static>> {
    let utterances: Vec<Utterance> = snapshot.utterances();
    let text_width = bubble_width(width).saturating_sub(2).max(1);
    let busy = snapshot.is_busy();
    let last_bot = utterances.iter().rposition(|u| u.sender == Sender::Bot);

    let mut lines = Vec::new();

    for (idx, utterance) in utterances.iter().enumerate() {
        let (label, label_style, bubble_style, alignment) = match utterance.sender {
            Sender::User => (
                "Jij",
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                Style::default().fg(Color::Black).bg(Color::Cyan),
                Alignment::Left,
            ),
            Sender::Bot => (
                "Lars",
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                Style::default().fg(Color::Black).bg(Color::Yellow),
                Alignment::Right,
            ),
        };

        lines.push(Line::from(Span::styled(label, label_style)).alignment(alignment));

        let pending = busy && Some(idx) == last_bot;
        if pending {
            let dots = ".".repeat(animation_frame as usize + 1);
            let text = format!(" {}{} ", utterance.text.trim_end_matches('.'), dots);
            lines.push(
                Line::from(Span::styled(
                    text,
                    Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
                ))
                .alignment(alignment),
            );
        } else {
            for wrapped in wrap_text_to_width(&utterance.text, text_width) {
                let mut spans = vec![Span::raw(" ")];
                match utterance.sender {
                    Sender::Bot => spans.extend(parse_markdown_line(&wrapped).spans),
                    Sender::User => spans.push(Span::raw(wrapped)),
                }
                spans.push(Span::raw(" "));
                lines.push(Line::from(spans).style(bubble_style).alignment(alignment));
            }
        }

        lines.push(Line::default());
    }

    lines
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, chat, input, footer
    let [header_area, chat_area, input_row, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(3),
        Constraint::Length(1),
    ])
    .areas(area);

    let snapshot = app.snapshot();

    render_header(app, frame, header_area);
    render_chat(app, &snapshot, frame, chat_area);
    render_input(app, &snapshot, frame, input_row);
    render_footer(app, &snapshot, frame, footer_area);
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let backend_label = match (&app.provider, &app.model) {
        (Some(provider), Some(model)) => format!(" {}: {} ", provider.display_name(), model),
        _ => " scripted ".to_string(),
    };

    let title = Line::from(vec![
        Span::styled(TITLE, Style::default().fg(Color::Cyan).bold()),
        Span::styled(backend_label, Style::default().fg(Color::Gray)),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_chat(app: &mut App, snapshot: &Snapshot, frame: &mut Frame, area: Rect) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" Gesprek ");

    let inner = block.inner(area);
    let lines = chat_lines(snapshot, inner.width, app.animation_frame);

    // Store layout for scrolling and mouse hit-testing
    app.chat_area = Some(area);
    app.chat_height = inner.height;
    app.chat_total_lines = u16::try_from(lines.len()).unwrap_or(u16::MAX);

    let chat = Paragraph::new(Text::from(lines))
        .block(block)
        .scroll((app.effective_scroll(), 0));

    frame.render_widget(chat, area);
}

fn render_input(app: &mut App, snapshot: &Snapshot, frame: &mut Frame, area: Rect) {
    let [input_area, send_area] = Layout::horizontal([
        Constraint::Min(0),
        Constraint::Length(SEND_WIDTH),
    ])
    .areas(area);

    app.send_area = Some(send_area);

    let busy = snapshot.is_busy();
    let border_color = if busy { Color::DarkGray } else { Color::Yellow };
    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color));

    // Calculate visible portion of input with horizontal scrolling
    let inner_width = input_area.width.saturating_sub(2) as usize;
    let cursor_pos = app.input_cursor;
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor_pos >= inner_width {
        cursor_pos - inner_width + 1
    } else {
        0
    };

    let input = if app.input.is_empty() {
        let placeholder = if snapshot.state == SessionState::AwaitingSecret {
            SECRET_PLACEHOLDER
        } else {
            INPUT_PLACEHOLDER
        };
        Paragraph::new(Span::styled(placeholder, Style::default().fg(Color::DarkGray)))
    } else {
        let visible_text: String = app.input
            .chars()
            .skip(scroll_offset)
            .take(inner_width)
            .collect();
        Paragraph::new(visible_text).style(Style::default().fg(Color::Cyan))
    };

    frame.render_widget(input.block(input_block), input_area);

    let send_style = if busy {
        Style::default().fg(Color::DarkGray)
    } else {
        Style::default().fg(Color::Black).bg(Color::Yellow).bold()
    };
    let send = Paragraph::new(Span::styled(SEND_LABEL, send_style))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).border_style(Style::default().fg(border_color)));
    frame.render_widget(send, send_area);

    if input_area.width > 2 {
        let cursor_x = u16::try_from(cursor_pos - scroll_offset).unwrap_or(0);
        frame.set_cursor_position((input_area.x + cursor_x + 1, input_area.y + 1));
    }
}

fn render_footer(app: &App, snapshot: &Snapshot, frame: &mut Frame, area: Rect) {
    let (state_style, state_text) = match snapshot.state {
        SessionState::AwaitingSecret => (Style::default().bg(Color::Magenta).fg(Color::White), " WACHTWOORD "),
        SessionState::Busy => (Style::default().bg(Color::Yellow).fg(Color::Black), " BEZIG "),
        SessionState::Failed => (Style::default().bg(Color::Red).fg(Color::White), " FOUT "),
        SessionState::Idle | SessionState::Ready => (Style::default().bg(Color::Blue).fg(Color::White), " KLAAR "),
    };

    let detail = match (&app.notice, &snapshot.last_error) {
        (Some(notice), _) => Span::styled(format!(" {}", notice), Style::default().fg(Color::Yellow)),
        (None, Some(error)) if snapshot.state == SessionState::Failed => {
            Span::styled(format!(" {}", error), Style::default().fg(Color::Red))
        }
        _ => Span::styled(
            " Enter: verstuur  ↑/↓ PgUp/PgDn: scroll  Esc: afsluiten",
            Style::default().fg(Color::DarkGray),
        ),
    };

    let footer = Paragraph::new(Line::from(vec![Span::styled(state_text, state_style), detail]));
    frame.render_widget(footer, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use lars_core::{ChatMode, ChatSession, Conversation, Script};
    use ratatui::{backend::TestBackend, buffer::Buffer, Terminal};

    fn create_test_terminal(width: u16, height: u16) -> Terminal<TestBackend> {
        let backend = TestBackend::new(width, height);
        Terminal::new(backend).unwrap()
    }

    fn buffer_rows(buffer: &Buffer) -> Vec<String> {
        let width = buffer.area.width as usize;
        buffer
            .content()
            .chunks(width)
            .map(|row| row.iter().map(|cell| cell.symbol()).collect())
            .collect()
    }

    fn draw(app: &mut App, width: u16, height: u16) -> Vec<String> {
        let mut terminal = create_test_terminal(width, height);
        terminal.draw(|frame| render(app, frame)).unwrap();
        buffer_rows(terminal.backend().buffer())
    }

    fn app(mode: ChatMode) -> App {
        App::new(ChatSession::new(Conversation::new(mode), None))
    }

    #[test]
    fn test_wrap_text_basic() {
        assert_eq!(
            wrap_text_to_width("een twee drie vier", 9),
            vec!["een twee", "drie vier"]
        );
    }

    #[test]
    fn test_wrap_text_keeps_newlines_and_splits_long_words() {
        assert_eq!(wrap_text_to_width("ab\ncd", 10), vec!["ab", "cd"]);
        assert_eq!(wrap_text_to_width("abcdefgh", 3), vec!["abc", "def", "gh"]);
        assert_eq!(wrap_text_to_width("", 5), vec![""]);
    }

    #[test]
    fn test_markdown_bold() {
        let line = parse_markdown_line("dit is **vet** toch");
        assert_eq!(line.spans.len(), 3);
        assert_eq!(line.spans[1].content, "vet");
        assert!(line.spans[1].style.add_modifier.contains(Modifier::BOLD));

        let unclosed = parse_markdown_line("**open");
        assert_eq!(unclosed.spans.len(), 1);
        assert_eq!(unclosed.spans[0].content, "**open");
    }

    #[test]
    fn test_chat_lines_alignment() {
        let snapshot = Snapshot {
            user_messages: vec!["hoi".to_string()],
            ..Conversation::new(ChatMode::Scripted).snapshot()
        };
        let lines = chat_lines(&snapshot, 40, 0);

        // greeting label, greeting text..., blank, user label, user text, blank
        assert_eq!(lines[0].alignment, Some(Alignment::Right));
        let user_label = lines
            .iter()
            .position(|l| l.spans.first().is_some_and(|s| s.content == "Jij"))
            .expect("user label");
        assert_eq!(lines[user_label].alignment, Some(Alignment::Left));
        assert_eq!(lines.last(), Some(&Line::default()));
    }

    #[test]
    fn test_renders_greeting_and_placeholder() {
        let mut app = app(ChatMode::Open);
        let rows = draw(&mut app, 100, 20).join("\n");

        assert!(rows.contains("Chatbot Lars"));
        assert!(rows.contains("Hallo! Ik ben Lars"));
        assert!(rows.contains(INPUT_PLACEHOLDER));
        assert!(rows.contains(SEND_LABEL));
        assert!(app.send_area.is_some());
        assert!(app.chat_area.is_some());
    }

    #[test]
    fn test_secret_placeholder_when_gated() {
        let mut app = app(ChatMode::Gated {
            secret: "OPEN".to_string(),
        });
        let rows = draw(&mut app, 100, 20).join("\n");
        assert!(rows.contains(SECRET_PLACEHOLDER));
        assert!(rows.contains("WACHTWOORD"));
    }

    #[tokio::test]
    async fn test_user_left_bot_right() {
        let mut app = app(ChatMode::Scripted);
        app.input = "hoi".to_string();
        app.submit_input();

        let rows = draw(&mut app, 80, 24);
        let reply = Script::default().scripted_reply;

        let user_row = rows.iter().find(|r| r.contains(" hoi ")).expect("user bubble");
        let bot_row = rows
            .iter()
            .find(|r| r.contains(reply.as_str()))
            .expect("bot bubble");

        let user_col = user_row.find("hoi").unwrap_or(usize::MAX);
        let bot_col = bot_row.find(reply.as_str()).unwrap_or(0);
        assert!(user_col < 10, "user bubble should hug the left edge");
        assert!(bot_col > user_col, "bot bubble should sit to the right");
        assert!(bot_row.trim_end_matches('│').trim_end().ends_with(reply.as_str()));
    }

    #[tokio::test]
    async fn test_failure_shown_in_footer() {
        let mut app = app(ChatMode::Open);
        app.input = "hoi".to_string();
        app.submit_input();

        let rows = draw(&mut app, 120, 20).join("\n");
        assert!(rows.contains("FOUT"));
        assert!(rows.contains("no completion client configured"));
    }

    #[test]
    fn test_tiny_terminal_does_not_panic() {
        let mut app = app(ChatMode::Open);
        draw(&mut app, 10, 4);
    }

    #[test]
    fn test_long_chat_follows_bottom() {
        let mut conversation = Conversation::new(ChatMode::Scripted);
        for i in 0..20 {
            conversation.submit(format!("bericht {}", i));
        }
        let mut app = App::new(ChatSession::new(conversation, None));

        let rows = draw(&mut app, 60, 16).join("\n");
        assert!(app.chat_total_lines > app.chat_height);
        assert!(rows.contains("bericht 19"));
        assert!(!rows.contains("Hallo! Ik ben Lars"));
    }
}
