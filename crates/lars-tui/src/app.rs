use lars_core::{ChatSession, Provider, SessionState, Snapshot, SubmitOutcome};
use ratatui::layout::Rect;
use tracing::debug;

pub struct App {
    pub should_quit: bool,
    pub session: ChatSession,

    // Pending input (cleared after every accepted submit)
    pub input: String,
    pub input_cursor: usize, // cursor position in chars, not bytes

    // Chat pane scrolling
    pub chat_scroll: u16,
    pub chat_height: u16,      // inner height, updated during render
    pub chat_total_lines: u16, // wrapped line count, updated during render
    pub follow_bottom: bool,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    /// One-line notice shown in the footer until the next keypress
    pub notice: Option<String>,

    // Labels for the header
    pub provider: Option<Provider>,
    pub model: Option<String>,

    // Panel areas for mouse hit-testing (updated during render)
    pub chat_area: Option<Rect>,
    pub send_area: Option<Rect>,
}

impl App {
    pub fn new(session: ChatSession) -> Self {
        let provider = session.backend().map(|b| b.client.provider());
        let model = session.backend().map(|b| b.model.clone());

        Self {
            should_quit: false,
            session,
            input: String::new(),
            input_cursor: 0,
            chat_scroll: 0,
            chat_height: 0,
            chat_total_lines: 0,
            follow_bottom: true,
            animation_frame: 0,
            notice: None,
            provider,
            model,
            chat_area: None,
            send_area: None,
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.session.snapshot()
    }

    pub fn state(&self) -> SessionState {
        self.session.conversation().state()
    }

    /// Send the pending input to the conversation
    pub fn submit_input(&mut self) {
        if self.input.trim().is_empty() {
            return;
        }

        let outcome = self.session.submit(self.input.clone());
        debug!(accepted = outcome.accepted(), state = self.state().label(), "input submitted");

        match outcome {
            SubmitOutcome::Ignored => {
                self.notice = Some("Lars is nog aan het antwoorden, even geduld...".to_string());
            }
            _ => {
                self.input.clear();
                self.input_cursor = 0;
                self.notice = None;
                self.scroll_to_bottom();
            }
        }
    }

    /// Pick up a finished reply, if there is one
    pub async fn poll_reply(&mut self) {
        if self.session.poll().await {
            self.scroll_to_bottom();
        }
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.session.is_busy() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        } else {
            self.animation_frame = 0;
        }
    }

    pub fn scroll_to_bottom(&mut self) {
        self.follow_bottom = true;
    }

    pub fn max_scroll(&self) -> u16 {
        self.chat_total_lines.saturating_sub(self.chat_height)
    }

    pub fn scroll_up(&mut self, lines: u16) {
        if self.follow_bottom {
            self.chat_scroll = self.max_scroll();
        }
        self.follow_bottom = false;
        self.chat_scroll = self.chat_scroll.saturating_sub(lines);
    }

    pub fn scroll_down(&mut self, lines: u16) {
        if self.follow_bottom {
            return;
        }
        self.chat_scroll = self.chat_scroll.saturating_add(lines);
        if self.chat_scroll >= self.max_scroll() {
            self.scroll_to_bottom();
        }
    }

    /// Scroll offset to render with, given the latest layout
    pub fn effective_scroll(&self) -> u16 {
        if self.follow_bottom {
            self.max_scroll()
        } else {
            self.chat_scroll.min(self.max_scroll())
        }
    }
}
