use ratatui::layout::Rect;
use mindmate_core::{ChatMode, RenderedLine, ViewUpdate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub mode: ChatMode,
    pub recording: bool,
    pub server_url: String,

    // Conversation
    pub lines: Vec<RenderedLine>,
    pub selected: Option<usize>, // index into lines, speakable lines only

    // Input state
    pub input: String,
    pub cursor: usize, // cursor position in input, in chars

    // Scroll state
    pub scroll: u16,
    pub chat_height: u16, // Height of chat area for scroll calculations
    pub chat_width: u16,  // Width of chat area for wrap calculations

    // Chat area for mouse hit-testing (updated during render)
    pub chat_area: Option<Rect>,

    // Animation state
    pub animation_frame: u8,
}

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

impl App {
    pub fn new(mode: ChatMode, server_url: String) -> Self {
        Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            mode,
            recording: false,
            server_url,

            lines: Vec::new(),
            selected: None,

            input: String::new(),
            cursor: 0,

            scroll: 0,
            chat_height: 0,
            chat_width: 0,

            chat_area: None,

            animation_frame: 0,
        }
    }

    /// Apply an update produced by the chat client
    pub fn apply(&mut self, update: ViewUpdate) {
        match update {
            ViewUpdate::Render(line) => {
                self.lines.push(line);
                self.scroll_to_bottom();
            }
            ViewUpdate::Clear => {
                self.lines.clear();
                self.selected = None;
                self.scroll = 0;
            }
            ViewUpdate::ModeActive(mode) => self.mode = mode,
            ViewUpdate::Recording(recording) => {
                self.recording = recording;
                self.animation_frame = 0;
            }
            ViewUpdate::SetInput(text) => {
                self.cursor = text.chars().count();
                self.input = text;
            }
        }
    }

    // Input editing
    pub fn insert_char(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.input, self.cursor);
        self.input.insert(byte_pos, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_pos = char_to_byte_index(&self.input, self.cursor);
            self.input.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        let char_count = self.input.chars().count();
        if self.cursor < char_count {
            let byte_pos = char_to_byte_index(&self.input, self.cursor);
            self.input.remove(byte_pos);
        }
    }

    pub fn cursor_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn cursor_right(&mut self) {
        let char_count = self.input.chars().count();
        self.cursor = (self.cursor + 1).min(char_count);
    }

    pub fn cursor_home(&mut self) {
        self.cursor = 0;
    }

    pub fn cursor_end(&mut self) {
        self.cursor = self.input.chars().count();
    }

    /// Take the typed text, leaving the input empty
    pub fn take_input(&mut self) -> String {
        self.cursor = 0;
        std::mem::take(&mut self.input)
    }

    // Listen selection (only speakable lines can be selected)
    pub fn select_next_speakable(&mut self) {
        let start = self.selected.map(|i| i + 1).unwrap_or(0);
        if let Some(i) = (start..self.lines.len()).find(|&i| self.lines[i].is_speakable()) {
            self.selected = Some(i);
            self.scroll_to_line(i);
        }
    }

    pub fn select_prev_speakable(&mut self) {
        let end = self.selected.unwrap_or(self.lines.len());
        if let Some(i) = (0..end).rev().find(|&i| self.lines[i].is_speakable()) {
            self.selected = Some(i);
            self.scroll_to_line(i);
        }
    }

    /// Text to synthesize for the selected line, falling back to the latest speakable one
    pub fn listen_text(&self) -> Option<String> {
        match self.selected {
            Some(i) => self.lines.get(i).and_then(|line| line.listen.clone()),
            None => self.lines.iter().rev().find_map(|line| line.listen.clone()),
        }
    }

    pub fn tick_animation(&mut self) {
        if self.recording {
            self.animation_frame = (self.animation_frame + 1) % 2;
        }
    }

    // Scrolling
    fn wrap_width(&self) -> usize {
        // Use actual chat width for wrap calculation, default to 50 if not set
        if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        }
    }

    fn visible_height(&self) -> u16 {
        if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        }
    }

    /// Rendered height of one message: label, wrapped content, blank separator
    fn line_height(&self, line: &RenderedLine) -> u16 {
        let wrap_width = self.wrap_width();
        let mut total: u16 = 1;
        for text_line in line.text.lines() {
            // Use character count, not byte length, for proper UTF-8 handling
            let char_count = text_line.chars().count();
            total = total.saturating_add((char_count / wrap_width + 1) as u16);
        }
        if line.text.is_empty() {
            total += 1;
        }
        total.saturating_add(1)
    }

    pub fn total_lines(&self) -> u16 {
        self.lines
            .iter()
            .fold(0u16, |acc, line| acc.saturating_add(self.line_height(line)))
    }

    fn max_scroll(&self) -> u16 {
        self.total_lines().saturating_sub(self.visible_height())
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll = self.max_scroll();
    }

    fn scroll_to_line(&mut self, index: usize) {
        let top: u16 = self.lines[..index]
            .iter()
            .fold(0u16, |acc, line| acc.saturating_add(self.line_height(line)));
        let bottom = top.saturating_add(self.line_height(&self.lines[index]));
        let height = self.visible_height();

        if top < self.scroll {
            self.scroll = top;
        } else if bottom > self.scroll.saturating_add(height) {
            self.scroll = bottom.saturating_sub(height).min(top);
        }
    }

    pub fn scroll_down(&mut self, amount: u16) {
        self.scroll = self.scroll.saturating_add(amount).min(self.max_scroll());
    }

    pub fn scroll_up(&mut self, amount: u16) {
        self.scroll = self.scroll.saturating_sub(amount);
    }

    pub fn scroll_half_page_down(&mut self) {
        let half = (self.visible_height() / 2).max(1);
        self.scroll_down(half);
    }

    pub fn scroll_half_page_up(&mut self) {
        let half = (self.visible_height() / 2).max(1);
        self.scroll_up(half);
    }
}
