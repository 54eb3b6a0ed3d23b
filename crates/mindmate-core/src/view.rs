//! The seam between conversation logic and whatever draws it.

use crate::mode::ChatMode;
use crate::state::{Message, Sender};

/// A message as it reaches the view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedLine {
    pub sender: Sender,
    /// Display text with markup characters escaped
    pub text: String,
    /// Exact original text to synthesize when the user asks to listen
    pub listen: Option<String>,
}

impl RenderedLine {
    pub fn is_speakable(&self) -> bool {
        self.listen.is_some()
    }
}

/// Everything the client can ask a view to do
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewUpdate {
    Render(RenderedLine),
    Clear,
    ModeActive(ChatMode),
    Recording(bool),
    SetInput(String),
}

/// Receives view updates. Implementations must not block.
pub trait ViewPort: Send + Sync {
    fn update(&self, update: ViewUpdate);

    fn render(&self, line: RenderedLine) {
        self.update(ViewUpdate::Render(line));
    }

    fn clear(&self) {
        self.update(ViewUpdate::Clear);
    }

    fn set_mode_active(&self, mode: ChatMode) {
        self.update(ViewUpdate::ModeActive(mode));
    }

    fn set_recording(&self, recording: bool) {
        self.update(ViewUpdate::Recording(recording));
    }

    fn set_input(&self, text: &str) {
        self.update(ViewUpdate::SetInput(text.to_string()));
    }
}

/// Escape `<` and `>` and drop control characters other than newline and tab.
pub fn escape_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\n' | '\t' => out.push(c),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}

/// Build the line for a message. Only assistant lines can be listened to.
pub fn render_message(message: &Message) -> RenderedLine {
    let listen = (message.speakable && message.sender == Sender::MindMate)
        .then(|| message.text.clone());

    RenderedLine {
        sender: message.sender,
        text: escape_markup(&message.text),
        listen,
    }
}
