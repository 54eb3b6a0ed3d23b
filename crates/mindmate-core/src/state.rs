//! UI-agnostic conversation types
//!
//! These are shared between front ends (the terminal UI today) and never
//! depend on a specific UI framework.

use serde::{Deserialize, Serialize};

/// Who a line in the conversation belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sender {
    You,
    MindMate,
    System,
}

impl Sender {
    pub fn label(&self) -> &'static str {
        match self {
            Sender::You => "You",
            Sender::MindMate => "MindMate",
            Sender::System => "System",
        }
    }
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender: Sender,
    pub text: String,
    pub speakable: bool,
}

impl Message {
    pub fn new(sender: Sender, text: impl Into<String>, speakable: bool) -> Self {
        Self {
            sender,
            text: text.into(),
            speakable,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Sender::You, text, false)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Sender::MindMate, text, true)
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Sender::System, text, false)
    }
}

/// Role of a history entry as the server writes it into the page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryRole {
    User,
    Model,
}

/// One entry of the `initialHistory` array supplied with the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: HistoryRole,
    pub text: String,
}

impl From<&HistoryEntry> for Message {
    fn from(entry: &HistoryEntry) -> Self {
        match entry.role {
            HistoryRole::User => Message::user(entry.text.clone()),
            HistoryRole::Model => Message::assistant(entry.text.clone()),
        }
    }
}
