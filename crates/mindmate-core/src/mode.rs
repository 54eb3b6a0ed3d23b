use serde::{Deserialize, Serialize};

/// Conversation mode, sent as `chat_type` with every chat request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatMode {
    #[default]
    MentalHealth,
    StudyBuddy,
}

impl ChatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatMode::MentalHealth => "mental_health",
            ChatMode::StudyBuddy => "study_buddy",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "mental_health" | "mental-health" => Some(ChatMode::MentalHealth),
            "study_buddy" | "study-buddy" => Some(ChatMode::StudyBuddy),
            _ => None,
        }
    }

    pub fn all() -> Vec<ChatMode> {
        vec![ChatMode::MentalHealth, ChatMode::StudyBuddy]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ChatMode::MentalHealth => "Mental Health",
            ChatMode::StudyBuddy => "Study Buddy",
        }
    }

    /// System line shown after switching into this mode
    pub fn announcement(&self) -> &'static str {
        match self {
            ChatMode::MentalHealth => {
                "Switched to Mental Health mode. MindMate is here to listen and support you."
            }
            ChatMode::StudyBuddy => {
                "Switched to Study Buddy mode. Ask me anything about your studies!"
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names() {
        assert_eq!(serde_json::to_string(&ChatMode::MentalHealth).unwrap(), "\"mental_health\"");
        assert_eq!(serde_json::to_string(&ChatMode::StudyBuddy).unwrap(), "\"study_buddy\"");
        for mode in ChatMode::all() {
            assert_eq!(ChatMode::from_str(mode.as_str()), Some(mode));
        }
    }

    #[test]
    fn test_from_str_is_lenient_about_case_and_dashes() {
        assert_eq!(ChatMode::from_str("Study-Buddy"), Some(ChatMode::StudyBuddy));
        assert_eq!(ChatMode::from_str(" MENTAL_HEALTH "), Some(ChatMode::MentalHealth));
        assert_eq!(ChatMode::from_str("therapy"), None);
    }

    #[test]
    fn test_announcements_differ_per_mode() {
        assert_ne!(
            ChatMode::MentalHealth.announcement(),
            ChatMode::StudyBuddy.announcement()
        );
    }
}
