use serde::{Deserialize, Serialize};

use super::summary::FriendSummary;

/// Kind of a chat event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageType {
    /// Plain chat text.
    Text,
    /// `/me` style text.
    Emote,
    LeftConversation,
    /// Friendship changed (request, removal, ...).
    Relationship,
    /// Presence changed.
    State,
    Typing,
}

impl MessageType {
    pub const ALL: [Self; 6] = [
        Self::Text,
        Self::Emote,
        Self::LeftConversation,
        Self::Relationship,
        Self::State,
        Self::Typing,
    ];

    /// Name used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "saytext",
            Self::Emote => "emote",
            Self::LeftConversation => "leftconversation",
            Self::Relationship => "personarelationship",
            Self::State => "personastate",
            Self::Typing => "typing",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(name))
    }
}

/// A chat or event record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub kind: MessageType,
    /// Who it came from, or who it goes to when sending.
    pub summary: FriendSummary,
    pub text: Option<String>,
    pub timestamp: i64,
}

impl Message {
    pub fn new(kind: MessageType, steamid: impl Into<String>) -> Self {
        Self {
            kind,
            summary: FriendSummary::new(steamid),
            text: None,
            timestamp: 0,
        }
    }

    pub fn text(steamid: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::new(MessageType::Text, steamid)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_parse_case_insensitively() {
        assert_eq!(MessageType::from_name("SayText"), Some(MessageType::Text));
        assert_eq!(
            MessageType::from_name("personarelationship"),
            Some(MessageType::Relationship)
        );
        assert_eq!(MessageType::from_name("notatype"), None);

        for kind in MessageType::ALL {
            assert_eq!(MessageType::from_name(kind.as_str()), Some(kind));
        }
    }
}
