use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::json;

/// Online status of a profile, as reported in `personastate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PersonaState {
    #[default]
    Offline,
    Online,
    Busy,
    Away,
    Snooze,
    LookingToTrade,
    LookingToPlay,
    /// A code this client does not know about.
    Other(i64),
}

impl PersonaState {
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Self::Offline,
            1 => Self::Online,
            2 => Self::Busy,
            3 => Self::Away,
            4 => Self::Snooze,
            5 => Self::LookingToTrade,
            6 => Self::LookingToPlay,
            other => Self::Other(other),
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::Offline => 0,
            Self::Online => 1,
            Self::Busy => 2,
            Self::Away => 3,
            Self::Snooze => 4,
            Self::LookingToTrade => 5,
            Self::LookingToPlay => 6,
            Self::Other(code) => code,
        }
    }
}

/// How a profile relates to us in the friends list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Relation {
    #[default]
    None,
    Friend,
    Ignored,
}

impl Relation {
    /// Parses the `relationship` field of a friends list entry.
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case("friend") {
            Self::Friend
        } else if name.eq_ignore_ascii_case("ignoredfriend") {
            Self::Ignored
        } else {
            Self::None
        }
    }
}

/// A profile, as far as we know it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendSummary {
    pub steamid: String,
    pub nick: Option<String>,
    pub fullname: Option<String>,
    /// Game currently being played.
    pub game: Option<String>,
    /// Address of the game server being played on.
    pub server: Option<String>,
    pub state: PersonaState,
    pub relation: Relation,
    /// Relationship change code from a poll event.
    pub action: i64,
}

impl FriendSummary {
    pub fn new(steamid: impl Into<String>) -> Self {
        Self {
            steamid: steamid.into(),
            ..Self::default()
        }
    }

    /// Copies the profile fields of a `GetUserSummaries` player entry.
    pub fn update_from(&mut self, player: &Value) {
        self.game = json::get_str(player, "gameextrainfo").map(str::to_string);
        self.server = json::get_str(player, "gameserverip").map(str::to_string);
        self.nick = json::get_str(player, "personaname").map(str::to_string);
        self.fullname = json::get_str(player, "realname").map(str::to_string);
        self.state = PersonaState::from_code(json::get_int(player, "personastate").unwrap_or(0));
    }
}

/// Index of a summary inside a [`SummaryArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SummaryKey(pub(crate) usize);

/// Storage for the summaries produced by one request.
///
/// Result lists and the pending-enrichment list both refer to summaries by
/// key, so enriching a summary updates every place it appears.
#[derive(Debug, Default)]
pub struct SummaryArena {
    slots: Vec<FriendSummary>,
}

impl SummaryArena {
    pub fn insert(&mut self, summary: FriendSummary) -> SummaryKey {
        self.slots.push(summary);
        SummaryKey(self.slots.len() - 1)
    }

    pub fn get(&self, key: SummaryKey) -> Option<&FriendSummary> {
        self.slots.get(key.0)
    }

    pub fn get_mut(&mut self, key: SummaryKey) -> Option<&mut FriendSummary> {
        self.slots.get_mut(key.0)
    }

    /// Clones a summary out of the arena. Unknown keys yield an empty summary.
    pub fn resolve(&self, key: SummaryKey) -> FriendSummary {
        self.get(key).cloned().unwrap_or_default()
    }
}
