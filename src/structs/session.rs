use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::auth::{AuthContext, AuthState};

/// Offset between an account id and the 64-bit steam id of an individual account.
pub const STEAMID_OFFSET: u64 = 76_561_197_960_265_728;

/// Converts an account id into its global steam id.
pub const fn to_global(account_id: u64) -> u64 {
    account_id.wrapping_add(STEAMID_OFFSET)
}

/// Converts a global steam id back into its account id.
pub const fn to_account(steamid: u64) -> u64 {
    steamid.wrapping_sub(STEAMID_OFFSET)
}

/// Global 64-bit steam id. Used in every service-facing field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SteamId(pub u64);

impl SteamId {
    pub const fn from_account_id(account_id: u64) -> Self {
        Self(to_global(account_id))
    }

    pub const fn account_id(self) -> u64 {
        to_account(self.0)
    }
}

impl fmt::Display for SteamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SteamId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// State of one logical login.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Our own steam id, once known.
    pub steamid: Option<SteamId>,
    /// The `sessionid` web cookie.
    pub sessid: Option<String>,
    /// OAuth bearer token.
    pub token: Option<String>,
    /// Client chosen chat session nonce.
    pub umqid: String,
    /// Id of the last event seen by the poll loop.
    pub last_message: i64,
    /// Server time of the last logon.
    pub timestamp: i64,
    pub auth: Option<AuthContext>,
    pub auth_state: AuthState,
}

impl Session {
    pub fn new(umqid: impl Into<String>) -> Self {
        Self {
            umqid: umqid.into(),
            ..Self::default()
        }
    }

    /// Starts a session with a random chat nonce.
    pub fn random() -> Self {
        Self::new(rand::random::<u32>().to_string())
    }

    pub fn steamid_str(&self) -> Option<String> {
        self.steamid.map(|id| id.to_string())
    }

    /// Ready means a token, a session cookie and a steam id are all present.
    pub fn is_ready(&self) -> bool {
        self.auth_state == AuthState::Ready
            && self.token.as_deref().is_some_and(|t| !t.is_empty())
            && self.sessid.as_deref().is_some_and(|s| !s.is_empty())
            && self.steamid.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_is_a_bijection() {
        for value in [0, 1, 42, u64::from(u32::MAX), STEAMID_OFFSET, u64::MAX, u64::MAX - 7] {
            assert_eq!(to_global(to_account(value)), value);
            assert_eq!(to_account(to_global(value)), value);
        }
    }

    #[test]
    fn known_steamid() {
        let id: SteamId = "76561197960287930".parse().unwrap();
        assert_eq!(id.account_id(), 22202);
        assert_eq!(SteamId::from_account_id(22202), id);
        assert_eq!(id.to_string(), "76561197960287930");
    }

    #[test]
    fn random_sessions_have_a_nonce() {
        let session = Session::random();
        assert!(session.umqid.parse::<u32>().is_ok());
        assert!(!session.is_ready());
    }
}
