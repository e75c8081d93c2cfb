use thiserror::Error;

use crate::structs::CallType;
use crate::transport::TransportError;

/// Steam API Errors.
#[derive(Debug, Error)]
pub enum SteamError {
    /// The service refused to hand out an RSA key for the account, or the key it sent was malformed.
    #[error("{0}")]
    Key(String),
    /// The password could not be encrypted. Usually the key was never fetched.
    #[error("{0}")]
    Encrypt(String),

    /// The credentials were rejected, or the OAuth document was unusable.
    #[error("{0}")]
    AuthFailed(String),
    /// The account is protected by Steam Guard. Resubmit with the emailed code.
    #[error("{0}")]
    GuardRequired(String),
    /// The service wants a captcha answered. Resubmit with the captcha text.
    #[error("{0}")]
    CaptchaRequired(String),

    /// The web presence logon was refused.
    #[error("{0}")]
    Logon(String),
    /// The presence session expired on the server side ("Not Logged On").
    #[error("Logon session expired")]
    LogonExpired,
    /// Re-establishing an expired presence session failed.
    #[error("{0}")]
    RelogonFailed(String),
    /// The presence logoff was refused.
    #[error("{0}")]
    Logoff(String),

    /// A chat message could not be delivered.
    #[error("{0}")]
    Message(String),
    /// The long poll returned an error, or a timeout lower than requested.
    #[error("{0}")]
    Poll(String),

    /// A pending friend request could not be answered.
    #[error("{0}")]
    FriendAccept(String),
    /// The friend invite was rejected.
    #[error("{0}")]
    FriendAdd(String),
    /// The friend could not be removed.
    #[error("{0}")]
    FriendRemove(String),

    /// The response body was not valid JSON.
    #[error("Parser: {0}")]
    Parse(String),

    /// The request never produced a usable response.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// The error every operation of [`Client`](crate::Client) fails with.
///
/// Displays as `"<operation>: <reason>"`, e.g. `"Polling: Timeout of 10 too low"`.
#[derive(Debug, Error)]
#[error("{call}: {kind}")]
pub struct ApiError {
    /// The operation that failed.
    pub call: CallType,
    /// Why it failed.
    pub kind: SteamError,
}

impl ApiError {
    pub fn new(call: CallType, kind: SteamError) -> Self {
        Self { call, kind }
    }

    /// Whether a fresh authentication attempt with a Steam Guard code may succeed.
    pub fn is_guard_required(&self) -> bool {
        matches!(self.kind, SteamError::GuardRequired(_))
    }

    /// Whether a fresh authentication attempt with a captcha answer may succeed.
    pub fn is_captcha_required(&self) -> bool {
        matches!(self.kind, SteamError::CaptchaRequired(_))
    }
}
