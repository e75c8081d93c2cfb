use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use super::batch::PendingSummaries;
use super::message::{Message, MessageType};
use super::summary::{FriendSummary, SummaryArena, SummaryKey};
use crate::errors::{ApiError, SteamError};
use crate::transport::HttpRequest;

/// Every kind of call the client can make.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallType {
    Auth,
    AuthRedirect,
    ChatLog,
    FriendAccept,
    FriendAdd,
    FriendIgnore,
    FriendRemove,
    FriendSearch,
    Friends,
    Key,
    Logon,
    Relogon,
    Logoff,
    Message,
    Poll,
    Summary,
}

impl CallType {
    /// Human readable name, used to prefix errors.
    pub fn label(self) -> &'static str {
        match self {
            Self::Auth => "Authentication",
            Self::AuthRedirect => "Authentication (redirect)",
            Self::ChatLog => "ChatLog",
            Self::FriendAccept => "Friend Acceptance",
            Self::FriendAdd => "Friend Addition",
            Self::FriendIgnore => "Friend Ignore",
            Self::FriendRemove => "Friend Removal",
            Self::FriendSearch => "Friend Search",
            Self::Friends => "Friends",
            Self::Key => "Key",
            Self::Logon => "Logon",
            Self::Relogon => "Relogon",
            Self::Logoff => "Logoff",
            Self::Message => "Message",
            Self::Poll => "Polling",
            Self::Summary => "Summary",
        }
    }
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

bitflags! {
    /// Per-request behaviour switches.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RequestFlags: u8 {
        /// The body is not JSON and must not be parsed.
        const NO_JSON = 1 << 0;
        /// Wait for the outbound queue to be open before sending.
        const QUEUED = 1 << 1;
    }
}

/// What to do after a transport round completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The call is over; hand the result or error to the caller.
    Finish,
    /// `request` was replaced by a follow-up request for the same call.
    Chain,
    /// The presence session expired; log on again and resend `request`.
    Relogon,
}

/// A chat event whose sender lives in the request's summary arena.
#[derive(Debug, Clone)]
pub struct PendingMessage {
    pub kind: MessageType,
    pub summary: SummaryKey,
    pub text: Option<String>,
    pub timestamp: i64,
}

/// Result being built up by a call.
#[derive(Debug, Default)]
pub enum Payload {
    #[default]
    None,
    /// Steam id the call acted on.
    Id(String),
    Summaries(Vec<SummaryKey>),
    Messages(Vec<PendingMessage>),
    Summary(Option<SummaryKey>),
}

/// Finished result of a call, detached from its arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    None,
    Id(String),
    Summaries(Vec<FriendSummary>),
    Messages(Vec<Message>),
    Summary(Option<FriendSummary>),
}

impl Reply {
    pub fn into_id(self) -> String {
        match self {
            Self::Id(id) => id,
            _ => String::new(),
        }
    }

    pub fn into_summaries(self) -> Vec<FriendSummary> {
        match self {
            Self::Summaries(summaries) => summaries,
            _ => Vec::new(),
        }
    }

    pub fn into_messages(self) -> Vec<Message> {
        match self {
            Self::Messages(messages) => messages,
            _ => Vec::new(),
        }
    }

    pub fn into_summary(self) -> Option<FriendSummary> {
        match self {
            Self::Summary(summary) => summary,
            _ => None,
        }
    }
}

/// One logical call, possibly spanning several transport rounds.
#[derive(Debug)]
pub struct RequestContext {
    pub call: CallType,
    pub flags: RequestFlags,
    /// The request of the current round. Resends reuse it unchanged.
    pub request: HttpRequest,
    pub payload: Payload,
    pub arena: SummaryArena,
    pub pending: PendingSummaries,
    pub error: Option<SteamError>,
    /// Transport rounds completed so far.
    pub rounds: u32,
    /// Whether `request` was already resent after a relogon.
    pub resent: bool,
}

impl RequestContext {
    pub fn new(call: CallType, request: HttpRequest) -> Self {
        Self {
            call,
            flags: RequestFlags::QUEUED,
            request,
            payload: Payload::None,
            arena: SummaryArena::default(),
            pending: PendingSummaries::default(),
            error: None,
            rounds: 0,
            resent: false,
        }
    }

    pub fn with_flags(mut self, flags: RequestFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// Records an error. The first one wins.
    pub fn fail(&mut self, error: SteamError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    /// Adds a summary stub to the arena and queues it for enrichment.
    pub fn add_pending(&mut self, summary: FriendSummary) -> SummaryKey {
        let key = self.arena.insert(summary);
        self.pending.push(key);
        key
    }

    /// Turns the context into what the caller sees.
    pub fn finish(self) -> Result<Reply, ApiError> {
        if let Some(error) = self.error {
            return Err(ApiError::new(self.call, error));
        }

        let arena = &self.arena;
        let reply = match self.payload {
            Payload::None => Reply::None,
            Payload::Id(id) => Reply::Id(id),
            Payload::Summaries(keys) => {
                Reply::Summaries(keys.into_iter().map(|key| arena.resolve(key)).collect())
            }
            Payload::Messages(pending) => Reply::Messages(
                pending
                    .into_iter()
                    .map(|message| Message {
                        kind: message.kind,
                        summary: arena.resolve(message.summary),
                        text: message.text,
                        timestamp: message.timestamp,
                    })
                    .collect(),
            ),
            Payload::Summary(key) => Reply::Summary(key.map(|key| arena.resolve(key))),
        };

        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Method;

    fn context(call: CallType) -> RequestContext {
        RequestContext::new(call, HttpRequest::new(Method::Get, "example.com", 443, "/"))
    }

    #[test]
    fn errors_are_prefixed_with_the_call() {
        let mut ctx = context(CallType::Poll);
        ctx.fail(SteamError::Poll("Timeout of 10 too low".to_string()));
        ctx.fail(SteamError::Poll("ignored".to_string()));

        let err = ctx.finish().unwrap_err();
        assert_eq!(err.to_string(), "Polling: Timeout of 10 too low");
    }

    #[test]
    fn finish_resolves_keys_through_the_arena() {
        let mut ctx = context(CallType::Friends);
        let a = ctx.add_pending(FriendSummary::new("1"));
        let b = ctx.add_pending(FriendSummary::new("2"));
        if let Some(summary) = ctx.arena.get_mut(a) {
            summary.nick = Some("first".to_string());
        }
        ctx.payload = Payload::Summaries(vec![a, b]);

        let summaries = ctx.finish().unwrap().into_summaries();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].nick.as_deref(), Some("first"));
        assert_eq!(summaries[1].steamid, "2");
    }
}
