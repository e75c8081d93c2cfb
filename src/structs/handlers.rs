//! Response interpretation, one handler per call type.
//!
//! Handlers only ever update the session or the request context. The two
//! exceptions that lead to more traffic do so by returning a [`Step`]: the
//! login chains into its redirect, and message/poll ask for a relogon.

use serde_json::Value;

use super::client::{Client, PATH_AUTH_REDIRECT, PATH_SUMMARIES, POLL_TIMEOUT};
use super::message::MessageType;
use super::request::{CallType, Payload, PendingMessage, RequestContext, RequestFlags, Step};
use super::session::{SteamId, to_global};
use super::summary::{FriendSummary, Relation};
use crate::auth::{AuthContext, AuthState};
use crate::errors::SteamError;
use crate::json;
use crate::transport::{HttpResponse, Method, Transport, TransportError};

const NOT_LOGGED_ON: &str = "Not Logged On";

impl<T: Transport> Client<T> {
    /// Handles a finished transport round for `ctx`.
    pub(crate) fn complete(
        &self,
        ctx: &mut RequestContext,
        response: Result<HttpResponse, TransportError>,
    ) -> Step {
        let response = match response {
            Ok(response) => response,
            Err(err) => {
                ctx.fail(err.into());
                return Step::Finish;
            }
        };

        let json = if ctx.flags.contains(RequestFlags::NO_JSON) {
            Value::Null
        } else {
            match json::parse(&response.body) {
                Ok(json) => json,
                Err(err) => {
                    ctx.fail(err);
                    return Step::Finish;
                }
            }
        };

        if ctx.pending.awaiting_batch() {
            ctx.pending.resolve(&mut ctx.arena, &json);
        } else {
            let step = self.interpret(ctx, &response, &json);
            if step != Step::Finish {
                return step;
            }
        }

        if ctx.error.is_none() && self.queue_summaries(ctx) {
            return Step::Chain;
        }

        Step::Finish
    }

    /// Replaces the request with the next summary batch, if stubs are waiting.
    fn queue_summaries(&self, ctx: &mut RequestContext) -> bool {
        if ctx.pending.is_empty() {
            return false;
        }

        let Some(batch) = ctx.pending.next_batch(&ctx.arena) else {
            return false;
        };

        tracing::trace!(call = %ctx.call, batch = batch.len(), waiting = ctx.pending.len(), "fetching summaries");

        let token = self.session.lock().token.clone();
        let steamids = batch.join(",");

        ctx.request = self
            .api_request(Method::Get, PATH_SUMMARIES)
            .param("access_token", token.as_deref())
            .param("steamids", Some(&steamids));
        ctx.flags = RequestFlags::QUEUED;
        true
    }

    fn interpret(&self, ctx: &mut RequestContext, response: &HttpResponse, json: &Value) -> Step {
        match ctx.call {
            CallType::Auth => return self.on_auth(ctx, json),
            CallType::AuthRedirect => self.on_auth_redirect(ctx),
            CallType::ChatLog => self.on_chat_log(ctx, json),
            CallType::FriendAccept => on_friend_accept(ctx, json),
            CallType::FriendAdd => on_friend_add(ctx, json),
            CallType::FriendIgnore => {}
            CallType::FriendRemove => on_friend_remove(ctx, &response.body),
            CallType::FriendSearch => on_friend_search(ctx, json),
            CallType::Friends => on_friends(ctx, json),
            CallType::Key => self.on_key(ctx, json),
            CallType::Logon => self.on_logon(ctx, json),
            CallType::Relogon => on_relogon(ctx, json),
            CallType::Logoff => on_logoff(ctx, json),
            CallType::Message => return on_message(ctx, json),
            CallType::Poll => return self.on_poll(ctx, json),
            CallType::Summary => on_summary(ctx, json),
        }

        Step::Finish
    }

    fn on_auth(&self, ctx: &mut RequestContext, json: &Value) -> Step {
        {
            let mut session = self.session.lock();
            let auth = session.auth.get_or_insert_with(AuthContext::new);

            if let Some(gid) = json::get_str(json, "captcha_gid") {
                auth.captcha_gid = Some(gid.to_string());
            }

            if let Some(esid) = json::get_str(json, "emailsteamid") {
                auth.email_steamid = Some(esid.to_string());
            }
        }

        if !json::get_bool(json, "success") {
            let message = json::get_str(json, "message")
                .unwrap_or("Failed to authenticate")
                .to_string();

            let (state, error) = if json::get_bool(json, "emailauth_needed") {
                (AuthState::GuardChallenge, SteamError::GuardRequired(message))
            } else if json::get_bool(json, "captcha_needed") {
                (AuthState::CaptchaChallenge, SteamError::CaptchaRequired(message))
            } else {
                (AuthState::Failed, SteamError::AuthFailed(message))
            };

            self.set_auth_state(state);
            ctx.fail(error);
            return Step::Finish;
        }

        self.set_auth_state(AuthState::OAuthExchange);

        let Some(oauth) = json::get_str(json, "oauth") else {
            return self.auth_failed(ctx, "Failed to obtain OAuth data");
        };

        let oauth = match json::parse(oauth) {
            Ok(oauth) => oauth,
            Err(err) => {
                self.set_auth_state(AuthState::Failed);
                ctx.fail(err);
                return Step::Finish;
            }
        };

        let Some(token) = json::get_str(&oauth, "oauth_token") else {
            return self.auth_failed(ctx, "Failed to obtain OAuth token");
        };

        {
            let mut session = self.session.lock();
            session.token = Some(token.to_string());

            if let Some(steamid) = json::get_str(&oauth, "steamid").and_then(|s| s.parse::<SteamId>().ok()) {
                session.steamid = Some(steamid);
            }
        }

        let mut request = self.community_request(Method::Post, PATH_AUTH_REDIRECT);
        request.params.extend(json::flatten(&oauth));

        ctx.call = CallType::AuthRedirect;
        ctx.flags = RequestFlags::QUEUED | RequestFlags::NO_JSON;
        ctx.request = request;

        self.set_auth_state(AuthState::SessionRedirect);
        Step::Chain
    }

    fn auth_failed(&self, ctx: &mut RequestContext, message: &str) -> Step {
        self.set_auth_state(AuthState::Failed);
        ctx.fail(SteamError::AuthFailed(message.to_string()));
        Step::Finish
    }

    fn on_auth_redirect(&self, ctx: &mut RequestContext) {
        self.set_auth_state(AuthState::CookieExtract);

        let Some(sessid) = self.transport.cookie(&self.options.community_host, "sessionid") else {
            self.auth_failed(ctx, "Failed to obtain OAuth session ID");
            return;
        };

        let steamid = {
            let mut session = self.session.lock();
            session.sessid = Some(sessid);
            session.steamid
        };

        self.set_auth_state(AuthState::Ready);
        tracing::info!(steamid = ?steamid, "authenticated");
    }

    fn on_key(&self, ctx: &mut RequestContext, json: &Value) {
        let refused = json::str_eq(json, "success", "false") || json.get("success") == Some(&Value::Bool(false));

        let mut session = self.session.lock();
        let mut auth = session.auth.clone().unwrap_or_default();

        let valid = !refused
            && json::get_str(json, "publickey_mod").is_some_and(|m| auth.set_modulus(m))
            && json::get_str(json, "publickey_exp").is_some_and(|e| auth.set_exponent(e));

        if !valid {
            drop(session);
            self.set_auth_state(AuthState::KeyFetch);
            ctx.fail(SteamError::Key("Failed to retrieve authentication key".to_string()));
            return;
        }

        // Sent as a string today; accept a number as well.
        auth.timestamp = json::get_str(json, "timestamp")
            .map(str::to_string)
            .or_else(|| json::get_int(json, "timestamp").map(|t| t.to_string()));

        session.auth = Some(auth);
        drop(session);
        self.set_auth_state(AuthState::Encrypt);
    }

    fn on_logon(&self, ctx: &mut RequestContext, json: &Value) {
        if !json::str_eq(json, "error", "OK") {
            ctx.fail(SteamError::Logon(error_text(json)));
            return;
        }

        {
            let mut session = self.session.lock();
            session.last_message = json::get_int(json, "message").unwrap_or(0);
            session.timestamp = json::get_int(json, "utc_timestamp").unwrap_or(0);

            if let Some(steamid) = json::get_str(json, "steamid").and_then(|s| s.parse::<SteamId>().ok()) {
                session.steamid = Some(steamid);
            }

            if let Some(umqid) = json::get_str(json, "umqid") {
                session.umqid = umqid.to_string();
            }

            tracing::info!(umqid = %session.umqid, last_message = session.last_message, "logged on");
        }

        self.refresh_cookies();
    }

    fn on_poll(&self, ctx: &mut RequestContext, json: &Value) -> Step {
        if let Some(error) = json::get_str(json, "error") {
            if !error.eq_ignore_ascii_case("Timeout") && !error.eq_ignore_ascii_case("OK") {
                if error.eq_ignore_ascii_case(NOT_LOGGED_ON) {
                    ctx.fail(SteamError::LogonExpired);
                    return Step::Relogon;
                }

                tracing::warn!(error, "poll failed");
                ctx.fail(SteamError::Poll(error.to_string()));
                return Step::Finish;
            }
        }

        let events = json::get_array(json, "messages")
            .map(Vec::as_slice)
            .unwrap_or_default();

        match json::get_int(json, "sectimeout") {
            Some(timeout) if timeout >= POLL_TIMEOUT || !events.is_empty() => {}
            timeout => {
                let timeout = timeout.unwrap_or(0);
                tracing::warn!(timeout, "poll returned early");
                ctx.fail(SteamError::Poll(format!("Timeout of {timeout} too low")));
                return Step::Finish;
            }
        }

        ctx.payload = Payload::Messages(Vec::new());

        let Some(last) = json::get_int(json, "messagelast") else {
            return Step::Finish;
        };

        let own = {
            let mut session = self.session.lock();
            if last == session.last_message {
                return Step::Finish;
            }

            session.last_message = last;
            session.steamid_str()
        };

        let mut messages = Vec::new();

        for event in events {
            let Some(from) = json::get_str(event, "steamid_from") else {
                continue;
            };

            if own.as_deref().is_some_and(|own| own.eq_ignore_ascii_case(from)) {
                continue;
            }

            // Unknown event types are ignored.
            let Some(kind) = json::get_str(event, "type").and_then(MessageType::from_name) else {
                continue;
            };

            let mut summary = FriendSummary::new(from);
            let mut text = None;

            let key = match kind {
                MessageType::Text | MessageType::Emote => {
                    text = json::get_str(event, "text").map(str::to_string);
                    ctx.arena.insert(summary)
                }
                MessageType::State => {
                    summary.nick = json::get_str(event, "persona_name").map(str::to_string);
                    ctx.add_pending(summary)
                }
                MessageType::Relationship => {
                    summary.action = json::get_int(event, "persona_state").unwrap_or(0);
                    ctx.add_pending(summary)
                }
                MessageType::Typing | MessageType::LeftConversation => continue,
            };

            messages.push(PendingMessage {
                kind,
                summary: key,
                text,
                timestamp: json::get_int(event, "utc_timestamp").unwrap_or(0),
            });
        }

        ctx.payload = Payload::Messages(messages);
        Step::Finish
    }

    fn on_chat_log(&self, ctx: &mut RequestContext, json: &Value) {
        let own = self.session.lock().steamid.map(SteamId::account_id);
        let entries = json.as_array().map(Vec::as_slice).unwrap_or_default();
        let mut messages = Vec::new();

        for entry in entries {
            let Some(account) = json::get_int(entry, "m_unAccountID") else {
                continue;
            };

            let Ok(account) = u64::try_from(account) else {
                continue;
            };

            if own == Some(account) {
                continue;
            }

            let key = ctx.add_pending(FriendSummary::new(to_global(account).to_string()));

            messages.push(PendingMessage {
                kind: MessageType::Text,
                summary: key,
                text: json::get_str(entry, "m_strMessage").map(str::to_string),
                timestamp: json::get_int(entry, "m_tsTimestamp").unwrap_or(0),
            });
        }

        ctx.payload = Payload::Messages(messages);
    }
}

/// The `error` field, or a stand-in when the service sent none.
fn error_text(json: &Value) -> String {
    json::get_str(json, "error")
        .unwrap_or("Unknown error")
        .to_string()
}

fn on_relogon(ctx: &mut RequestContext, json: &Value) {
    if json::str_eq(json, "error", "OK") {
        return;
    }

    let message = error_text(json);
    tracing::warn!(error = %message, "relogon failed");
    ctx.fail(SteamError::RelogonFailed(message));
}

fn on_logoff(ctx: &mut RequestContext, json: &Value) {
    if !json::str_eq(json, "error", "OK") {
        ctx.fail(SteamError::Logoff(error_text(json)));
        return;
    }

    tracing::info!("logged off");
}

fn on_message(ctx: &mut RequestContext, json: &Value) -> Step {
    if json::str_eq(json, "error", "OK") {
        return Step::Finish;
    }

    if json::str_eq(json, "error", NOT_LOGGED_ON) {
        ctx.fail(SteamError::LogonExpired);
        return Step::Relogon;
    }

    ctx.fail(SteamError::Message(error_text(json)));
    Step::Finish
}

fn on_friend_accept(ctx: &mut RequestContext, json: &Value) {
    if let Some(error) = json::get_str(json, "error_text") {
        ctx.fail(SteamError::FriendAccept(error.to_string()));
    }
}

fn on_friend_add(ctx: &mut RequestContext, json: &Value) {
    let failed = json::get_array(json, "failed_invites_result").is_some_and(|failed| !failed.is_empty());

    if failed {
        ctx.fail(SteamError::FriendAdd("Failed to add friend".to_string()));
    }
}

fn on_friend_remove(ctx: &mut RequestContext, body: &str) {
    let body = body.trim();

    if body.eq_ignore_ascii_case("true") || body == "1" {
        return;
    }

    ctx.fail(SteamError::FriendRemove("Failed to remove friend".to_string()));
}

fn on_friend_search(ctx: &mut RequestContext, json: &Value) {
    let results = json::get_array(json, "results")
        .map(Vec::as_slice)
        .unwrap_or_default();
    let mut keys = Vec::new();

    for result in results {
        if !json::str_eq(result, "type", "user") {
            continue;
        }

        let Some(steamid) = json::get_str(result, "steamid") else {
            continue;
        };

        let mut summary = FriendSummary::new(steamid);
        summary.nick = json::get_str(result, "matchingtext").map(str::to_string);
        keys.push(ctx.add_pending(summary));
    }

    ctx.payload = Payload::Summaries(keys);
}

fn on_friends(ctx: &mut RequestContext, json: &Value) {
    let friends = json::get_array(json, "friends")
        .map(Vec::as_slice)
        .unwrap_or_default();
    let mut keys = Vec::new();

    for friend in friends {
        let relation = match json::get_str(friend, "relationship").map(Relation::from_name) {
            Some(relation @ (Relation::Friend | Relation::Ignored)) => relation,
            _ => continue,
        };

        let Some(steamid) = json::get_str(friend, "steamid") else {
            continue;
        };

        let mut summary = FriendSummary::new(steamid);
        summary.relation = relation;
        keys.push(ctx.add_pending(summary));
    }

    ctx.payload = Payload::Summaries(keys);
}

fn on_summary(ctx: &mut RequestContext, json: &Value) {
    let player = json::get_array(json, "players").and_then(|players| players.first());

    let key = player.and_then(|player| {
        let steamid = json::get_str(player, "steamid")?;
        let mut summary = FriendSummary::new(steamid);
        summary.update_from(player);
        Some(ctx.arena.insert(summary))
    });

    ctx.payload = Payload::Summary(key);
}
