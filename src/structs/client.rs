use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::message::{Message, MessageType};
use super::request::{CallType, Payload, Reply, RequestContext, RequestFlags, Step};
use super::session::{Session, SteamId};
use super::summary::FriendSummary;
use crate::auth::AuthState;
use crate::errors::{ApiError, SteamError};
use crate::gate::QueueGate;
use crate::transport::{HttpRequest, Method, ReqwestTransport, Transport, TransportError};

pub const API_HOST: &str = "api.steampowered.com";
pub const COMMUNITY_HOST: &str = "steamcommunity.com";
pub const USER_AGENT: &str = concat!("Steam App / steam-client / ", env!("CARGO_PKG_VERSION"), " / 0");

/// OAuth client id of the official mobile app.
pub const CLIENT_ID: &str = "DE45CD61";
const OAUTH_SCOPE: &str = "read_profile write_profile read_client write_client";

/// Seconds the server is asked to hold a poll open. Replies with less are rejected.
pub const POLL_TIMEOUT: i64 = 30;

pub(crate) const PATH_FRIEND_SEARCH: &str = "/ISteamUserOAuth/Search/v0001";
pub(crate) const PATH_FRIENDS: &str = "/ISteamUserOAuth/GetFriendList/v0001";
pub(crate) const PATH_LOGON: &str = "/ISteamWebUserPresenceOAuth/Logon/v0001";
pub(crate) const PATH_LOGOFF: &str = "/ISteamWebUserPresenceOAuth/Logoff/v0001";
pub(crate) const PATH_MESSAGE: &str = "/ISteamWebUserPresenceOAuth/Message/v0001";
pub(crate) const PATH_POLL: &str = "/ISteamWebUserPresenceOAuth/Poll/v0001";
pub(crate) const PATH_SUMMARIES: &str = "/ISteamUserOAuth/GetUserSummaries/v0001";

pub(crate) const PATH_AUTH: &str = "/mobilelogin/dologin/";
pub(crate) const PATH_AUTH_REDIRECT: &str = "/mobileloginsucceeded/";
pub(crate) const PATH_CHATLOG: &str = "/chat/chatlog/";
pub(crate) const PATH_FRIEND_ADD: &str = "/actions/AddFriendAjax/";
pub(crate) const PATH_FRIEND_REMOVE: &str = "/actions/RemoveFriendAjax/";
pub(crate) const PATH_KEY: &str = "/mobilelogin/getrsakey/";
pub(crate) const PATH_PROFILE: &str = "/profiles/";
pub(crate) const PATH_CAPTCHA: &str = "/public/captcha.php?gid=";

/// Steam client options. Pass this into [`Client::new()`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    /// Host of the Web API (presence, friends, summaries).
    pub api_host: String,
    /// Host of the community site (login, chat log, friend actions).
    pub community_host: String,
    /// HTTPS port used for both hosts.
    pub port: u16,
    /// User agent sent with every request.
    pub user_agent: String,
    /// Chat session nonce. A random one is picked when `None`.
    pub umqid: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            api_host: API_HOST.to_string(),
            community_host: COMMUNITY_HOST.to_string(),
            port: 443,
            user_agent: USER_AGENT.to_string(),
            umqid: None,
        }
    }
}

/// Answer to a pending friend request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcceptAction {
    Accept,
    Ignore,
    Block,
}

impl AcceptAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Ignore => "ignore",
            Self::Block => "block",
        }
    }
}

/// Steam client. Owns one logical session and the transport it talks through.
///
/// Calls may run concurrently (a long poll alongside a message send, say);
/// session state is only touched between awaits.
#[derive(Debug)]
pub struct Client<T: Transport = ReqwestTransport> {
    pub options: ClientOptions,
    pub(crate) transport: T,
    pub(crate) gate: QueueGate,
    pub(crate) session: Mutex<Session>,
}

impl Client<ReqwestTransport> {
    /// Creates a new Steam client talking HTTPS through `reqwest`.
    pub fn new(options: ClientOptions) -> Result<Self, TransportError> {
        let transport = ReqwestTransport::new(&options.user_agent)?;
        Ok(Self::with_transport(options, transport))
    }
}

impl<T: Transport> Client<T> {
    pub fn with_transport(options: ClientOptions, transport: T) -> Self {
        let session = match &options.umqid {
            Some(umqid) => Session::new(umqid.as_str()),
            None => Session::random(),
        };

        Self::with_session(options, transport, session)
    }

    /// Resumes from a previously obtained session (token, steam id, nonce).
    pub fn with_session(options: ClientOptions, transport: T, session: Session) -> Self {
        Self {
            options,
            transport,
            gate: QueueGate::new(),
            session: Mutex::new(session),
        }
    }

    /// Snapshot of the current session.
    pub fn session(&self) -> Session {
        self.session.lock().clone()
    }

    pub fn auth_state(&self) -> AuthState {
        self.session.lock().auth_state
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn gate(&self) -> &QueueGate {
        &self.gate
    }

    pub(crate) fn set_auth_state(&self, state: AuthState) {
        let mut session = self.session.lock();
        if session.auth_state != state {
            tracing::debug!(from = %session.auth_state, to = %state, "auth state changed");
            session.auth_state = state;
        }
    }

    /// Community profile page of a steam id.
    pub fn profile_url(&self, steamid: &str) -> String {
        format!("https://{}{PATH_PROFILE}{steamid}/", self.options.community_host)
    }

    /// Image of the captcha the service asked for, if any.
    pub fn captcha_url(&self) -> Option<String> {
        let session = self.session.lock();
        let gid = session.auth.as_ref()?.captcha_gid.as_deref()?;
        Some(format!("https://{}{PATH_CAPTCHA}{gid}", self.options.community_host))
    }

    /// Sets the `steamLogin` and `sessionid` web cookies from the session.
    pub fn refresh_cookies(&self) {
        let (login, sessid) = {
            let session = self.session.lock();
            let login = format!(
                "{}||oauth:{}",
                session.steamid_str().unwrap_or_default(),
                session.token.as_deref().unwrap_or_default()
            );
            (login, session.sessid.clone().unwrap_or_default())
        };

        self.transport.set_cookies(
            &self.options.community_host,
            &[("steamLogin", login.as_str()), ("sessionid", sessid.as_str())],
        );
    }

    pub(crate) fn api_request(&self, method: Method, path: &str) -> HttpRequest {
        HttpRequest::new(method, &self.options.api_host, self.options.port, path)
    }

    pub(crate) fn community_request(&self, method: Method, path: &str) -> HttpRequest {
        HttpRequest::new(method, &self.options.community_host, self.options.port, path)
    }

    /// Token, nonce and own steam id, read in one lock.
    fn credentials(&self) -> (Option<String>, String, Option<String>) {
        let session = self.session.lock();
        (session.token.clone(), session.umqid.clone(), session.steamid_str())
    }

    fn sessid(&self) -> Option<String> {
        self.session.lock().sessid.clone()
    }

    /// Fetches the RSA key used to encrypt the password of `username`.
    pub async fn fetch_key(&self, username: &str) -> Result<(), ApiError> {
        self.set_auth_state(AuthState::KeyFetch);

        let ms = anti_cache_token();
        let request = self
            .community_request(Method::Post, PATH_KEY)
            .param("username", Some(username))
            .param("donotcache", Some(&ms));

        self.dispatch(RequestContext::new(CallType::Key, request))
            .await
            .map(drop)
    }

    /// Submits the credentials and, once accepted, turns the OAuth answer into web cookies.
    ///
    /// Needs a key from [`fetch_key`](Self::fetch_key). After a guard or
    /// captcha challenge, call again with the code or answer; the challenge
    /// ids handed out by the service are resent automatically.
    pub async fn authenticate(
        &self,
        username: &str,
        password: &str,
        guard_code: Option<&str>,
        captcha: Option<&str>,
    ) -> Result<(), ApiError> {
        self.set_auth_state(AuthState::Encrypt);

        let auth = self.session.lock().auth.clone();
        let encrypted = match auth.as_ref().map(|auth| auth.encrypt(password)) {
            Some(Ok(encrypted)) => encrypted,
            Some(Err(err)) => {
                self.set_auth_state(AuthState::Failed);
                return Err(ApiError::new(CallType::Auth, err));
            }
            None => {
                self.set_auth_state(AuthState::KeyFetch);
                return Err(ApiError::new(
                    CallType::Auth,
                    SteamError::Encrypt("No authentication key".to_string()),
                ));
            }
        };
        let auth = auth.unwrap_or_default();

        let ms = anti_cache_token();
        let request = self
            .community_request(Method::Post, PATH_AUTH)
            .param("username", Some(username))
            .param("password", Some(&encrypted))
            .param("emailauth", guard_code)
            .param("emailsteamid", auth.email_steamid.as_deref())
            .param("captchagid", auth.captcha_gid.as_deref())
            .param("captcha_text", captcha)
            .param("rsatimestamp", auth.timestamp.as_deref())
            .param("oauth_client_id", Some(CLIENT_ID))
            .param("donotcache", Some(&ms))
            .param("remember_login", Some("true"))
            .param("oauth_scope", Some(OAUTH_SCOPE));

        self.set_auth_state(AuthState::Submit);
        self.dispatch(RequestContext::new(CallType::Auth, request))
            .await
            .map(drop)
    }

    /// Fetches a key if none is held yet, then authenticates.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
        guard_code: Option<&str>,
        captcha: Option<&str>,
    ) -> Result<(), ApiError> {
        if self.session.lock().auth.is_none() {
            self.fetch_key(username).await?;
        }

        self.authenticate(username, password, guard_code, captcha)
            .await
    }

    /// Starts the web presence session.
    pub async fn logon(&self) -> Result<(), ApiError> {
        let (token, umqid, _) = self.credentials();
        let request = self
            .api_request(Method::Post, PATH_LOGON)
            .param("access_token", token.as_deref())
            .param("umqid", Some(&umqid))
            .param("ui_mode", Some("web"));

        self.dispatch(RequestContext::new(CallType::Logon, request))
            .await
            .map(drop)
    }

    /// Re-establishes an expired presence session with the current token and nonce.
    ///
    /// The outbound queue stays paused until the logon completes, whatever its outcome.
    pub async fn relogon(&self) -> Result<(), ApiError> {
        let _guard = self.gate.pause();
        self.logon_again().await
    }

    pub async fn logoff(&self) -> Result<(), ApiError> {
        let (token, umqid, _) = self.credentials();
        let request = self
            .api_request(Method::Post, PATH_LOGOFF)
            .param("access_token", token.as_deref())
            .param("umqid", Some(&umqid));

        self.dispatch(RequestContext::new(CallType::Logoff, request))
            .await
            .map(drop)
    }

    /// Sends a chat message. Only text, emote and typing notifications can be sent.
    pub async fn send_message(
        &self,
        target: &str,
        kind: MessageType,
        text: Option<&str>,
    ) -> Result<(), ApiError> {
        let (token, umqid, _) = self.credentials();
        let mut request = self
            .api_request(Method::Post, PATH_MESSAGE)
            .param("access_token", token.as_deref())
            .param("umqid", Some(&umqid))
            .param("steamid_dst", Some(target))
            .param("type", Some(kind.as_str()));

        match kind {
            MessageType::Text | MessageType::Emote => {
                request = request.param("text", text);
            }
            MessageType::Typing => {}
            _ => {
                return Err(ApiError::new(
                    CallType::Message,
                    SteamError::Message(format!("Cannot send {} messages", kind.as_str())),
                ));
            }
        }

        self.dispatch(RequestContext::new(CallType::Message, request))
            .await
            .map(drop)
    }

    /// Sends a prepared [`Message`] to its summary's steam id.
    pub async fn send(&self, message: &Message) -> Result<(), ApiError> {
        self.send_message(&message.summary.steamid, message.kind, message.text.as_deref())
            .await
    }

    /// Long-polls for new events. Call again as soon as it returns.
    pub async fn poll(&self) -> Result<Vec<Message>, ApiError> {
        let (token, umqid, _) = self.credentials();
        let last = self.session.lock().last_message.to_string();
        let timeout = POLL_TIMEOUT.to_string();

        let request = self
            .api_request(Method::Post, PATH_POLL)
            .header("Connection", "Keep-Alive")
            .param("access_token", token.as_deref())
            .param("umqid", Some(&umqid))
            .param("message", Some(&last))
            .param("sectimeout", Some(&timeout));

        self.dispatch(RequestContext::new(CallType::Poll, request))
            .await
            .map(Reply::into_messages)
    }

    /// Friends and ignored friends, with full profiles.
    pub async fn friends(&self) -> Result<Vec<FriendSummary>, ApiError> {
        let (token, _, steamid) = self.credentials();
        let request = self
            .api_request(Method::Get, PATH_FRIENDS)
            .param("access_token", token.as_deref())
            .param("steamid", steamid.as_deref())
            .param("relationship", Some("friend,ignoredfriend"));

        self.dispatch(RequestContext::new(CallType::Friends, request))
            .await
            .map(Reply::into_summaries)
    }

    /// Searches users by name.
    pub async fn search_friends(&self, text: &str, limit: u32) -> Result<Vec<FriendSummary>, ApiError> {
        let (token, _, _) = self.credentials();
        let keywords = format!("\"{text}\"");
        let count = limit.to_string();

        let request = self
            .api_request(Method::Get, PATH_FRIEND_SEARCH)
            .param("access_token", token.as_deref())
            .param("keywords", Some(&keywords))
            .param("count", Some(&count))
            .param("offset", Some("0"))
            .param("fields", Some("all"))
            .param("targets", Some("users"));

        self.dispatch(RequestContext::new(CallType::FriendSearch, request))
            .await
            .map(Reply::into_summaries)
    }

    /// Sends a friend invite. Returns the steam id acted on.
    pub async fn add_friend(&self, steamid: &str) -> Result<String, ApiError> {
        let request = self
            .community_request(Method::Post, PATH_FRIEND_ADD)
            .param("sessionID", self.sessid().as_deref())
            .param("steamid", Some(steamid));

        let ctx = RequestContext::new(CallType::FriendAdd, request)
            .with_payload(Payload::Id(steamid.to_string()));
        self.dispatch(ctx).await.map(Reply::into_id)
    }

    pub async fn remove_friend(&self, steamid: &str) -> Result<String, ApiError> {
        let request = self
            .community_request(Method::Post, PATH_FRIEND_REMOVE)
            .param("sessionID", self.sessid().as_deref())
            .param("steamid", Some(steamid));

        let ctx = RequestContext::new(CallType::FriendRemove, request)
            .with_flags(RequestFlags::QUEUED | RequestFlags::NO_JSON)
            .with_payload(Payload::Id(steamid.to_string()));
        self.dispatch(ctx).await.map(Reply::into_id)
    }

    /// Answers a pending friend request.
    pub async fn accept_friend(&self, steamid: &str, action: AcceptAction) -> Result<String, ApiError> {
        let own = self.session.lock().steamid_str().unwrap_or_default();
        let path = format!("{PATH_PROFILE}{own}/home_process");

        let request = self
            .community_request(Method::Post, &path)
            .param("sessionID", self.sessid().as_deref())
            .param("id", Some(steamid))
            .param("perform", Some(action.as_str()))
            .param("action", Some("approvePending"))
            .param("itype", Some("friend"))
            .param("json", Some("1"))
            .param("xml", Some("0"));

        let ctx = RequestContext::new(CallType::FriendAccept, request)
            .with_payload(Payload::Id(steamid.to_string()));
        self.dispatch(ctx).await.map(Reply::into_id)
    }

    /// Ignores or unignores a friend.
    pub async fn ignore_friend(&self, steamid: &str, ignore: bool) -> Result<String, ApiError> {
        let own = self.session.lock().steamid_str().unwrap_or_default();
        let path = format!("{PATH_PROFILE}{own}/friends/");
        let field = format!("friends[{steamid}]");

        let request = self
            .community_request(Method::Post, &path)
            .param("sessionID", self.sessid().as_deref())
            .param("action", Some(if ignore { "ignore" } else { "unignore" }))
            .param(&field, Some("1"));

        let ctx = RequestContext::new(CallType::FriendIgnore, request)
            .with_flags(RequestFlags::QUEUED | RequestFlags::NO_JSON)
            .with_payload(Payload::Id(steamid.to_string()));
        self.dispatch(ctx).await.map(Reply::into_id)
    }

    /// Full profile of one steam id. `None` when the service knows no such profile.
    pub async fn summary(&self, steamid: &str) -> Result<Option<FriendSummary>, ApiError> {
        let (token, _, _) = self.credentials();
        let request = self
            .api_request(Method::Get, PATH_SUMMARIES)
            .param("access_token", token.as_deref())
            .param("steamids", Some(steamid));

        self.dispatch(RequestContext::new(CallType::Summary, request))
            .await
            .map(Reply::into_summary)
    }

    /// Recent chat history with `steamid`, oldest first.
    pub async fn chat_log(&self, steamid: &str) -> Result<Vec<Message>, ApiError> {
        let target: SteamId = steamid.parse().map_err(|_| {
            ApiError::new(
                CallType::ChatLog,
                SteamError::Parse(format!("Invalid steam id: {steamid}")),
            )
        })?;
        let path = format!("{PATH_CHATLOG}{}", target.account_id());

        let request = self
            .community_request(Method::Post, &path)
            .param("sessionid", self.sessid().as_deref());

        self.dispatch(RequestContext::new(CallType::ChatLog, request))
            .await
            .map(Reply::into_messages)
    }

    /// Runs a call to completion: follows chained requests and survives one
    /// presence session expiry by logging on again and resending.
    pub(crate) async fn dispatch(&self, mut ctx: RequestContext) -> Result<Reply, ApiError> {
        loop {
            match self.round(&mut ctx).await {
                Step::Finish => break,
                Step::Chain => continue,
                Step::Relogon => {
                    if ctx.resent {
                        break;
                    }

                    tracing::warn!(call = %ctx.call, "logon session expired, logging on again");
                    self.recover_logon().await?;

                    ctx.error = None;
                    ctx.resent = true;
                }
            }
        }

        if let Some(err) = &ctx.error {
            tracing::debug!(call = %ctx.call, rounds = ctx.rounds, error = %err, "call failed");
        }

        ctx.finish()
    }

    /// One transport round: wait for the queue, send, interpret.
    async fn round(&self, ctx: &mut RequestContext) -> Step {
        if ctx.flags.contains(RequestFlags::QUEUED) {
            self.gate.opened().await;
        }

        ctx.rounds += 1;
        tracing::debug!(
            call = %ctx.call,
            path = %ctx.request.path,
            round = ctx.rounds,
            "sending request"
        );

        let response = self.transport.send(&ctx.request).await;
        self.complete(ctx, response)
    }

    /// Logs on again unless another call already does; then waits for it.
    async fn recover_logon(&self) -> Result<(), ApiError> {
        match self.gate.try_pause() {
            Some(_guard) => self.logon_again().await,
            None => {
                self.gate.opened().await;
                Ok(())
            }
        }
    }

    /// Sends the relogon request past the paused queue.
    async fn logon_again(&self) -> Result<(), ApiError> {
        let (token, umqid, _) = self.credentials();
        let request = self
            .api_request(Method::Post, PATH_LOGON)
            .param("access_token", token.as_deref())
            .param("umqid", Some(&umqid));

        let mut ctx = RequestContext::new(CallType::Relogon, request).with_flags(RequestFlags::empty());
        while self.round(&mut ctx).await == Step::Chain {}

        ctx.finish().map(drop)
    }
}

/// Millisecond component of the current time, sent to defeat caches.
fn anti_cache_token() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_millis())
        .unwrap_or_default()
        .to_string()
}
