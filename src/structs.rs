mod batch;
mod client;
mod handlers;
mod message;
mod request;
mod session;
mod summary;

pub use batch::BATCH_SIZE;
pub use client::{AcceptAction, Client, ClientOptions, API_HOST, CLIENT_ID, COMMUNITY_HOST, POLL_TIMEOUT, USER_AGENT};
pub use message::{Message, MessageType};
pub use request::CallType;
pub use session::{to_account, to_global, Session, SteamId, STEAMID_OFFSET};
pub use summary::{FriendSummary, PersonaState, Relation};
