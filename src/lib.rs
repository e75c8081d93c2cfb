//! Client for the Steam web chat and community API.
//!
//! [`Client`] logs a user in (RSA key exchange, Steam Guard and captcha
//! challenges, OAuth), keeps the web presence session alive, long-polls for
//! chat and presence events and performs the friend operations of the
//! community site. Profiles referenced by friends lists, searches, chat logs
//! and events are enriched in batches before the call returns.
//!
//! ```rust,ignore
//! let client = steam_client::Client::new(steam_client::ClientOptions::default())?;
//! client.login("user", "password", None, None).await?;
//! client.logon().await?;
//!
//! loop {
//!     for message in client.poll().await? {
//!         println!("{:?}", message);
//!     }
//! }
//! ```

pub mod auth;
mod errors;
pub mod gate;
pub mod json;
mod structs;
pub mod transport;

pub use auth::{AuthContext, AuthState};
pub use errors::{ApiError, SteamError};
pub use gate::{PauseGuard, QueueGate};
pub use structs::*;
pub use transport::{HttpRequest, HttpResponse, Method, ReqwestTransport, Transport, TransportError};
