//! HTTP surface of the BFF

pub mod auth;
mod router;
mod server;

pub use auth::{AccessToken, TOKEN_HEADER, token_middleware};
pub use router::{AppState, DEFAULT_POLL_INTERVAL_SECS, create_router};
pub use server::Gateway;
