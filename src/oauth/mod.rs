//! OAuth 2.0 device authorization grant
//!
//! Lets a device without a browser log a user in:
//! - [`GoogleOAuthClient::initiate_login`] obtains a device and user code
//! - [`poll_device_login`] waits for the user to approve on another device
//! - [`GoogleOAuthClient::refresh_access_token`] renews an expired access token

mod client;
mod poller;
mod types;

pub use client::{DEVICE_GRANT_TYPE, GoogleOAuthClient};
pub use poller::{TokenEndpoint, poll_device_login};
pub use types::{
    DeviceLoginSession, LoginDetails, PollResponse, RefreshTokenRequest, RefreshedToken,
    TokenGrant,
};
