//! Device flow polling loop
//!
//! [`poll_device_login`] asks a [`TokenEndpoint`] whether the user approved
//! the login, waiting `interval` between attempts, until the provider gives a
//! definitive answer, the budget runs out or the caller cancels.
//!
//! Budget and cancellation wrap the whole loop, so neither a hung attempt nor
//! a sleep that would overshoot the deadline can hold the call open.

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::types::{DeviceLoginSession, PollResponse, TokenGrant};
use crate::{Error, Result};

/// Token endpoint that can be asked about a pending device login
#[async_trait]
pub trait TokenEndpoint: Send + Sync {
    /// Perform one exchange attempt for `device_code`.
    ///
    /// Provider answers, including errors such as `access_denied`, come back
    /// as `Ok`; `Err` is reserved for transport and protocol failures.
    async fn exchange_device_code(&self, device_code: &str) -> Result<PollResponse>;
}

/// Where a polling call stands after an attempt.
///
/// Running out of budget is the fourth, implicit state: it is decided outside
/// the loop and surfaces as [`Error::Timeout`].
#[derive(Debug)]
enum PollState {
    Polling { interval: Duration },
    Succeeded(TokenGrant),
    Failed(Error),
}

impl PollState {
    fn advance(interval: Duration, response: PollResponse) -> Self {
        match response {
            PollResponse::Granted(grant) => Self::Succeeded(grant),
            PollResponse::Pending => Self::Polling { interval },
            PollResponse::SlowDown => Self::Polling {
                interval: interval.saturating_mul(2),
            },
            PollResponse::Denied => Self::Failed(Error::AuthorizationDenied),
            PollResponse::Rejected { code, description } => {
                Self::Failed(Error::provider(code, description))
            }
        }
    }
}

/// Poll until the login is approved, denied, times out or is cancelled.
///
/// On `slow_down` the interval doubles and the next attempt waits the new
/// interval.
pub async fn poll_device_login<E>(
    endpoint: &E,
    session: DeviceLoginSession,
    cancel: &CancellationToken,
) -> Result<TokenGrant>
where
    E: TokenEndpoint + ?Sized,
{
    let budget = session.timeout;
    let polling = poll_loop(endpoint, &session.device_code, session.interval);

    tokio::select! {
        biased;
        () = cancel.cancelled() => {
            info!("Device login polling cancelled");
            Err(Error::Cancelled)
        }
        outcome = tokio::time::timeout(budget, polling) => match outcome {
            Ok(result) => result,
            Err(_) => {
                warn!(budget_ms = budget.as_millis(), "Device login polling timed out");
                Err(Error::Timeout(budget))
            }
        },
    }
}

async fn poll_loop<E>(endpoint: &E, device_code: &str, interval: Duration) -> Result<TokenGrant>
where
    E: TokenEndpoint + ?Sized,
{
    let mut interval = interval;
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let response = endpoint.exchange_device_code(device_code).await?;
        debug!(attempt, response = response_kind(&response), "Device login poll attempt");

        match PollState::advance(interval, response) {
            PollState::Succeeded(grant) => {
                info!(attempts = attempt, "Device login approved");
                return Ok(grant);
            }
            PollState::Failed(e) => return Err(e),
            PollState::Polling { interval: next } => {
                if next != interval {
                    warn!(
                        from_ms = interval.as_millis(),
                        to_ms = next.as_millis(),
                        "Provider asked to slow down"
                    );
                }
                interval = next;
                tokio::time::sleep(interval).await;
            }
        }
    }
}

/// Log-safe name of a response
fn response_kind(response: &PollResponse) -> &'static str {
    match response {
        PollResponse::Granted(_) => "granted",
        PollResponse::Pending => "pending",
        PollResponse::SlowDown => "slow_down",
        PollResponse::Denied => "denied",
        PollResponse::Rejected { .. } => "rejected",
    }
}
