#![cfg(feature = "net")]

use super::response::write_timeout_response;
use crate::net::{HttpError, NetError};
use std::time::{Duration, Instant};

/// Absolute expiration for one inbound request or one outbound cluster-API
/// call.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RequestDeadline {
    expires_at: Instant,
}

impl RequestDeadline {
    pub(crate) fn from_timeout(timeout: Duration) -> Self {
        let bounded = if timeout.is_zero() {
            Duration::from_millis(1)
        } else {
            timeout
        };
        Self {
            expires_at: Instant::now() + bounded,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_deadline(expires_at: Instant) -> Self {
        Self { expires_at }
    }

    pub(crate) fn remaining(&self) -> Option<Duration> {
        self.expires_at
            .checked_duration_since(Instant::now())
            .filter(|remaining| !remaining.is_zero())
    }

    /// Remaining budget, or `RequestTimeout` once it is spent.
    pub(crate) fn budget(&self) -> Result<Duration, NetError> {
        self.remaining()
            .ok_or_else(|| NetError::from(HttpError::RequestTimeout))
    }

    pub(crate) fn enforce(&self) -> Result<(), NetError> {
        self.budget().map(|_| ())
    }

    /// Writes a 408 and returns `false` when the deadline has passed.
    pub(crate) fn respond_if_expired(
        &self,
        stream: &mut (impl std::io::Write + ?Sized),
    ) -> Result<bool, NetError> {
        if self.enforce().is_err() {
            write_timeout_response(stream)?;
            return Ok(false);
        }
        Ok(true)
    }
}
