use super::transport::{ApiRequest, RoundTrip, RoundTripFuture, SharedTransport};
use tracing::warn;

/// Total attempts when the endpoint configures a round tripper count of zero.
pub const DEFAULT_ROUND_TRIPPER_COUNT: u32 = 3;

/// Re-issues a request when it fails with a transient network error.
///
/// A round tripper count of `n` means at most `n` attempts in total. Errors
/// that are not transient are returned on first occurrence. No delay is
/// inserted between attempts, so dropping the future stops the loop at once.
pub struct RetryTransport {
    inner: SharedTransport,
    attempts: u32,
}

impl RetryTransport {
    #[must_use]
    pub fn new(inner: SharedTransport, round_tripper_count: u32) -> Self {
        Self {
            inner,
            attempts: effective_round_tripper_count(round_tripper_count),
        }
    }

    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[must_use]
pub fn effective_round_tripper_count(configured: u32) -> u32 {
    if configured == 0 {
        DEFAULT_ROUND_TRIPPER_COUNT
    } else {
        configured
    }
}

impl RoundTrip for RetryTransport {
    fn round_trip<'a>(&'a self, request: &'a ApiRequest) -> RoundTripFuture<'a> {
        Box::pin(async move {
            let mut attempt = 1;
            loop {
                match self.inner.round_trip(request).await {
                    Err(err) if err.is_transient() && attempt < self.attempts => {
                        warn!(
                            path = %request.path,
                            attempt,
                            max_attempts = self.attempts,
                            error = %err,
                            "Transient network error, retrying"
                        );
                        attempt += 1;
                    }
                    result => return result,
                }
            }
        })
    }
}
