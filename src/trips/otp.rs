use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

use crate::{db::TripRef, error::{TripError, TripResult}};

#[derive(Default)]
struct Attempts {
    failures: u32,
    locked_until: Option<Instant>,
}

/// Counts consecutive wrong OTPs per trip and locks `start` out for a while
/// once `max_attempts` is reached. `max_attempts == 0` disables the lockout.
pub struct OtpGuard {
    max_attempts: u32,
    lockout: Duration,
    attempts: DashMap<TripRef, Attempts>,
}

impl OtpGuard {
    pub fn new(max_attempts: u32, lockout: Duration) -> Self {
        Self {
            max_attempts,
            lockout,
            attempts: DashMap::new(),
        }
    }

    pub fn check(&self, trip: &TripRef) -> TripResult<()> {
        let now = Instant::now();
        let mut expired = false;

        if let Some(attempts) = self.attempts.get(trip) {
            match attempts.locked_until {
                Some(until) if until > now => {
                    let remaining = until - now;
                    return Err(TripError::TooManyAttempts {
                        retry_after_secs: remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0),
                    });
                }
                Some(_) => expired = true,
                None => {}
            }
        }

        if expired {
            self.attempts.remove(trip);
        }
        Ok(())
    }

    /// Returns true when this failure triggered a lockout.
    pub fn record_failure(&self, trip: &TripRef) -> bool {
        if self.max_attempts == 0 {
            return false;
        }

        let mut attempts = self.attempts.entry(trip.clone()).or_default();
        attempts.failures += 1;
        if attempts.failures >= self.max_attempts {
            attempts.failures = 0;
            attempts.locked_until = Some(Instant::now() + self.lockout);
            return true;
        }
        false
    }

    pub fn clear(&self, trip: &TripRef) {
        self.attempts.remove(trip);
    }
}
