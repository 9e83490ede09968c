//! Bounded recovery policies: decoder reset counting and reconnect backoff.

use std::time::Duration;

use tokio::time::Instant;

/// What to do about a recoverable decoder error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Reset the decoder in place and keep the transport.
    LightweightReset,
    /// A reset happened too recently; ignore this error.
    Debounced,
    /// Resets are exhausted; reconnect.
    Escalate,
}

/// Counts consecutive lightweight decoder resets.
///
/// Cleared on every successful connection.
#[derive(Debug, Clone)]
pub struct RecoveryCounter {
    max_attempts: u32,
    debounce: Duration,
    attempts: u32,
    last_reset: Option<Instant>,
}

impl RecoveryCounter {
    pub fn new(max_attempts: u32, debounce: Duration) -> Self {
        Self {
            max_attempts,
            debounce,
            attempts: 0,
            last_reset: None,
        }
    }

    /// Decides how to respond to an error at `now`, counting the reset if one
    /// is granted.
    pub fn evaluate(&mut self, now: Instant) -> RecoveryAction {
        if let Some(last) = self.last_reset {
            if now.saturating_duration_since(last) < self.debounce {
                return RecoveryAction::Debounced;
            }
        }
        if self.attempts >= self.max_attempts {
            return RecoveryAction::Escalate;
        }
        self.attempts += 1;
        self.last_reset = Some(now);
        RecoveryAction::LightweightReset
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn clear(&mut self) {
        self.attempts = 0;
        self.last_reset = None;
    }
}

/// Exponential reconnect delay: `base * 2^n`, capped at `max`.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl ReconnectBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            attempt: 0,
        }
    }

    /// Returns the delay for the next attempt and advances the sequence.
    pub fn next_delay(&mut self) -> Duration {
        let factor = 1u32.checked_shl(self.attempt).unwrap_or(u32::MAX);
        let delay = self.base.saturating_mul(factor).min(self.max);
        self.attempt = self.attempt.saturating_add(1);
        delay
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
