//! Reconnect policy: backoff delays, cooldown windows, and the decision
//! taken after each classified failure

use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::ReconnectConfig;
use crate::error::FailureClass;
use crate::state::ConnectionState;
use crate::types::ConnectionStatus;

/// Pure policy component deciding when and how long to wait before a retry
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
}

/// What the caller must arm after a failure was classified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    /// Nothing to do: a retry is already pending or a cooldown is active
    None,
    /// Arm a delayed retry after this delay
    Schedule(Duration),
    /// The record entered a cooldown window of this length
    Cooldown(Duration),
}

impl ReconnectPolicy {
    pub fn new(config: ReconnectConfig) -> Self {
        Self { config }
    }

    /// Delay before the given attempt: exponential growth from the base
    /// delay plus random jitter, capped at the configured ceiling.
    pub fn compute_delay(&self, attempt: u32) -> Duration {
        let exponential = self
            .config
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        let jitter = if self.config.jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..self.config.jitter_ms)
        };
        Duration::from_millis(exponential.saturating_add(jitter).min(self.config.max_delay_ms))
    }

    /// Apply the retry rules to a record that just failed.
    ///
    /// Mutates the attempt counter, cooldown window, and status, and tells
    /// the caller what to arm. Never schedules twice for one account: a
    /// pending retry or an unexpired cooldown makes this a no-op.
    pub fn next_action(
        &self,
        state: &mut ConnectionState,
        class: FailureClass,
        now: Instant,
    ) -> RetryAction {
        if state.reconnect_scheduled {
            return RetryAction::None;
        }
        if state.in_cooldown(now) {
            state.status = ConnectionStatus::CooldownWait;
            return RetryAction::None;
        }

        if class == FailureClass::Permanent {
            // Host categorically unreachable: skip the ladder and let the
            // health monitor revisit once the long window lapses.
            state.reconnect_attempts = state.max_reconnect_attempts;
            let window = self.config.permanent_cooldown();
            state.cooldown_until = Some(now + window);
            state.status = ConnectionStatus::CooldownWait;
            return RetryAction::Cooldown(window);
        }

        state.reconnect_attempts += 1;
        if state.reconnect_attempts >= state.max_reconnect_attempts {
            // Ceiling reached: fixed cooldown, counter reset for the next
            // cycle so the account becomes retryable once it lapses.
            let window = self.config.failure_cooldown();
            state.reconnect_attempts = 0;
            state.cooldown_until = Some(now + window);
            state.status = ConnectionStatus::CooldownWait;
            return RetryAction::Cooldown(window);
        }

        let delay = self.compute_delay(state.reconnect_attempts);
        state.reconnect_scheduled = true;
        state.status = ConnectionStatus::Disconnected;
        RetryAction::Schedule(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccountId, Protocol};

    fn policy_without_jitter() -> ReconnectPolicy {
        ReconnectPolicy::new(ReconnectConfig {
            jitter_ms: 0,
            ..ReconnectConfig::default()
        })
    }

    fn record() -> ConnectionState {
        ConnectionState::new(AccountId::new_v4(), Protocol::Imap, "INBOX", 5)
    }

    #[test]
    fn test_backoff_sequence() {
        let policy = policy_without_jitter();
        let delays: Vec<u64> = (1..=5)
            .map(|attempt| policy.compute_delay(attempt).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![2_000, 4_000, 8_000, 16_000, 32_000]);
    }

    #[test]
    fn test_backoff_cap() {
        let policy = policy_without_jitter();
        assert_eq!(policy.compute_delay(6), Duration::from_millis(60_000));
        assert_eq!(policy.compute_delay(30), Duration::from_millis(60_000));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = ReconnectPolicy::new(ReconnectConfig {
            jitter_ms: 500,
            ..ReconnectConfig::default()
        });
        for _ in 0..100 {
            let delay = policy.compute_delay(1).as_millis() as u64;
            assert!((2_000..2_500).contains(&delay));
        }
    }

    #[tokio::test]
    async fn test_transient_failure_schedules_retry() {
        let policy = policy_without_jitter();
        let mut state = record();

        let action = policy.next_action(&mut state, FailureClass::Transient, Instant::now());
        assert_eq!(action, RetryAction::Schedule(Duration::from_millis(2_000)));
        assert_eq!(state.reconnect_attempts, 1);
        assert!(state.reconnect_scheduled);
        assert_eq!(state.status, ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_no_duplicate_scheduling() {
        let policy = policy_without_jitter();
        let mut state = record();
        state.reconnect_scheduled = true;

        let action = policy.next_action(&mut state, FailureClass::Transient, Instant::now());
        assert_eq!(action, RetryAction::None);
        assert_eq!(state.reconnect_attempts, 0);
    }

    #[tokio::test]
    async fn test_permanent_failure_forces_cooldown() {
        let policy = policy_without_jitter();
        let mut state = record();
        let now = Instant::now();

        let action = policy.next_action(&mut state, FailureClass::Permanent, now);
        assert_eq!(action, RetryAction::Cooldown(Duration::from_secs(1_800)));
        assert_eq!(state.reconnect_attempts, state.max_reconnect_attempts);
        assert_eq!(state.status, ConnectionStatus::CooldownWait);
        assert!(state.in_cooldown(now));
    }

    #[tokio::test]
    async fn test_attempt_ceiling_enters_cooldown_and_resets_counter() {
        let policy = policy_without_jitter();
        let mut state = record();
        state.reconnect_attempts = 4;
        let now = Instant::now();

        let action = policy.next_action(&mut state, FailureClass::Transient, now);
        assert_eq!(action, RetryAction::Cooldown(Duration::from_secs(900)));
        assert_eq!(state.reconnect_attempts, 0);
        assert_eq!(state.status, ConnectionStatus::CooldownWait);
        assert!(state.in_cooldown(now));
    }

    #[tokio::test]
    async fn test_cooldown_suppresses_scheduling() {
        let policy = policy_without_jitter();
        let mut state = record();
        let now = Instant::now();
        state.cooldown_until = Some(now + Duration::from_secs(300));

        let action = policy.next_action(&mut state, FailureClass::Transient, now);
        assert_eq!(action, RetryAction::None);
        assert_eq!(state.status, ConnectionStatus::CooldownWait);
        assert_eq!(state.reconnect_attempts, 0);
    }
}
