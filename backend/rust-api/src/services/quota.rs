//! Daily call budget for the remote reasoning service.
//!
//! The governor is an injected object rather than ambient module state, and
//! the check-then-increment is done under one lock so concurrent requests
//! cannot overshoot the ceiling.

use chrono::{Local, NaiveDate};
use std::sync::Mutex;

use crate::metrics::QUOTA_RESETS_TOTAL;

#[derive(Debug)]
struct QuotaState {
    calls_today: u32,
    last_reset: NaiveDate,
}

#[derive(Debug)]
pub struct QuotaGovernor {
    daily_limit: u32,
    state: Mutex<QuotaState>,
}

impl QuotaGovernor {
    pub fn new(daily_limit: u32) -> Self {
        Self {
            daily_limit,
            state: Mutex::new(QuotaState {
                calls_today: 0,
                last_reset: Local::now().date_naive(),
            }),
        }
    }

    /// Atomically reserve one model-backed call for today. Returns false when
    /// the daily ceiling is reached; the caller must route to the fallback
    /// generator instead of surfacing an error.
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_on(Local::now().date_naive())
    }

    /// Date-injected variant of [`try_acquire`](Self::try_acquire). The
    /// counter resets exactly once when `today` moves past the stored reset
    /// date, regardless of how many requests race over the boundary.
    pub fn try_acquire_on(&self, today: NaiveDate) -> bool {
        let mut state = self.state.lock().expect("quota state poisoned");

        if state.last_reset != today {
            tracing::info!(
                calls_yesterday = state.calls_today,
                "Resetting daily AI call counter"
            );
            state.calls_today = 0;
            state.last_reset = today;
            QUOTA_RESETS_TOTAL.inc();
        }

        if state.calls_today >= self.daily_limit {
            tracing::warn!(
                limit = self.daily_limit,
                "Daily AI call limit reached, degrading to fallback generator"
            );
            return false;
        }

        state.calls_today += 1;
        true
    }

    pub fn calls_today(&self) -> u32 {
        self.state.lock().expect("quota state poisoned").calls_today
    }

    pub fn daily_limit(&self) -> u32 {
        self.daily_limit
    }
}

/// Does an error message from the remote service indicate its own rate
/// limiting? Those failures degrade to the fallback generator instead of
/// surfacing to the caller.
pub fn is_rate_limit_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("quota")
        || lower.contains("rate limit")
        || lower.contains("resource_exhausted")
        || lower.contains("429")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn exhausting_the_limit_denies_further_calls() {
        let governor = QuotaGovernor::new(3);
        let today = day("2025-03-10");

        for _ in 0..3 {
            assert!(governor.try_acquire_on(today));
        }
        assert!(!governor.try_acquire_on(today));
        assert_eq!(governor.calls_today(), 3);
    }

    #[test]
    fn day_rollover_resets_the_counter_once() {
        let governor = QuotaGovernor::new(2);
        let monday = day("2025-03-10");
        let tuesday = day("2025-03-11");

        assert!(governor.try_acquire_on(monday));
        assert!(governor.try_acquire_on(monday));
        assert!(!governor.try_acquire_on(monday));

        // First call after the rollover must be permitted regardless of the
        // prior day's count.
        assert!(governor.try_acquire_on(tuesday));
        assert_eq!(governor.calls_today(), 1);
    }

    #[test]
    fn zero_limit_always_denies() {
        let governor = QuotaGovernor::new(0);
        assert!(!governor.try_acquire_on(day("2025-03-10")));
    }

    #[test]
    fn rate_limit_messages_are_detected() {
        assert!(is_rate_limit_message("429 Too Many Requests"));
        assert!(is_rate_limit_message("Quota exceeded for model"));
        assert!(is_rate_limit_message("RESOURCE_EXHAUSTED"));
        assert!(!is_rate_limit_message("connection refused"));
    }
}
