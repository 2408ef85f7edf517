//! Per-question countdown timers.
//!
//! Every timed-writing step registers a countdown once its intro (if any) is
//! dismissed. One shared one-second tick decrements every armed, non-expired
//! timer in lockstep. Expiry freezes the remaining value at zero and is
//! irreversible; it never forces navigation by itself.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Countdown state of one question.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimerState {
    pub remaining_secs: u64,
    pub expired: bool,
}

/// Owns every armed countdown in the module.
#[derive(Debug, Default, Clone)]
pub struct TimerManager {
    timers: HashMap<String, TimerState>,
}

impl TimerManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a countdown for `question_id`. Re-arming an existing timer
    /// is a no-op; the original countdown keeps running.
    pub fn arm(&mut self, question_id: &str, duration_secs: u64) {
        if self.timers.contains_key(question_id) {
            return;
        }
        tracing::debug!("Timer armed for {question_id}: {duration_secs}s");
        self.timers.insert(
            question_id.to_string(),
            TimerState {
                remaining_secs: duration_secs,
                expired: false,
            },
        );
    }

    /// Advances every armed, non-expired timer by one second. Returns the
    /// ids whose timers expired on this tick.
    pub fn tick(&mut self) -> Vec<String> {
        let mut newly_expired = Vec::new();
        for (id, state) in &mut self.timers {
            if state.expired {
                continue;
            }
            state.remaining_secs = state.remaining_secs.saturating_sub(1);
            if state.remaining_secs == 0 {
                state.expired = true;
                newly_expired.push(id.clone());
            }
        }
        for id in &newly_expired {
            tracing::info!("Timer expired for {id}");
        }
        newly_expired
    }

    pub fn state(&self, question_id: &str) -> Option<TimerState> {
        self.timers.get(question_id).copied()
    }

    pub fn is_armed(&self, question_id: &str) -> bool {
        self.timers.contains_key(question_id)
    }

    pub fn is_expired(&self, question_id: &str) -> bool {
        self.timers
            .get(question_id)
            .map(|s| s.expired)
            .unwrap_or(false)
    }

    pub fn remaining(&self, question_id: &str) -> Option<u64> {
        self.timers.get(question_id).map(|s| s.remaining_secs)
    }
}

/// hh:mm:ss rendering used by the countdown display.
pub fn format_secs(total: u64) -> String {
    let hours = total / 3600;
    let mins = (total % 3600) / 60;
    let secs = total % 60;
    format!("{hours:02}:{mins:02}:{secs:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_is_non_increasing_and_never_negative() {
        let mut timers = TimerManager::new();
        timers.arm("q1", 3);
        let mut previous = timers.remaining("q1").unwrap();
        for _ in 0..6 {
            timers.tick();
            let now = timers.remaining("q1").unwrap();
            assert!(now <= previous);
            previous = now;
        }
        assert_eq!(timers.remaining("q1"), Some(0));
    }

    #[test]
    fn expiry_fires_exactly_once() {
        let mut timers = TimerManager::new();
        timers.arm("q1", 2);
        assert!(timers.tick().is_empty());
        assert_eq!(timers.tick(), vec!["q1".to_string()]);
        assert!(timers.is_expired("q1"));
        // Further ticks neither re-expire nor go below zero.
        assert!(timers.tick().is_empty());
        assert_eq!(timers.remaining("q1"), Some(0));
    }

    #[test]
    fn rearming_keeps_the_running_countdown() {
        let mut timers = TimerManager::new();
        timers.arm("q1", 100);
        timers.tick();
        timers.arm("q1", 100);
        assert_eq!(timers.remaining("q1"), Some(99));
    }

    #[test]
    fn armed_timers_tick_in_lockstep() {
        let mut timers = TimerManager::new();
        timers.arm("q1", 10);
        timers.arm("q2", 5);
        for _ in 0..4 {
            timers.tick();
        }
        assert_eq!(timers.remaining("q1"), Some(6));
        assert_eq!(timers.remaining("q2"), Some(1));
    }

    #[test]
    fn formats_hh_mm_ss() {
        assert_eq!(format_secs(0), "00:00:00");
        assert_eq!(format_secs(420), "00:07:00");
        assert_eq!(format_secs(3661), "01:01:01");
    }
}
