//! Deadline and escalation bookkeeping for supervised turns.
//!
//! The supervising loop in `io::process` owns the clock; this module only
//! answers "has a deadline passed?" and "which termination stages are due?".

use std::time::Duration;

use crate::core::types::TimeoutKind;

/// Timeout policy for one supervised turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogPolicy {
    /// Kill the turn when no byte arrived on either stream for this long.
    pub no_output_timeout: Duration,
    /// Kill the turn when it has been running for this long, output or not.
    pub max_duration: Duration,
    /// How often deadlines are checked.
    pub poll_interval: Duration,
    /// Delay after the interrupt before sending a terminate signal.
    pub terminate_after: Duration,
    /// Delay after the interrupt before force-killing.
    pub kill_after: Duration,
}

impl Default for WatchdogPolicy {
    fn default() -> Self {
        Self {
            no_output_timeout: Duration::from_secs(180),
            max_duration: Duration::from_secs(900),
            poll_interval: Duration::from_secs(5),
            terminate_after: Duration::from_secs(3),
            kill_after: Duration::from_secs(4),
        }
    }
}

impl WatchdogPolicy {
    /// Return the deadline that has passed, if any.
    ///
    /// The hang check runs first; both thresholds are strict (`>`).
    pub fn check(&self, since_start: Duration, since_output: Duration) -> Option<TimeoutKind> {
        if since_output > self.no_output_timeout {
            return Some(TimeoutKind::NoOutput);
        }
        if since_start > self.max_duration {
            return Some(TimeoutKind::MaxDuration);
        }
        None
    }
}

/// Termination signals, in escalation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Interrupt,
    Terminate,
    Kill,
}

/// One-shot escalation schedule, measured from the moment the watchdog fired.
#[derive(Debug, Clone)]
pub struct Escalation {
    schedule: [(Duration, Stage); 3],
    sent: usize,
}

impl Escalation {
    pub fn new(policy: &WatchdogPolicy) -> Self {
        Self {
            schedule: [
                (Duration::ZERO, Stage::Interrupt),
                (policy.terminate_after, Stage::Terminate),
                (policy.kill_after, Stage::Kill),
            ],
            sent: 0,
        }
    }

    /// Stages that became due at `elapsed`, each returned exactly once.
    pub fn take_due(&mut self, elapsed: Duration) -> Vec<Stage> {
        let mut due = Vec::new();
        while let Some((at, stage)) = self.schedule.get(self.sent) {
            if *at > elapsed {
                break;
            }
            due.push(*stage);
            self.sent += 1;
        }
        due
    }

    /// Time from `elapsed` until the next pending stage.
    pub fn next_due_in(&self, elapsed: Duration) -> Option<Duration> {
        self.schedule
            .get(self.sent)
            .map(|(at, _)| at.saturating_sub(elapsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> WatchdogPolicy {
        WatchdogPolicy {
            no_output_timeout: Duration::from_secs(180),
            max_duration: Duration::from_secs(900),
            ..WatchdogPolicy::default()
        }
    }

    #[test]
    fn gaps_below_threshold_never_fire() {
        let policy = policy();
        for gap in [0, 1, 60, 179, 180] {
            assert_eq!(
                policy.check(Duration::from_secs(300), Duration::from_secs(gap)),
                None,
                "gap {gap}s should not fire"
            );
        }
    }

    #[test]
    fn silence_past_threshold_is_a_hang() {
        assert_eq!(
            policy().check(Duration::from_secs(200), Duration::from_secs(181)),
            Some(TimeoutKind::NoOutput)
        );
    }

    #[test]
    fn duration_limit_ignores_recent_output() {
        assert_eq!(
            policy().check(Duration::from_secs(901), Duration::ZERO),
            Some(TimeoutKind::MaxDuration)
        );
    }

    #[test]
    fn escalation_interrupts_immediately_then_terminates_then_kills() {
        let mut escalation = Escalation::new(&WatchdogPolicy::default());

        assert_eq!(escalation.take_due(Duration::ZERO), vec![Stage::Interrupt]);
        assert_eq!(
            escalation.next_due_in(Duration::from_secs(1)),
            Some(Duration::from_secs(2))
        );
        assert!(escalation.take_due(Duration::from_secs(2)).is_empty());
        assert_eq!(
            escalation.take_due(Duration::from_secs(3)),
            vec![Stage::Terminate]
        );
        assert_eq!(escalation.take_due(Duration::from_secs(10)), vec![Stage::Kill]);
        assert!(escalation.take_due(Duration::from_secs(20)).is_empty());
        assert_eq!(escalation.next_due_in(Duration::from_secs(20)), None);
    }

    #[test]
    fn late_poll_delivers_all_overdue_stages_once() {
        let mut escalation = Escalation::new(&WatchdogPolicy::default());
        assert_eq!(
            escalation.take_due(Duration::from_secs(5)),
            vec![Stage::Interrupt, Stage::Terminate, Stage::Kill]
        );
        assert!(escalation.take_due(Duration::from_secs(6)).is_empty());
    }
}
