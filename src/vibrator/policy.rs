//! Arbitration between a live session and a newly submitted request

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use tracing::debug;

use super::types::{Usage, VibrationRequest};

/// Minimal view of a session used for arbitration
#[derive(Debug, Clone, Copy)]
pub struct SessionView<'a> {
    pub request: &'a VibrationRequest,
    pub usage: Usage,
}

/// Decides whether an incoming request may preempt the live session
///
/// Returning `Err` keeps the live session running and fails the incoming
/// request with `OperationFailed`; the string ends up in the log.
pub trait ArbitrationPolicy: Send + Sync + Debug + 'static {
    fn admit(&self, live: SessionView<'_>, incoming: SessionView<'_>) -> Result<(), String>;
}

/// Knobs of [`UsagePriorityPolicy`] as read from the config file
///
/// The defaults reproduce the arbitration of the platform vibrator service.
/// Rules are checked in field order; the first one that decides wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArbitrationConfig {
    /// A repeating preset (count > 1) always takes over the actuator
    ///
    /// Checked before every other rule, so a repeating preset even replaces
    /// a live alarm.
    #[serde(default = "default_true")]
    pub incoming_repeat_wins: bool,

    /// A live repeating preset only yields to an identical request
    #[serde(default = "default_true")]
    pub lock_repeating_presets: bool,

    /// Usages whose sessions are only replaced by a request of the same usage
    #[serde(default = "default_protected_usages")]
    pub protected_usages: Vec<Usage>,

    /// Usages that never replace a session of a usage outside this list
    ///
    /// With the default `[unknown]`, an anonymous request cannot cut off a
    /// notification or ring, but two anonymous requests replace each other.
    #[serde(default = "default_lowest_priority_usages")]
    pub lowest_priority_usages: Vec<Usage>,
}

fn default_true() -> bool {
    true
}

fn default_protected_usages() -> Vec<Usage> {
    vec![Usage::Alarm]
}

fn default_lowest_priority_usages() -> Vec<Usage> {
    vec![Usage::Unknown]
}

impl Default for ArbitrationConfig {
    fn default() -> Self {
        Self {
            incoming_repeat_wins: default_true(),
            lock_repeating_presets: default_true(),
            protected_usages: default_protected_usages(),
            lowest_priority_usages: default_lowest_priority_usages(),
        }
    }
}

/// Default policy built from [`ArbitrationConfig`]
///
/// Anything no rule refuses follows "last accepted request wins".
#[derive(Debug, Clone, Default)]
pub struct UsagePriorityPolicy {
    config: ArbitrationConfig,
}

impl UsagePriorityPolicy {
    /// Policy applying the rules enabled in `config`
    pub fn new(config: ArbitrationConfig) -> Self {
        Self { config }
    }

    /// Policy that never refuses, every request preempts the live one
    pub fn permissive() -> Self {
        Self::new(ArbitrationConfig {
            incoming_repeat_wins: false,
            lock_repeating_presets: false,
            protected_usages: Vec::new(),
            lowest_priority_usages: Vec::new(),
        })
    }
}

fn is_repeating(request: &VibrationRequest) -> bool {
    matches!(request, VibrationRequest::Effect { count, .. } if *count > 1)
}

impl ArbitrationPolicy for UsagePriorityPolicy {
    fn admit(&self, live: SessionView<'_>, incoming: SessionView<'_>) -> Result<(), String> {
        if self.config.incoming_repeat_wins && is_repeating(incoming.request) {
            debug!(
                "Repeating preset {} takes over from {} ({})",
                incoming.request, live.request, live.usage
            );
            return Ok(());
        }

        if self.config.lock_repeating_presets
            && is_repeating(live.request)
            && live.request != incoming.request
        {
            return Err(format!(
                "repeating preset {} still playing, {} refused",
                live.request, incoming.request
            ));
        }

        if self.config.protected_usages.contains(&live.usage) && incoming.usage != live.usage {
            return Err(format!(
                "live {} session with protected usage {} blocks {} request",
                live.request, live.usage, incoming.usage
            ));
        }

        let lowest = &self.config.lowest_priority_usages;
        if lowest.contains(&incoming.usage) && !lowest.contains(&live.usage) {
            return Err(format!(
                "{} request cannot preempt live {} session of usage {}",
                incoming.usage, live.request, live.usage
            ));
        }

        debug!(
            "{} ({}) may preempt {} ({})",
            incoming.request, incoming.usage, live.request, live.usage
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(request: &VibrationRequest, usage: Usage) -> SessionView<'_> {
        SessionView { request, usage }
    }

    #[test]
    fn alarm_only_yields_to_alarm() {
        let policy = UsagePriorityPolicy::new(ArbitrationConfig::default());
        let alarm = VibrationRequest::duration(3000);
        let tick = VibrationRequest::effect("haptic.clock.timer", 1);

        assert!(policy
            .admit(view(&alarm, Usage::Alarm), view(&tick, Usage::Unknown))
            .is_err());
        assert!(policy
            .admit(view(&alarm, Usage::Alarm), view(&tick, Usage::Alarm))
            .is_ok());
        assert!(policy
            .admit(view(&alarm, Usage::Alarm), view(&tick, Usage::Ring))
            .is_err());
    }

    #[test]
    fn incoming_repeating_preset_wins_over_alarm() {
        let policy = UsagePriorityPolicy::default();
        let alarm = VibrationRequest::duration(10_000);
        let three = VibrationRequest::effect("haptic.clock.timer", 3);

        assert!(policy
            .admit(view(&alarm, Usage::Alarm), view(&three, Usage::Unknown))
            .is_ok());

        let strict = UsagePriorityPolicy::new(ArbitrationConfig {
            incoming_repeat_wins: false,
            ..ArbitrationConfig::default()
        });
        assert!(strict
            .admit(view(&alarm, Usage::Alarm), view(&three, Usage::Unknown))
            .is_err());
    }

    #[test]
    fn unknown_usage_does_not_cut_off_named_usages() {
        let policy = UsagePriorityPolicy::default();
        let tick = VibrationRequest::effect("haptic.clock.timer", 1);

        assert!(policy
            .admit(view(&tick, Usage::Notification), view(&tick, Usage::Unknown))
            .is_err());
        assert!(policy
            .admit(view(&tick, Usage::Notification), view(&tick, Usage::Ring))
            .is_ok());
        assert!(policy
            .admit(view(&tick, Usage::Unknown), view(&tick, Usage::Unknown))
            .is_ok());
        assert!(policy
            .admit(view(&tick, Usage::Unknown), view(&tick, Usage::Alarm))
            .is_ok());
    }

    #[test]
    fn repeating_preset_only_restarts_identically() {
        let policy = UsagePriorityPolicy::new(ArbitrationConfig::default());
        let three = VibrationRequest::effect("haptic.clock.timer", 3);
        let one = VibrationRequest::effect("haptic.clock.timer", 1);

        assert!(policy
            .admit(view(&three, Usage::Unknown), view(&one, Usage::Unknown))
            .is_err());
        assert!(policy
            .admit(view(&three, Usage::Unknown), view(&three, Usage::Unknown))
            .is_ok());
        assert!(policy
            .admit(view(&one, Usage::Ring), view(&three, Usage::Notification))
            .is_ok());
    }

    #[test]
    fn permissive_policy_admits_everything() {
        let policy = UsagePriorityPolicy::permissive();
        let alarm = VibrationRequest::duration(3000);
        let three = VibrationRequest::effect("haptic.clock.timer", 3);
        assert!(policy
            .admit(view(&alarm, Usage::Alarm), view(&three, Usage::Unknown))
            .is_ok());
        assert!(policy
            .admit(view(&three, Usage::Unknown), view(&alarm, Usage::Alarm))
            .is_ok());
    }
}
