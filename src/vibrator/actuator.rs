//! Hardware abstraction for the vibration motor
//!
//! The controller only talks to the motor through [`Actuator`]. The daemon
//! ships [`SimulatedActuator`], which logs what a driver would be asked to do
//! and can be told to reject effect/usage pairs the hardware cannot play.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::catalog::EffectInfo;
use super::error::ActuatorError;
use super::types::{StopMode, Usage, VibratorParameter};

/// Driver facing side of the controller
///
/// Calls are short and non-blocking; waiting for a vibration to finish is the
/// session's job, not the actuator's.
pub trait Actuator: Send + Sync + 'static {
    /// Runs the motor for `duration_ms`
    fn start_once(
        &self,
        duration_ms: u64,
        usage: Usage,
        parameter: VibratorParameter,
    ) -> Result<(), ActuatorError>;

    /// Plays one repetition of a preset effect
    fn start_effect(
        &self,
        effect: &EffectInfo,
        usage: Usage,
        parameter: VibratorParameter,
    ) -> Result<(), ActuatorError>;

    /// Halts whatever runs in `mode`
    fn stop(&self, mode: StopMode) -> Result<(), ActuatorError>;
}

/// Effect/usage pair the simulated hardware refuses
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RejectedPair {
    /// Effect id as registered in the catalog
    pub effect_id: String,
    /// Usage the effect is refused for; other usages still play it
    pub usage: Usage,
}

/// Call recorded by [`SimulatedActuator`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActuatorCall {
    StartOnce { duration_ms: u64, usage: Usage },
    StartEffect { effect_id: String, usage: Usage },
    Stop { mode: StopMode },
}

#[derive(Debug, Default)]
struct SimulatedState {
    engaged: Option<StopMode>,
    calls: Vec<ActuatorCall>,
    overlapping_starts: usize,
}

/// In-process stand-in for the motor driver
#[derive(Debug, Clone, Default)]
pub struct SimulatedActuator {
    rejected: Arc<HashSet<RejectedPair>>,
    state: Arc<Mutex<SimulatedState>>,
}

impl SimulatedActuator {
    pub fn new(rejected: impl IntoIterator<Item = RejectedPair>) -> Self {
        Self {
            rejected: Arc::new(rejected.into_iter().collect()),
            state: Arc::new(Mutex::new(SimulatedState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimulatedState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every call received so far, oldest first
    pub fn calls(&self) -> Vec<ActuatorCall> {
        self.lock().calls.clone()
    }

    /// Whether the motor currently runs
    pub fn is_engaged(&self) -> bool {
        self.lock().engaged.is_some()
    }

    /// Starts issued while the motor was still running
    pub fn overlapping_starts(&self) -> usize {
        self.lock().overlapping_starts
    }

    fn engage(&self, mode: StopMode, call: ActuatorCall) {
        let mut state = self.lock();
        if let Some(running) = state.engaged {
            warn!("Actuator started in {} mode while {} was running", mode, running);
            state.overlapping_starts += 1;
        }
        state.engaged = Some(mode);
        state.calls.push(call);
    }
}

impl Actuator for SimulatedActuator {
    fn start_once(
        &self,
        duration_ms: u64,
        usage: Usage,
        parameter: VibratorParameter,
    ) -> Result<(), ActuatorError> {
        info!(
            "Actuator: run {}ms (usage {}, intensity {}, frequency {})",
            duration_ms, usage, parameter.intensity, parameter.frequency
        );
        self.engage(StopMode::Time, ActuatorCall::StartOnce { duration_ms, usage });
        Ok(())
    }

    fn start_effect(
        &self,
        effect: &EffectInfo,
        usage: Usage,
        parameter: VibratorParameter,
    ) -> Result<(), ActuatorError> {
        let pair = RejectedPair {
            effect_id: effect.id.clone(),
            usage,
        };
        if self.rejected.contains(&pair) {
            warn!("Actuator refuses effect {} for usage {}", effect.id, usage);
            return Err(ActuatorError::Rejected {
                effect_id: effect.id.clone(),
                usage: usage.to_string(),
            });
        }

        info!(
            "Actuator: play {} (usage {}, intensity {}, frequency {})",
            effect.id, usage, parameter.intensity, parameter.frequency
        );
        self.engage(
            StopMode::Preset,
            ActuatorCall::StartEffect {
                effect_id: effect.id.clone(),
                usage,
            },
        );
        Ok(())
    }

    fn stop(&self, mode: StopMode) -> Result<(), ActuatorError> {
        let mut state = self.lock();
        if state.engaged == Some(mode) {
            state.engaged = None;
        } else {
            debug!("Actuator stop({}) while not running in that mode", mode);
        }
        state.calls.push(ActuatorCall::Stop { mode });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_configured_pairs_only() {
        let actuator = SimulatedActuator::new([RejectedPair {
            effect_id: "haptic.clock.timer".into(),
            usage: Usage::Ring,
        }]);
        let effect = EffectInfo::new("haptic.clock.timer", 2000);

        assert!(actuator
            .start_effect(&effect, Usage::Ring, VibratorParameter::default())
            .is_err());
        assert!(!actuator.is_engaged());

        actuator
            .start_effect(&effect, Usage::Notification, VibratorParameter::default())
            .unwrap();
        assert!(actuator.is_engaged());
        actuator.stop(StopMode::Preset).unwrap();
        assert!(!actuator.is_engaged());
    }

    #[test]
    fn counts_overlapping_starts() {
        let actuator = SimulatedActuator::default();
        actuator
            .start_once(100, Usage::Unknown, VibratorParameter::default())
            .unwrap();
        actuator
            .start_once(100, Usage::Unknown, VibratorParameter::default())
            .unwrap();
        assert_eq!(actuator.overlapping_starts(), 1);
        assert_eq!(actuator.calls().len(), 2);
    }
}
