//! Vibration session with statum state machine
//!
//! One session is one activation of the motor. The controller validates it,
//! activates it and hands the active session to a playback task that runs
//! until the request finishes or a stop signal arrives.
//!
//! # State Machine
//!
//! ```text
//! Validating ──► Active ──► Completed
//!     │            ├──────► Stopped
//!     │            ├──────► Preempted
//!     ▼            ▼
//!   Failed ◄───────┘
//! ```
//!
//! Validation errors drop the session before it ever touches the actuator.

use chrono::{DateTime, Local};
use serde::Serialize;
use statum::{machine, state};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::vibrator::{
    Actuator, EffectCatalog, EffectInfo, SessionView, StopMode, Usage, UsageContext,
    VibrationError, VibrationRequest,
};

/// Why a failed session did not finish
#[derive(Debug, Clone)]
pub struct FailureReason {
    pub message: String,
}

#[state]
#[derive(Debug, Clone)]
pub enum SessionState {
    Validating,
    Active,
    Completed,
    Stopped,
    Preempted,
    Failed(FailureReason),
}

/// Signal sent to a playing session by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Explicit stop request or service shutdown
    Stopped,
    /// A newer request took over the actuator
    Preempted,
}

#[machine]
pub struct VibrationSession<S: SessionState> {
    id: u64,
    request: VibrationRequest,
    context: UsageContext,
    actuator: Arc<dyn Actuator>,
    effect: Option<EffectInfo>,
    created_at: DateTime<Local>,
}

impl<S: SessionState> VibrationSession<S> {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn request(&self) -> &VibrationRequest {
        &self.request
    }

    pub fn usage(&self) -> Usage {
        self.context.usage
    }

    pub fn mode(&self) -> StopMode {
        self.request.mode()
    }

    pub fn view(&self) -> SessionView<'_> {
        SessionView {
            request: &self.request,
            usage: self.context.usage,
        }
    }

    fn snapshot(&self, phase: SessionPhase) -> SessionSnapshot {
        SessionSnapshot {
            session_id: Some(self.id),
            phase,
            mode: Some(self.request.mode()),
            request: Some(self.request.clone()),
            usage: Some(self.context.usage),
            updated_at: Local::now(),
        }
    }
}

impl VibrationSession<Validating> {
    pub fn create(
        id: u64,
        request: VibrationRequest,
        context: UsageContext,
        actuator: Arc<dyn Actuator>,
    ) -> Self {
        debug!("Creating session {} for {} ({})", id, request, context.usage);
        Self::new(id, request, context, actuator, None, Local::now())
    }

    /// Checks the request against the catalog and limits
    ///
    /// Resolves the effect metadata for preset requests so playback never has
    /// to consult the catalog again.
    pub fn validate(
        mut self,
        catalog: &EffectCatalog,
        max_duration_ms: i64,
    ) -> Result<Self, VibrationError> {
        self.context.parameter.validate()?;

        match &self.request {
            VibrationRequest::Duration { millis } => {
                if *millis <= 0 || *millis > max_duration_ms {
                    return Err(VibrationError::invalid_parameter(format!(
                        "duration {}ms outside 1..={}",
                        millis, max_duration_ms
                    )));
                }
            }
            VibrationRequest::Effect { effect_id, count } => {
                if effect_id.is_empty() {
                    return Err(VibrationError::invalid_parameter("effect id is empty"));
                }
                if *count < 1 {
                    return Err(VibrationError::invalid_parameter(format!(
                        "count {} must be at least 1",
                        count
                    )));
                }
                let effect = catalog.lookup(effect_id).ok_or_else(|| {
                    VibrationError::invalid_parameter(format!(
                        "effect '{}' is not registered",
                        effect_id
                    ))
                })?;
                self.effect = Some(effect.clone());
            }
        }

        debug!("Session {} validated", self.id);
        Ok(self)
    }

    /// Starts the actuator for the first run of the request
    pub fn activate(self) -> Result<VibrationSession<Active>, VibrationSession<Failed>> {
        let started = match (&self.request, &self.effect) {
            (VibrationRequest::Duration { millis }, _) => self.actuator.start_once(
                *millis as u64,
                self.context.usage,
                self.context.parameter,
            ),
            (VibrationRequest::Effect { .. }, Some(effect)) => {
                self.actuator
                    .start_effect(effect, self.context.usage, self.context.parameter)
            }
            (VibrationRequest::Effect { effect_id, .. }, None) => {
                let message = format!("effect {} was never resolved", effect_id);
                return Err(self.transition_with(FailureReason { message }));
            }
        };

        match started {
            Ok(()) => {
                info!("Session {} active: {}", self.id, self.request);
                Ok(self.transition())
            }
            Err(e) => {
                warn!("Actuator refused session {}: {}", self.id, e);
                Err(self.transition_with(FailureReason {
                    message: e.to_string(),
                }))
            }
        }
    }
}

impl VibrationSession<Active> {
    pub fn snapshot_active(&self) -> SessionSnapshot {
        self.snapshot(SessionPhase::Active)
    }

    /// Plays the session to its end
    ///
    /// Time sessions wait out their duration. Preset sessions play `count`
    /// repetitions of the effect, stopping the actuator after each one. A stop
    /// signal interrupts either kind at once; the actuator is always stopped
    /// before this returns.
    pub async fn play(self, mut stop_rx: oneshot::Receiver<StopReason>) -> SessionEnd {
        match self.request.clone() {
            VibrationRequest::Duration { millis } => {
                let interrupted = tokio::select! {
                    reason = &mut stop_rx => Some(reason.unwrap_or(StopReason::Stopped)),
                    _ = tokio::time::sleep(Duration::from_millis(millis as u64)) => None,
                };
                self.halt(StopMode::Time);
                self.finish(interrupted)
            }
            VibrationRequest::Effect { count, .. } => {
                let Some(effect) = self.effect.clone() else {
                    return self.fail("preset session without effect metadata".to_string());
                };

                for repetition in 0..count {
                    if repetition > 0 {
                        if let Err(e) = self.actuator.start_effect(
                            &effect,
                            self.context.usage,
                            self.context.parameter,
                        ) {
                            return self.fail(e.to_string());
                        }
                    }
                    debug!(
                        "Session {} repetition {}/{} of {}",
                        self.id,
                        repetition + 1,
                        count,
                        effect.id
                    );

                    let interrupted = tokio::select! {
                        reason = &mut stop_rx => Some(reason.unwrap_or(StopReason::Stopped)),
                        _ = tokio::time::sleep(Duration::from_millis(effect.duration_ms)) => None,
                    };
                    self.halt(StopMode::Preset);

                    if interrupted.is_some() {
                        return self.finish(interrupted);
                    }
                }
                self.finish(None)
            }
        }
    }

    fn halt(&self, mode: StopMode) {
        if let Err(e) = self.actuator.stop(mode) {
            warn!("Failed to stop actuator for session {}: {}", self.id, e);
        }
    }

    fn finish(self, interrupted: Option<StopReason>) -> SessionEnd {
        let elapsed = Local::now() - self.created_at;
        match interrupted {
            None => {
                info!(
                    "Session {} completed after {}ms",
                    self.id,
                    elapsed.num_milliseconds()
                );
                SessionEnd::Completed(self.transition())
            }
            Some(StopReason::Stopped) => {
                info!("Session {} stopped", self.id);
                SessionEnd::Stopped(self.transition())
            }
            Some(StopReason::Preempted) => {
                info!("Session {} preempted", self.id);
                SessionEnd::Preempted(self.transition())
            }
        }
    }

    fn fail(self, message: String) -> SessionEnd {
        warn!("Session {} failed during playback: {}", self.id, message);
        SessionEnd::Failed(self.transition_with(FailureReason { message }))
    }
}

impl VibrationSession<Failed> {
    pub fn reason(&self) -> String {
        self.get_state_data()
            .map(|reason| reason.message.clone())
            .unwrap_or_default()
    }
}

/// Terminal state a played session ended in
pub enum SessionEnd {
    Completed(VibrationSession<Completed>),
    Stopped(VibrationSession<Stopped>),
    Preempted(VibrationSession<Preempted>),
    Failed(VibrationSession<Failed>),
}

impl SessionEnd {
    pub fn id(&self) -> u64 {
        match self {
            SessionEnd::Completed(s) => s.id(),
            SessionEnd::Stopped(s) => s.id(),
            SessionEnd::Preempted(s) => s.id(),
            SessionEnd::Failed(s) => s.id(),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        match self {
            SessionEnd::Completed(s) => s.snapshot(SessionPhase::Completed),
            SessionEnd::Stopped(s) => s.snapshot(SessionPhase::Stopped),
            SessionEnd::Preempted(s) => s.snapshot(SessionPhase::Preempted),
            SessionEnd::Failed(s) => s.snapshot(SessionPhase::Failed),
        }
    }
}

impl From<&VibrationSession<Failed>> for SessionSnapshot {
    fn from(session: &VibrationSession<Failed>) -> Self {
        session.snapshot(SessionPhase::Failed)
    }
}

/// Lifecycle phase of the most recent session as seen by observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Idle,
    Active,
    Completed,
    Stopped,
    Preempted,
    Failed,
}

/// Published state of the session slot
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Option<u64>,
    pub phase: SessionPhase,
    pub mode: Option<StopMode>,
    pub request: Option<VibrationRequest>,
    pub usage: Option<Usage>,
    pub updated_at: DateTime<Local>,
}

impl SessionSnapshot {
    pub fn idle() -> Self {
        Self {
            session_id: None,
            phase: SessionPhase::Idle,
            mode: None,
            request: None,
            usage: None,
            updated_at: Local::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vibrator::{
        ActuatorCall, EffectCatalogBuilder, RejectedPair, SimulatedActuator, VibratorParameter,
    };

    fn session(
        request: VibrationRequest,
        usage: Usage,
        actuator: &SimulatedActuator,
    ) -> VibrationSession<Validating> {
        VibrationSession::create(1, request, UsageContext::new(usage), Arc::new(actuator.clone()))
    }

    #[test]
    fn duration_bounds_are_inclusive_of_the_maximum() {
        let catalog = EffectCatalogBuilder::default().build();
        let actuator = SimulatedActuator::default();

        for ok in [1, 10, 1_800_000] {
            assert!(session(VibrationRequest::duration(ok), Usage::Unknown, &actuator)
                .validate(&catalog, 1_800_000)
                .is_ok());
        }
        for bad in [-1, 0, 1_800_001] {
            let err = session(VibrationRequest::duration(bad), Usage::Unknown, &actuator)
                .validate(&catalog, 1_800_000)
                .err()
                .unwrap();
            assert_eq!(err.code(), 401);
        }
    }

    #[test]
    fn effect_validation() {
        let catalog = EffectCatalogBuilder::default().build();
        let actuator = SimulatedActuator::default();

        for bad in [
            VibrationRequest::effect("", 1),
            VibrationRequest::effect("haptic.xxx.yyy", 1),
            VibrationRequest::effect("haptic.clock.timer", 0),
        ] {
            assert!(session(bad, Usage::Unknown, &actuator)
                .validate(&catalog, 1_800_000)
                .is_err());
        }
        assert!(actuator.calls().is_empty());
    }

    #[test]
    fn out_of_range_parameter_is_rejected() {
        let catalog = EffectCatalogBuilder::default().build();
        let actuator = SimulatedActuator::default();
        let context = UsageContext::new(Usage::Media).with_parameter(VibratorParameter {
            intensity: 150,
            frequency: 0,
        });
        let result = VibrationSession::create(
            7,
            VibrationRequest::duration(100),
            context,
            Arc::new(actuator),
        )
        .validate(&catalog, 1_800_000);
        assert!(matches!(result, Err(VibrationError::InvalidParameter { .. })));
    }

    #[test]
    fn refused_activation_ends_in_failed() {
        let catalog = EffectCatalogBuilder::default().build();
        let actuator = SimulatedActuator::new([RejectedPair {
            effect_id: "haptic.clock.timer".into(),
            usage: Usage::Ring,
        }]);
        let failed = session(
            VibrationRequest::effect("haptic.clock.timer", 1),
            Usage::Ring,
            &actuator,
        )
        .validate(&catalog, 1_800_000)
        .unwrap()
        .activate()
        .err()
        .unwrap();

        assert!(failed.reason().contains("haptic.clock.timer"));
        assert_eq!(SessionSnapshot::from(&failed).phase, SessionPhase::Failed);
        assert!(!actuator.is_engaged());
    }

    #[tokio::test(start_paused = true)]
    async fn preset_plays_every_repetition() {
        let catalog = EffectCatalogBuilder::empty()
            .with_effect("haptic.tick", 50)
            .build();
        let actuator = SimulatedActuator::default();
        let active = session(VibrationRequest::effect("haptic.tick", 3), Usage::Touch, &actuator)
            .validate(&catalog, 1_800_000)
            .unwrap()
            .activate()
            .ok()
            .unwrap();

        let (_stop_tx, stop_rx) = oneshot::channel();
        let end = active.play(stop_rx).await;

        assert_eq!(end.snapshot().phase, SessionPhase::Completed);
        let starts = actuator
            .calls()
            .into_iter()
            .filter(|call| matches!(call, ActuatorCall::StartEffect { .. }))
            .count();
        assert_eq!(starts, 3);
        assert!(!actuator.is_engaged());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_signal_interrupts_playback() {
        let catalog = EffectCatalogBuilder::default().build();
        let actuator = SimulatedActuator::default();
        let active = session(VibrationRequest::duration(60_000), Usage::Unknown, &actuator)
            .validate(&catalog, 1_800_000)
            .unwrap()
            .activate()
            .ok()
            .unwrap();

        let (stop_tx, stop_rx) = oneshot::channel();
        let playback = tokio::spawn(active.play(stop_rx));
        stop_tx.send(StopReason::Preempted).unwrap();

        let end = playback.await.unwrap();
        assert_eq!(end.snapshot().phase, SessionPhase::Preempted);
        assert_eq!(end.id(), 1);
        assert_eq!(
            actuator.calls().last(),
            Some(&ActuatorCall::Stop {
                mode: StopMode::Time
            })
        );
    }
}
