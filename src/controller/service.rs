//! Controller task owning the single session slot
//!
//! All mutating requests are serialised through one mpsc queue. The task
//! holds at most one live session; accepting a new one first tears the old
//! one down and waits for its playback task to finish, so the actuator never
//! serves two sessions.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::completion::{ControllerResult, Responder};
use super::session::{SessionSnapshot, StopReason, VibrationSession};
use super::ControllerSettings;
use crate::vibrator::{
    Actuator, ArbitrationPolicy, EffectCatalog, SessionView, StopMode, UsageContext,
    VibrationError, VibrationRequest,
};

macro_rules! respond {
    ($result:expr, $response_tx:expr) => {
        if $response_tx.send($result).is_err() {
            debug!("Caller dropped its completion before the answer arrived");
        }
    };
}

#[derive(Debug)]
pub(crate) enum ControllerCommand {
    Start {
        request: VibrationRequest,
        context: UsageContext,
        response_tx: Responder<()>,
    },
    Stop {
        mode: Option<StopMode>,
        response_tx: Responder<()>,
    },
}

/// Bookkeeping for the session currently owning the actuator
struct LiveSession {
    id: u64,
    request: VibrationRequest,
    context: UsageContext,
    stop_tx: Option<oneshot::Sender<StopReason>>,
    task: JoinHandle<()>,
}

pub(crate) struct VibratorService {
    settings: ControllerSettings,
    catalog: Arc<EffectCatalog>,
    actuator: Arc<dyn Actuator>,
    policy: Arc<dyn ArbitrationPolicy>,
    snapshots: Arc<watch::Sender<SessionSnapshot>>,
    live: Option<LiveSession>,
    next_id: u64,
}

impl VibratorService {
    pub(crate) fn new(
        settings: ControllerSettings,
        catalog: Arc<EffectCatalog>,
        actuator: Arc<dyn Actuator>,
        policy: Arc<dyn ArbitrationPolicy>,
        snapshots: Arc<watch::Sender<SessionSnapshot>>,
    ) -> Self {
        Self {
            settings,
            catalog,
            actuator,
            policy,
            snapshots,
            live: None,
            next_id: 1,
        }
    }

    pub(crate) async fn run(
        mut self,
        mut command_rx: mpsc::Receiver<ControllerCommand>,
        shutdown: CancellationToken,
    ) {
        info!("Vibrator controller running");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested for vibrator controller");
                    break;
                }
                command = command_rx.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => {
                        warn!("All vibrator handles dropped");
                        break;
                    }
                }
            }
        }

        self.teardown(StopReason::Stopped).await;
        info!("Vibrator controller terminated");
    }

    async fn handle(&mut self, command: ControllerCommand) {
        match command {
            ControllerCommand::Start {
                request,
                context,
                response_tx,
            } => {
                respond!(self.start(request, context).await, response_tx);
            }
            ControllerCommand::Stop { mode, response_tx } => {
                respond!(self.stop(mode).await, response_tx);
            }
        }
    }

    async fn start(
        &mut self,
        request: VibrationRequest,
        context: UsageContext,
    ) -> ControllerResult<()> {
        // Only accepted requests consume an id
        let id = self.next_id;

        let session = VibrationSession::create(id, request, context, self.actuator.clone())
            .validate(&self.catalog, self.settings.max_duration_ms)
            .inspect_err(|e| warn!("Rejected request: {}", e.reason()))?;

        self.check_permission()?;

        self.release_finished();
        if let Some(live) = &self.live {
            let live_view = SessionView {
                request: &live.request,
                usage: live.context.usage,
            };
            if let Err(reason) = self.policy.admit(live_view, session.view()) {
                warn!("Request refused by arbitration: {}", reason);
                return Err(VibrationError::operation_failed(reason));
            }
        }
        self.next_id += 1;

        self.teardown(StopReason::Preempted).await;

        match session.activate() {
            Ok(active) => {
                self.snapshots.send_replace(active.snapshot_active());

                let (stop_tx, stop_rx) = oneshot::channel();
                let request = active.request().clone();
                let snapshots = self.snapshots.clone();
                let task = tokio::spawn(async move {
                    let end = active.play(stop_rx).await;
                    debug!("Playback task for session {} finished", end.id());
                    snapshots.send_replace(end.snapshot());
                });

                self.live = Some(LiveSession {
                    id,
                    request,
                    context,
                    stop_tx: Some(stop_tx),
                    task,
                });
                Ok(())
            }
            Err(failed) => {
                self.snapshots.send_replace(SessionSnapshot::from(&failed));
                Err(VibrationError::operation_failed(failed.reason()))
            }
        }
    }

    async fn stop(&mut self, mode: Option<StopMode>) -> ControllerResult<()> {
        self.check_permission()?;

        self.release_finished();
        let live_mode = self.live.as_ref().map(|live| live.request.mode());
        match (live_mode, mode) {
            (None, _) => {
                debug!("Stop requested without an active session");
            }
            (Some(running), Some(wanted)) if running != wanted => {
                debug!(
                    "Stop for {} mode ignored, active session runs in {} mode",
                    wanted, running
                );
            }
            (Some(_), _) => {
                self.teardown(StopReason::Stopped).await;
            }
        }
        Ok(())
    }

    fn check_permission(&self) -> ControllerResult<()> {
        if self.settings.vibrate_permission_granted {
            Ok(())
        } else {
            warn!("Vibrate permission not granted");
            Err(VibrationError::PermissionDenied)
        }
    }

    /// Frees the slot when the live session already played to its end
    fn release_finished(&mut self) {
        if self
            .live
            .as_ref()
            .is_some_and(|live| live.task.is_finished())
        {
            if let Some(done) = self.live.take() {
                debug!("Session {} already finished, slot is free", done.id);
            }
        }
    }

    /// Ends the live session, if any, and waits until the actuator is released
    async fn teardown(&mut self, reason: StopReason) {
        let Some(mut live) = self.live.take() else {
            return;
        };

        if let Some(stop_tx) = live.stop_tx.take() {
            if stop_tx.send(reason).is_err() {
                debug!("Session {} ended before the {:?} signal", live.id, reason);
            }
        }

        if let Err(e) = live.task.await {
            error!("Playback task for session {} panicked: {}", live.id, e);
        }
    }
}
