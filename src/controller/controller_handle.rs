//! Vibrator Handle - public API of the vibration controller
//!
//! Spawns the controller task and forwards requests to it. The handle is
//! cheap to clone; all clones talk to the same controller and observe the
//! same session snapshots.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::completion::Completion;
use super::service::{ControllerCommand, VibratorService};
use super::session::SessionSnapshot;
use crate::vibrator::{
    Actuator, ArbitrationPolicy, EffectCatalog, StopMode, SystemVibrateMode, UsageContext,
    VibrationError, VibrationRequest,
};

/// Runtime limits of the controller task
///
/// Usually built from the `[limits]` and `[permission]` config sections via
/// [`ServiceConfig::controller_settings`](crate::config::ServiceConfig::controller_settings).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerSettings {
    /// Longest accepted time based vibration in milliseconds
    pub max_duration_ms: i64,

    /// Capacity of the command queue between handles and the controller
    ///
    /// Requests submitted while the queue is full fail right away instead of
    /// waiting for room.
    pub command_buffer: usize,

    /// Whether start and stop requests are allowed at all
    pub vibrate_permission_granted: bool,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            max_duration_ms: crate::vibrator::types::DEFAULT_MAX_DURATION_MS,
            command_buffer: 64,
            vibrate_permission_granted: true,
        }
    }
}

/// Errors that can occur while bringing the controller up
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    /// Settings or runtime environment prevent the controller from starting
    #[error("Initialization error: {0}")]
    InitializationError(String),

    /// The controller task is gone or its queue refused a request
    #[error("Channel error: {0}")]
    ChannelError(String),
}

/// Handle to a running vibration controller
///
/// # Calling conventions
///
/// Mutating operations return a [`Completion`]:
///
/// ```rust,no_run
/// use vibration_controller::controller::{ControllerSettings, VibratorHandle};
/// use vibration_controller::vibrator::{
///     EffectCatalogBuilder, SimulatedActuator, UsagePriorityPolicy, VibrationRequest,
/// };
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let handle = VibratorHandle::spawn(
///     ControllerSettings::default(),
///     Arc::new(EffectCatalogBuilder::default().build()),
///     Arc::new(SimulatedActuator::default()),
///     Arc::new(UsagePriorityPolicy::default()),
/// )?;
///
/// // future style
/// handle.vibrate(VibrationRequest::duration(500)).await?;
///
/// // callback style
/// handle
///     .vibrate(VibrationRequest::effect("haptic.fail", 1))
///     .on_complete(|result| println!("vibrate finished: {:?}", result));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct VibratorHandle {
    /// Queue into the controller task
    command_tx: mpsc::Sender<ControllerCommand>,
    /// Shared read-only catalog, answers support queries without the task
    catalog: Arc<EffectCatalog>,
    snapshots: watch::Receiver<SessionSnapshot>,
    shutdown: CancellationToken,
    /// Taken by the first `shutdown` call so the task is joined once
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl VibratorHandle {
    /// Spawns the controller task on the current tokio runtime
    ///
    /// # Errors
    ///
    /// * [`ControllerError::InitializationError`] - invalid settings or no
    ///   runtime to spawn on
    pub fn spawn(
        settings: ControllerSettings,
        catalog: Arc<EffectCatalog>,
        actuator: Arc<dyn Actuator>,
        policy: Arc<dyn ArbitrationPolicy>,
    ) -> Result<Self, ControllerError> {
        info!("Initializing vibrator controller with settings: {:?}", settings);

        if settings.max_duration_ms <= 0 {
            return Err(ControllerError::InitializationError(format!(
                "max_duration_ms must be positive, got {}",
                settings.max_duration_ms
            )));
        }
        if settings.command_buffer == 0 {
            return Err(ControllerError::InitializationError(
                "command_buffer must be at least 1".to_string(),
            ));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            ControllerError::InitializationError(format!("no tokio runtime: {}", e))
        })?;
        if catalog.is_empty() {
            warn!("Effect catalog is empty");
        }

        let (command_tx, command_rx) = mpsc::channel(settings.command_buffer);
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::idle());
        let shutdown = CancellationToken::new();
        debug!(
            "Created command channel with buffer capacity {}",
            settings.command_buffer
        );

        let service = VibratorService::new(
            settings,
            catalog.clone(),
            actuator,
            policy,
            Arc::new(snapshot_tx),
        );
        let worker = runtime.spawn(service.run(command_rx, shutdown.clone()));

        info!("Vibrator controller spawned with {} effects", catalog.len());
        Ok(Self {
            command_tx,
            catalog,
            snapshots: snapshot_rx,
            shutdown,
            worker: Arc::new(Mutex::new(Some(worker))),
        })
    }

    /// Starts a vibration with usage `unknown` and the default parameter
    pub fn vibrate(&self, request: VibrationRequest) -> Completion<()> {
        self.start_vibration(request, UsageContext::default())
    }

    /// Legacy fixed length vibration
    pub fn vibrate_mode(&self, mode: SystemVibrateMode) -> Completion<()> {
        self.vibrate(VibrationRequest::duration(mode.duration_ms()))
    }

    /// Starts a vibration on behalf of `context.usage`, preempting the live
    /// session if arbitration allows it
    pub fn start_vibration(
        &self,
        request: VibrationRequest,
        context: UsageContext,
    ) -> Completion<()> {
        debug!("start_vibration {} as {}", request, context.usage);
        self.submit(|response_tx| ControllerCommand::Start {
            request,
            context,
            response_tx,
        })
    }

    /// Stops the live session when it runs in `mode`, or whatever runs when
    /// `mode` is `None`
    pub fn stop_vibration(&self, mode: Option<StopMode>) -> Completion<()> {
        debug!("stop_vibration {:?}", mode);
        self.submit(|response_tx| ControllerCommand::Stop { mode, response_tx })
    }

    /// [`stop_vibration`](Self::stop_vibration) with the mode given by name
    pub fn stop_vibration_named(&self, mode: Option<&str>) -> Completion<()> {
        match mode.map(str::parse::<StopMode>).transpose() {
            Ok(mode) => self.stop_vibration(mode),
            Err(e) => {
                warn!("Rejected stop request: {}", e.reason());
                Completion::ready(Err(e))
            }
        }
    }

    /// Same as [`stop_vibration`](Self::stop_vibration)
    pub fn stop(&self, mode: Option<StopMode>) -> Completion<()> {
        self.stop_vibration(mode)
    }

    /// Stops whatever runs, regardless of its mode
    ///
    /// Succeeds without effect when nothing is playing.
    pub fn cancel(&self) -> Completion<()> {
        self.stop_vibration(None)
    }

    /// Catalog lookup, never touches the controller task
    pub fn is_support_effect(&self, effect_id: &str) -> Completion<bool> {
        Completion::ready(Ok(self.catalog.is_supported(effect_id)))
    }

    /// Every registered effect id, sorted
    pub fn supported_effects(&self) -> Vec<String> {
        self.catalog.ids()
    }

    /// Receiver that sees every published session snapshot
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    /// Most recently published snapshot, without waiting for a change
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Stops the live session and waits for the controller task to exit
    ///
    /// Requests submitted afterwards fail with `OperationFailed`.
    pub async fn shutdown(&self) {
        info!("Shutting down vibrator controller");
        self.shutdown.cancel();

        let worker = self.worker.lock().await.take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                error!("Vibrator controller task ended abnormally: {}", e);
            }
        }
    }

    fn submit<T, F>(&self, command: F) -> Completion<T>
    where
        T: Send + 'static,
        F: FnOnce(oneshot::Sender<Result<T, VibrationError>>) -> ControllerCommand,
    {
        let (response_tx, response_rx) = oneshot::channel();
        match self.command_tx.try_send(command(response_tx)) {
            Ok(()) => Completion::waiting(response_rx),
            Err(mpsc::error::TrySendError::Full(_)) => {
                let e = ControllerError::ChannelError("command queue full".to_string());
                error!("{}", e);
                Completion::ready(Err(VibrationError::operation_failed(e.to_string())))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                let e = ControllerError::ChannelError("controller not running".to_string());
                error!("{}", e);
                Completion::ready(Err(VibrationError::operation_failed(e.to_string())))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vibrator::{EffectCatalogBuilder, SimulatedActuator, UsagePriorityPolicy};

    fn spawn_default() -> (VibratorHandle, SimulatedActuator) {
        let actuator = SimulatedActuator::default();
        let handle = VibratorHandle::spawn(
            ControllerSettings::default(),
            Arc::new(EffectCatalogBuilder::default().build()),
            Arc::new(actuator.clone()),
            Arc::new(UsagePriorityPolicy::default()),
        )
        .unwrap();
        (handle, actuator)
    }

    #[test]
    fn spawn_outside_runtime_is_an_initialization_error() {
        let result = VibratorHandle::spawn(
            ControllerSettings::default(),
            Arc::new(EffectCatalogBuilder::default().build()),
            Arc::new(SimulatedActuator::default()),
            Arc::new(UsagePriorityPolicy::default()),
        );
        assert!(matches!(result, Err(ControllerError::InitializationError(_))));
    }

    #[tokio::test]
    async fn rejects_zero_command_buffer() {
        let settings = ControllerSettings {
            command_buffer: 0,
            ..ControllerSettings::default()
        };
        let result = VibratorHandle::spawn(
            settings,
            Arc::new(EffectCatalogBuilder::default().build()),
            Arc::new(SimulatedActuator::default()),
            Arc::new(UsagePriorityPolicy::default()),
        );
        assert!(matches!(result, Err(ControllerError::InitializationError(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn legacy_modes_map_to_fixed_durations() {
        let (handle, actuator) = spawn_default();

        handle.vibrate_mode(SystemVibrateMode::Short).await.unwrap();
        handle.vibrate_mode(SystemVibrateMode::Long).await.unwrap();

        let starts: Vec<_> = actuator
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                crate::vibrator::ActuatorCall::StartOnce { duration_ms, .. } => Some(duration_ms),
                _ => None,
            })
            .collect();
        assert_eq!(starts, vec![35, 1000]);
    }

    #[tokio::test(start_paused = true)]
    async fn named_stop_validates_before_queueing() {
        let (handle, _) = spawn_default();

        let err = handle.stop_vibration_named(Some("")).await.unwrap_err();
        assert_eq!(err.code(), 401);
        let err = handle.stop_vibration_named(Some("loud")).await.unwrap_err();
        assert_eq!(err.code(), 401);

        handle.stop_vibration_named(Some("time")).await.unwrap();
        handle.stop_vibration_named(None).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn requests_after_shutdown_fail() {
        let (handle, actuator) = spawn_default();

        handle.vibrate(VibrationRequest::duration(60_000)).await.unwrap();
        assert!(actuator.is_engaged());

        handle.shutdown().await;
        assert!(!actuator.is_engaged());

        let err = handle.vibrate(VibrationRequest::duration(10)).await.unwrap_err();
        assert_eq!(err.code(), 14600101);

        // second shutdown is a no-op
        handle.shutdown().await;
    }
}
