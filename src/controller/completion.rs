//! Single-resolution result of a controller request
//!
//! Every operation on [`VibratorHandle`](super::VibratorHandle) returns a
//! [`Completion`]. Awaiting it is the future style; [`Completion::on_complete`]
//! is the callback style and invokes the callback exactly once. Both read the
//! same oneshot channel, so the controller never knows which style was used.

use std::future::{Future, IntoFuture};
use std::pin::Pin;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::error;

use crate::vibrator::VibrationError;

pub type ControllerResult<T> = Result<T, VibrationError>;

pub(crate) type Responder<T> = oneshot::Sender<ControllerResult<T>>;

enum Pending<T> {
    Ready(ControllerResult<T>),
    Waiting(oneshot::Receiver<ControllerResult<T>>),
}

#[must_use = "a completion does nothing unless awaited or given a callback"]
pub struct Completion<T> {
    pending: Pending<T>,
}

impl<T: Send + 'static> Completion<T> {
    pub(crate) fn ready(result: ControllerResult<T>) -> Self {
        Self {
            pending: Pending::Ready(result),
        }
    }

    pub(crate) fn waiting(receiver: oneshot::Receiver<ControllerResult<T>>) -> Self {
        Self {
            pending: Pending::Waiting(receiver),
        }
    }

    /// Resolves with the controller's answer
    pub async fn wait(self) -> ControllerResult<T> {
        match self.pending {
            Pending::Ready(result) => result,
            Pending::Waiting(receiver) => receiver.await.unwrap_or_else(|_| {
                error!("Vibrator controller dropped a request without answering");
                Err(VibrationError::operation_failed(
                    "controller stopped before answering",
                ))
            }),
        }
    }

    /// Hands the result to `callback` from a spawned task
    ///
    /// Must be called inside a tokio runtime. The callback runs even for
    /// results that were known up front, so it never fires before this
    /// method has returned.
    pub fn on_complete<F>(self, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(ControllerResult<T>) + Send + 'static,
    {
        tokio::spawn(async move {
            let result = self.wait().await;
            callback(result);
        })
    }
}

impl<T: Send + 'static> IntoFuture for Completion<T> {
    type Output = ControllerResult<T>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}
