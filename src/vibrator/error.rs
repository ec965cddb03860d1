//! Error definitions for the vibrator module

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const PARAMETER_ERROR_CODE: i32 = 401;
pub const PERMISSION_DENIED_CODE: i32 = 201;
pub const DEVICE_OPERATION_FAILED_CODE: i32 = 14_600_101;

/// Errors reported to callers of the vibration controller
///
/// The display text is the public message of the error shape. The `reason`
/// fields carry the detail that only goes to the log.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VibrationError {
    /// Malformed, missing or out of range input, detected before any hardware access
    #[error("The parameter invalid.")]
    InvalidParameter { reason: String },

    /// Caller is not allowed to drive the vibrator
    #[error("Permission denied.")]
    PermissionDenied,

    /// Actuator or arbitration rejected a request that passed validation
    #[error("Device operation failed.")]
    OperationFailed { reason: String },
}

impl VibrationError {
    pub fn invalid_parameter(reason: impl Into<String>) -> Self {
        VibrationError::InvalidParameter {
            reason: reason.into(),
        }
    }

    pub fn operation_failed(reason: impl Into<String>) -> Self {
        VibrationError::OperationFailed {
            reason: reason.into(),
        }
    }

    /// Public error code of this kind
    pub fn code(&self) -> i32 {
        match self {
            VibrationError::InvalidParameter { .. } => PARAMETER_ERROR_CODE,
            VibrationError::PermissionDenied => PERMISSION_DENIED_CODE,
            VibrationError::OperationFailed { .. } => DEVICE_OPERATION_FAILED_CODE,
        }
    }

    /// Log detail, never shown to callers
    pub fn reason(&self) -> &str {
        match self {
            VibrationError::InvalidParameter { reason }
            | VibrationError::OperationFailed { reason } => reason,
            VibrationError::PermissionDenied => "vibrate permission not granted",
        }
    }

    pub fn shape(&self) -> ErrorShape {
        ErrorShape {
            code: self.code(),
            message: self.to_string(),
        }
    }
}

/// `{code, message}` pair handed across the binding boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorShape {
    /// Numeric code callers branch on (401, 201 or 14600101)
    pub code: i32,
    /// Fixed public message belonging to `code`
    pub message: String,
}

/// Failures raised by an actuator implementation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActuatorError {
    /// The hardware cannot play this effect for this usage
    #[error("effect {effect_id} not playable for usage {usage}")]
    Rejected { effect_id: String, usage: String },

    /// Driver missing or not responding
    #[error("actuator unavailable: {0}")]
    Unavailable(String),
}

impl From<ActuatorError> for VibrationError {
    fn from(err: ActuatorError) -> Self {
        VibrationError::operation_failed(err.to_string())
    }
}
