//! Vibration domain: requests, usages, effects and the motor abstraction
//!
//! Everything here is plain data or a trait seam; the session lifecycle and
//! arbitration loop live in [`crate::controller`].

pub mod actuator;
pub mod catalog;
pub mod error;
pub mod policy;
pub mod types;

pub use actuator::{Actuator, ActuatorCall, RejectedPair, SimulatedActuator};
pub use catalog::{EffectCatalog, EffectCatalogBuilder, EffectInfo};
pub use error::{ActuatorError, ErrorShape, VibrationError};
pub use policy::{ArbitrationConfig, ArbitrationPolicy, SessionView, UsagePriorityPolicy};
pub use types::{
    StopMode, SystemVibrateMode, Usage, UsageContext, VibrationRequest, VibratorParameter,
};
