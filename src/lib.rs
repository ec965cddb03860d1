//! Vibration session controller
//!
//! Accepts time based and preset vibration requests, keeps at most one of
//! them driving the motor and arbitrates between competing usages.
//!
//! - [`vibrator`] - request types, effect catalog, actuator seam, arbitration
//! - [`controller`] - session state machine and the controller task
//! - [`bridge`] - JSON line protocol served by the daemon
//! - [`config`] - TOML service configuration

pub mod bridge;
pub mod config;
pub mod controller;
pub mod vibrator;
