//! Controller subsystem for vibration sessions
//!
//! Split into three layers:
//!
//! 1. [`session`] - statum state machine for a single motor activation
//! 2. `service` - task owning the session slot and arbitrating requests
//! 3. [`controller_handle`] - cloneable API and lifecycle management
//!
//! # Architecture
//!
//! ```text
//! VibratorHandle ──[ControllerCommand]──► VibratorService ──► playback task
//!       ▲                                      │                  │
//!       └────────── Completion (oneshot) ◄─────┘                  │
//!       └────────── SessionSnapshot (watch) ◄─────────────────────┘
//! ```
//!
//! Every mutating call is answered through a [`Completion`], which can be
//! awaited or given a callback.

pub mod completion;
pub mod controller_handle;
mod service;
pub mod session;

pub use completion::{Completion, ControllerResult};
pub use controller_handle::{ControllerError, ControllerSettings, VibratorHandle};
pub use session::{SessionPhase, SessionSnapshot};
