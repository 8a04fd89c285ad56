//! Common runtime pieces for the AlienFX lighting engine
//!
//! This crate provides what sits between the pure packet encoder and the
//! USB hardware: the transport abstraction, the session controller that
//! runs the ready/busy handshake, the worker bridge that serializes access
//! to a device, error handling and logging.

pub mod channel;
pub mod error;
pub mod logging;
pub mod session;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod transport;

pub use channel::{DeviceSummary, LightBridge, LightCommand, LightWorker, create_light_bridge};
pub use error::{EngineError, Result};
pub use logging::setup_logging;
pub use session::{PollPolicy, SessionController, SessionState};
pub use transport::Transport;
