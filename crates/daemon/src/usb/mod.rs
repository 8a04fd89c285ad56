//! USB subsystem
//!
//! The USB subsystem runs in a dedicated thread (worker) so blocking control
//! transfers and the ready poll never stall the Tokio runtime. The worker
//! owns the one session controller for the keyboard.

pub mod transport;
pub mod worker;

pub use worker::spawn_light_worker;
