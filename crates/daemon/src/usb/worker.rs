//! USB worker thread
//!
//! Dedicated thread that owns the rusb context and the session controller.
//! Communicates with the Tokio runtime through the light bridge.

use crate::config::SessionSettings;
use crate::usb::transport::{UsbTransport, list_devices};
use common::{EngineError, LightWorker, PollPolicy, SessionController};
use rusb::Context;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error};

/// Spawn the USB worker thread for one keyboard
///
/// The thread serves commands until a Shutdown command is received or every
/// bridge handle is dropped. It fails early only if libusb cannot be
/// initialized.
pub fn spawn_light_worker(
    worker: LightWorker,
    vendor_id: u16,
    product_id: u16,
    settings: &SessionSettings,
) -> JoinHandle<Result<(), EngineError>> {
    let policy = PollPolicy::from_attempts(settings.max_poll_attempts);
    let timeout = Duration::from_millis(settings.transfer_timeout_ms);

    std::thread::Builder::new()
        .name("usb-worker".to_string())
        .spawn(move || {
            let context = Context::new().map_err(|e| {
                error!("Failed to initialize libusb: {}", e);
                EngineError::Io(format!("libusb init failed: {}", e))
            })?;

            debug!(
                "Worker for {:04x}:{:04x}, poll policy {:?}, transfer timeout {:?}",
                vendor_id, product_id, policy, timeout
            );

            let transport =
                UsbTransport::new(context.clone(), vendor_id, product_id).with_timeout(timeout);
            let session = SessionController::new(transport).with_poll_policy(policy);

            worker.run(session, move || list_devices(&context));
            Ok(())
        })
        .expect("Failed to spawn USB worker thread")
}
