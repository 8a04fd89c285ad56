//! Async channel bridge between the Tokio runtime and the USB worker thread
//!
//! The worker thread owns the one [`SessionController`] for the device and
//! handles commands strictly one after another, so overlapping `apply`
//! calls from async callers are serialized here rather than inside the
//! session controller.

use crate::error::{EngineError, Result};
use crate::session::SessionController;
use crate::transport::Transport;
use async_channel::{Receiver, Sender, bounded};
use protocol::{Block, HardwareProfile, LightingOperation};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// USB device seen during enumeration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSummary {
    pub vendor_id: u16,
    pub product_id: u16,
    pub bus_number: u8,
    pub device_address: u8,
    pub product: Option<String>,
}

/// Commands from Tokio runtime to the USB thread
#[derive(Debug)]
pub enum LightCommand {
    /// Run one lighting update
    Apply {
        profile: Arc<HardwareProfile>,
        block: Block,
        operations: Vec<LightingOperation>,
        /// Channel to send response back
        response: oneshot::Sender<Result<()>>,
    },

    /// List connected USB devices
    ListDevices {
        /// Channel to send response back
        response: oneshot::Sender<Vec<DeviceSummary>>,
    },

    /// Shutdown the USB thread gracefully
    Shutdown,
}

/// Handle for Tokio runtime (async)
#[derive(Clone)]
pub struct LightBridge {
    cmd_tx: Sender<LightCommand>,
}

impl LightBridge {
    /// Send a command to the USB thread
    pub async fn send_command(&self, cmd: LightCommand) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|e| EngineError::Channel(e.to_string()))
    }

    /// Queue a lighting update and wait for its result
    pub async fn apply(
        &self,
        profile: Arc<HardwareProfile>,
        block: Block,
        operations: Vec<LightingOperation>,
    ) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send_command(LightCommand::Apply {
            profile,
            block,
            operations,
            response: tx,
        })
        .await?;

        rx.await
            .map_err(|e| EngineError::Channel(format!("USB worker dropped request: {}", e)))?
    }

    /// Ask the USB thread for the connected devices
    pub async fn list_devices(&self) -> Result<Vec<DeviceSummary>> {
        let (tx, rx) = oneshot::channel();
        self.send_command(LightCommand::ListDevices { response: tx })
            .await?;
        rx.await
            .map_err(|e| EngineError::Channel(format!("USB worker dropped request: {}", e)))
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send_command(LightCommand::Shutdown).await
    }
}

/// Handle for USB thread (blocking)
pub struct LightWorker {
    cmd_rx: Receiver<LightCommand>,
}

impl LightWorker {
    /// Receive a command from Tokio runtime (blocking)
    pub fn recv_command(&self) -> Result<LightCommand> {
        self.cmd_rx
            .recv_blocking()
            .map_err(|e| EngineError::Channel(e.to_string()))
    }

    /// Serve commands until shutdown or until every bridge is dropped
    ///
    /// `list_devices` is called on the worker thread for
    /// [`LightCommand::ListDevices`]. The released session is handed back
    /// when the loop ends.
    pub fn run<T, F>(
        self,
        mut session: SessionController<T>,
        mut list_devices: F,
    ) -> SessionController<T>
    where
        T: Transport,
        F: FnMut() -> Vec<DeviceSummary>,
    {
        info!("USB worker thread started");

        loop {
            let cmd = match self.recv_command() {
                Ok(cmd) => cmd,
                Err(e) => {
                    debug!("Command channel closed: {}", e);
                    break;
                }
            };

            match cmd {
                LightCommand::Apply {
                    profile,
                    block,
                    operations,
                    response,
                } => {
                    debug!(
                        "Applying {} operations (block {}, save={})",
                        operations.len(),
                        block.block_id,
                        block.save
                    );
                    let result = session.apply(&profile, block, &operations);
                    if response.send(result).is_err() {
                        warn!("Apply caller went away before the result was ready");
                    }
                }
                LightCommand::ListDevices { response } => {
                    let _ = response.send(list_devices());
                }
                LightCommand::Shutdown => {
                    info!("USB worker shutting down");
                    break;
                }
            }
        }

        session.transport_mut().release();
        info!("USB worker thread stopped");
        session
    }
}

/// Create the channel bridge between Tokio and the USB thread
///
/// Returns (LightBridge for Tokio, LightWorker for USB thread)
pub fn create_light_bridge() -> (LightBridge, LightWorker) {
    let (cmd_tx, cmd_rx) = bounded(32);
    (LightBridge { cmd_tx }, LightWorker { cmd_rx })
}
