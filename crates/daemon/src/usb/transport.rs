//! rusb-backed transport
//!
//! Opens the keyboard by exact VID/PID, claims interface 0 and moves
//! packets with HID class control transfers (SET_REPORT out, GET_REPORT in).

use common::{DeviceSummary, EngineError, Transport};
use protocol::Packet;
use rusb::{Context, DeviceHandle, UsbContext};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Interface carrying the lighting controller
const INTERFACE: u8 = 0;

/// Configuration selected before claiming
const CONFIGURATION: u8 = 1;

// Host-to-device, class, interface: HID SET_REPORT
const SEND_REQUEST_TYPE: u8 = 0x21;
const SEND_REQUEST: u8 = 0x09;
const SEND_VALUE: u16 = 0x0202;
const SEND_INDEX: u16 = 0x0000;

// Device-to-host, class, interface: HID GET_REPORT
const READ_REQUEST_TYPE: u8 = 0xA1;
const READ_REQUEST: u8 = 0x01;
const READ_VALUE: u16 = 0x0101;
const READ_INDEX: u16 = 0x0000;

/// Default timeout for control transfers (5 seconds)
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Exclusive handle on one AlienFX controller
pub struct UsbTransport {
    context: Context,
    vendor_id: u16,
    product_id: u16,
    timeout: Duration,
    /// Device handle (if opened)
    handle: Option<DeviceHandle<Context>>,
    /// Whether we detached a kernel driver that should be given back
    detached_kernel_driver: bool,
}

impl UsbTransport {
    pub fn new(context: Context, vendor_id: u16, product_id: u16) -> Self {
        Self {
            context,
            vendor_id,
            product_id,
            timeout: DEFAULT_TIMEOUT,
            handle: None,
            detached_kernel_driver: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Find and open the device, select its configuration and claim it
    fn open(&mut self) -> Result<DeviceHandle<Context>, EngineError> {
        let devices = self.context.devices().map_err(|e| self.map_error(e))?;

        let device = devices
            .iter()
            .find(|device| {
                device.device_descriptor().is_ok_and(|desc| {
                    desc.vendor_id() == self.vendor_id && desc.product_id() == self.product_id
                })
            })
            .ok_or(EngineError::DeviceNotFound {
                vendor_id: self.vendor_id,
                product_id: self.product_id,
            })?;

        let mut handle = device.open().map_err(|e| self.map_error(e))?;
        debug!(
            "Opened {:04x}:{:04x} on bus {:03} device {:03}",
            self.vendor_id,
            self.product_id,
            device.bus_number(),
            device.address()
        );

        if let Err(e) = self.configure_and_claim(&mut handle) {
            if self.detached_kernel_driver {
                reattach_kernel_driver(&mut handle);
                self.detached_kernel_driver = false;
            }
            return Err(e);
        }
        debug!("Claimed interface {}", INTERFACE);

        Ok(handle)
    }

    /// Select the configuration (detaching the kernel driver once if needed)
    /// and claim the lighting interface
    fn configure_and_claim(&mut self, handle: &mut DeviceHandle<Context>) -> common::Result<()> {
        if let Err(e) = handle.set_active_configuration(CONFIGURATION) {
            debug!("set_configuration failed ({}), detaching kernel driver", e);
            match handle.detach_kernel_driver(INTERFACE) {
                Ok(()) => self.detached_kernel_driver = true,
                Err(e) => debug!("Could not detach kernel driver: {}", e),
            }

            handle.set_active_configuration(CONFIGURATION).map_err(|e| {
                EngineError::Configuration(format!(
                    "set_configuration failed after detaching kernel driver: {}",
                    e
                ))
            })?;
        }

        handle
            .claim_interface(INTERFACE)
            .map_err(|e| self.map_error(e))
    }

    fn handle(&self) -> Result<&DeviceHandle<Context>, EngineError> {
        self.handle
            .as_ref()
            .ok_or_else(|| EngineError::Io("device not claimed".to_string()))
    }

    fn map_error(&self, err: rusb::Error) -> EngineError {
        map_rusb_error(err, self.vendor_id, self.product_id)
    }
}

impl Transport for UsbTransport {
    fn take_over(&mut self) -> common::Result<()> {
        if self.is_open() {
            return Ok(());
        }

        let handle = self.open()?;
        self.handle = Some(handle);
        info!(
            "Took over device {:04x}:{:04x}",
            self.vendor_id, self.product_id
        );
        Ok(())
    }

    fn write(&mut self, packet: &Packet) -> common::Result<()> {
        let handle = self.handle()?;
        let written = handle
            .write_control(
                SEND_REQUEST_TYPE,
                SEND_REQUEST,
                SEND_VALUE,
                SEND_INDEX,
                packet.bytes(),
                self.timeout,
            )
            .map_err(map_transfer_error)?;

        if written != packet.bytes().len() {
            return Err(EngineError::Io(format!(
                "short write: {} of {} bytes",
                written,
                packet.bytes().len()
            )));
        }
        Ok(())
    }

    fn read_status(&mut self, expected_len: usize) -> common::Result<Vec<u8>> {
        let handle = self.handle()?;
        let mut buffer = vec![0u8; expected_len];
        let len = handle
            .read_control(
                READ_REQUEST_TYPE,
                READ_REQUEST,
                READ_VALUE,
                READ_INDEX,
                &mut buffer,
                self.timeout,
            )
            .map_err(map_transfer_error)?;
        buffer.truncate(len);
        Ok(buffer)
    }

    fn release(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            if let Err(e) = handle.release_interface(INTERFACE) {
                warn!("Failed to release interface {}: {}", INTERFACE, e);
            }

            if self.detached_kernel_driver {
                reattach_kernel_driver(&mut handle);
                self.detached_kernel_driver = false;
            }

            debug!(
                "Released device {:04x}:{:04x}",
                self.vendor_id, self.product_id
            );
        }
    }
}

impl Drop for UsbTransport {
    fn drop(&mut self) {
        self.release();
    }
}

fn reattach_kernel_driver(handle: &mut DeviceHandle<Context>) {
    match handle.attach_kernel_driver(INTERFACE) {
        Ok(()) => debug!("Reattached kernel driver to interface {}", INTERFACE),
        Err(e) => debug!("Could not reattach kernel driver: {}", e),
    }
}

/// Map a control transfer failure; once claimed, every bus error is I/O
pub fn map_transfer_error(err: rusb::Error) -> EngineError {
    EngineError::Io(format!("control transfer failed: {}", err))
}

/// Map an error raised while finding or opening the device
pub fn map_rusb_error(err: rusb::Error, vendor_id: u16, product_id: u16) -> EngineError {
    match err {
        rusb::Error::NoDevice | rusb::Error::NotFound => EngineError::DeviceNotFound {
            vendor_id,
            product_id,
        },
        rusb::Error::Access => EngineError::Configuration(format!(
            "permission denied opening {:04x}:{:04x}",
            vendor_id, product_id
        )),
        rusb::Error::Busy => EngineError::Configuration(format!(
            "interface {} of {:04x}:{:04x} is busy",
            INTERFACE, vendor_id, product_id
        )),
        _ => EngineError::Io(err.to_string()),
    }
}

/// Enumerate connected USB devices
pub fn list_devices(context: &Context) -> Vec<DeviceSummary> {
    let devices = match context.devices() {
        Ok(devices) => devices,
        Err(e) => {
            warn!("Failed to enumerate USB devices: {}", e);
            return Vec::new();
        }
    };

    devices
        .iter()
        .filter_map(|device| {
            let descriptor = device.device_descriptor().ok()?;
            let product = descriptor.product_string_index().and_then(|idx| {
                device
                    .open()
                    .ok()
                    .and_then(|handle| handle.read_string_descriptor_ascii(idx).ok())
            });

            Some(DeviceSummary {
                vendor_id: descriptor.vendor_id(),
                product_id: descriptor.product_id(),
                bus_number: device.bus_number(),
                device_address: device.address(),
                product,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_rusb_error() {
        assert!(matches!(
            map_rusb_error(rusb::Error::NoDevice, 0x187c, 0x0521),
            EngineError::DeviceNotFound {
                vendor_id: 0x187c,
                product_id: 0x0521
            }
        ));
        assert!(matches!(
            map_rusb_error(rusb::Error::Access, 0x187c, 0x0521),
            EngineError::Configuration(_)
        ));
        assert!(matches!(
            map_rusb_error(rusb::Error::Timeout, 0x187c, 0x0521),
            EngineError::Io(_)
        ));
    }

    #[test]
    fn test_transfer_errors_are_io() {
        for err in [
            rusb::Error::Busy,
            rusb::Error::Access,
            rusb::Error::NoDevice,
            rusb::Error::Pipe,
            rusb::Error::Timeout,
        ] {
            assert!(matches!(map_transfer_error(err), EngineError::Io(_)));
        }
    }

    #[test]
    fn test_write_requires_claim() {
        // Context creation may fail without USB access
        let Ok(context) = Context::new() else {
            return;
        };
        let mut transport = UsbTransport::new(context, 0x187c, 0x0521);
        assert!(!transport.is_open());
        assert!(transport.read_status(9).is_err());
        transport.release();
    }

    #[test]
    fn test_failed_take_over_leaves_driver_attached() {
        let Ok(context) = Context::new() else {
            return;
        };
        let mut transport = UsbTransport::new(context, 0xffff, 0xfffe);
        assert!(matches!(
            transport.take_over(),
            Err(EngineError::DeviceNotFound { .. })
        ));
        assert!(!transport.is_open());
        assert!(!transport.detached_kernel_driver);
    }
}
