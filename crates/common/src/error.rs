//! Engine error types

use protocol::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// No USB device matches the profile's vendor/product id
    #[error("Device {vendor_id:04x}:{product_id:04x} not found")]
    DeviceNotFound { vendor_id: u16, product_id: u16 },

    /// `set_configuration` failed even after detaching the kernel driver
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A control transfer failed mid-sequence
    #[error("USB I/O error: {0}")]
    Io(String),

    /// The operations could not be encoded
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Bounded poll policy gave up before the device reported ready
    #[error("Device not ready after {attempts} status polls")]
    NotReady { attempts: u32 },

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Logging setup error: {0}")]
    Logging(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_not_found_display() {
        let err = EngineError::DeviceNotFound {
            vendor_id: 0x187c,
            product_id: 0x0521,
        };
        assert_eq!(err.to_string(), "Device 187c:0521 not found");
    }

    #[test]
    fn test_protocol_error_conversion() {
        let err: EngineError = ProtocolError::EmptyOperations.into();
        assert!(matches!(err, EngineError::Protocol(ProtocolError::EmptyOperations)));
    }
}
