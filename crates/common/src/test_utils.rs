//! Test utilities for the lighting engine
//!
//! Provides a sample hardware profile and a scripted mock transport for
//! testing the session controller and worker bridge without hardware.
//!
//! Compiled for this crate's tests and behind the `test-utils` feature.
//!
//! # Example
//!
//! ```ignore
//! use common::test_utils::{MockTransport, sample_operations, sample_profile};
//! use common::SessionController;
//! use protocol::Block;
//!
//! let profile = sample_profile();
//! let mut session = SessionController::new(MockTransport::ready(&profile));
//! session.apply(&profile, Block::volatile(1), &sample_operations()).unwrap();
//! assert_eq!(session.transport().take_overs, 1);
//! ```

use crate::error::{EngineError, Result};
use crate::transport::Transport;
use protocol::{
    HardwareProfile, LightingOperation, Packet, PacketKind, ProtocolConstants, Region, Rgb,
};
use std::collections::VecDeque;
use std::future::Future;
use std::time::Duration;

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

pub const SAMPLE_VENDOR_ID: u16 = 0x187c;
pub const SAMPLE_PRODUCT_ID: u16 = 0x0521;

/// M14x-shaped profile with a handful of regions
pub fn sample_profile() -> HardwareProfile {
    let regions = vec![
        Region::new("RIGHT_KEYBOARD", "Right keyboard", 0x0001).with_max_commands(3),
        Region::new("MIDDLE_RIGHT_KEYBOARD", "Middle-right keyboard", 0x0002).with_max_commands(3),
        Region::new("MIDDLE_LEFT_KEYBOARD", "Middle-left keyboard", 0x0004).with_max_commands(3),
        Region::new("LEFT_KEYBOARD", "Left keyboard", 0x0008).with_max_commands(3),
        Region::new("ALIEN_HEAD", "Alien head", 0x0080).with_max_commands(3),
        Region::new("LOGO", "Alienware logo", 0x0100).with_max_commands(3),
        Region::new("MEDIA_BAR", "Media bar", 0x1c00).with_max_commands(3),
        Region::new("POWER_BUTTON", "Power button", 0x2000).with_capabilities(false, false),
    ];

    HardwareProfile::new(
        "Alienware M14x",
        SAMPLE_VENDOR_ID,
        SAMPLE_PRODUCT_ID,
        ProtocolConstants::default(),
        regions,
    )
    .expect("sample profile is valid")
}

/// A small volatile-safe theme: speed, two regions, end of block
pub fn sample_operations() -> Vec<LightingOperation> {
    vec![
        LightingOperation::SetSpeed { speed: 200 },
        LightingOperation::fixed(0x0008, Rgb::new(0, 255, 0)),
        LightingOperation::EndColorsLine,
        LightingOperation::morph(0x0080, Rgb::new(255, 0, 0), Rgb::new(0, 0, 255)),
        LightingOperation::EndColorsLine,
        LightingOperation::EndBlockLine,
    ]
}

/// Scripted in-memory transport
///
/// Status reads pop the scripted state codes first and then keep
/// answering with the ready code.
#[derive(Debug, Default)]
pub struct MockTransport {
    /// Every successfully written packet, in order
    pub written: Vec<Vec<u8>>,
    /// Kind of every successfully written packet, in order
    pub kinds: Vec<PacketKind>,
    pub take_overs: u32,
    pub releases: u32,
    pub status_reads: u32,
    statuses: VecDeque<u8>,
    ready_state: u8,
    fail_write_at: Option<usize>,
    fail_read_at: Option<u32>,
    missing: bool,
    claimed: bool,
}

impl MockTransport {
    /// Transport whose device is always ready
    pub fn ready(profile: &HardwareProfile) -> Self {
        Self {
            ready_state: profile.constants().state_ready,
            ..Default::default()
        }
    }

    /// Transport whose device is never found
    pub fn missing() -> Self {
        Self {
            missing: true,
            ..Default::default()
        }
    }

    /// Answer the next status reads with these state codes
    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = u8>) -> Self {
        self.statuses.extend(statuses);
        self
    }

    /// Fail the write with this zero-based index
    pub fn failing_write_at(mut self, index: usize) -> Self {
        self.fail_write_at = Some(index);
        self
    }

    /// Fail the status read with this zero-based index
    pub fn failing_read_at(mut self, index: u32) -> Self {
        self.fail_read_at = Some(index);
        self
    }

    /// Number of written packets of a kind
    pub fn count(&self, kind: PacketKind) -> usize {
        self.kinds.iter().filter(|k| **k == kind).count()
    }
}

impl Transport for MockTransport {
    fn take_over(&mut self) -> Result<()> {
        if self.missing {
            return Err(EngineError::DeviceNotFound {
                vendor_id: SAMPLE_VENDOR_ID,
                product_id: SAMPLE_PRODUCT_ID,
            });
        }
        self.take_overs += 1;
        self.claimed = true;
        Ok(())
    }

    fn write(&mut self, packet: &Packet) -> Result<()> {
        if !self.claimed {
            return Err(EngineError::Io("device not claimed".to_string()));
        }
        if self.fail_write_at == Some(self.written.len()) {
            self.fail_write_at = None;
            return Err(EngineError::Io("mock write failure".to_string()));
        }
        self.written.push(packet.bytes().to_vec());
        self.kinds.push(packet.kind());
        Ok(())
    }

    fn read_status(&mut self, expected_len: usize) -> Result<Vec<u8>> {
        if !self.claimed {
            return Err(EngineError::Io("device not claimed".to_string()));
        }
        if self.fail_read_at == Some(self.status_reads) {
            self.fail_read_at = None;
            return Err(EngineError::Io("mock read failure".to_string()));
        }
        self.status_reads += 1;
        let state = self.statuses.pop_front().unwrap_or(self.ready_state);
        let mut response = vec![0u8; expected_len.max(1)];
        response[0] = state;
        Ok(response)
    }

    fn release(&mut self) {
        self.releases += 1;
        self.claimed = false;
    }
}

/// Run a future with a timeout, panicking if it expires
pub async fn with_timeout<F, T>(future: F) -> T
where
    F: Future<Output = T>,
{
    tokio::time::timeout(DEFAULT_TEST_TIMEOUT, future)
        .await
        .expect("test timed out")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_profile_regions() {
        let profile = sample_profile();
        assert_eq!(profile.regions().len(), 8);
        assert!(profile.region("MEDIA_BAR").is_some());
    }

    #[test]
    fn test_mock_scripted_statuses() {
        let profile = sample_profile();
        let mut mock = MockTransport::ready(&profile).with_statuses([0x11]);
        mock.take_over().unwrap();

        assert_eq!(mock.read_status(9).unwrap()[0], 0x11);
        assert_eq!(mock.read_status(9).unwrap()[0], 0x10);
        assert_eq!(mock.status_reads, 2);
    }

    #[test]
    fn test_mock_read_failure() {
        let profile = sample_profile();
        let mut mock = MockTransport::ready(&profile).failing_read_at(1);
        mock.take_over().unwrap();

        assert!(mock.read_status(9).is_ok());
        assert!(mock.read_status(9).is_err());
        assert!(mock.read_status(9).is_ok());
        assert_eq!(mock.status_reads, 2);
    }

    #[test]
    fn test_mock_requires_claim() {
        let profile = sample_profile();
        let mut mock = MockTransport::ready(&profile);
        assert!(mock.read_status(9).is_err());
    }
}
