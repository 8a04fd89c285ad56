//! Hardware profile and region definitions
//!
//! A [`HardwareProfile`] describes one keyboard model: its USB identity, the
//! fixed protocol constants its controller speaks, and the lighting regions it
//! exposes. Profiles are validated once when built and are immutable
//! afterwards; the encoder and session controller only borrow them.

use crate::error::{ProtocolError, Result};
use crate::types::Mode;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Smallest packet length that can carry a color command (indices 0..=8)
pub const MIN_DATA_LENGTH: usize = 9;

/// Highest bitmask expressible in the three area bytes
pub const MAX_AREA_BITMASK: u32 = 0x00FF_FFFF;

/// Fixed protocol constants for one controller family
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConstants {
    /// Packet length in bytes
    pub data_length: usize,
    /// First byte of every packet
    pub start_byte: u8,
    /// Padding for unused packet bytes
    pub fill_byte: u8,

    pub op_set_morph_color: u8,
    pub op_set_blink_color: u8,
    pub op_set_color: u8,
    pub op_loop_block_end: u8,
    pub op_transmit_execute: u8,
    pub op_get_status: u8,
    pub op_reset: u8,
    pub op_save_next: u8,
    pub op_save: u8,
    pub op_set_speed: u8,

    pub state_ready: u8,
    pub state_busy: u8,
    pub state_unknown_command: u8,

    pub reset_touch_controls: u8,
    pub reset_sleep_lights_on: u8,
    pub reset_all_off: u8,
    pub reset_all_on: u8,

    /// Lowest speed the controller accepts
    pub speed_min: u8,
}

impl Default for ProtocolConstants {
    fn default() -> Self {
        Self {
            data_length: 9,
            start_byte: 0x02,
            fill_byte: 0x00,

            op_set_morph_color: 0x01,
            op_set_blink_color: 0x02,
            op_set_color: 0x03,
            op_loop_block_end: 0x04,
            op_transmit_execute: 0x05,
            op_get_status: 0x06,
            op_reset: 0x07,
            op_save_next: 0x08,
            op_save: 0x09,
            op_set_speed: 0x0E,

            state_ready: 0x10,
            state_busy: 0x11,
            state_unknown_command: 0x12,

            reset_touch_controls: 0x01,
            reset_sleep_lights_on: 0x02,
            reset_all_off: 0x03,
            reset_all_on: 0x04,

            speed_min: 1,
        }
    }
}

/// Addressable lighting area of the keyboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    /// Symbolic name, e.g. `LEFT_KEYBOARD`
    pub id: String,
    /// Human readable description
    #[serde(default)]
    pub description: String,
    /// Hardware area identifier (24 significant bits)
    pub bitmask: u32,
    /// Max color zones addressable in this region within one block
    #[serde(default = "Region::default_max_commands")]
    pub max_commands: u8,
    #[serde(default = "Region::default_capability")]
    pub can_blink: bool,
    #[serde(default = "Region::default_capability")]
    pub can_morph: bool,
}

impl Region {
    pub fn new(id: impl Into<String>, description: impl Into<String>, bitmask: u32) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            bitmask,
            max_commands: Self::default_max_commands(),
            can_blink: true,
            can_morph: true,
        }
    }

    pub fn with_max_commands(mut self, max_commands: u8) -> Self {
        self.max_commands = max_commands;
        self
    }

    pub fn with_capabilities(mut self, can_blink: bool, can_morph: bool) -> Self {
        self.can_blink = can_blink;
        self.can_morph = can_morph;
        self
    }

    /// Whether this region can display `mode`
    pub fn supports(&self, mode: Mode) -> bool {
        match mode {
            Mode::Fixed => true,
            Mode::Blink => self.can_blink,
            Mode::Morph => self.can_morph,
        }
    }

    fn default_max_commands() -> u8 {
        1
    }

    fn default_capability() -> bool {
        true
    }
}

/// Serialized shape of a hardware descriptor file
///
/// Converted into a [`HardwareProfile`] through `TryFrom`, which is where
/// validation happens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileDescriptor {
    pub name: String,
    pub vendor_id: u16,
    pub product_id: u16,
    #[serde(default)]
    pub constants: ProtocolConstants,
    #[serde(default)]
    pub regions: Vec<Region>,
}

/// Read-only description of one keyboard model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ProfileDescriptor", into = "ProfileDescriptor")]
pub struct HardwareProfile {
    name: String,
    vendor_id: u16,
    product_id: u16,
    constants: ProtocolConstants,
    regions: Vec<Region>,
}

impl HardwareProfile {
    /// Build and validate a profile
    ///
    /// Duplicate region ids or bitmasks are rejected, never merged.
    pub fn new(
        name: impl Into<String>,
        vendor_id: u16,
        product_id: u16,
        constants: ProtocolConstants,
        regions: Vec<Region>,
    ) -> Result<Self> {
        let profile = Self {
            name: name.into(),
            vendor_id,
            product_id,
            constants,
            regions,
        };
        profile.validate()?;
        Ok(profile)
    }

    fn validate(&self) -> Result<()> {
        if self.constants.data_length < MIN_DATA_LENGTH {
            return Err(ProtocolError::PacketTooShort {
                needed: MIN_DATA_LENGTH,
                actual: self.constants.data_length,
            });
        }

        let mut ids: HashSet<&str> = HashSet::new();
        let mut masks: HashMap<u32, &str> = HashMap::new();

        for region in &self.regions {
            if !ids.insert(region.id.as_str()) {
                return Err(ProtocolError::DuplicateRegionId(region.id.clone()));
            }
            if let Some(first) = masks.insert(region.bitmask, region.id.as_str()) {
                return Err(ProtocolError::DuplicateRegionBitmask {
                    bitmask: region.bitmask,
                    first: first.to_string(),
                    second: region.id.clone(),
                });
            }
            if region.bitmask > MAX_AREA_BITMASK {
                return Err(ProtocolError::BitmaskTooWide {
                    id: region.id.clone(),
                    bitmask: region.bitmask,
                });
            }
            if region.max_commands == 0 {
                return Err(ProtocolError::ZeroMaxCommands(region.id.clone()));
            }
        }

        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vendor_id(&self) -> u16 {
        self.vendor_id
    }

    pub fn product_id(&self) -> u16 {
        self.product_id
    }

    pub fn constants(&self) -> &ProtocolConstants {
        &self.constants
    }

    pub fn data_length(&self) -> usize {
        self.constants.data_length
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Look up a region by symbolic id
    pub fn region(&self, id: &str) -> Option<&Region> {
        self.regions.iter().find(|r| r.id == id)
    }

    /// Look up a region by hardware bitmask
    pub fn region_by_bitmask(&self, bitmask: u32) -> Option<&Region> {
        self.regions.iter().find(|r| r.bitmask == bitmask)
    }
}

impl TryFrom<ProfileDescriptor> for HardwareProfile {
    type Error = ProtocolError;

    fn try_from(desc: ProfileDescriptor) -> Result<Self> {
        Self::new(
            desc.name,
            desc.vendor_id,
            desc.product_id,
            desc.constants,
            desc.regions,
        )
    }
}

impl From<HardwareProfile> for ProfileDescriptor {
    fn from(profile: HardwareProfile) -> Self {
        Self {
            name: profile.name,
            vendor_id: profile.vendor_id,
            product_id: profile.product_id,
            constants: profile.constants,
            regions: profile.regions,
        }
    }
}
