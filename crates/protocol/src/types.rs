//! Lighting operation types
//!
//! This module defines the logical input to the encoder: colors, modes,
//! blocks and the [`LightingOperation`] union the daemon builds from a theme.

use crate::error::ProtocolError;
use crate::profile::ProtocolConstants;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 24-bit RGB color as chosen by the user
///
/// The device only stores 4 bits per channel, see [`Rgb::nibbles`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Self = Self::new(0, 0, 0);
    pub const WHITE: Self = Self::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Reduce each channel to the 4-bit value the hardware accepts
    ///
    /// Truncates: the low nibble is discarded, `0xFF` becomes `0xF`.
    pub const fn nibbles(self) -> (u8, u8, u8) {
        (self.r / 16, self.g / 16, self.b / 16)
    }

    /// Expand 4-bit channels back to bytes (`n * 16`)
    pub const fn from_nibbles(r: u8, g: u8, b: u8) -> Self {
        Self::new((r & 0x0F) * 16, (g & 0x0F) * 16, (b & 0x0F) * 16)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl FromStr for Rgb {
    type Err = ProtocolError;

    /// Parse `#rrggbb` or `rrggbb`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().trim_start_matches('#');
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ProtocolError::InvalidColor(s.to_string()));
        }

        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16)
                .map_err(|_| ProtocolError::InvalidColor(s.to_string()))
        };

        Ok(Self::new(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

/// How a zone displays its color(s)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Steady color
    #[default]
    Fixed,
    /// Color flashing on and off
    Blink,
    /// Gradient between a left and a right color
    Morph,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Mode::Fixed => "fixed",
            Mode::Blink => "blink",
            Mode::Morph => "morph",
        };
        f.write_str(name)
    }
}

/// Reset sub-command carried in a reset packet
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetKind {
    #[default]
    AllOn,
    AllOff,
    TouchControls,
    SleepLightsOn,
}

impl ResetKind {
    /// Resolve to the model's sub-command byte
    pub fn code(self, constants: &ProtocolConstants) -> u8 {
        match self {
            ResetKind::AllOn => constants.reset_all_on,
            ResetKind::AllOff => constants.reset_all_off,
            ResetKind::TouchControls => constants.reset_touch_controls,
            ResetKind::SleepLightsOn => constants.reset_sleep_lights_on,
        }
    }
}

/// Persistence intent for a batch of commands
///
/// A persistent block is stored by the device and replayed at boot; a
/// volatile one is applied immediately and forgotten on power loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Block {
    pub save: bool,
    pub block_id: u8,
}

impl Block {
    pub const fn volatile(block_id: u8) -> Self {
        Self {
            save: false,
            block_id,
        }
    }

    pub const fn persistent(block_id: u8) -> Self {
        Self {
            save: true,
            block_id,
        }
    }
}

impl Default for Block {
    fn default() -> Self {
        Self::volatile(1)
    }
}

/// One logical step of a lighting update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LightingOperation {
    /// Set a zone inside a region
    SetColor {
        region_bitmask: u32,
        mode: Mode,
        left_color: Rgb,
        right_color: Option<Rgb>,
    },
    /// Global animation speed; clamped to the protocol range when encoded
    SetSpeed { speed: u16 },
    /// Device reset
    Reset { sub_command: ResetKind },
    /// Status query
    GetStatus,
    /// Close one region's command group
    EndColorsLine,
    /// Close the whole block
    EndBlockLine,
}

impl LightingOperation {
    /// Fixed color on one region
    pub fn fixed(region_bitmask: u32, color: Rgb) -> Self {
        Self::SetColor {
            region_bitmask,
            mode: Mode::Fixed,
            left_color: color,
            right_color: None,
        }
    }

    /// Blinking color on one region
    pub fn blink(region_bitmask: u32, color: Rgb) -> Self {
        Self::SetColor {
            region_bitmask,
            mode: Mode::Blink,
            left_color: color,
            right_color: None,
        }
    }

    /// Gradient from `left` to `right` on one region
    pub fn morph(region_bitmask: u32, left: Rgb, right: Rgb) -> Self {
        Self::SetColor {
            region_bitmask,
            mode: Mode::Morph,
            left_color: left,
            right_color: Some(right),
        }
    }

    /// Short name used in error messages and legends
    pub fn name(&self) -> &'static str {
        match self {
            LightingOperation::SetColor { .. } => "SetColor",
            LightingOperation::SetSpeed { .. } => "SetSpeed",
            LightingOperation::Reset { .. } => "Reset",
            LightingOperation::GetStatus => "GetStatus",
            LightingOperation::EndColorsLine => "EndColorsLine",
            LightingOperation::EndBlockLine => "EndBlockLine",
        }
    }

    /// True for operations that carry block content and get save framing
    pub fn is_content(&self) -> bool {
        matches!(
            self,
            LightingOperation::SetColor { .. }
                | LightingOperation::SetSpeed { .. }
                | LightingOperation::Reset { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_parse() {
        assert_eq!("#ff8000".parse::<Rgb>().unwrap(), Rgb::new(0xFF, 0x80, 0x00));
        assert_eq!("00ff00".parse::<Rgb>().unwrap(), Rgb::new(0, 0xFF, 0));
        assert!("#ff80".parse::<Rgb>().is_err());
        assert!("#gg0000".parse::<Rgb>().is_err());
        assert!("#ff80€".parse::<Rgb>().is_err());
        assert!("#+f+f+f".parse::<Rgb>().is_err());
        assert!("-1ff00".parse::<Rgb>().is_err());
    }

    #[test]
    fn test_rgb_display() {
        assert_eq!(Rgb::new(0x12, 0xab, 0x00).to_string(), "#12ab00");
    }

    #[test]
    fn test_nibbles_truncate() {
        assert_eq!(Rgb::new(0xFF, 0x80, 0x0F).nibbles(), (0xF, 0x8, 0x0));
        assert_eq!(Rgb::from_nibbles(0xF, 0x8, 0x0), Rgb::new(0xF0, 0x80, 0x00));
    }

    #[test]
    fn test_reset_codes() {
        let constants = ProtocolConstants::default();
        assert_eq!(ResetKind::default(), ResetKind::AllOn);
        assert_eq!(ResetKind::AllOn.code(&constants), 0x04);
        assert_eq!(ResetKind::AllOff.code(&constants), 0x03);
        assert_eq!(ResetKind::TouchControls.code(&constants), 0x01);
        assert_eq!(ResetKind::SleepLightsOn.code(&constants), 0x02);
    }

    #[test]
    fn test_content_operations() {
        assert!(LightingOperation::fixed(0x8, Rgb::WHITE).is_content());
        assert!(LightingOperation::SetSpeed { speed: 10 }.is_content());
        assert!(!LightingOperation::EndColorsLine.is_content());
        assert!(!LightingOperation::GetStatus.is_content());
    }
}
