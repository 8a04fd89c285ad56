//! Lighting themes
//!
//! A theme is the user-facing description of one lighting block: a speed,
//! whether to persist it, and a list of zones. [`ThemeSettings::to_operations`]
//! resolves region names against a hardware profile and produces the
//! operation list the encoder consumes.

use anyhow::{Context, Result, anyhow};
use protocol::{Block, HardwareProfile, LightingOperation, Mode, ResetKind, Rgb};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeSettings {
    /// Animation speed for blink and morph zones
    #[serde(default = "ThemeSettings::default_speed")]
    pub speed: u16,
    /// Persist the block across power cycles
    #[serde(default)]
    pub save: bool,
    #[serde(default = "ThemeSettings::default_block_id")]
    pub block_id: u8,
    #[serde(default)]
    pub zones: Vec<ZoneSettings>,
}

/// One color command for one region
///
/// # Example Configuration
/// ```toml
/// [[theme.zones]]
/// region = "ALIEN_HEAD"
/// mode = "morph"
/// left = "#ff0000"
/// right = "#0000ff"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneSettings {
    /// Region id from the hardware profile
    pub region: String,
    #[serde(default)]
    pub mode: Mode,
    /// Primary color (`#rrggbb`)
    pub left: String,
    /// Morph target color (`#rrggbb`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right: Option<String>,
}

impl Default for ThemeSettings {
    fn default() -> Self {
        Self {
            speed: Self::default_speed(),
            save: false,
            block_id: Self::default_block_id(),
            zones: vec![
                ZoneSettings::fixed("LEFT_KEYBOARD", "#00ff00"),
                ZoneSettings::fixed("MIDDLE_LEFT_KEYBOARD", "#00ff00"),
                ZoneSettings::fixed("MIDDLE_RIGHT_KEYBOARD", "#00ff00"),
                ZoneSettings::fixed("RIGHT_KEYBOARD", "#00ff00"),
                ZoneSettings {
                    region: "ALIEN_HEAD".to_string(),
                    mode: Mode::Morph,
                    left: "#ff0000".to_string(),
                    right: Some("#0000ff".to_string()),
                },
            ],
        }
    }
}

impl ThemeSettings {
    fn default_speed() -> u16 {
        200
    }

    fn default_block_id() -> u8 {
        1
    }

    pub fn block(&self) -> Block {
        Block {
            save: self.save,
            block_id: self.block_id,
        }
    }

    /// Check colors and speed without a profile
    pub fn validate(&self) -> Result<()> {
        if self.speed == 0 {
            return Err(anyhow!("Invalid theme speed 0, must be at least 1"));
        }
        for zone in &self.zones {
            zone.colors()
                .with_context(|| format!("Invalid zone for region '{}'", zone.region))?;
        }
        Ok(())
    }

    /// Resolve the theme into one block of operations
    ///
    /// Zones for the same region share one colors line, in the order their
    /// region first appears.
    pub fn to_operations(&self, profile: &HardwareProfile) -> Result<Vec<LightingOperation>> {
        let mut lines: Vec<(u32, Vec<LightingOperation>)> = Vec::new();

        for zone in &self.zones {
            let region = profile.region(&zone.region).ok_or_else(|| {
                anyhow!(
                    "Unknown region '{}' for profile '{}'",
                    zone.region,
                    profile.name()
                )
            })?;
            let (left, right) = zone
                .colors()
                .with_context(|| format!("Invalid zone for region '{}'", zone.region))?;

            let op = LightingOperation::SetColor {
                region_bitmask: region.bitmask,
                mode: zone.mode,
                left_color: left,
                right_color: right,
            };

            match lines.iter_mut().find(|(mask, _)| *mask == region.bitmask) {
                Some((_, ops)) => ops.push(op),
                None => lines.push((region.bitmask, vec![op])),
            }
        }

        let mut ops = vec![LightingOperation::SetSpeed { speed: self.speed }];
        for (_, line) in lines {
            ops.extend(line);
            ops.push(LightingOperation::EndColorsLine);
        }
        ops.push(LightingOperation::EndBlockLine);
        Ok(ops)
    }
}

impl ZoneSettings {
    pub fn fixed(region: &str, color: &str) -> Self {
        Self {
            region: region.to_string(),
            mode: Mode::Fixed,
            left: color.to_string(),
            right: None,
        }
    }

    fn colors(&self) -> Result<(Rgb, Option<Rgb>)> {
        let left: Rgb = self.left.parse()?;
        let right = self.right.as_deref().map(str::parse::<Rgb>).transpose()?;
        Ok((left, right))
    }
}

/// Operations that switch every light off
pub fn lights_off() -> Vec<LightingOperation> {
    vec![
        LightingOperation::Reset {
            sub_command: ResetKind::AllOff,
        },
        LightingOperation::EndBlockLine,
    ]
}
