//! Hardware profiles
//!
//! Profiles come from TOML descriptor files; the M14x layout is built in so
//! the daemon works without one.

use anyhow::{Context, Result};
use protocol::{HardwareProfile, ProtocolConstants, Region};
use std::fs;
use std::path::PathBuf;

pub const M14X_VENDOR_ID: u16 = 0x187c;
pub const M14X_PRODUCT_ID: u16 = 0x0521;

/// Built-in Alienware M14x profile
pub fn m14x() -> protocol::Result<HardwareProfile> {
    let regions = vec![
        Region::new("RIGHT_KEYBOARD", "Right keyboard", 0x0001),
        Region::new("MIDDLE_RIGHT_KEYBOARD", "Middle-right keyboard", 0x0002),
        Region::new("MIDDLE_LEFT_KEYBOARD", "Middle-left keyboard", 0x0004),
        Region::new("LEFT_KEYBOARD", "Left keyboard", 0x0008),
        Region::new("ALIEN_HEAD", "Alien head", 0x0080),
        Region::new("LOGO", "Alienware logo", 0x0100),
        Region::new("MEDIA_BAR", "Media bar", 0x1c00),
        Region::new("POWER_BUTTON", "Power button", 0x2000),
    ];

    HardwareProfile::new(
        "Alienware M14x",
        M14X_VENDOR_ID,
        M14X_PRODUCT_ID,
        ProtocolConstants::default(),
        regions,
    )
}

/// Load a descriptor file, or the built-in profile when no path is given
pub fn load(path: Option<&str>) -> Result<HardwareProfile> {
    let Some(path) = path else {
        return m14x().context("Built-in profile is invalid");
    };

    let path = PathBuf::from(shellexpand::tilde(path).as_ref());
    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read profile descriptor: {}", path.display()))?;

    let profile: HardwareProfile = toml::from_str(&content)
        .with_context(|| format!("Invalid profile descriptor: {}", path.display()))?;

    tracing::info!(
        "Loaded profile '{}' ({} regions) from {}",
        profile.name(),
        profile.regions().len(),
        path.display()
    );
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_builtin_profile() {
        let profile = m14x().unwrap();
        assert_eq!(profile.vendor_id(), 0x187c);
        assert_eq!(profile.product_id(), 0x0521);
        assert_eq!(profile.regions().len(), 8);
        assert_eq!(profile.region("MEDIA_BAR").unwrap().bitmask, 0x1c00);
    }

    #[test]
    fn test_load_without_path() {
        assert_eq!(load(None).unwrap(), m14x().unwrap());
    }

    #[test]
    fn test_load_descriptor_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
name = "Test keyboard"
vendor_id = 0x187c
product_id = 0x0530

[[regions]]
id = "KEYBOARD"
description = "Whole keyboard"
bitmask = 0x0f
max_commands = 2
"#
        )
        .unwrap();

        let profile = load(file.path().to_str()).unwrap();
        assert_eq!(profile.name(), "Test keyboard");
        assert_eq!(profile.region("KEYBOARD").unwrap().max_commands, 2);
    }

    #[test]
    fn test_load_rejects_invalid_descriptor() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
name = "Broken"
vendor_id = 1
product_id = 2

[[regions]]
id = "A"
description = "a"
bitmask = 1

[[regions]]
id = "B"
description = "b"
bitmask = 1
"#
        )
        .unwrap();

        let err = load(file.path().to_str()).unwrap_err();
        assert!(format!("{:#}", err).contains("Duplicate region bitmask"));
    }

    #[test]
    fn test_load_missing_file() {
        assert!(load(Some("/nonexistent/alienfx/profile.toml")).is_err());
    }
}
