//! AlienFX lighting daemon
//!
//! Applies a lighting theme to an AlienFX keyboard controller over USB.
//! Lighting intent from the configuration file is encoded into protocol
//! packets and written by a dedicated USB worker thread after the device
//! reports ready.

mod config;
mod profiles;
mod theme;
mod usb;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use common::{LightBridge, setup_logging};
use protocol::{Block, HardwareProfile, LightingOperation, encode};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use usb::spawn_light_worker;

#[derive(Parser, Debug)]
#[command(name = "alienfx-daemon")]
#[command(
    author,
    version,
    about = "AlienFX lighting daemon - apply keyboard lighting themes"
)]
#[command(long_about = "
Encodes a lighting theme into AlienFX controller packets and writes them to
the keyboard once it reports ready.

EXAMPLES:
    # Apply the theme from the default config
    alienfx-daemon

    # Apply a theme from a custom config
    alienfx-daemon --config /path/to/daemon.toml

    # Print the packets without touching the device
    alienfx-daemon --dry-run

    # Switch all lights off
    alienfx-daemon --off

    # List USB devices
    alienfx-daemon --list-devices

CONFIGURATION:
    The daemon looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/alienfx/daemon.toml
    3. /etc/alienfx/daemon.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// List USB devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Encode and print packets without touching the device
    #[arg(long)]
    dry_run: bool,

    /// Switch all lights off instead of applying the theme
    #[arg(long)]
    off: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --save-config flag early (before loading config)
    if args.save_config {
        let config = config::DaemonConfig::default();
        let path = config::DaemonConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    // Load configuration first (to get log level from config if not specified)
    let config = if let Some(ref path) = args.config {
        config::DaemonConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        config::DaemonConfig::load_or_default()
    };

    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.daemon.log_level);

    setup_logging(log_level).context("Failed to setup logging")?;

    info!("alienfx-daemon v{}", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", log_level);

    let profile = Arc::new(
        profiles::load(config.device.profile.as_deref())
            .context("Failed to load hardware profile")?,
    );
    info!(
        "Profile: {} ({:04x}:{:04x})",
        profile.name(),
        profile.vendor_id(),
        profile.product_id()
    );

    let (block, operations) = if args.off {
        (Block::volatile(config.theme.block_id), theme::lights_off())
    } else {
        (
            config.theme.block(),
            config
                .theme
                .to_operations(&profile)
                .context("Failed to build theme")?,
        )
    };

    if args.dry_run {
        return dry_run(&profile, block, &operations);
    }

    let (bridge, worker) = common::create_light_bridge();
    let worker_handle = spawn_light_worker(
        worker,
        profile.vendor_id(),
        profile.product_id(),
        &config.session,
    );

    let result = if args.list_devices {
        list_devices_mode(&bridge).await
    } else {
        apply_mode(&bridge, profile, block, operations, &config.session).await
    };

    let result = match result {
        Ok(()) => Ok(()),
        Err(ApplyError::Failed(e)) => Err(e),
        Err(ApplyError::Abandoned(secs)) => {
            // The worker is still blocked on the bus; exiting drops it
            return Err(anyhow!(
                "Lighting update did not finish within {}s and was abandoned",
                secs
            ));
        }
    };

    info!("Shutting down USB subsystem...");
    if let Err(e) = bridge.shutdown().await {
        error!("Error shutting down USB worker: {}", e);
    }

    match worker_handle.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("USB worker failed: {}", e),
        Err(e) => error!("USB worker thread panicked: {:?}", e),
    }

    result
}

enum ApplyError {
    /// The update ran and failed
    Failed(anyhow::Error),
    /// The deadline passed while the update was still running
    Abandoned(u64),
}

impl From<anyhow::Error> for ApplyError {
    fn from(e: anyhow::Error) -> Self {
        ApplyError::Failed(e)
    }
}

/// Encode and print the packets
fn dry_run(
    profile: &HardwareProfile,
    block: Block,
    operations: &[LightingOperation],
) -> Result<()> {
    let sequence = encode(profile, block, operations).context("Failed to encode theme")?;

    println!(
        "{} packets for {} (block {}, {}):\n",
        sequence.len(),
        profile.name(),
        block.block_id,
        if block.save { "saved" } else { "volatile" }
    );
    for packet in &sequence {
        println!("  {}", packet);
    }

    if !sequence.warnings().is_empty() {
        println!();
        for warning in sequence.warnings() {
            println!("  warning: {}", warning);
        }
    }

    Ok(())
}

/// List USB devices
async fn list_devices_mode(bridge: &LightBridge) -> Result<(), ApplyError> {
    info!("Listing USB devices...");

    let devices = bridge
        .list_devices()
        .await
        .context("Failed to receive device list")?;

    if devices.is_empty() {
        println!("No USB devices found.");
    } else {
        println!("Found {} USB device(s):\n", devices.len());
        for device in devices {
            println!(
                "  {:04x}:{:04x} - {}",
                device.vendor_id,
                device.product_id,
                device.product.as_deref().unwrap_or("Unknown Product")
            );
            println!(
                "      Bus {:03} Device {:03}",
                device.bus_number, device.device_address
            );
        }
    }

    Ok(())
}

/// Apply one block, honoring the configured deadline
async fn apply_mode(
    bridge: &LightBridge,
    profile: Arc<HardwareProfile>,
    block: Block,
    operations: Vec<LightingOperation>,
    settings: &config::SessionSettings,
) -> Result<(), ApplyError> {
    let apply = bridge.apply(profile, block, operations);

    let result = if settings.apply_timeout_secs == 0 {
        apply.await
    } else {
        let deadline = Duration::from_secs(settings.apply_timeout_secs);
        match tokio::time::timeout(deadline, apply).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "Apply exceeded {}s, abandoning the bus operation",
                    settings.apply_timeout_secs
                );
                return Err(ApplyError::Abandoned(settings.apply_timeout_secs));
            }
        }
    };

    result.context("Failed to apply lighting")?;
    info!("Lighting applied");
    Ok(())
}
