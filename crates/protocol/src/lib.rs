//! Lighting command protocol for AlienFX-style keyboard controllers
//!
//! This crate turns logical lighting intent (per-zone colors, modes, speed,
//! persistence) into the fixed-width packets the keyboard's USB
//! microcontroller understands. It performs no I/O; writing packets to the
//! bus is the job of a transport.
//!
//! # Example
//!
//! ```
//! use protocol::{encode, Block, HardwareProfile, LightingOperation, PacketKind, ProtocolConstants, Region, Rgb};
//!
//! let profile = HardwareProfile::new(
//!     "M14x",
//!     0x187c,
//!     0x0521,
//!     ProtocolConstants::default(),
//!     vec![Region::new("LEFT_KEYBOARD", "Left keyboard", 0x0008)],
//! )
//! .unwrap();
//!
//! let ops = [
//!     LightingOperation::SetSpeed { speed: 128 },
//!     LightingOperation::fixed(0x0008, Rgb::new(0, 255, 0)),
//!     LightingOperation::EndColorsLine,
//!     LightingOperation::EndBlockLine,
//! ];
//!
//! let sequence = encode(&profile, Block::volatile(1), &ops).unwrap();
//! assert_eq!(sequence.len(), 4);
//! assert_eq!(sequence.terminal(), Some(PacketKind::TransmitExecute));
//! ```

pub mod encoder;
pub mod error;
pub mod packet;
pub mod profile;
pub mod types;

pub use encoder::{
    EncodeWarning, PacketBuilder, encode, encode_probe, pack_area, pack_color_pair,
    pack_left_color, pack_right_color,
};
pub use error::{ProtocolError, Result};
pub use packet::{BlockSpan, Packet, PacketKind, PacketSequence};
pub use profile::{
    HardwareProfile, MAX_AREA_BITMASK, MIN_DATA_LENGTH, ProfileDescriptor, ProtocolConstants,
    Region,
};
pub use types::{Block, LightingOperation, Mode, ResetKind, Rgb};
