//! Lighting operation encoder
//!
//! Turns an ordered list of [`LightingOperation`]s into the ordered
//! [`PacketSequence`] the keyboard controller understands. The encoder is
//! pure: no I/O, no shared state, one builder per sequence.
//!
//! # Packet layouts
//!
//! ```text
//! color       [start, op, hex_id, a0, a1, a2, c0, c1, c2]
//! speed       [start, op_set_speed, hi, lo, fill...]
//! save_next   [start, op_save_next, block_id, fill...]
//! reset       [start, op_reset, sub_command, fill...]
//! others      [start, op, fill...]
//! ```
//!
//! Colors keep only the high nibble of each channel. Fixed and blink pack
//! the left color as `c0 = r<<4 | g`, `c1 = b<<4`; morph overlaps the right
//! color into the same bytes (`c1 += r2`, `c2 = g2<<4 | b2`).

use crate::error::{ProtocolError, Result};
use crate::packet::{BlockSpan, Packet, PacketKind, PacketSequence};
use crate::profile::HardwareProfile;
use crate::types::{Block, LightingOperation, Mode, ResetKind, Rgb};
use std::collections::HashMap;
use std::fmt;
use tracing::{trace, warn};

/// Non-fatal condition raised while encoding
///
/// Each warning is also logged at `warn` level when it is raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodeWarning {
    /// Speed outside the accepted range was clamped
    SpeedClamped { requested: u16, applied: u8 },
    /// Morph was requested without a right color; encoded as fixed
    MorphWithoutRightColor { region_bitmask: u32 },
    /// Region cannot display the mode; encoded as fixed
    ModeUnsupported { region: String, mode: Mode },
    /// More color zones in a region than it can hold in one block
    TooManyZones { region: String, max_commands: u8 },
}

impl fmt::Display for EncodeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodeWarning::SpeedClamped { requested, applied } => {
                write!(f, "speed {} out of range, clamped to {}", requested, applied)
            }
            EncodeWarning::MorphWithoutRightColor { region_bitmask } => write!(
                f,
                "morph on area {:#08x} has no right color, using fixed",
                region_bitmask
            ),
            EncodeWarning::ModeUnsupported { region, mode } => {
                write!(f, "region {} cannot {}, using fixed", region, mode)
            }
            EncodeWarning::TooManyZones {
                region,
                max_commands,
            } => write!(
                f,
                "region {} holds at most {} zones per block",
                region, max_commands
            ),
        }
    }
}

/// Split a region bitmask into the three area bytes (24-bit big-endian)
pub const fn pack_area(bitmask: u32) -> [u8; 3] {
    [
        ((bitmask / 65536) % 256) as u8,
        ((bitmask / 256) % 256) as u8,
        (bitmask % 256) as u8,
    ]
}

/// Pack the left color into two bytes: `[r*16 + g, b*16]`
pub const fn pack_left_color(color: Rgb) -> [u8; 2] {
    let (r, g, b) = color.nibbles();
    [r * 16 + g, b * 16]
}

/// Pack the right (morph target) color into two bytes: `[r, g*16 + b]`
pub const fn pack_right_color(color: Rgb) -> [u8; 2] {
    let (r, g, b) = color.nibbles();
    [r, g * 16 + b]
}

/// Pack a morph color pair into the three color bytes
pub const fn pack_color_pair(left: Rgb, right: Rgb) -> [u8; 3] {
    let [l0, l1] = pack_left_color(left);
    let [r0, r1] = pack_right_color(right);
    [l0, l1 + r0, r1]
}

/// Builder for one packet sequence
///
/// ```
/// use protocol::{Block, HardwareProfile, LightingOperation, PacketBuilder, ProtocolConstants, Region, Rgb};
///
/// let profile = HardwareProfile::new(
///     "demo",
///     0x187c,
///     0x0521,
///     ProtocolConstants::default(),
///     vec![Region::new("LEFT_KEYBOARD", "Left keyboard", 0x0008)],
/// )
/// .unwrap();
///
/// let mut builder = PacketBuilder::new(&profile);
/// builder.begin_block(Block::volatile(1)).unwrap();
/// builder.push(&LightingOperation::fixed(0x0008, Rgb::new(0, 255, 0))).unwrap();
/// builder.push(&LightingOperation::EndColorsLine).unwrap();
/// builder.push(&LightingOperation::EndBlockLine).unwrap();
/// let sequence = builder.finish().unwrap();
/// assert_eq!(sequence.len(), 3);
/// ```
pub struct PacketBuilder<'a> {
    profile: &'a HardwareProfile,
    block: Option<Block>,
    /// 1-based zone counter, embedded in color packets
    hex_id: u16,
    /// Color commands per region bitmask in the open block
    zones: HashMap<u32, u8>,
    packets: Vec<Packet>,
    blocks: Vec<BlockSpan>,
    warnings: Vec<EncodeWarning>,
}

impl<'a> PacketBuilder<'a> {
    pub fn new(profile: &'a HardwareProfile) -> Self {
        Self {
            profile,
            block: None,
            hex_id: 1,
            zones: HashMap::new(),
            packets: Vec::new(),
            blocks: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Open a block; the zone counter restarts at 1
    pub fn begin_block(&mut self, block: Block) -> Result<()> {
        if let Some(open) = self.block {
            return Err(ProtocolError::BlockAlreadyOpen(open.block_id));
        }
        self.block = Some(block);
        self.blocks.push(BlockSpan {
            start: self.packets.len(),
            block,
        });
        self.hex_id = 1;
        self.zones.clear();
        Ok(())
    }

    /// Encode one operation
    pub fn push(&mut self, op: &LightingOperation) -> Result<()> {
        match op {
            LightingOperation::GetStatus => {
                let packet = self.status_packet();
                self.emit(packet);
            }
            LightingOperation::Reset { sub_command } => {
                if let Some(block) = self.block {
                    self.frame(block);
                }
                let packet = self.reset_packet(*sub_command);
                self.emit(packet);
            }
            LightingOperation::SetSpeed { speed } => {
                let block = self.open_block(op)?;
                self.frame(block);
                let packet = self.speed_packet(*speed);
                self.emit(packet);
            }
            LightingOperation::SetColor {
                region_bitmask,
                mode,
                left_color,
                right_color,
            } => {
                let block = self.open_block(op)?;
                let hex_id = u8::try_from(self.hex_id).map_err(|_| ProtocolError::TooManyLines {
                    block_id: block.block_id,
                    limit: u8::MAX,
                })?;
                self.frame(block);
                let packet =
                    self.color_packet(hex_id, *region_bitmask, *mode, *left_color, *right_color);
                self.emit(packet);
            }
            LightingOperation::EndColorsLine => {
                self.open_block(op)?;
                let packet = self.simple_packet(
                    PacketKind::LoopBlockEnd,
                    self.profile.constants().op_loop_block_end,
                    format!("End colors line {}", self.hex_id),
                );
                self.emit(packet);
                self.hex_id = self.hex_id.saturating_add(1);
            }
            LightingOperation::EndBlockLine => {
                let block = self.open_block(op)?;
                let constants = self.profile.constants();
                let packet = if block.save {
                    self.simple_packet(
                        PacketKind::Save,
                        constants.op_save,
                        format!("Save block {}", block.block_id),
                    )
                } else {
                    self.simple_packet(
                        PacketKind::TransmitExecute,
                        constants.op_transmit_execute,
                        format!("Transmit execute block {}", block.block_id),
                    )
                };
                self.emit(packet);
                self.block = None;
            }
        }
        Ok(())
    }

    /// Close the builder and return the sequence
    pub fn finish(self) -> Result<PacketSequence> {
        if let Some(block) = self.block {
            return Err(ProtocolError::UnterminatedBlock(block.block_id));
        }

        let sequence = PacketSequence::new(self.packets, self.blocks, self.warnings);
        sequence.validate()?;
        Ok(sequence)
    }

    fn open_block(&self, op: &LightingOperation) -> Result<Block> {
        self.block.ok_or(ProtocolError::NoOpenBlock(op.name()))
    }

    /// Save framing: a save-next marker before content in a persistent block
    fn frame(&mut self, block: Block) {
        if block.save {
            let mut bytes = self.empty_packet(self.profile.constants().op_save_next);
            bytes[2] = block.block_id;
            let packet = Packet::new(
                PacketKind::SaveNext,
                bytes,
                format!("Save next (block {})", block.block_id),
            );
            self.emit(packet);
        }
    }

    fn emit(&mut self, packet: Packet) {
        trace!("Encoded packet: {}", packet);
        self.packets.push(packet);
    }

    fn warn(&mut self, warning: EncodeWarning) {
        warn!("{}", warning);
        self.warnings.push(warning);
    }

    fn empty_packet(&self, opcode: u8) -> Vec<u8> {
        let constants = self.profile.constants();
        let mut bytes = vec![constants.fill_byte; constants.data_length];
        bytes[0] = constants.start_byte;
        bytes[1] = opcode;
        bytes
    }

    fn simple_packet(&self, kind: PacketKind, opcode: u8, legend: String) -> Packet {
        Packet::new(kind, self.empty_packet(opcode), legend)
    }

    fn status_packet(&self) -> Packet {
        self.simple_packet(
            PacketKind::GetStatus,
            self.profile.constants().op_get_status,
            "Get status".to_string(),
        )
    }

    fn reset_packet(&self, sub_command: ResetKind) -> Packet {
        let constants = self.profile.constants();
        let mut bytes = self.empty_packet(constants.op_reset);
        bytes[2] = sub_command.code(constants);
        Packet::new(PacketKind::Reset, bytes, format!("Reset {:?}", sub_command))
    }

    fn speed_packet(&mut self, requested: u16) -> Packet {
        let constants = self.profile.constants();
        let floor = constants.speed_min;
        let op_set_speed = constants.op_set_speed;

        let applied = if requested > u16::from(u8::MAX) {
            u8::MAX
        } else if requested < u16::from(floor) {
            floor
        } else {
            requested as u8
        };
        if u16::from(applied) != requested {
            self.warn(EncodeWarning::SpeedClamped { requested, applied });
        }

        let word = u16::from(applied);
        let mut bytes = self.empty_packet(op_set_speed);
        bytes[2] = (word >> 8) as u8;
        bytes[3] = (word & 0xFF) as u8;
        Packet::new(PacketKind::SetSpeed, bytes, format!("Set speed {}", applied))
    }

    fn color_packet(
        &mut self,
        hex_id: u8,
        region_bitmask: u32,
        mode: Mode,
        left: Rgb,
        right: Option<Rgb>,
    ) -> Packet {
        let mode = self.resolve_mode(region_bitmask, mode, right);
        self.count_zone(region_bitmask);

        let constants = self.profile.constants();
        let opcode = match mode {
            Mode::Fixed => constants.op_set_color,
            Mode::Blink => constants.op_set_blink_color,
            Mode::Morph => constants.op_set_morph_color,
        };

        let mut bytes = self.empty_packet(opcode);
        bytes[2] = hex_id;
        bytes[3..6].copy_from_slice(&pack_area(region_bitmask));

        let legend = match (mode, right) {
            (Mode::Morph, Some(right)) => {
                bytes[6..9].copy_from_slice(&pack_color_pair(left, right));
                format!("Set morph {:#08x} {} {}", region_bitmask, left, right)
            }
            _ => {
                bytes[6..8].copy_from_slice(&pack_left_color(left));
                format!("Set {} {:#08x} {}", mode, region_bitmask, left)
            }
        };

        Packet::new(PacketKind::SetColor(mode), bytes, legend)
    }

    /// Downgrade modes the request or the region cannot carry
    fn resolve_mode(&mut self, region_bitmask: u32, mode: Mode, right: Option<Rgb>) -> Mode {
        if mode == Mode::Morph && right.is_none() {
            self.warn(EncodeWarning::MorphWithoutRightColor { region_bitmask });
            return Mode::Fixed;
        }

        // Unknown bitmasks are encoded as requested
        let Some(region) = self.profile.region_by_bitmask(region_bitmask) else {
            return mode;
        };

        if region.supports(mode) {
            mode
        } else {
            let region = region.id.clone();
            self.warn(EncodeWarning::ModeUnsupported { region, mode });
            Mode::Fixed
        }
    }

    fn count_zone(&mut self, region_bitmask: u32) {
        let count = self.zones.entry(region_bitmask).or_insert(0);
        *count = count.saturating_add(1);
        let count = *count;

        if let Some(region) = self.profile.region_by_bitmask(region_bitmask)
            && count > region.max_commands
        {
            let warning = EncodeWarning::TooManyZones {
                region: region.id.clone(),
                max_commands: region.max_commands,
            };
            self.warn(warning);
        }
    }
}

/// Encode one block of operations
///
/// `ops` must not be empty and must close the block with
/// [`LightingOperation::EndBlockLine`].
pub fn encode(
    profile: &HardwareProfile,
    block: Block,
    ops: &[LightingOperation],
) -> Result<PacketSequence> {
    if ops.is_empty() {
        return Err(ProtocolError::EmptyOperations);
    }

    let mut builder = PacketBuilder::new(profile);
    builder.begin_block(block)?;
    for op in ops {
        builder.push(op)?;
    }
    builder.finish()
}

/// Build the ready-probe: a status query followed by a reset
pub fn encode_probe(profile: &HardwareProfile, reset: ResetKind) -> PacketSequence {
    let builder = PacketBuilder::new(profile);
    let packets = vec![builder.status_packet(), builder.reset_packet(reset)];
    PacketSequence::new(packets, Vec::new(), Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::{ProtocolConstants, Region};

    fn profile() -> HardwareProfile {
        HardwareProfile::new(
            "test",
            0x187c,
            0x0521,
            ProtocolConstants::default(),
            vec![
                Region::new("LEFT_KEYBOARD", "Left keyboard", 0x0008).with_max_commands(2),
                Region::new("POWER_BUTTON", "Power button", 0x2000).with_capabilities(false, false),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_pack_area() {
        assert_eq!(pack_area(0x1c00), [0x00, 0x1c, 0x00]);
        assert_eq!(pack_area(0x80), [0x00, 0x00, 0x80]);
        assert_eq!(pack_area(0x100), [0x00, 0x01, 0x00]);
        assert_eq!(pack_area(0x12_3456), [0x12, 0x34, 0x56]);
    }

    #[test]
    fn test_pack_left_color() {
        assert_eq!(pack_left_color(Rgb::new(0xFF, 0x80, 0x00)), [0xF8, 0x00]);
        assert_eq!(pack_left_color(Rgb::new(0x00, 0x00, 0xFF)), [0x00, 0xF0]);
    }

    #[test]
    fn test_pack_color_pair() {
        let left = Rgb::new(0x10, 0x20, 0x30);
        let right = Rgb::new(0x40, 0x50, 0x60);
        // left: r=1 g=2 b=3 -> [0x12, 0x30]; right: r=4 g=5 b=6 -> [0x04, 0x56]
        assert_eq!(pack_color_pair(left, right), [0x12, 0x34, 0x56]);
    }

    #[test]
    fn test_color_requires_block() {
        let profile = profile();
        let mut builder = PacketBuilder::new(&profile);
        let err = builder
            .push(&LightingOperation::fixed(0x8, Rgb::WHITE))
            .unwrap_err();
        assert_eq!(err, ProtocolError::NoOpenBlock("SetColor"));
    }

    #[test]
    fn test_status_outside_block() {
        let profile = profile();
        let mut builder = PacketBuilder::new(&profile);
        builder.push(&LightingOperation::GetStatus).unwrap();
        let seq = builder.finish().unwrap();
        assert_eq!(seq.packets()[0].bytes(), &[0x02, 0x06, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_nested_block_rejected() {
        let profile = profile();
        let mut builder = PacketBuilder::new(&profile);
        builder.begin_block(Block::volatile(1)).unwrap();
        assert_eq!(
            builder.begin_block(Block::volatile(2)),
            Err(ProtocolError::BlockAlreadyOpen(1))
        );
    }

    #[test]
    fn test_unterminated_block() {
        let profile = profile();
        let ops = [LightingOperation::fixed(0x8, Rgb::WHITE)];
        assert_eq!(
            encode(&profile, Block::volatile(3), &ops),
            Err(ProtocolError::UnterminatedBlock(3))
        );
    }

    #[test]
    fn test_empty_operations() {
        let profile = profile();
        assert_eq!(
            encode(&profile, Block::default(), &[]),
            Err(ProtocolError::EmptyOperations)
        );
    }

    #[test]
    fn test_blink_downgraded_on_incapable_region() {
        let profile = profile();
        let ops = [
            LightingOperation::blink(0x2000, Rgb::WHITE),
            LightingOperation::EndColorsLine,
            LightingOperation::EndBlockLine,
        ];
        let seq = encode(&profile, Block::default(), &ops).unwrap();

        assert_eq!(seq.packets()[0].kind(), PacketKind::SetColor(Mode::Fixed));
        assert_eq!(seq.packets()[0].opcode(), 0x03);
        assert_eq!(
            seq.warnings(),
            &[EncodeWarning::ModeUnsupported {
                region: "POWER_BUTTON".into(),
                mode: Mode::Blink
            }]
        );
    }

    #[test]
    fn test_unknown_region_encoded_as_requested() {
        let profile = profile();
        let ops = [
            LightingOperation::blink(0x40_0000, Rgb::WHITE),
            LightingOperation::EndBlockLine,
        ];
        let seq = encode(&profile, Block::default(), &ops).unwrap();
        let color = &seq.packets()[0];
        assert_eq!(color.kind(), PacketKind::SetColor(Mode::Blink));
        assert_eq!(&color.bytes()[3..6], &[0x40, 0x00, 0x00]);
        assert!(seq.warnings().is_empty());
    }

    #[test]
    fn test_too_many_zones_warns() {
        let profile = profile();
        let ops = [
            LightingOperation::fixed(0x8, Rgb::WHITE),
            LightingOperation::fixed(0x8, Rgb::BLACK),
            LightingOperation::fixed(0x8, Rgb::WHITE),
            LightingOperation::EndColorsLine,
            LightingOperation::EndBlockLine,
        ];
        let seq = encode(&profile, Block::default(), &ops).unwrap();
        assert_eq!(seq.warnings().len(), 1);
        assert!(matches!(
            seq.warnings()[0],
            EncodeWarning::TooManyZones { max_commands: 2, .. }
        ));
    }

    #[test]
    fn test_speed_clamping() {
        let profile = profile();
        let ops = [
            LightingOperation::SetSpeed { speed: 300 },
            LightingOperation::SetSpeed { speed: 0 },
            LightingOperation::SetSpeed { speed: 200 },
            LightingOperation::EndBlockLine,
        ];
        let seq = encode(&profile, Block::default(), &ops).unwrap();

        assert_eq!(&seq.packets()[0].bytes()[1..4], &[0x0E, 0x00, 0xFF]);
        assert_eq!(&seq.packets()[1].bytes()[1..4], &[0x0E, 0x00, 0x01]);
        assert_eq!(&seq.packets()[2].bytes()[1..4], &[0x0E, 0x00, 200]);
        assert_eq!(
            seq.warnings(),
            &[
                EncodeWarning::SpeedClamped {
                    requested: 300,
                    applied: 255
                },
                EncodeWarning::SpeedClamped {
                    requested: 0,
                    applied: 1
                },
            ]
        );
    }

    #[test]
    fn test_block_without_colors() {
        let profile = profile();

        let seq = encode(
            &profile,
            Block::persistent(1),
            &[LightingOperation::EndBlockLine],
        )
        .unwrap();
        assert_eq!(seq.len(), 1);
        assert_eq!(seq.terminal(), Some(PacketKind::Save));

        let ops = [
            LightingOperation::Reset {
                sub_command: ResetKind::AllOn,
            },
            LightingOperation::EndColorsLine,
            LightingOperation::EndBlockLine,
        ];
        let seq = encode(&profile, Block::volatile(1), &ops).unwrap();
        assert_eq!(seq.len(), 3);
        assert_eq!(seq.terminal(), Some(PacketKind::TransmitExecute));

        let ops = [
            LightingOperation::EndColorsLine,
            LightingOperation::EndBlockLine,
        ];
        let seq = encode(&profile, Block::volatile(1), &ops).unwrap();
        assert_eq!(seq.count(PacketKind::LoopBlockEnd), 1);
    }

    #[test]
    fn test_zone_counter_limit() {
        let profile = profile();
        let mut builder = PacketBuilder::new(&profile);
        builder.begin_block(Block::volatile(4)).unwrap();

        for _ in 0..254 {
            builder.push(&LightingOperation::EndColorsLine).unwrap();
        }
        // Line 255 is the last one the counter byte can address
        builder
            .push(&LightingOperation::fixed(0x8, Rgb::WHITE))
            .unwrap();
        builder.push(&LightingOperation::EndColorsLine).unwrap();

        assert_eq!(
            builder.push(&LightingOperation::fixed(0x8, Rgb::WHITE)),
            Err(ProtocolError::TooManyLines {
                block_id: 4,
                limit: 255
            })
        );

        builder.push(&LightingOperation::EndBlockLine).unwrap();
        let seq = builder.finish().unwrap();
        let color = seq
            .iter()
            .find(|p| p.kind() == PacketKind::SetColor(Mode::Fixed))
            .unwrap();
        assert_eq!(color.bytes()[2], 255);
    }

    #[test]
    fn test_probe() {
        let profile = profile();
        let probe = encode_probe(&profile, ResetKind::default());
        assert_eq!(probe.len(), 2);
        assert_eq!(probe.packets()[0].kind(), PacketKind::GetStatus);
        assert_eq!(probe.packets()[1].bytes()[..3], [0x02, 0x07, 0x04]);
    }
}
