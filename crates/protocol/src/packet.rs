//! Packet and packet sequence types
//!
//! Every packet is exactly `data_length` bytes: the start byte, an opcode,
//! the opcode payload, and fill bytes up to the end. A [`PacketSequence`]
//! keeps packets in wire order together with the warnings raised while
//! encoding them.

use crate::encoder::EncodeWarning;
use crate::error::{ProtocolError, Result};
use crate::types::{Block, Mode};
use std::fmt;

/// What a packet does, independent of the model's opcode values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    GetStatus,
    Reset,
    SetSpeed,
    SetColor(Mode),
    SaveNext,
    LoopBlockEnd,
    TransmitExecute,
    Save,
}

impl PacketKind {
    /// True for the two packets that close a block
    pub fn is_terminal(self) -> bool {
        matches!(self, PacketKind::TransmitExecute | PacketKind::Save)
    }
}

/// One fixed-length protocol packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    kind: PacketKind,
    bytes: Vec<u8>,
    /// Diagnostic text, never transmitted
    legend: String,
}

impl Packet {
    pub(crate) fn new(kind: PacketKind, bytes: Vec<u8>, legend: String) -> Self {
        Self {
            kind,
            bytes,
            legend,
        }
    }

    pub fn kind(&self) -> PacketKind {
        self.kind
    }

    /// Raw bytes as written to the bus
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn legend(&self) -> &str {
        &self.legend
    }

    /// Opcode byte (index 1)
    pub fn opcode(&self) -> u8 {
        self.bytes[1]
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<28}", self.legend)?;
        for byte in &self.bytes {
            write!(f, " {:02x}", byte)?;
        }
        Ok(())
    }
}

/// Where a block opened in a sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSpan {
    /// Index of the first packet emitted after the block opened
    pub start: usize,
    pub block: Block,
}

/// Ordered packets ready to be written, in exactly this order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PacketSequence {
    packets: Vec<Packet>,
    blocks: Vec<BlockSpan>,
    warnings: Vec<EncodeWarning>,
}

impl PacketSequence {
    pub(crate) fn new(
        packets: Vec<Packet>,
        blocks: Vec<BlockSpan>,
        warnings: Vec<EncodeWarning>,
    ) -> Self {
        Self {
            packets,
            blocks,
            warnings,
        }
    }

    pub fn packets(&self) -> &[Packet] {
        &self.packets
    }

    /// Blocks opened while encoding, in order
    pub fn blocks(&self) -> &[BlockSpan] {
        &self.blocks
    }

    /// Soft conditions hit while encoding
    pub fn warnings(&self) -> &[EncodeWarning] {
        &self.warnings
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Packet> {
        self.packets.iter()
    }

    /// Number of packets of a given kind
    pub fn count(&self, kind: PacketKind) -> usize {
        self.packets.iter().filter(|p| p.kind == kind).count()
    }

    /// Commit kind of the final packet, if the sequence ends a block
    pub fn terminal(&self) -> Option<PacketKind> {
        self.packets
            .last()
            .map(Packet::kind)
            .filter(|kind| kind.is_terminal())
    }

    /// Check block structure against the recorded block table
    ///
    /// Every opened block must close with exactly one terminal packet:
    /// `Save` for a persistent block, `TransmitExecute` otherwise. In a
    /// persistent block each content packet is directly preceded by a
    /// save-next marker. Color, speed and loop-end packets only appear
    /// inside a block.
    pub fn validate(&self) -> Result<()> {
        let malformed = |index: usize, reason: &str| ProtocolError::MalformedSequence {
            index,
            reason: reason.to_string(),
        };

        let length = self.packets.first().map(|p| p.bytes.len());
        let mut spans = self.blocks.iter().peekable();
        let mut open: Option<Block> = None;
        let mut after_save_next = false;

        for (index, packet) in self.packets.iter().enumerate() {
            if Some(packet.bytes.len()) != length {
                return Err(malformed(index, "packet length differs from sequence"));
            }

            if let Some(span) = spans.next_if(|span| span.start == index) {
                if open.is_some() {
                    return Err(malformed(index, "block opened inside another block"));
                }
                open = Some(span.block);
            }
            let persistent = open.is_some_and(|block| block.save);

            match packet.kind {
                PacketKind::SaveNext => {
                    if !persistent {
                        return Err(malformed(index, "save-next outside a saved block"));
                    }
                    if after_save_next {
                        return Err(malformed(index, "consecutive save-next markers"));
                    }
                }
                PacketKind::SetColor(_) | PacketKind::SetSpeed => {
                    if open.is_none() {
                        return Err(malformed(index, "content outside a block"));
                    }
                    if persistent && !after_save_next {
                        return Err(malformed(index, "content without save-next in saved block"));
                    }
                }
                PacketKind::Reset => {
                    if persistent && !after_save_next {
                        return Err(malformed(index, "reset without save-next in saved block"));
                    }
                }
                PacketKind::LoopBlockEnd => {
                    if open.is_none() {
                        return Err(malformed(index, "loop end outside a block"));
                    }
                    if after_save_next {
                        return Err(malformed(index, "save-next not followed by content"));
                    }
                }
                PacketKind::Save => {
                    if !persistent {
                        return Err(malformed(index, "save closes a volatile block"));
                    }
                    if after_save_next {
                        return Err(malformed(index, "save-next not followed by content"));
                    }
                    open = None;
                }
                PacketKind::TransmitExecute => {
                    match open {
                        None => return Err(malformed(index, "transmit-execute outside a block")),
                        Some(block) if block.save => {
                            return Err(malformed(index, "transmit-execute closes a saved block"));
                        }
                        Some(_) => {}
                    }
                    open = None;
                }
                PacketKind::GetStatus => {
                    if after_save_next {
                        return Err(malformed(index, "save-next not followed by content"));
                    }
                }
            }

            after_save_next = packet.kind == PacketKind::SaveNext;
        }

        if open.is_some() || spans.next().is_some() {
            return Err(malformed(
                self.packets.len().saturating_sub(1),
                "block has no terminal packet",
            ));
        }

        Ok(())
    }
}

impl<'a> IntoIterator for &'a PacketSequence {
    type Item = &'a Packet;
    type IntoIter = std::slice::Iter<'a, Packet>;

    fn into_iter(self) -> Self::IntoIter {
        self.packets.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(kind: PacketKind) -> Packet {
        Packet::new(kind, vec![0x02, 0x00, 0, 0, 0, 0, 0, 0, 0], format!("{:?}", kind))
    }

    fn sequence(kinds: &[PacketKind]) -> PacketSequence {
        PacketSequence::new(kinds.iter().copied().map(packet).collect(), Vec::new(), Vec::new())
    }

    fn block_sequence(block: Block, kinds: &[PacketKind]) -> PacketSequence {
        PacketSequence::new(
            kinds.iter().copied().map(packet).collect(),
            vec![BlockSpan { start: 0, block }],
            Vec::new(),
        )
    }

    #[test]
    fn test_volatile_block_valid() {
        let seq = block_sequence(Block::volatile(1), &[
            PacketKind::SetSpeed,
            PacketKind::SetColor(Mode::Fixed),
            PacketKind::LoopBlockEnd,
            PacketKind::TransmitExecute,
        ]);
        assert!(seq.validate().is_ok());
        assert_eq!(seq.terminal(), Some(PacketKind::TransmitExecute));
    }

    #[test]
    fn test_saved_block_valid() {
        let seq = block_sequence(Block::persistent(1), &[
            PacketKind::SaveNext,
            PacketKind::SetColor(Mode::Blink),
            PacketKind::LoopBlockEnd,
            PacketKind::Save,
        ]);
        assert!(seq.validate().is_ok());
        assert_eq!(seq.terminal(), Some(PacketKind::Save));
    }

    #[test]
    fn test_saved_block_closed_by_execute() {
        let seq = block_sequence(Block::persistent(1), &[
            PacketKind::SaveNext,
            PacketKind::SetColor(Mode::Fixed),
            PacketKind::TransmitExecute,
        ]);
        assert!(matches!(
            seq.validate(),
            Err(ProtocolError::MalformedSequence { index: 2, .. })
        ));
    }

    #[test]
    fn test_missing_terminal() {
        let seq = block_sequence(
            Block::volatile(1),
            &[PacketKind::SetColor(Mode::Fixed), PacketKind::LoopBlockEnd],
        );
        assert!(seq.validate().is_err());
        assert_eq!(seq.terminal(), None);
    }

    #[test]
    fn test_empty_saved_block_valid() {
        let seq = block_sequence(Block::persistent(1), &[PacketKind::Save]);
        assert!(seq.validate().is_ok());
    }

    #[test]
    fn test_block_without_content_valid() {
        let seq = block_sequence(
            Block::volatile(1),
            &[
                PacketKind::Reset,
                PacketKind::LoopBlockEnd,
                PacketKind::TransmitExecute,
            ],
        );
        assert!(seq.validate().is_ok());

        let seq = block_sequence(
            Block::volatile(1),
            &[PacketKind::LoopBlockEnd, PacketKind::TransmitExecute],
        );
        assert!(seq.validate().is_ok());
    }

    #[test]
    fn test_content_outside_block() {
        let seq = sequence(&[PacketKind::SetColor(Mode::Fixed), PacketKind::TransmitExecute]);
        assert!(matches!(
            seq.validate(),
            Err(ProtocolError::MalformedSequence { index: 0, .. })
        ));
    }

    #[test]
    fn test_unreached_block_is_unterminated() {
        let seq = PacketSequence::new(
            vec![packet(PacketKind::GetStatus)],
            vec![BlockSpan {
                start: 1,
                block: Block::volatile(1),
            }],
            Vec::new(),
        );
        assert!(seq.validate().is_err());
    }

    #[test]
    fn test_probe_has_no_terminal() {
        let seq = sequence(&[PacketKind::GetStatus, PacketKind::Reset]);
        assert!(seq.validate().is_ok());
        assert_eq!(seq.terminal(), None);
    }

    #[test]
    fn test_length_drift() {
        let mut packets = vec![packet(PacketKind::GetStatus)];
        packets.push(Packet::new(PacketKind::Reset, vec![0x02, 0x07], "short".into()));
        let seq = PacketSequence::new(packets, Vec::new(), Vec::new());
        assert!(seq.validate().is_err());
    }

    #[test]
    fn test_display_hex() {
        let p = Packet::new(PacketKind::GetStatus, vec![0x02, 0x06, 0x00], "status".into());
        let text = p.to_string();
        assert!(text.starts_with("status"));
        assert!(text.ends_with("02 06 00"));
    }
}
