//! Protocol error types

use thiserror::Error;

/// Protocol-level errors
///
/// These are structural errors: the caller asked for something the packet
/// format cannot express. Out-of-range numeric input is never an error here,
/// it is clamped and reported as an [`EncodeWarning`](crate::EncodeWarning).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// Two regions in one profile share a symbolic id
    #[error("Duplicate region id: {0}")]
    DuplicateRegionId(String),

    /// Two regions in one profile share a hardware bitmask
    #[error("Duplicate region bitmask {bitmask:#08x} (regions '{first}' and '{second}')")]
    DuplicateRegionBitmask {
        bitmask: u32,
        first: String,
        second: String,
    },

    /// Region bitmask does not fit in the three area bytes of a packet
    #[error("Region '{id}' bitmask {bitmask:#x} exceeds 24 bits")]
    BitmaskTooWide { id: String, bitmask: u32 },

    /// Region declares that it accepts no color zones at all
    #[error("Region '{0}' must allow at least one command")]
    ZeroMaxCommands(String),

    /// Packet length is too short to carry a color command
    #[error("Packet length too small: needed {needed}, got {actual}")]
    PacketTooShort { needed: usize, actual: usize },

    /// No operations were given to the encoder
    #[error("Operation list is empty")]
    EmptyOperations,

    /// A block-scoped operation was pushed while no block was open
    #[error("'{0}' requires an open block")]
    NoOpenBlock(&'static str),

    /// A new block was started before the previous one was closed
    #[error("Block {0} is still open")]
    BlockAlreadyOpen(u8),

    /// Encoding finished with a block that never received an end marker
    #[error("Block {0} was never terminated")]
    UnterminatedBlock(u8),

    /// More color lines in one block than the zone counter byte can number
    #[error("Block {block_id} has more than {limit} color lines")]
    TooManyLines { block_id: u8, limit: u8 },

    /// A packet sequence failed its structural check
    #[error("Malformed packet sequence at packet {index}: {reason}")]
    MalformedSequence { index: usize, reason: String },

    /// A color string could not be parsed
    #[error("Invalid color '{0}', expected #rrggbb")]
    InvalidColor(String),
}

/// Type alias for protocol results
pub type Result<T> = std::result::Result<T, ProtocolError>;
