//! Bus transport abstraction
//!
//! A [`Transport`] is the only thing that touches the physical device. It
//! knows how to claim the keyboard and move raw packets; it knows nothing
//! about what the packets mean. The rusb implementation lives in the daemon.

use crate::Result;
use protocol::Packet;

/// Exclusive owner of one device handle
///
/// Not reentrant: a transport must be driven by one session at a time.
pub trait Transport {
    /// Claim (or re-claim) the device for a new command batch
    fn take_over(&mut self) -> Result<()>;

    /// Write one packet with the protocol's control transfer
    fn write(&mut self, packet: &Packet) -> Result<()>;

    /// Read the device status; byte 0 is the state code
    fn read_status(&mut self, expected_len: usize) -> Result<Vec<u8>>;

    /// Give the interface back so another session can claim it
    fn release(&mut self);
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn take_over(&mut self) -> Result<()> {
        (**self).take_over()
    }

    fn write(&mut self, packet: &Packet) -> Result<()> {
        (**self).write(packet)
    }

    fn read_status(&mut self, expected_len: usize) -> Result<Vec<u8>> {
        (**self).read_status(expected_len)
    }

    fn release(&mut self) {
        (**self).release()
    }
}
