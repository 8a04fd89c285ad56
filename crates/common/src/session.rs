//! Lighting session controller
//!
//! Drives one full lighting update over a [`Transport`]:
//!
//! ```text
//! Idle -> Polling -> Ready -> Sending -> Done
//!            |                   |
//!            +------> Failed <---+
//! ```
//!
//! `Polling` re-sends the `GetStatus + Reset` probe and reads the status
//! byte until the device reports ready. With the default
//! [`PollPolicy::Unbounded`] this loop has no timeout and no backoff; it only
//! ends on ready or on an I/O error. [`PollPolicy::Bounded`] caps it.

use crate::error::{EngineError, Result};
use crate::transport::Transport;
use protocol::{
    Block, HardwareProfile, LightingOperation, PacketSequence, ProtocolError, ResetKind, encode,
    encode_probe,
};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Where the controller is in the ready/busy handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Polling,
    Ready,
    Sending,
    Done,
    Failed,
}

/// How long to wait for the device to report ready
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PollPolicy {
    /// Poll until ready or I/O error
    #[default]
    Unbounded,
    /// Give up with [`EngineError::NotReady`] after `max_attempts` polls or
    /// once `deadline` has elapsed, whichever comes first
    Bounded {
        max_attempts: u32,
        deadline: Option<Duration>,
    },
}

impl PollPolicy {
    /// Bounded policy from a config value where 0 means unbounded
    pub fn from_attempts(max_attempts: u32) -> Self {
        if max_attempts == 0 {
            PollPolicy::Unbounded
        } else {
            PollPolicy::Bounded {
                max_attempts,
                deadline: None,
            }
        }
    }

    fn exhausted(&self, attempts: u32, started: Instant) -> bool {
        match *self {
            PollPolicy::Unbounded => false,
            PollPolicy::Bounded {
                max_attempts,
                deadline,
            } => attempts >= max_attempts || deadline.is_some_and(|d| started.elapsed() >= d),
        }
    }
}

/// Runs lighting updates against one exclusively owned transport
pub struct SessionController<T: Transport> {
    transport: T,
    state: SessionState,
    policy: PollPolicy,
}

impl<T: Transport> SessionController<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            state: SessionState::Idle,
            policy: PollPolicy::default(),
        }
    }

    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn poll_policy(&self) -> PollPolicy {
        self.policy
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Encode `ops` as one block and write it to the device
    ///
    /// Encoding errors are returned before the bus is touched. On `Ok`
    /// every packet has been written in order; the device applies the
    /// batch once it sees the terminating save or transmit-execute packet.
    pub fn apply(
        &mut self,
        profile: &HardwareProfile,
        block: Block,
        ops: &[LightingOperation],
    ) -> Result<()> {
        let sequence = encode(profile, block, ops)?;
        self.apply_sequence(profile, &sequence)
    }

    /// Write a pre-encoded sequence through the ready handshake
    pub fn apply_sequence(
        &mut self,
        profile: &HardwareProfile,
        sequence: &PacketSequence,
    ) -> Result<()> {
        if sequence.is_empty() {
            return Err(ProtocolError::EmptyOperations.into());
        }
        sequence.validate()?;

        self.state = SessionState::Idle;
        match self.run(profile, sequence) {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("Lighting update failed in {:?}: {}", self.state, e);
                self.transition(SessionState::Failed);
                self.transport.release();
                Err(e)
            }
        }
    }

    fn run(&mut self, profile: &HardwareProfile, sequence: &PacketSequence) -> Result<()> {
        self.transition(SessionState::Polling);
        self.transport.take_over()?;
        self.wait_ready(profile)?;
        self.transition(SessionState::Ready);

        self.transition(SessionState::Sending);
        for packet in sequence {
            debug!("Write {}", packet);
            self.transport.write(packet)?;
        }

        self.transition(SessionState::Done);
        info!(
            "Applied {} packets to {} ({} warnings)",
            sequence.len(),
            profile.name(),
            sequence.warnings().len()
        );
        Ok(())
    }

    fn wait_ready(&mut self, profile: &HardwareProfile) -> Result<()> {
        let constants = profile.constants();
        let probe = encode_probe(profile, ResetKind::default());
        let started = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            for packet in &probe {
                trace!("Probe {}", packet);
                self.transport.write(packet)?;
            }

            let status = self.transport.read_status(profile.data_length())?;
            attempts = attempts.saturating_add(1);

            match status.first().copied() {
                Some(state) if state == constants.state_ready => {
                    debug!("Device ready after {} polls", attempts);
                    return Ok(());
                }
                Some(state) if state == constants.state_unknown_command => {
                    warn!("Device reported unknown command, polling again");
                }
                Some(state) => {
                    trace!("Device busy (state {:#04x})", state);
                }
                None => {
                    return Err(EngineError::Io("empty status response".to_string()));
                }
            }

            if self.policy.exhausted(attempts, started) {
                return Err(EngineError::NotReady { attempts });
            }
        }
    }

    fn transition(&mut self, next: SessionState) {
        trace!("Session {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}
