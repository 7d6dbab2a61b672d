//! The debug transport the rest of flashlink is built on.
//!
//! flashlink does not talk to any USB device or drive the SWD lines itself.
//! The embedding firmware implements [`DebugTransport`] on top of its own
//! wire protocol, and every sequence in this crate only uses the primitives
//! of that trait.

pub mod fake_probe;

use crate::architecture::arm::{sequences::TargetState, ArmError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A single transaction on the debug transport failed.
///
/// Transport errors are never retried inside flashlink. They abort the
/// operation which was in progress.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The target did not acknowledge the request.
    #[error("The target did not acknowledge the request")]
    NoAcknowledge,
    /// The target answered with a FAULT response.
    #[error("The target responded with a FAULT")]
    FaultResponse,
    /// The target kept answering with WAIT responses.
    #[error("The target kept responding with WAIT")]
    WaitResponse,
    /// The SWD protocol was violated, e.g. by a parity error.
    #[error("SWD protocol error")]
    SwdProtocol,
    /// The debug port could not be powered up or initialized.
    #[error("Initializing the debug port failed")]
    InitFailed,
    /// Some other transport specific error.
    #[error("{0}")]
    Other(String),
}

/// Register level access to a target, as provided by the probe firmware.
///
/// Only one sequence may drive a transport at a time. Callers serialize
/// access for a whole attach, program and detach session.
pub trait DebugTransport {
    /// Powers up and initializes the debug port.
    fn init_debug(&mut self) -> Result<(), TransportError>;

    /// Reads a 32 bit word from the memory mapped address space of the target.
    fn read_word_32(&mut self, address: u64) -> Result<u32, TransportError>;

    /// Writes a 32 bit word to the memory mapped address space of the target.
    fn write_word_32(&mut self, address: u64, value: u32) -> Result<(), TransportError>;

    /// Reads the register at `offset` of access port `ap`.
    fn read_ap_register(&mut self, ap: u8, offset: u8) -> Result<u32, TransportError>;

    /// Writes the register at `offset` of access port `ap`.
    fn write_ap_register(&mut self, ap: u8, offset: u8, value: u32) -> Result<(), TransportError>;

    /// Writes a debug port register.
    fn write_dp_register(&mut self, offset: u8, value: u32) -> Result<(), TransportError>;

    /// Drives the physical reset line. `true` asserts reset.
    fn set_target_reset(&mut self, asserted: bool) -> Result<(), TransportError>;

    /// The generic software reset routine of the probe, used for every state
    /// which does not need a family specific sequence.
    fn set_target_state_sw(&mut self, state: TargetState) -> Result<(), TransportError>;

    /// Waits for `duration`. Firmware with a scheduler should yield here.
    fn delay(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }

    /// Writes `data` to target memory starting at the word aligned `address`.
    ///
    /// The final word is padded with zeroes if `data` is not a multiple of
    /// four bytes long.
    fn write_block(&mut self, address: u64, data: &[u8]) -> Result<(), TransportError> {
        for (address, chunk) in (address..).step_by(4).zip(data.chunks(4)) {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            self.write_word_32(address, u32::from_le_bytes(word))?;
        }

        Ok(())
    }

    /// Fills `data` from target memory starting at the word aligned `address`.
    fn read_block(&mut self, address: u64, data: &mut [u8]) -> Result<(), TransportError> {
        for (address, chunk) in (address..).step_by(4).zip(data.chunks_mut(4)) {
            let word = self.read_word_32(address)?.to_le_bytes();
            chunk.copy_from_slice(&word[..chunk.len()]);
        }

        Ok(())
    }
}

/// An external cancellation signal.
///
/// Every bounded poll in flashlink checks the signal once per iteration, so
/// cancelling ends a sequence after at most one more register access.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    /// Creates a signal which is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. All clones observe the request.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Returns true once [`Cancellation::cancel`] was called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub(crate) fn check(&self) -> Result<(), ArmError> {
        if self.is_cancelled() {
            return Err(ArmError::Cancelled);
        }

        Ok(())
    }
}
