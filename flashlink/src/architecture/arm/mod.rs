//! All the interface bits for ARM.

pub mod debug_mailbox;
pub mod registers;
pub mod sequences;

use crate::probe::TransportError;

/// ARM specific errors.
#[derive(Debug, thiserror::Error)]
pub enum ArmError {
    /// A register transaction on the debug transport failed.
    #[error("A transaction on the debug transport failed")]
    Transport(#[from] TransportError),
    /// A bounded poll did not observe the expected register value.
    #[error("{register} did not reach the expected state after {attempts} reads, last value was {last_value:#010x}")]
    RetryExhausted {
        /// Name of the polled register.
        register: &'static str,
        /// Number of reads performed.
        attempts: u32,
        /// The value returned by the final read.
        last_value: u32,
    },
    /// The operation was cancelled through its [`Cancellation`](crate::Cancellation).
    #[error("The operation was cancelled")]
    Cancelled,
    /// An error from a sequence implemented outside of flashlink.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
