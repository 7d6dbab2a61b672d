use flashlink_target::DescriptorError;
use thiserror::Error;

use crate::architecture::arm::{sequences::TargetState, ArmError};
use crate::probe::TransportError;

/// Describes any error that happened during the or in preparation for the flashing procedure.
#[derive(Error, Debug)]
pub enum FlashError {
    /// The flash algorithm descriptor violates the layout rules.
    #[error("The flash algorithm descriptor is invalid")]
    Descriptor(#[from] DescriptorError),
    /// The target has no flash algorithm.
    #[error("Trying to write flash, but no flash algorithm is attached to target '{name}'.")]
    NoFlashLoaderAlgorithmAttached {
        /// Name of the target.
        name: String,
    },
    /// The requested range lies outside of the flash.
    #[error("No flash memory contains the entire requested memory range {start:#010x}..{end:#010x}.")]
    NoSuitableFlash {
        /// Start of the requested range.
        start: u64,
        /// End of the requested range.
        end: u64,
    },
    /// The flash algorithm does not implement a routine.
    #[error("The '{0}' routine is not supported with the given flash algorithm.")]
    RoutineNotSupported(&'static str),
    /// A routine returned an error code.
    #[error("The execution of '{name}' failed with code {error_code}.")]
    RoutineCallFailed {
        /// The name of the routine.
        name: &'static str,
        /// The error code the routine returned.
        error_code: u32,
    },
    /// The `Verify` routine reported a mismatch.
    #[error("Verifying flash failed at address {address:#010x}.")]
    VerifyFailed {
        /// First address whose content differs.
        address: u64,
    },
    /// `ProgramPage` was called with a buffer of the wrong size.
    #[error("ProgramPage needs exactly {expected} bytes, got {actual}.")]
    InvalidChunkLength {
        /// The chunk size of the algorithm.
        expected: u32,
        /// The length of the given buffer.
        actual: usize,
    },
    /// A value does not fit into a 32 bit core register.
    #[error("The value {0:#x} does not fit into a core register.")]
    RegisterValueNotSupported(u64),
    /// The image read back from RAM differs from the one written.
    #[error("The RAM contents did not match the expected contents after loading the flash algorithm.")]
    FlashAlgorithmNotLoaded,
    /// The core locked up while running a routine.
    #[error("The core locked up while running '{name}'.")]
    CoreLockedUp {
        /// The name of the routine.
        name: &'static str,
    },
    /// The target could not be brought into the state required for a step.
    #[error("The target could not be brought into state '{state}'")]
    TargetState {
        /// The requested state.
        state: TargetState,
        /// Why the sequence failed.
        #[source]
        source: ArmError,
    },
    /// Talking to the core failed.
    #[error("Something during the interaction with the core went wrong")]
    Core(#[from] ArmError),
}

impl From<TransportError> for FlashError {
    fn from(error: TransportError) -> Self {
        FlashError::Core(ArmError::Transport(error))
    }
}
