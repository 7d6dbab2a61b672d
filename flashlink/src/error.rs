use crate::config::RegistryError;
use crate::flashing::FlashError;
use crate::{ArmError, TransportError};
use thiserror::Error;

/// The overarching error type which contains all possible errors as variants.
#[derive(Error, Debug)]
pub enum Error {
    /// A single transaction on the debug transport failed.
    #[error("An error with the debug transport occurred")]
    Transport(#[from] TransportError),
    /// Bringing the core into the requested state failed.
    #[error("An ARM specific error occurred")]
    Arm(#[from] ArmError),
    /// Running the flash algorithm failed.
    #[error("Flashing failed")]
    Flash(#[from] FlashError),
    /// The requested target could not be found or loaded.
    #[error("Unable to load the target description")]
    ChipNotFound(#[from] RegistryError),
    /// Any other error occurred.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
