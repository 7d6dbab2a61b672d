//! # Halt sequencing and flash algorithm loading for debug probe firmware
//!
//! flashlink contains the part of a debug probe that brings a target
//! microcontroller into a halted, programmable state, and the contract used
//! to run a chip specific flash algorithm on the target's own core.
//!
//! The register level debug link is not part of this crate. It is supplied by
//! the embedding firmware or host through the [`DebugTransport`] trait.
//!
//! # Examples
//!
//! ## Halting a target for programming
//!
//! ```no_run
//! # fn transport() -> flashlink::FakeProbe { flashlink::FakeProbe::new() }
//! use flashlink::{config, vendor, Cancellation, Settings, TargetState};
//!
//! let mut probe = transport();
//! let target = config::get_target_by_name("KW40Z160")?;
//!
//! let sequence = vendor::create_sequence(target.family, &Settings::default());
//! let halted = sequence.enter_state(&mut probe, TargetState::ProgramMode, &Cancellation::new());
//! # Ok::<(), flashlink::Error>(())
//! ```
//!
//! ## Programming flash
//!
//! ```no_run
//! # fn transport() -> flashlink::FakeProbe { flashlink::FakeProbe::new() }
//! use flashlink::config;
//! use flashlink::flashing::{download_to_flash, DownloadOptions};
//!
//! let mut probe = transport();
//! let target = config::get_target_by_name("KW40Z160")?;
//!
//! let firmware = std::fs::read("firmware.bin")?;
//! download_to_flash(&mut probe, &target, 0x0, &firmware, &DownloadOptions::default())?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod architecture;
pub mod config;
mod error;
#[warn(missing_docs)]
pub mod flashing;
#[warn(missing_docs)]
pub mod probe;
pub mod vendor;

pub use crate::architecture::arm::{
    sequences::{ResetSequence, TargetState},
    ArmError,
};
pub use crate::config::{Settings, Target};
pub use crate::error::Error;
pub use crate::probe::{fake_probe::FakeProbe, Cancellation, DebugTransport, TransportError};

pub use flashlink_target::{
    FlashAlgorithmDescriptor, FlashProperties, SectorDescription, SectorInfo, SectorMap,
};
