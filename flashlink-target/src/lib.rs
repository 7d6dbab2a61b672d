//! Target description schema
//!
//! Every chip flashlink can program is described by a small amount of static
//! data: the flash algorithm that runs on the chip itself, the layout of its
//! flash sectors and the family it belongs to, which decides how the core is
//! brought into a halted state. This crate contains the schema structs for
//! those descriptions together with their validation rules.
//!
//! Descriptions are usually stored as YAML files, with the algorithm image
//! carried as an opaque base64 string.
#![warn(missing_docs)]

mod chip_family;
mod error;
mod flash_algorithm;
mod memory;
pub(crate) mod serialize;

pub use chip_family::{Chip, ChipFamily};
pub use error::DescriptorError;
pub use flash_algorithm::FlashAlgorithmDescriptor;
pub use memory::{FlashProperties, SectorDescription, SectorInfo, SectorMap};

/// Re-exported so users of the schema do not need a direct `jep106` dependency.
pub use jep106::JEP106Code;
