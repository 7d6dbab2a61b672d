//! Target descriptions and settings.
//!
//! The builtin target descriptions are compiled into flashlink and parsed on
//! first use. More families can be added at runtime from YAML.

mod registry;
mod settings;
mod target;

pub use registry::{
    add_target_from_yaml, families, get_target_by_name, Registry, RegistryError,
};
pub use settings::{FlashConfig, HaltConfig, MailboxConfig, Settings};
pub use target::Target;

pub use flashlink_target::{Chip, ChipFamily, DescriptorError};
