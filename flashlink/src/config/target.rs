use flashlink_target::{Chip, ChipFamily, FlashAlgorithmDescriptor, FlashProperties};

use crate::vendor::FamilyId;

/// This describes a complete target with a fixed chip model and variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// The name of the target.
    pub name: String,
    /// Selects the reset sequence of the target.
    pub family: FamilyId,
    /// The flash of the target.
    pub flash: FlashProperties,
    /// The flash algorithm of the target, if it can be programmed.
    pub flash_algorithm: Option<FlashAlgorithmDescriptor>,
}

impl Target {
    /// Create a new target for the given family and chip.
    ///
    /// The family is expected to be validated already.
    pub(crate) fn new(family: &ChipFamily, chip: &Chip) -> Target {
        Target {
            name: chip.name.clone(),
            family: FamilyId::new(family.manufacturer, family.family),
            flash: chip.flash.clone(),
            flash_algorithm: family.algorithm_for_chip(chip).cloned(),
        }
    }
}
