use crate::error::DescriptorError;
use crate::flash_algorithm::FlashAlgorithmDescriptor;
use crate::memory::FlashProperties;
use jep106::JEP106Code;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A single chip variant.
///
/// Variants of one family share the halt sequence and usually the flash
/// algorithm, but differ in their flash size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Chip {
    /// The name of the chip variant, e.g. `KW40Z160`.
    pub name: String,
    /// The flash of this variant.
    pub flash: FlashProperties,
    /// Name of the flash algorithm used to program this variant.
    ///
    /// The algorithm is looked up in [`ChipFamily::flash_algorithms`].
    /// Variants without an algorithm can be halted but not programmed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flash_algorithm: Option<String>,
}

/// This describes a chip family with all its variants.
///
/// This struct is usually read from a target description file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChipFamily {
    /// This is the name of the chip family in base form, e.g. `KW40Z`.
    pub name: String,
    /// The JEP106 code of the manufacturer.
    pub manufacturer: JEP106Code,
    /// Vendor specific family number. Together with the manufacturer it
    /// selects the reset/halt sequence of the family.
    pub family: u8,
    /// This vector holds all the variants of the family.
    pub variants: Vec<Chip>,
    /// This vector holds all available algorithms.
    #[serde(default)]
    pub flash_algorithms: Vec<FlashAlgorithmDescriptor>,
}

impl ChipFamily {
    /// Parses a family from a YAML target description.
    ///
    /// The family is not validated, call [`ChipFamily::validate`] afterwards.
    pub fn from_yaml_reader<R: std::io::Read>(reader: R) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_reader(reader)
    }

    /// Parses a family from a YAML string. See [`ChipFamily::from_yaml_reader`].
    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Validates the family so that consumers can rely on its contents
    /// without checking them again.
    ///
    /// This method should be called right after the family is created.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        self.reject_duplicate_target_names()?;
        self.ensure_algorithms_exist()?;

        for algorithm in &self.flash_algorithms {
            algorithm.validate()?;
        }

        for variant in &self.variants {
            variant.flash.validate()?;
        }

        Ok(())
    }

    /// Only one of several targets with the same name could ever be selected.
    fn reject_duplicate_target_names(&self) -> Result<(), DescriptorError> {
        let mut seen = HashSet::new();

        for chip in &self.variants {
            if !seen.insert(chip.name.to_ascii_lowercase()) {
                return Err(DescriptorError::Family(format!(
                    "target {} appears multiple times in {}",
                    chip.name, self.name,
                )));
            }
        }

        Ok(())
    }

    /// Make sure the algorithms used on the variants exist on the family.
    fn ensure_algorithms_exist(&self) -> Result<(), DescriptorError> {
        for variant in &self.variants {
            if let Some(algorithm_name) = &variant.flash_algorithm {
                if self.get_algorithm(algorithm_name).is_none() {
                    return Err(DescriptorError::Family(format!(
                        "unknown flash algorithm `{}` for variant `{}`",
                        algorithm_name, variant.name
                    )));
                }
            }
        }

        Ok(())
    }

    /// Get the different [Chip]s which are part of this family.
    pub fn variants(&self) -> &[Chip] {
        &self.variants
    }

    /// Try to find a [`FlashAlgorithmDescriptor`] with a given name.
    pub fn get_algorithm(&self, name: impl AsRef<str>) -> Option<&FlashAlgorithmDescriptor> {
        let name = name.as_ref();
        self.flash_algorithms.iter().find(|elem| elem.name == name)
    }

    /// The flash algorithm of `chip`, if it has one.
    pub fn algorithm_for_chip(&self, chip: &Chip) -> Option<&FlashAlgorithmDescriptor> {
        chip.flash_algorithm
            .as_ref()
            .and_then(|name| self.get_algorithm(name))
    }
}
