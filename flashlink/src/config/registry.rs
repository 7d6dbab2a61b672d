//! Internal target registry

use flashlink_target::{ChipFamily, DescriptorError};
use once_cell::sync::Lazy;
use parking_lot::RwLock;

use super::target::Target;

/// All builtin target descriptions.
const BUILTIN_TARGETS: &[(&str, &str)] = &[
    ("NXP_KW40Z.yaml", include_str!("../../targets/NXP_KW40Z.yaml")),
    ("NXP_LPC55S6x.yaml", include_str!("../../targets/NXP_LPC55S6x.yaml")),
];

static REGISTRY: Lazy<RwLock<Registry>> =
    Lazy::new(|| RwLock::new(Registry::from_builtin_families()));

/// Error type for all errors which occur when working
/// with the internal registry of targets.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The requested chip was not found in the registry.
    #[error("The requested chip '{0}' was not found in the list of known targets.")]
    ChipNotFound(String),
    /// A chip family description failed validation.
    #[error("Invalid chip family definition ({family})")]
    InvalidChipFamilyDefinition {
        /// Name of the family.
        family: String,
        /// The rule which was violated.
        #[source]
        source: DescriptorError,
    },
    /// An IO error occurred when trying to read a target description file.
    #[error("An IO error was encountered")]
    Io(#[from] std::io::Error),
    /// An error occurred while deserializing a YAML target description file.
    #[error("Deserializing the yaml encountered an error")]
    Yaml(#[from] serde_yaml::Error),
}

/// Registry of all available targets.
#[derive(Debug, Default)]
pub struct Registry {
    /// All the available chips.
    families: Vec<ChipFamily>,
}

impl Registry {
    /// Creates a registry holding the builtin targets.
    ///
    /// A builtin description which cannot be loaded is skipped and logged.
    pub fn from_builtin_families() -> Self {
        let mut registry = Self::default();

        for (file, yaml) in BUILTIN_TARGETS {
            if let Err(error) = registry.add_target_from_yaml(yaml.as_bytes()) {
                tracing::error!("Failed to load builtin target description {file}: {error}");
            }
        }

        registry
    }

    /// All known families.
    pub fn families(&self) -> &[ChipFamily] {
        &self.families
    }

    /// Looks up a target by its name, ignoring case.
    ///
    /// An exact match is preferred. Otherwise the first variant whose name
    /// starts with `name` is returned.
    pub fn get_target_by_name(&self, name: impl AsRef<str>) -> Result<Target, RegistryError> {
        let name = name.as_ref();
        let wanted = name.to_ascii_lowercase();

        tracing::debug!("Searching registry for chip with name {name}");

        let mut partial = None;
        for family in &self.families {
            for variant in family.variants() {
                let variant_name = variant.name.to_ascii_lowercase();

                if variant_name == wanted {
                    return Ok(Target::new(family, variant));
                }

                if partial.is_none() && variant_name.starts_with(&wanted) {
                    partial = Some((family, variant));
                }
            }
        }

        let (family, variant) = partial.ok_or_else(|| RegistryError::ChipNotFound(name.to_string()))?;

        tracing::warn!(
            "Found chip {} which matches given partial name {}. Consider specifying its full name.",
            variant.name,
            name,
        );

        Ok(Target::new(family, variant))
    }

    /// Validates `family` and adds it, replacing a family of the same name.
    ///
    /// Returns the name of the family.
    pub fn add_target_family(&mut self, family: ChipFamily) -> Result<String, RegistryError> {
        family
            .validate()
            .map_err(|source| RegistryError::InvalidChipFamilyDefinition {
                family: family.name.clone(),
                source,
            })?;

        let family_name = family.name.clone();

        self.families
            .retain(|old_family| !old_family.name.eq_ignore_ascii_case(&family_name));
        self.families.push(family);

        Ok(family_name)
    }

    /// Parses a family description from YAML and adds it to the registry.
    pub fn add_target_from_yaml<R: std::io::Read>(
        &mut self,
        yaml_reader: R,
    ) -> Result<String, RegistryError> {
        let family = ChipFamily::from_yaml_reader(yaml_reader)?;

        self.add_target_family(family)
    }
}

/// Get a target from the internal registry based on its name.
pub fn get_target_by_name(name: impl AsRef<str>) -> Result<Target, RegistryError> {
    REGISTRY.read().get_target_by_name(name)
}

/// Parses a family description from YAML and adds it to the internal registry.
///
/// Returns the name of the family.
pub fn add_target_from_yaml<R: std::io::Read>(yaml_reader: R) -> Result<String, RegistryError> {
    REGISTRY.write().add_target_from_yaml(yaml_reader)
}

/// Get a list of all families which are contained in the internal registry.
pub fn families() -> Vec<ChipFamily> {
    REGISTRY.read().families().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vendor::{nxp, FamilyId};
    use flashlink_target::SectorInfo;
    use pretty_assertions::assert_eq;

    #[test]
    fn builtin_targets_are_valid() {
        let registry = Registry::from_builtin_families();

        let names: Vec<&str> = registry.families().iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["KW40Z", "LPC55S6x"]);
    }

    #[test]
    fn kw40z_target() {
        let target = Registry::from_builtin_families()
            .get_target_by_name("KW40Z160")
            .unwrap();

        assert_eq!(target.family, FamilyId::new(nxp::NXP, nxp::FAMILY_KINETIS));
        assert_eq!(target.flash.address_range, 0..0x2_8000);
        assert_eq!(
            target.flash.sector_info(0x400),
            Some(SectorInfo {
                base_address: 0x400,
                size: 0x400
            })
        );

        let algo = target.flash_algorithm.unwrap();
        assert_eq!(algo.name, "kw40z4");
        assert_eq!(algo.init_entry, 0x2000_027d);
        assert_eq!(algo.uninit_entry, 0x2000_02e5);
        assert_eq!(algo.erase_chip_entry, 0x2000_0209);
        assert_eq!(algo.erase_sector_entry, 0x2000_023d);
        assert_eq!(algo.program_page_entry, 0x2000_029d);
        assert_eq!(algo.verify_entry, None);
        assert_eq!(algo.breakpoint_address, algo.algo_ram_start + 1);
        assert_eq!(
            algo.static_base,
            flashlink_target::FlashAlgorithmDescriptor::static_base_for(0x2000_0000, 0x20, 0x628)
        );
        assert_eq!(algo.algo_size(), 1612);
        assert_eq!(&algo.algo_image[..4], &[0x00, 0xbe, 0x0a, 0xe0]);
        assert_eq!(algo.chunk_bytes, 512);
    }

    #[test]
    fn lpc55s6x_has_no_algorithm() {
        let target = Registry::from_builtin_families()
            .get_target_by_name("lpc55s69")
            .unwrap();

        assert_eq!(target.name, "LPC55S69");
        assert_eq!(target.family, FamilyId::new(nxp::NXP, nxp::FAMILY_LPC55S6X));
        assert!(target.flash_algorithm.is_none());
    }

    #[test]
    fn partial_name_matches() {
        let target = Registry::from_builtin_families()
            .get_target_by_name("kw40")
            .unwrap();

        assert_eq!(target.name, "KW40Z160");
    }

    #[test]
    fn unknown_chip() {
        let result = Registry::from_builtin_families().get_target_by_name("nRF52840");

        assert!(matches!(result, Err(RegistryError::ChipNotFound(name)) if name == "nRF52840"));
    }

    #[test]
    fn add_family_replaces_by_name() {
        let mut registry = Registry::from_builtin_families();
        let yaml = r#"
name: kw40z
manufacturer:
  id: 0x15
  cc: 0x0
family: 1
variants:
  - name: KW40Z128
    flash:
      address_range:
        start: 0x0
        end: 0x20000
      sectors:
        - address: 0x0
          size: 0x400
"#;

        let name = registry.add_target_from_yaml(yaml.as_bytes()).unwrap();

        assert_eq!(name, "kw40z");
        assert_eq!(registry.families().len(), 2);
        assert!(registry.get_target_by_name("KW40Z160").is_err());
        assert!(registry.get_target_by_name("KW40Z128").is_ok());
    }

    #[test]
    fn invalid_family_is_rejected() {
        let mut registry = Registry::default();
        let yaml = r#"
name: Broken
manufacturer:
  id: 0x15
  cc: 0x0
family: 0
variants:
  - name: Broken1
    flash:
      address_range:
        start: 0x0
        end: 0x1000
      sectors: []
"#;

        let result = registry.add_target_from_yaml(yaml.as_bytes());

        assert!(matches!(
            result,
            Err(RegistryError::InvalidChipFamilyDefinition {
                source: DescriptorError::EmptySectorMap,
                ..
            })
        ));
        assert!(registry.families().is_empty());
    }

    #[test]
    fn global_registry() {
        assert!(get_target_by_name("LPC55S66").is_ok());
        assert!(families().iter().any(|family| family.name == "KW40Z"));
    }
}
