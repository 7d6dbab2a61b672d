use crate::error::DescriptorError;
use crate::serialize::{hex_range, hex_u_int};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Holds information about a specific, individual flash
/// sector.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SectorInfo {
    /// Base address of the flash sector
    pub base_address: u64,
    /// Size of the flash sector
    pub size: u64,
}

impl SectorInfo {
    /// Returns the address range of the sector.
    pub fn address_range(&self) -> Range<u64> {
        self.base_address..self.base_address + self.size
    }
}

/// Information about a group of flash sectors, which
/// is used as part of a [`SectorMap`].
///
/// Starting at the absolute flash address `address`, all following sectors
/// have a size of `size`. This is valid until either the end of the flash,
/// or until the next `SectorDescription` changes the sector size.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SectorDescription {
    /// Start address of the group of flash sectors.
    #[serde(serialize_with = "hex_u_int")]
    pub address: u64,
    /// Size of each individual flash sector
    #[serde(serialize_with = "hex_u_int")]
    pub size: u64,
}

/// Ordered table translating flash addresses into erase-granularity
/// boundaries.
///
/// The table itself does not know where the flash ends: the last entry's
/// sector size applies to everything above its start address. Use
/// [`FlashProperties`] when the flash bounds are known.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectorMap(Vec<SectorDescription>);

impl SectorMap {
    /// Creates a sector map from `(start_address, sector_size)` pairs.
    ///
    /// The entries are not checked; call [`SectorMap::validate`] before
    /// relying on lookups.
    pub fn new(entries: impl IntoIterator<Item = (u64, u64)>) -> Self {
        Self(
            entries
                .into_iter()
                .map(|(address, size)| SectorDescription { address, size })
                .collect(),
        )
    }

    /// The table entries, in address order.
    pub fn entries(&self) -> &[SectorDescription] {
        &self.0
    }

    /// Checks that the table is non-empty, sorted by strictly increasing
    /// start address and free of zero-sized sectors.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        if self.0.is_empty() {
            return Err(DescriptorError::EmptySectorMap);
        }

        let mut previous: Option<&SectorDescription> = None;
        for entry in &self.0 {
            if entry.size == 0 {
                return Err(DescriptorError::ZeroSectorSize {
                    address: entry.address,
                });
            }
            if let Some(previous) = previous {
                if entry.address <= previous.address {
                    return Err(DescriptorError::UnsortedSectors {
                        address: entry.address,
                        previous: previous.address,
                    });
                }
            }
            previous = Some(entry);
        }

        Ok(())
    }

    /// Returns the sector which contains `address`.
    ///
    /// The entry with the greatest start address not above `address` decides
    /// the sector size, and the sector start is the largest multiple of that
    /// size (counted from the entry's start) not above `address`.
    ///
    /// Returns `None` if `address` lies below the first entry, or if the
    /// entry covering it has a size of zero.
    pub fn sector_for(&self, address: u64) -> Option<SectorInfo> {
        let containing = self.0.iter().rfind(|s| s.address <= address)?;

        let index = (address - containing.address).checked_div(containing.size)?;

        Some(SectorInfo {
            base_address: containing.address + index * containing.size,
            size: containing.size,
        })
    }

    /// Iterates over all sectors from the first table entry up to
    /// `flash_end` (exclusive).
    pub fn iter_sectors(&self, flash_end: u64) -> impl Iterator<Item = SectorInfo> + '_ {
        let mut address = self.0.first().map(|s| s.address).unwrap_or(flash_end);

        std::iter::from_fn(move || {
            if address >= flash_end {
                return None;
            }

            let sector = self.sector_for(address)?;
            address = sector.base_address + sector.size;

            Some(sector)
        })
    }
}

/// Properties of the flash of a single device.
///
/// The flash bounds come from here, not from the sector table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlashProperties {
    /// The range of the device flash.
    #[serde(serialize_with = "hex_range")]
    pub address_range: Range<u64>,
    /// The value of a byte in flash that was just erased.
    #[serde(serialize_with = "hex_u_int", default = "default_erased_byte_value")]
    pub erased_byte_value: u8,
    /// The available sectors of the device flash.
    pub sectors: SectorMap,
}

fn default_erased_byte_value() -> u8 {
    0xff
}

impl Default for FlashProperties {
    #[allow(clippy::reversed_empty_ranges)]
    fn default() -> Self {
        FlashProperties {
            address_range: 0..0,
            erased_byte_value: default_erased_byte_value(),
            sectors: SectorMap::default(),
        }
    }
}

impl FlashProperties {
    /// Validates the sector table and checks that it starts inside the flash.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        self.sectors.validate()?;

        match self.sectors.entries().first() {
            Some(first) if !self.address_range.contains(&first.address) => {
                Err(DescriptorError::Family(format!(
                    "sector table starts at {:#010x}, outside of the flash {:#010x}..{:#010x}",
                    first.address, self.address_range.start, self.address_range.end
                )))
            }
            _ => Ok(()),
        }
    }

    /// Try to retrieve the information about the flash sector
    /// which contains `address`.
    ///
    /// If the `address` is not part of the flash, `None` is returned.
    pub fn sector_info(&self, address: u64) -> Option<SectorInfo> {
        if !self.address_range.contains(&address) {
            return None;
        }

        self.sectors.sector_for(address)
    }

    /// Iterate over all the sectors of the flash.
    pub fn iter_sectors(&self) -> impl Iterator<Item = SectorInfo> + '_ {
        self.sectors.iter_sectors(self.address_range.end)
    }

    /// Returns true if the entire contents of the argument array equal the erased byte value.
    pub fn is_erased(&self, data: &[u8]) -> bool {
        data.iter().all(|b| *b == self.erased_byte_value)
    }
}
