use crate::error::DescriptorError;
use crate::serialize::{hex_option, hex_u_int, image_deserialize, image_serialize};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// The RAM layout and entry points of a flash algorithm, together with its
/// opaque machine code.
///
/// A descriptor is immutable, one instance per supported chip variant. All
/// addresses are absolute target addresses. The image is copied verbatim to
/// [`algo_ram_start`](Self::algo_ram_start); nothing in flashlink looks at
/// the instructions themselves.
///
/// Call [`FlashAlgorithmDescriptor::validate`] before use. Descriptors coming
/// out of the target registry have already been validated.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlashAlgorithmDescriptor {
    /// The name of the flash algorithm.
    pub name: String,
    /// The description of the algorithm.
    #[serde(default)]
    pub description: String,
    /// Version label of the algorithm image asset.
    pub version: String,
    /// Whether this flash algorithm is the default one or not.
    #[serde(default)]
    pub default: bool,
    /// Address of the `Init()` entry point.
    #[serde(serialize_with = "hex_u_int")]
    pub init_entry: u64,
    /// Address of the `UnInit()` entry point.
    #[serde(serialize_with = "hex_u_int")]
    pub uninit_entry: u64,
    /// Address of the `EraseChip()` entry point.
    #[serde(serialize_with = "hex_u_int")]
    pub erase_chip_entry: u64,
    /// Address of the `EraseSector()` entry point.
    #[serde(serialize_with = "hex_u_int")]
    pub erase_sector_entry: u64,
    /// Address of the `ProgramPage()` entry point.
    #[serde(serialize_with = "hex_u_int")]
    pub program_page_entry: u64,
    /// Address of the `Verify()` entry point. `None` if the algorithm
    /// cannot verify.
    #[serde(default, serialize_with = "hex_option")]
    pub verify_entry: Option<u64>,
    /// Return address planted in LR before every call. Always the first
    /// image byte with the Thumb bit set.
    #[serde(serialize_with = "hex_u_int")]
    pub breakpoint_address: u64,
    /// Base of the algorithm's position-independent data, loaded into R9.
    #[serde(serialize_with = "hex_u_int")]
    pub static_base: u64,
    /// Initial value of the stack pointer when calling any entry point.
    #[serde(serialize_with = "hex_u_int")]
    pub initial_stack_pointer: u64,
    /// RAM scratch area that receives each chunk before `ProgramPage()`.
    #[serde(serialize_with = "hex_u_int")]
    pub program_buffer_address: u64,
    /// Where the image is loaded in target RAM.
    #[serde(serialize_with = "hex_u_int")]
    pub algo_ram_start: u64,
    /// The algorithm's machine code, including its breakpoint header.
    #[serde(
        serialize_with = "image_serialize",
        deserialize_with = "image_deserialize"
    )]
    pub algo_image: Vec<u8>,
    /// Number of bytes handed to `ProgramPage()` per call.
    #[serde(serialize_with = "hex_u_int")]
    pub chunk_bytes: u32,
}

impl FlashAlgorithmDescriptor {
    /// Computes the static base of an algorithm image loaded at
    /// `image_start`, from the size of the image header and the offset of
    /// the data region recorded when the algorithm was built.
    pub const fn static_base_for(image_start: u64, header_size: u64, data_offset: u64) -> u64 {
        image_start + header_size + data_offset
    }

    /// Size of the algorithm image in bytes.
    pub fn algo_size(&self) -> u64 {
        self.algo_image.len() as u64
    }

    /// RAM occupied by the image once loaded.
    pub fn image_range(&self) -> Range<u64> {
        self.algo_ram_start..self.algo_ram_start + self.algo_size()
    }

    /// RAM occupied by one staged chunk.
    pub fn program_buffer_range(&self) -> Range<u64> {
        self.program_buffer_address..self.program_buffer_address + self.chunk_bytes as u64
    }

    /// The entry points which must be present, by name.
    pub fn required_entries(&self) -> [(&'static str, u64); 5] {
        [
            ("init", self.init_entry),
            ("uninit", self.uninit_entry),
            ("erase_chip", self.erase_chip_entry),
            ("erase_sector", self.erase_sector_entry),
            ("program_page", self.program_page_entry),
        ]
    }

    /// Checks the layout rules the flash driver relies on:
    ///
    /// - the breakpoint is `algo_ram_start + 1` and lies inside the image,
    /// - every entry point lies inside the image,
    /// - the program buffer starts at or above the end of the image,
    /// - the initial stack pointer lies above the image,
    /// - chunks are a non-zero number of whole words.
    pub fn validate(&self) -> Result<(), DescriptorError> {
        let name = || self.name.clone();

        if self.algo_image.is_empty() {
            return Err(DescriptorError::EmptyImage { name: name() });
        }

        let image = self.image_range();

        let expected = self.algo_ram_start + 1;
        if self.breakpoint_address != expected {
            return Err(DescriptorError::BreakpointMisplaced {
                name: name(),
                breakpoint: self.breakpoint_address,
                expected,
            });
        }

        if !image.contains(&self.breakpoint_address) {
            return Err(DescriptorError::BreakpointOutsideImage {
                name: name(),
                breakpoint: self.breakpoint_address,
                start: image.start,
                end: image.end,
            });
        }

        let optional = self.verify_entry.map(|address| ("verify", address));
        for (entry, address) in self.required_entries().into_iter().chain(optional) {
            if !image.contains(&address) {
                return Err(DescriptorError::EntryOutsideImage {
                    name: name(),
                    entry,
                    address,
                    start: image.start,
                    end: image.end,
                });
            }
        }

        if self.program_buffer_address < image.end {
            return Err(DescriptorError::BufferOverlapsImage {
                name: name(),
                buffer: self.program_buffer_address,
                image_end: image.end,
            });
        }

        if self.initial_stack_pointer <= image.end {
            return Err(DescriptorError::StackOverlapsImage {
                name: name(),
                stack_pointer: self.initial_stack_pointer,
                image_end: image.end,
            });
        }

        if self.chunk_bytes == 0 || self.chunk_bytes % 4 != 0 {
            return Err(DescriptorError::InvalidChunkSize {
                name: name(),
                chunk_bytes: self.chunk_bytes,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn descriptor() -> FlashAlgorithmDescriptor {
        FlashAlgorithmDescriptor {
            name: "test".to_string(),
            version: "1".to_string(),
            init_entry: 0x2000_0101,
            uninit_entry: 0x2000_0111,
            erase_chip_entry: 0x2000_0121,
            erase_sector_entry: 0x2000_0131,
            program_page_entry: 0x2000_0141,
            verify_entry: None,
            breakpoint_address: 0x2000_0001,
            static_base: FlashAlgorithmDescriptor::static_base_for(0x2000_0000, 0x20, 0x1c0),
            initial_stack_pointer: 0x2000_0800,
            program_buffer_address: 0x2000_0a00,
            algo_ram_start: 0x2000_0000,
            algo_image: vec![0xaa; 0x200],
            chunk_bytes: 512,
            ..Default::default()
        }
    }

    #[test]
    fn valid_descriptor() {
        let algo = descriptor();

        algo.validate().unwrap();

        assert_eq!(algo.breakpoint_address, algo.algo_ram_start + 1);
        assert!(algo.image_range().contains(&algo.breakpoint_address));
        assert_eq!(algo.static_base, 0x2000_01e0);
    }

    #[test]
    fn breakpoint_must_be_thumb_start() {
        let algo = FlashAlgorithmDescriptor {
            breakpoint_address: 0x2000_0000,
            ..descriptor()
        };

        assert_eq!(
            algo.validate(),
            Err(DescriptorError::BreakpointMisplaced {
                name: "test".to_string(),
                breakpoint: 0x2000_0000,
                expected: 0x2000_0001,
            })
        );
    }

    #[test]
    fn breakpoint_needs_room_in_the_image() {
        let algo = FlashAlgorithmDescriptor {
            algo_image: vec![0xbe],
            init_entry: 0x2000_0000,
            uninit_entry: 0x2000_0000,
            erase_chip_entry: 0x2000_0000,
            erase_sector_entry: 0x2000_0000,
            program_page_entry: 0x2000_0000,
            ..descriptor()
        };

        assert!(matches!(
            algo.validate(),
            Err(DescriptorError::BreakpointOutsideImage { .. })
        ));
    }

    #[test]
    fn program_buffer_must_follow_the_image() {
        let algo = FlashAlgorithmDescriptor {
            program_buffer_address: 0x2000_01fc,
            ..descriptor()
        };

        assert_eq!(
            algo.validate(),
            Err(DescriptorError::BufferOverlapsImage {
                name: "test".to_string(),
                buffer: 0x2000_01fc,
                image_end: 0x2000_0200,
            })
        );

        // Directly adjacent is fine.
        let algo = FlashAlgorithmDescriptor {
            program_buffer_address: 0x2000_0200,
            ..descriptor()
        };
        algo.validate().unwrap();
    }

    #[test]
    fn entries_must_be_inside_the_image() {
        let algo = FlashAlgorithmDescriptor {
            verify_entry: Some(0x2000_0400),
            ..descriptor()
        };

        assert!(matches!(
            algo.validate(),
            Err(DescriptorError::EntryOutsideImage {
                entry: "verify",
                address: 0x2000_0400,
                ..
            })
        ));
    }

    #[test]
    fn stack_must_be_above_the_image() {
        let algo = FlashAlgorithmDescriptor {
            initial_stack_pointer: 0x2000_0100,
            ..descriptor()
        };

        assert!(matches!(
            algo.validate(),
            Err(DescriptorError::StackOverlapsImage { .. })
        ));
    }

    #[test]
    fn chunk_size_is_word_aligned() {
        for chunk_bytes in [0, 6] {
            let algo = FlashAlgorithmDescriptor {
                chunk_bytes,
                ..descriptor()
            };

            assert!(matches!(
                algo.validate(),
                Err(DescriptorError::InvalidChunkSize { .. })
            ));
        }
    }

    #[test]
    fn image_is_base64_in_yaml() {
        let yaml = r#"
name: tiny
version: "2"
init_entry: 0x20000005
uninit_entry: 0x20000005
erase_chip_entry: 0x20000005
erase_sector_entry: 0x20000005
program_page_entry: 0x20000005
breakpoint_address: 0x20000001
static_base: 0x20000008
initial_stack_pointer: 0x20000400
program_buffer_address: 0x20000800
algo_ram_start: 0x20000000
algo_image: AL4K4AAAAAA=
chunk_bytes: 256
"#;

        let algo: FlashAlgorithmDescriptor = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(algo.algo_image, vec![0x00, 0xbe, 0x0a, 0xe0, 0, 0, 0, 0]);
        assert_eq!(algo.verify_entry, None);
        algo.validate().unwrap();

        let written = serde_yaml::to_string(&algo).unwrap();
        assert!(written.contains("algo_image: AL4K4AAAAAA="));
        assert!(written.contains("init_entry: '0x20000005'"));
    }
}
