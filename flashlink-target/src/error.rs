use thiserror::Error;

/// A target description violates one of the layout rules flashlink relies on.
///
/// Descriptions are checked once when they are registered, so none of the
/// code that consumes them has to re-check these rules.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    /// The algorithm image is empty.
    #[error("flash algorithm '{name}' has an empty image")]
    EmptyImage {
        /// Name of the offending algorithm.
        name: String,
    },
    /// The breakpoint is not the Thumb address of the first image byte.
    #[error("breakpoint address {breakpoint:#010x} of '{name}' must be {expected:#010x} (RAM start + 1)")]
    BreakpointMisplaced {
        /// Name of the offending algorithm.
        name: String,
        /// Configured breakpoint address.
        breakpoint: u64,
        /// The only accepted breakpoint address.
        expected: u64,
    },
    /// The breakpoint does not lie inside the loaded image.
    #[error("breakpoint address {breakpoint:#010x} of '{name}' lies outside the image {start:#010x}..{end:#010x}")]
    BreakpointOutsideImage {
        /// Name of the offending algorithm.
        name: String,
        /// Configured breakpoint address.
        breakpoint: u64,
        /// First byte of the image in RAM.
        start: u64,
        /// First byte after the image in RAM.
        end: u64,
    },
    /// An entry point does not lie inside the loaded image.
    #[error("entry point '{entry}' ({address:#010x}) of '{name}' lies outside the image {start:#010x}..{end:#010x}")]
    EntryOutsideImage {
        /// Name of the offending algorithm.
        name: String,
        /// Which entry point.
        entry: &'static str,
        /// Configured entry address.
        address: u64,
        /// First byte of the image in RAM.
        start: u64,
        /// First byte after the image in RAM.
        end: u64,
    },
    /// The page buffer overlaps the algorithm image.
    #[error("program buffer {buffer:#010x} of '{name}' overlaps the algorithm image ending at {image_end:#010x}")]
    BufferOverlapsImage {
        /// Name of the offending algorithm.
        name: String,
        /// Configured program buffer address.
        buffer: u64,
        /// First byte after the image in RAM.
        image_end: u64,
    },
    /// The initial stack pointer would grow the stack into the image.
    #[error("initial stack pointer {stack_pointer:#010x} of '{name}' is not above the image ending at {image_end:#010x}")]
    StackOverlapsImage {
        /// Name of the offending algorithm.
        name: String,
        /// Configured initial stack pointer.
        stack_pointer: u64,
        /// First byte after the image in RAM.
        image_end: u64,
    },
    /// The chunk size cannot be written word-wise.
    #[error("chunk size {chunk_bytes} of '{name}' must be a non-zero multiple of 4")]
    InvalidChunkSize {
        /// Name of the offending algorithm.
        name: String,
        /// Configured chunk size.
        chunk_bytes: u32,
    },
    /// A sector table has no entries.
    #[error("the sector table is empty")]
    EmptySectorMap,
    /// A sector table entry has a size of zero.
    #[error("sector table entry at {address:#010x} has a size of zero")]
    ZeroSectorSize {
        /// Start address of the offending entry.
        address: u64,
    },
    /// Sector table entries are not sorted by strictly increasing address.
    #[error("sector table entry at {address:#010x} does not follow the previous entry at {previous:#010x}")]
    UnsortedSectors {
        /// Start address of the offending entry.
        address: u64,
        /// Start address of the entry before it.
        previous: u64,
    },
    /// A chip family description is inconsistent.
    #[error("{0}")]
    Family(String),
}
