//! Running flash algorithms on the target.
//!
//! A flash algorithm is a position dependent blob which is copied into
//! target RAM and called through a fixed register convention. The
//! [`Flasher`] wraps the individual routine calls, and
//! [`download_to_flash`] combines them with the reset sequence of the
//! target into a complete programming run.

mod download;
mod error;
mod flasher;

pub use download::{download_to_flash, DownloadOptions};
pub use error::FlashError;
pub use flasher::{Flasher, Operation};
