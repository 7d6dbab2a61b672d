use crate::architecture::arm::sequences::{ResetSequence, TargetState};
use crate::config::{Settings, Target};
use crate::probe::{Cancellation, DebugTransport};
use crate::vendor;

use super::{FlashError, Flasher, Operation};

/// Options for downloading a binary into flash.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Erase the whole chip instead of the sectors which are written.
    pub chip_erase: bool,
    /// Check the flash contents after programming.
    pub verify: bool,
    /// Reset the target and let it run after programming.
    pub reset_after: bool,
    /// Clock frequency passed to `Init()`. Zero lets the algorithm decide.
    pub clock: u32,
    /// Poll limits and delays.
    pub settings: Settings,
    /// Aborts the download between two register accesses.
    pub cancel: Cancellation,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            chip_erase: false,
            verify: true,
            reset_after: true,
            clock: 0,
            settings: Settings::default(),
            cancel: Cancellation::new(),
        }
    }
}

/// Downloads `data` to the flash of `target`, starting at `address`.
///
/// The target is halted with the reset sequence of its family, the flash
/// algorithm is loaded, and the affected sectors are erased and programmed
/// page by page. Pages are aligned to the chunk size of the algorithm; bytes
/// before `address` in the first page and after the data in the last page
/// are filled with the erased byte value.
#[tracing::instrument(skip_all, fields(target = %target.name, address, len = data.len()))]
pub fn download_to_flash(
    probe: &mut dyn DebugTransport,
    target: &Target,
    address: u64,
    data: &[u8],
    options: &DownloadOptions,
) -> Result<(), FlashError> {
    let algorithm = target.flash_algorithm.as_ref().ok_or_else(|| {
        FlashError::NoFlashLoaderAlgorithmAttached {
            name: target.name.clone(),
        }
    })?;

    algorithm.validate()?;

    if data.is_empty() {
        tracing::info!("Nothing to download");
        return Ok(());
    }

    // Pages start on multiples of the chunk size.
    let chunk_bytes = algorithm.chunk_bytes as u64;
    let start = address - address % chunk_bytes;
    let end = (address + data.len() as u64).div_ceil(chunk_bytes) * chunk_bytes;

    let flash = &target.flash;
    if start < flash.address_range.start || end > flash.address_range.end {
        return Err(FlashError::NoSuitableFlash { start, end });
    }

    let sequence = vendor::create_sequence(target.family, &options.settings);
    enter_state(&*sequence, probe, TargetState::ProgramMode, &options.cancel)?;

    {
        let mut flasher = Flasher::new(
            &mut *probe,
            algorithm,
            options.settings.flash,
            options.cancel.clone(),
        )?;

        flasher.init(flash.address_range.start, options.clock, Operation::Erase)?;
        if options.chip_erase {
            flasher.erase_chip()?;
        } else {
            let mut sector_address = start;
            while sector_address < end {
                let sector = flash.sector_info(sector_address).ok_or(
                    FlashError::NoSuitableFlash {
                        start: sector_address,
                        end,
                    },
                )?;

                flasher.erase_sector(sector.base_address)?;
                sector_address = sector.base_address + sector.size;
            }
        }
        flasher.uninit(Operation::Erase)?;

        let pages = pages(address, data, algorithm.chunk_bytes as usize, flash.erased_byte_value);

        tracing::info!("Programming {} pages", pages.len());
        flasher.init(flash.address_range.start, options.clock, Operation::Program)?;
        for (page_address, page) in &pages {
            flasher.program_page(*page_address, page)?;
        }
        flasher.uninit(Operation::Program)?;

        if options.verify {
            if algorithm.verify_entry.is_some() {
                flasher.init(flash.address_range.start, options.clock, Operation::Verify)?;
                for (page_address, page) in &pages {
                    flasher.verify(*page_address, page)?;
                }
                flasher.uninit(Operation::Verify)?;
            } else {
                let mut contents = vec![0; data.len()];
                flasher.read(address, &mut contents)?;

                if let Some(offset) = contents.iter().zip(data).position(|(a, b)| a != b) {
                    return Err(FlashError::VerifyFailed {
                        address: address + offset as u64,
                    });
                }
            }

            tracing::info!("Verified {} bytes", data.len());
        }
    }

    if options.reset_after {
        enter_state(&*sequence, probe, TargetState::ResetRun, &options.cancel)?;
    }

    Ok(())
}

fn enter_state(
    sequence: &dyn ResetSequence,
    probe: &mut dyn DebugTransport,
    state: TargetState,
    cancel: &Cancellation,
) -> Result<(), FlashError> {
    sequence
        .set_target_state(probe, state, cancel)
        .map_err(|source| FlashError::TargetState { state, source })
}

/// Splits `data` into pages of `chunk_bytes` aligned to multiples of
/// `chunk_bytes`, padding the head of the first and the tail of the last one.
fn pages(address: u64, data: &[u8], chunk_bytes: usize, erased_byte_value: u8) -> Vec<(u64, Vec<u8>)> {
    let head = (address % chunk_bytes as u64) as usize;

    let mut buffer = vec![erased_byte_value; head];
    buffer.extend_from_slice(data);
    buffer.resize(buffer.len().div_ceil(chunk_bytes) * chunk_bytes, erased_byte_value);

    (address - head as u64..)
        .step_by(chunk_bytes)
        .zip(buffer.chunks(chunk_bytes))
        .map(|(page_address, page)| (page_address, page.to_vec()))
        .collect()
}
