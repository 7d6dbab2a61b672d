use std::fmt::Debug;

use flashlink_target::FlashAlgorithmDescriptor;

use super::FlashError;
use crate::architecture::arm::registers::{
    CoreRegister, Dcrdr, Dcrsr, Dhcsr, MemoryMappedRegister,
};
use crate::architecture::arm::ArmError;
use crate::config::FlashConfig;
use crate::probe::{Cancellation, DebugTransport};

/// The operation a flash algorithm is initialized for, passed to `Init()`
/// and `UnInit()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Erasing sectors or the whole chip.
    Erase = 1,
    /// Programming pages.
    Program = 2,
    /// Verifying the flash contents.
    Verify = 3,
}

/// Registers which are set before calling a routine, in addition to the
/// static base, stack pointer and return address.
struct Registers {
    pc: u32,
    r0: Option<u32>,
    r1: Option<u32>,
    r2: Option<u32>,
    r3: Option<u32>,
}

impl Debug for Registers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:08x}({:?}, {:?}, {:?}, {:?})",
            self.pc, self.r0, self.r1, self.r2, self.r3
        )
    }
}

fn into_reg(val: u64) -> Result<u32, FlashError> {
    let reg_value: u32 = val
        .try_into()
        .map_err(|_| FlashError::RegisterValueNotSupported(val))?;

    Ok(reg_value)
}

/// Runs the routines of a flash algorithm on a halted core.
///
/// Creating a flasher copies the algorithm image into target RAM and checks
/// it. Every routine call then sets up the registers, resumes the core and
/// waits until the routine returns into the breakpoint at the start of the
/// image.
pub struct Flasher<'probe> {
    probe: &'probe mut dyn DebugTransport,
    algorithm: FlashAlgorithmDescriptor,
    config: FlashConfig,
    cancel: Cancellation,
}

impl<'probe> Flasher<'probe> {
    /// Validates `algorithm` and loads it into target RAM.
    ///
    /// The core must be halted.
    #[tracing::instrument(skip_all, fields(algorithm = %algorithm.name))]
    pub fn new(
        probe: &'probe mut dyn DebugTransport,
        algorithm: &FlashAlgorithmDescriptor,
        config: FlashConfig,
        cancel: Cancellation,
    ) -> Result<Self, FlashError> {
        algorithm.validate()?;

        let mut flasher = Self {
            probe,
            algorithm: algorithm.clone(),
            config,
            cancel,
        };

        flasher.load()?;

        Ok(flasher)
    }

    /// The algorithm this flasher runs.
    pub fn algorithm(&self) -> &FlashAlgorithmDescriptor {
        &self.algorithm
    }

    fn load(&mut self) -> Result<(), FlashError> {
        let algo = &self.algorithm;

        tracing::debug!(
            "Loading algorithm into RAM at address {:#010x}",
            algo.algo_ram_start
        );

        self.probe.write_block(algo.algo_ram_start, &algo.algo_image)?;

        let mut data = vec![0; algo.algo_image.len()];
        self.probe.read_block(algo.algo_ram_start, &mut data)?;

        if data != algo.algo_image {
            tracing::error!("Failed to verify flash algorithm. Data mismatch.");
            return Err(FlashError::FlashAlgorithmNotLoaded);
        }

        tracing::debug!("RAM contents match flashing algo blob.");

        Ok(())
    }

    /// Calls `Init(address, clock, operation)`.
    #[tracing::instrument(name = "Call to flash algorithm init", skip(self))]
    pub fn init(&mut self, address: u64, clock: u32, operation: Operation) -> Result<(), FlashError> {
        let registers = Registers {
            pc: into_reg(self.algorithm.init_entry)?,
            r0: Some(into_reg(address)?),
            r1: Some(clock),
            r2: Some(operation as u32),
            r3: None,
        };

        self.call_checked(&registers, "init")
    }

    /// Calls `UnInit(operation)`.
    pub fn uninit(&mut self, operation: Operation) -> Result<(), FlashError> {
        tracing::debug!("Running uninit routine.");

        let registers = Registers {
            pc: into_reg(self.algorithm.uninit_entry)?,
            r0: Some(operation as u32),
            r1: None,
            r2: None,
            r3: None,
        };

        self.call_checked(&registers, "uninit")
    }

    /// Calls `EraseChip()`.
    pub fn erase_chip(&mut self) -> Result<(), FlashError> {
        tracing::info!("Erasing entire chip.");

        let registers = Registers {
            pc: into_reg(self.algorithm.erase_chip_entry)?,
            r0: None,
            r1: None,
            r2: None,
            r3: None,
        };

        self.call_checked(&registers, "erase_chip")
    }

    /// Calls `EraseSector(address)`.
    pub fn erase_sector(&mut self, address: u64) -> Result<(), FlashError> {
        tracing::info!("Erasing sector at address {:#010x}", address);

        let registers = Registers {
            pc: into_reg(self.algorithm.erase_sector_entry)?,
            r0: Some(into_reg(address)?),
            r1: None,
            r2: None,
            r3: None,
        };

        self.call_checked(&registers, "erase_sector")
    }

    /// Stages `data` in the program buffer and calls
    /// `ProgramPage(address, chunk_bytes, buffer)`.
    ///
    /// `data` must be exactly `chunk_bytes` long.
    pub fn program_page(&mut self, address: u64, data: &[u8]) -> Result<(), FlashError> {
        tracing::debug!("Programming page at address {:#010x}", address);

        let chunk_bytes = self.algorithm.chunk_bytes;
        if data.len() != chunk_bytes as usize {
            return Err(FlashError::InvalidChunkLength {
                expected: chunk_bytes,
                actual: data.len(),
            });
        }

        self.probe
            .write_block(self.algorithm.program_buffer_address, data)?;

        let registers = Registers {
            pc: into_reg(self.algorithm.program_page_entry)?,
            r0: Some(into_reg(address)?),
            r1: Some(chunk_bytes),
            r2: Some(into_reg(self.algorithm.program_buffer_address)?),
            r3: None,
        };

        self.call_checked(&registers, "program_page")
    }

    /// Stages `data` in the program buffer and calls
    /// `Verify(address, len, buffer)`.
    ///
    /// The routine returns `address + len` if the flash matches, and the
    /// first mismatching address otherwise.
    pub fn verify(&mut self, address: u64, data: &[u8]) -> Result<(), FlashError> {
        let entry = self
            .algorithm
            .verify_entry
            .ok_or(FlashError::RoutineNotSupported("verify"))?;

        let chunk_bytes = self.algorithm.chunk_bytes;
        if data.len() > chunk_bytes as usize {
            return Err(FlashError::InvalidChunkLength {
                expected: chunk_bytes,
                actual: data.len(),
            });
        }

        self.probe
            .write_block(self.algorithm.program_buffer_address, data)?;

        let registers = Registers {
            pc: into_reg(entry)?,
            r0: Some(into_reg(address)?),
            r1: Some(data.len() as u32),
            r2: Some(into_reg(self.algorithm.program_buffer_address)?),
            r3: None,
        };

        let result = self.call_function_and_wait(&registers, "verify")?;

        let end = address + data.len() as u64;
        if result as u64 != end {
            return Err(FlashError::VerifyFailed {
                address: result as u64,
            });
        }

        Ok(())
    }

    /// Reads target memory, e.g. to compare flash contents after programming.
    pub fn read(&mut self, address: u64, data: &mut [u8]) -> Result<(), FlashError> {
        self.probe.read_block(address, data)?;
        Ok(())
    }

    fn call_checked(&mut self, registers: &Registers, name: &'static str) -> Result<(), FlashError> {
        let result = self.call_function_and_wait(registers, name)?;

        if result != 0 {
            return Err(FlashError::RoutineCallFailed {
                name,
                error_code: result,
            });
        }

        Ok(())
    }

    fn call_function_and_wait(
        &mut self,
        registers: &Registers,
        name: &'static str,
    ) -> Result<u32, FlashError> {
        self.call_function(registers)?;
        self.wait_for_completion(name)
    }

    fn call_function(&mut self, registers: &Registers) -> Result<(), FlashError> {
        tracing::debug!("Calling routine {:?}", registers);

        let algo = &self.algorithm;

        let registers = [
            (CoreRegister::PC, Some(registers.pc)),
            (CoreRegister::R0, registers.r0),
            (CoreRegister::R1, registers.r1),
            (CoreRegister::R2, registers.r2),
            (CoreRegister::R3, registers.r3),
            (CoreRegister::R9, Some(into_reg(algo.static_base)?)),
            (CoreRegister::SP, Some(into_reg(algo.initial_stack_pointer)?)),
            // Returning into the breakpoint halts the core. The address has
            // the Thumb bit set.
            (CoreRegister::LR, Some(into_reg(algo.breakpoint_address)?)),
            (CoreRegister::XPSR, Some(CoreRegister::XPSR_THUMB)),
        ];

        for (register, value) in registers {
            if let Some(value) = value {
                self.write_core_reg(register, value)?;
            }
        }

        // Resume target operation.
        self.probe
            .write_word_32(Dhcsr::ADDRESS, Dhcsr::debug_enable().into())?;

        Ok(())
    }

    fn wait_for_completion(&mut self, name: &'static str) -> Result<u32, FlashError> {
        tracing::debug!("Waiting for routine call completion.");

        let mut dhcsr = Dhcsr::from(0);

        for _ in 0..self.config.routine_poll_limit {
            if let Err(error) = self.cancel.check() {
                self.halt_after_failure();
                return Err(error.into());
            }

            dhcsr = Dhcsr::from(self.probe.read_word_32(Dhcsr::ADDRESS)?);

            if dhcsr.s_halt() {
                return self.read_core_reg(CoreRegister::R0);
            }

            if dhcsr.s_lockup() {
                self.halt_after_failure();
                return Err(FlashError::CoreLockedUp { name });
            }
        }

        tracing::error!("Routine '{name}' did not return, DHCSR = {:#010x}", u32::from(dhcsr));
        self.halt_after_failure();

        Err(ArmError::RetryExhausted {
            register: Dhcsr::NAME,
            attempts: self.config.routine_poll_limit,
            last_value: dhcsr.into(),
        }
        .into())
    }

    /// Stops a routine which did not return, so the core does not keep
    /// running from an unknown state.
    fn halt_after_failure(&mut self) {
        if let Err(error) = self
            .probe
            .write_word_32(Dhcsr::ADDRESS, Dhcsr::halt_request().into())
        {
            tracing::warn!("Failed to halt the core: {error}");
        }
    }

    fn write_core_reg(&mut self, register: CoreRegister, value: u32) -> Result<(), FlashError> {
        self.probe.write_word_32(Dcrdr::ADDRESS, value)?;

        let mut dcrsr = Dcrsr::from(0);
        dcrsr.set_regwnr(true);
        dcrsr.set_regsel(register.0);
        self.probe.write_word_32(Dcrsr::ADDRESS, dcrsr.into())?;

        self.wait_for_core_register_transfer(register)
    }

    fn read_core_reg(&mut self, register: CoreRegister) -> Result<u32, FlashError> {
        let mut dcrsr = Dcrsr::from(0);
        dcrsr.set_regwnr(false);
        dcrsr.set_regsel(register.0);
        self.probe.write_word_32(Dcrsr::ADDRESS, dcrsr.into())?;

        self.wait_for_core_register_transfer(register)?;

        Ok(self.probe.read_word_32(Dcrdr::ADDRESS)?)
    }

    fn wait_for_core_register_transfer(&mut self, register: CoreRegister) -> Result<(), FlashError> {
        let mut dhcsr = Dhcsr::from(0);

        for _ in 0..self.config.register_ready_poll_limit {
            dhcsr = Dhcsr::from(self.probe.read_word_32(Dhcsr::ADDRESS)?);

            if dhcsr.s_regrdy() {
                return Ok(());
            }
        }

        tracing::warn!("Transfer of core register {register} did not complete");

        Err(ArmError::RetryExhausted {
            register: Dhcsr::NAME,
            attempts: self.config.register_ready_poll_limit,
            last_value: dhcsr.into(),
        }
        .into())
    }
}
