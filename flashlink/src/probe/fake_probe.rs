#![allow(missing_docs)] // Don't require docs for test code
//! A scripted [`DebugTransport`] for tests and dry runs.
//!
//! The fake probe records every transaction, keeps a sparse word addressed
//! memory and emulates just enough of a Cortex-M core to run flash
//! algorithm calls: DHCSR halting, the DCRSR/DCRDR core register transfer
//! and resuming until the breakpoint is hit.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt::Debug;
use std::time::Duration;

use crate::architecture::arm::registers::{
    CoreRegister, Dcrdr, Dcrsr, Dhcsr, MemoryMappedRegister,
};
use crate::architecture::arm::sequences::TargetState;
use crate::probe::{DebugTransport, TransportError};

/// A single transaction seen by the fake probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    InitDebug,
    ReadWord { address: u64 },
    WriteWord { address: u64, value: u32 },
    ReadAp { ap: u8, offset: u8 },
    WriteAp { ap: u8, offset: u8, value: u32 },
    WriteDp { offset: u8, value: u32 },
    SetReset(bool),
    SetStateSw(TargetState),
    Delay(Duration),
}

/// Register contents at the moment the core was resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutineCall {
    pub pc: u32,
    pub r0: u32,
    pub r1: u32,
    pub r2: u32,
    pub r3: u32,
    pub r9: u32,
    pub sp: u32,
    pub lr: u32,
    pub xpsr: u32,
}

/// Emulates a routine of the flash algorithm. Returns the value of R0 when
/// the routine hits its breakpoint.
pub type RoutineHandler = Box<dyn FnMut(&RoutineCall, &mut FakeMemory) -> u32 + Send>;

/// Sparse, word addressed target memory. Unwritten words read as zero.
#[derive(Debug, Default, Clone)]
pub struct FakeMemory {
    words: BTreeMap<u64, u32>,
}

impl FakeMemory {
    pub fn read_word(&self, address: u64) -> u32 {
        self.words.get(&(address & !3)).copied().unwrap_or(0)
    }

    pub fn write_word(&mut self, address: u64, value: u32) {
        self.words.insert(address & !3, value);
    }

    pub fn read_bytes(&self, address: u64, len: usize) -> Vec<u8> {
        (address..address + len as u64)
            .map(|address| self.read_word(address).to_le_bytes()[(address & 3) as usize])
            .collect()
    }

    pub fn write_bytes(&mut self, address: u64, data: &[u8]) {
        for (address, byte) in (address..).zip(data) {
            let mut word = self.read_word(address).to_le_bytes();
            word[(address & 3) as usize] = *byte;
            self.write_word(address, u32::from_le_bytes(word));
        }
    }

    pub fn fill(&mut self, address: u64, len: usize, value: u8) {
        self.write_bytes(address, &vec![value; len]);
    }
}

/// A read script. The last entry repeats forever.
#[derive(Debug, Default)]
struct Script(VecDeque<Result<u32, TransportError>>);

impl Script {
    fn next(&mut self) -> Option<Result<u32, TransportError>> {
        if self.0.len() > 1 {
            self.0.pop_front()
        } else {
            self.0.front().cloned()
        }
    }
}

/// The parts of a Cortex-M core the fake probe emulates.
#[derive(Default)]
struct MockCore {
    debugen: bool,
    is_halted: bool,
    locked_up: bool,
    dcrdr: u32,
    registers: [u32; 17],
}

impl MockCore {
    fn dhcsr(&self) -> u32 {
        let mut dhcsr = 0;

        if self.debugen {
            dhcsr |= 1;
        }
        if self.is_halted {
            dhcsr |= 1 << 17;
        }
        if self.locked_up {
            dhcsr |= 1 << 19;
        }

        // Always set S_REGRDY, register transfers complete immediately.
        dhcsr | 1 << 16
    }

    fn register(&self, register: CoreRegister) -> u32 {
        self.registers
            .get(register.0 as usize)
            .copied()
            .unwrap_or_default()
    }

    fn routine_call(&self) -> RoutineCall {
        RoutineCall {
            pc: self.register(CoreRegister::PC),
            r0: self.register(CoreRegister::R0),
            r1: self.register(CoreRegister::R1),
            r2: self.register(CoreRegister::R2),
            r3: self.register(CoreRegister::R3),
            r9: self.register(CoreRegister::R9),
            sp: self.register(CoreRegister::SP),
            lr: self.register(CoreRegister::LR),
            xpsr: self.register(CoreRegister::XPSR),
        }
    }
}

/// This is a mock probe which can be used for mocking things in tests or for dry runs.
pub struct FakeProbe {
    operations: Vec<Operation>,
    memory: FakeMemory,
    core: MockCore,

    word_reads: HashMap<u64, Script>,
    ap_reads: HashMap<(u8, u8), Script>,
    word_write_failures: HashMap<u64, (usize, TransportError)>,
    dp_write_failure: Option<TransportError>,
    init_failure: Option<TransportError>,

    routine_handler: Option<RoutineHandler>,
    routine_calls: Vec<RoutineCall>,
    halt_on_resume: bool,
}

impl Default for FakeProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl Debug for FakeProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeProbe")
            .field("operations", &self.operations.len())
            .field("routine_calls", &self.routine_calls.len())
            .field("halted", &self.core.is_halted)
            .finish()
    }
}

impl FakeProbe {
    pub fn new() -> Self {
        Self {
            operations: Vec::new(),
            memory: FakeMemory::default(),
            core: MockCore::default(),
            word_reads: HashMap::new(),
            ap_reads: HashMap::new(),
            word_write_failures: HashMap::new(),
            dp_write_failure: None,
            init_failure: None,
            routine_handler: None,
            routine_calls: Vec::new(),
            halt_on_resume: true,
        }
    }

    /// Makes reads of `address` return `values` in order. The last value
    /// repeats once the script is exhausted. Scripts take precedence over the
    /// memory and the emulated core.
    pub fn script_word_reads(&mut self, address: u64, values: impl IntoIterator<Item = u32>) {
        self.word_reads
            .insert(address, Script(values.into_iter().map(Ok).collect()));
    }

    /// Like [`FakeProbe::script_word_reads`], for access port registers.
    /// Unscripted access port registers read as zero.
    pub fn script_ap_reads(&mut self, ap: u8, offset: u8, values: impl IntoIterator<Item = u32>) {
        self.ap_reads
            .insert((ap, offset), Script(values.into_iter().map(Ok).collect()));
    }

    /// Makes every read of the access port register fail.
    pub fn fail_ap_reads(&mut self, ap: u8, offset: u8, error: TransportError) {
        self.ap_reads
            .insert((ap, offset), Script(VecDeque::from([Err(error)])));
    }

    /// Makes the next `count` writes to `address` fail.
    pub fn fail_word_writes(&mut self, address: u64, count: usize, error: TransportError) {
        self.word_write_failures.insert(address, (count, error));
    }

    /// Makes every debug port write fail.
    pub fn fail_dp_writes(&mut self, error: TransportError) {
        self.dp_write_failure = Some(error);
    }

    /// Makes initializing the debug port fail.
    pub fn fail_init(&mut self, error: TransportError) {
        self.init_failure = Some(error);
    }

    /// Installs the emulation of the flash algorithm. Without a handler every
    /// routine returns 0.
    pub fn set_routine_handler(&mut self, handler: RoutineHandler) {
        self.routine_handler = Some(handler);
    }

    /// If false, a resumed core never reaches its breakpoint.
    pub fn set_halt_on_resume(&mut self, halt: bool) {
        self.halt_on_resume = halt;
    }

    /// Makes the core report a lockup on DHCSR.
    pub fn set_locked_up(&mut self, locked_up: bool) {
        self.core.locked_up = locked_up;
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn clear_operations(&mut self) {
        self.operations.clear();
    }

    /// Number of recorded operations matching `filter`.
    pub fn count(&self, filter: impl Fn(&Operation) -> bool) -> usize {
        self.operations.iter().filter(|op| filter(op)).count()
    }

    pub fn routine_calls(&self) -> &[RoutineCall] {
        &self.routine_calls
    }

    pub fn memory(&self) -> &FakeMemory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut FakeMemory {
        &mut self.memory
    }

    pub fn is_halted(&self) -> bool {
        self.core.is_halted
    }

    pub fn core_register(&self, register: CoreRegister) -> u32 {
        self.core.register(register)
    }

    fn write_dhcsr(&mut self, value: u32) {
        let dhcsr = Dhcsr::from(value);

        if !dhcsr.has_debug_key() {
            tracing::trace!("[write] <DHCSR> without debug key ignored: {value:#010x}");
            return;
        }

        self.core.debugen = dhcsr.c_debugen();

        if dhcsr.c_halt() {
            self.core.is_halted = true;
        } else if self.core.is_halted && dhcsr.c_debugen() {
            self.resume();
        }
    }

    fn resume(&mut self) {
        self.core.is_halted = false;

        let call = self.core.routine_call();
        tracing::trace!("[resume] {call:x?}");
        self.routine_calls.push(call);

        if !self.halt_on_resume {
            return;
        }

        let result = match &mut self.routine_handler {
            Some(handler) => handler(&call, &mut self.memory),
            None => 0,
        };

        self.core.registers[CoreRegister::R0.0 as usize] = result;
        self.core.registers[CoreRegister::PC.0 as usize] = call.lr & !1;
        self.core.is_halted = true;
    }

    fn write_dcrsr(&mut self, value: u32) {
        let dcrsr = Dcrsr::from(value);
        let Some(register) = self.core.registers.get_mut(dcrsr.regsel() as usize) else {
            return;
        };

        if dcrsr.regwnr() {
            *register = self.core.dcrdr;
        } else {
            self.core.dcrdr = *register;
        }
    }
}

impl DebugTransport for FakeProbe {
    fn init_debug(&mut self) -> Result<(), TransportError> {
        self.operations.push(Operation::InitDebug);

        match &self.init_failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn read_word_32(&mut self, address: u64) -> Result<u32, TransportError> {
        self.operations.push(Operation::ReadWord { address });

        if let Some(value) = self.word_reads.get_mut(&address).and_then(Script::next) {
            return value;
        }

        let value = match address {
            Dhcsr::ADDRESS => self.core.dhcsr(),
            Dcrdr::ADDRESS => self.core.dcrdr,
            _ => self.memory.read_word(address),
        };

        tracing::trace!("[read_word_32] {address:#010x} = {value:#010x}");

        Ok(value)
    }

    fn write_word_32(&mut self, address: u64, value: u32) -> Result<(), TransportError> {
        self.operations.push(Operation::WriteWord { address, value });

        if let Some((remaining, error)) = self.word_write_failures.get_mut(&address) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(error.clone());
            }
        }

        match address {
            Dhcsr::ADDRESS => self.write_dhcsr(value),
            Dcrsr::ADDRESS => self.write_dcrsr(value),
            Dcrdr::ADDRESS => self.core.dcrdr = value,
            _ => self.memory.write_word(address, value),
        }

        Ok(())
    }

    fn read_ap_register(&mut self, ap: u8, offset: u8) -> Result<u32, TransportError> {
        self.operations.push(Operation::ReadAp { ap, offset });

        self.ap_reads
            .get_mut(&(ap, offset))
            .and_then(Script::next)
            .unwrap_or(Ok(0))
    }

    fn write_ap_register(&mut self, ap: u8, offset: u8, value: u32) -> Result<(), TransportError> {
        self.operations.push(Operation::WriteAp { ap, offset, value });
        Ok(())
    }

    fn write_dp_register(&mut self, offset: u8, value: u32) -> Result<(), TransportError> {
        self.operations.push(Operation::WriteDp { offset, value });

        match &self.dp_write_failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn set_target_reset(&mut self, asserted: bool) -> Result<(), TransportError> {
        self.operations.push(Operation::SetReset(asserted));
        Ok(())
    }

    fn set_target_state_sw(&mut self, state: TargetState) -> Result<(), TransportError> {
        self.operations.push(Operation::SetStateSw(state));
        Ok(())
    }

    fn delay(&mut self, duration: Duration) {
        self.operations.push(Operation::Delay(duration));
    }
}
