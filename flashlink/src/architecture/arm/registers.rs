//! Cortex-M debug registers and the debug port registers used by the
//! halt sequences.

use bitfield::bitfield;

/// A register in the memory mapped address space of the target.
pub trait MemoryMappedRegister: Clone + From<u32> + Into<u32> + Sized + std::fmt::Debug {
    /// The register's address in the target memory.
    const ADDRESS: u64;
    /// The register's name.
    const NAME: &'static str;
}

/// A register of the debug port, addressed by its offset.
pub trait DpRegister: Clone + From<u32> + Into<u32> + Sized + std::fmt::Debug {
    /// Offset of the register in the debug port.
    const ADDRESS: u8;
    /// The register's name.
    const NAME: &'static str;
}

bitfield! {
    /// Debug Halting Control and Status Register, DHCSR
    #[derive(Copy, Clone)]
    pub struct Dhcsr(u32);
    impl Debug;
    pub s_reset_st, _: 25;
    pub s_retire_st, _: 24;
    pub s_lockup, _: 19;
    pub s_sleep, _: 18;
    pub s_halt, _: 17;
    pub s_regrdy, _: 16;
    pub c_maskints, set_c_maskints: 3;
    pub c_step, set_c_step: 2;
    pub c_halt, set_c_halt: 1;
    pub c_debugen, set_c_debugen: 0;
}

impl Dhcsr {
    /// Value written to the upper half word to unlock writes to bits 15:0.
    pub const DBGKEY: u32 = 0xa05f;

    /// This function sets the bit to enable writes to this register.
    ///
    /// Software must write 0xA05F to the debug key field to enable write
    /// accesses to bits [15:0], otherwise the processor ignores the write.
    pub fn enable_write(&mut self) {
        self.0 &= !(0xffff << 16);
        self.0 |= Self::DBGKEY << 16;
    }

    /// Returns true if the upper half word carries the debug key.
    pub fn has_debug_key(&self) -> bool {
        self.0 >> 16 == Self::DBGKEY
    }

    /// `DBGKEY | C_DEBUGEN`
    pub fn debug_enable() -> Self {
        let mut dhcsr = Dhcsr(0);
        dhcsr.set_c_debugen(true);
        dhcsr.enable_write();
        dhcsr
    }

    /// `DBGKEY | C_DEBUGEN | C_HALT`
    pub fn halt_request() -> Self {
        let mut dhcsr = Self::debug_enable();
        dhcsr.set_c_halt(true);
        dhcsr
    }
}

impl From<u32> for Dhcsr {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<Dhcsr> for u32 {
    fn from(value: Dhcsr) -> Self {
        value.0
    }
}

impl MemoryMappedRegister for Dhcsr {
    const ADDRESS: u64 = 0xE000_EDF0;
    const NAME: &'static str = "DHCSR";
}

bitfield! {
    /// Debug Core Register Selector Register, DCRSR
    #[derive(Copy, Clone)]
    pub struct Dcrsr(u32);
    impl Debug;
    pub regwnr, set_regwnr: 16;
    pub u8, regsel, set_regsel: 4,0;
}

impl From<u32> for Dcrsr {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<Dcrsr> for u32 {
    fn from(value: Dcrsr) -> Self {
        value.0
    }
}

impl MemoryMappedRegister for Dcrsr {
    const ADDRESS: u64 = 0xE000_EDF4;
    const NAME: &'static str = "DCRSR";
}

/// Debug Core Register Data Register, DCRDR
#[derive(Debug, Copy, Clone)]
pub struct Dcrdr(pub u32);

impl From<u32> for Dcrdr {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl From<Dcrdr> for u32 {
    fn from(value: Dcrdr) -> Self {
        value.0
    }
}

impl MemoryMappedRegister for Dcrdr {
    const ADDRESS: u64 = 0xE000_EDF8;
    const NAME: &'static str = "DCRDR";
}

bitfield! {
    /// The ABORT register of the debug port.
    #[derive(Copy, Clone)]
    pub struct Abort(u32);
    impl Debug;
    pub _, set_orunerrclr: 4;
    pub _, set_wderrclr: 3;
    pub _, set_stkerrclr: 2;
    pub _, set_stkcmpclr: 1;
    pub _, set_dapabort: 0;
}

impl Abort {
    /// Aborts the current access port transaction.
    pub fn dap_abort() -> Self {
        let mut abort = Abort(0);
        abort.set_dapabort(true);
        abort
    }
}

impl From<u32> for Abort {
    fn from(raw: u32) -> Self {
        Abort(raw)
    }
}

impl From<Abort> for u32 {
    fn from(raw: Abort) -> Self {
        raw.0
    }
}

impl DpRegister for Abort {
    const ADDRESS: u8 = 0x0;
    const NAME: &'static str = "ABORT";
}

/// Selector values of the core registers, as written to `DCRSR.REGSEL`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoreRegister(pub u8);

impl CoreRegister {
    /// First argument and result register.
    pub const R0: CoreRegister = CoreRegister(0);
    /// Second argument register.
    pub const R1: CoreRegister = CoreRegister(1);
    /// Third argument register.
    pub const R2: CoreRegister = CoreRegister(2);
    /// Fourth argument register.
    pub const R3: CoreRegister = CoreRegister(3);
    /// Static base register of position independent code.
    pub const R9: CoreRegister = CoreRegister(9);
    /// Stack pointer.
    pub const SP: CoreRegister = CoreRegister(13);
    /// Link register.
    pub const LR: CoreRegister = CoreRegister(14);
    /// Debug return address, the PC the core resumes at.
    pub const PC: CoreRegister = CoreRegister(15);
    /// Program status register.
    pub const XPSR: CoreRegister = CoreRegister(16);

    /// The Thumb state bit of xPSR. Cortex-M cores fault when it is clear.
    pub const XPSR_THUMB: u32 = 1 << 24;
}

impl std::fmt::Display for CoreRegister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            13 => write!(f, "SP"),
            14 => write!(f, "LR"),
            15 => write!(f, "PC"),
            16 => write!(f, "xPSR"),
            n => write!(f, "R{n}"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn dhcsr_commands() {
        assert_eq!(u32::from(Dhcsr::debug_enable()), 0xa05f_0001);
        assert_eq!(u32::from(Dhcsr::halt_request()), 0xa05f_0003);
        assert!(Dhcsr::halt_request().has_debug_key());
        assert!(!Dhcsr(0x0003_0003).has_debug_key());
    }

    #[test]
    fn dhcsr_status_bits() {
        let status = Dhcsr(0x0003_0000);

        assert!(status.s_halt());
        assert!(status.s_regrdy());
        assert!(!status.s_lockup());
    }

    #[test]
    fn dcrsr_selects_register() {
        let mut dcrsr = Dcrsr(0);
        dcrsr.set_regwnr(true);
        dcrsr.set_regsel(CoreRegister::XPSR.0);

        assert_eq!(u32::from(dcrsr), 0x0001_0010);
        assert_eq!(Dcrsr(0x0001_000f).regsel(), 15);
    }

    #[test]
    fn abort_values() {
        assert_eq!(u32::from(Abort::dap_abort()), 0x1);

        let mut clear = Abort(0);
        clear.set_stkcmpclr(true);
        clear.set_stkerrclr(true);
        clear.set_wderrclr(true);
        clear.set_orunerrclr(true);
        assert_eq!(u32::from(clear), 0x1e);
    }

    #[test]
    fn register_names() {
        assert_eq!(CoreRegister::R9.to_string(), "R9");
        assert_eq!(CoreRegister::PC.to_string(), "PC");
        assert_eq!(CoreRegister::XPSR.to_string(), "xPSR");
    }
}
