//! Byte-wide register surface used by the DFLL.
//!
//! The calibration only ever touches the counter block, the event controller
//! and the two RC trim registers. Access goes through [`Registers`] so the
//! search can run against real memory-mapped I/O ([`Mmio`]) or a simulated
//! chip.

/// Registers the DFLL reads or writes.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reg {
    /// Counter A, low byte of the measurement counter.
    CntA,
    /// Counter B, high byte of the measurement counter.
    CntB,
    /// Counter C, low byte of the window counter.
    CntC,
    /// Counter D, high byte of the window counter.
    CntD,
    /// Counter clock source selection.
    CntCtrlCk,
    /// Counter chaining and direction.
    CntConfig1,
    /// Counter capture/PWM configuration.
    CntConfig2,
    /// Counter enable mask, see [`cnt_on`].
    CntOn,
    /// Pending events, write 1 to clear. See [`evn`].
    Evn,
    /// Event enable mask. See [`evn`].
    EvnEn,
    /// RC oscillator trim, high bits.
    SysRcTrim1,
    /// RC oscillator trim, low 6 bits.
    SysRcTrim2,
}

/// `CntOn` bits.
pub mod cnt_on {
    /// Counter A (chained with B) running.
    pub const CNT_A: u8 = 0x01;
    /// Counter C (chained with D) running.
    pub const CNT_C: u8 = 0x04;
}

/// `Evn` / `EvnEn` bits.
pub mod evn {
    /// Counter C reached zero.
    pub const CNT_C: u8 = 0x40;
}

/// Byte-wide register access.
pub trait Registers {
    /// Read the current value of `reg`.
    fn read(&mut self, reg: Reg) -> u8;

    /// Write `value` to `reg`.
    fn write(&mut self, reg: Reg, value: u8);

    /// Read-modify-write `reg`.
    fn modify(&mut self, reg: Reg, f: impl FnOnce(u8) -> u8) {
        let value = self.read(reg);
        self.write(reg, f(value));
    }
}

impl<T: Registers + ?Sized> Registers for &mut T {
    fn read(&mut self, reg: Reg) -> u8 {
        (**self).read(reg)
    }

    fn write(&mut self, reg: Reg, value: u8) {
        (**self).write(reg, value)
    }
}

/// Addresses of every [`Reg`] in the data space.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegisterMap {
    pub cnt_a: usize,
    pub cnt_b: usize,
    pub cnt_c: usize,
    pub cnt_d: usize,
    pub cnt_ctrl_ck: usize,
    pub cnt_config1: usize,
    pub cnt_config2: usize,
    pub cnt_on: usize,
    pub evn: usize,
    pub evn_en: usize,
    pub sys_rc_trim1: usize,
    pub sys_rc_trim2: usize,
}

impl RegisterMap {
    /// Address of `reg`.
    pub const fn addr(&self, reg: Reg) -> usize {
        match reg {
            Reg::CntA => self.cnt_a,
            Reg::CntB => self.cnt_b,
            Reg::CntC => self.cnt_c,
            Reg::CntD => self.cnt_d,
            Reg::CntCtrlCk => self.cnt_ctrl_ck,
            Reg::CntConfig1 => self.cnt_config1,
            Reg::CntConfig2 => self.cnt_config2,
            Reg::CntOn => self.cnt_on,
            Reg::Evn => self.evn,
            Reg::EvnEn => self.evn_en,
            Reg::SysRcTrim1 => self.sys_rc_trim1,
            Reg::SysRcTrim2 => self.sys_rc_trim2,
        }
    }
}

/// Volatile memory-mapped register access.
pub struct Mmio {
    map: RegisterMap,
}

impl Mmio {
    /// Create a register accessor for the given address map.
    ///
    /// # Safety
    ///
    /// Caller must ensure:
    /// - every address in `map` is a valid, byte-accessible peripheral register.
    /// - nothing else touches the counter, event or trim registers while the
    ///   returned `Mmio` is alive.
    pub const unsafe fn new(map: RegisterMap) -> Self {
        Self { map }
    }

    /// The address map in use.
    pub fn map(&self) -> &RegisterMap {
        &self.map
    }
}

impl Registers for Mmio {
    fn read(&mut self, reg: Reg) -> u8 {
        let ptr = self.map.addr(reg) as *const u8;
        // Safety: validity of the address is the contract of `Mmio::new`.
        unsafe { core::ptr::read_volatile(ptr) }
    }

    fn write(&mut self, reg: Reg, value: u8) {
        let ptr = self.map.addr(reg) as *mut u8;
        // Safety: validity of the address is the contract of `Mmio::new`.
        unsafe { core::ptr::write_volatile(ptr, value) }
    }
}
