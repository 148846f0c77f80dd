//! Successive-approximation search over the RC trim.

use super::measure::measure;
use super::{Config, TargetCount};
use crate::cpu::{ClockDivider, Cpu};
use crate::regs::{Reg, Registers};

/// 11-bit RC oscillator trim code.
///
/// Split across two registers: bits 10..6 go to `SysRcTrim1`, bits 5..0 to
/// `SysRcTrim2`. A higher code gives a faster oscillator.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Trim(u16);

impl Trim {
    /// Number of significant bits.
    pub const BITS: u32 = 11;
    /// Lowest trim code.
    pub const MIN: Trim = Trim(0);
    /// Highest trim code.
    pub const MAX: Trim = Trim((1 << Self::BITS) - 1);
    /// First bit tried by the search.
    pub const MSB: u16 = 1 << (Self::BITS - 1);

    const LOW_BITS: u32 = 6;
    const LOW_MASK: u16 = (1 << Self::LOW_BITS) - 1;

    /// Create a trim code, discarding bits above bit 10.
    pub const fn new(value: u16) -> Self {
        Self(value & Self::MAX.0)
    }

    /// Assemble a trim code from the two register values.
    pub const fn from_regs(trim1: u8, trim2: u8) -> Self {
        Self::new(((trim1 as u16) << Self::LOW_BITS) | (trim2 as u16 & Self::LOW_MASK))
    }

    /// Raw 11-bit code.
    pub const fn value(self) -> u16 {
        self.0
    }

    /// `SysRcTrim1` value (high bits).
    pub const fn trim1(self) -> u8 {
        (self.0 >> Self::LOW_BITS) as u8
    }

    /// `SysRcTrim2` value (low 6 bits).
    pub const fn trim2(self) -> u8 {
        (self.0 & Self::LOW_MASK) as u8
    }

    const fn with(self, bit: u16) -> Self {
        Self::new(self.0 | bit)
    }

    const fn without(self, bit: u16) -> Self {
        Self(self.0 & !bit)
    }

    /// One LSB faster, or `None` at [`Trim::MAX`].
    pub fn step_up(self) -> Option<Self> {
        (self < Self::MAX).then(|| Self(self.0 + 1))
    }

    /// One LSB slower, or `None` at [`Trim::MIN`].
    pub fn step_down(self) -> Option<Self> {
        self.0.checked_sub(1).map(Self)
    }
}

/// Result of one calibration.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Calibration {
    /// Counter value the search aimed for.
    pub target: TargetCount,
    /// Trim left in the oscillator.
    pub trim: Trim,
    /// Counter value measured at the final trim.
    pub count: u16,
}

impl Calibration {
    /// Signed distance of [`Calibration::count`] from the target.
    pub fn error(&self) -> i32 {
        self.count as i32 - self.target.0 as i32
    }
}

pub(crate) fn write_trim<R: Registers>(regs: &mut R, trim: Trim) {
    regs.write(Reg::SysRcTrim1, trim.trim1());
    regs.write(Reg::SysRcTrim2, trim.trim2());
}

pub(crate) fn read_trim<R: Registers>(regs: &mut R) -> Trim {
    Trim::from_regs(regs.read(Reg::SysRcTrim1), regs.read(Reg::SysRcTrim2))
}

/// Give the RC oscillator time to settle after a trim change.
pub(crate) fn settle<C: Cpu>(cpu: &mut C, cycles: u8) {
    for _ in 0..cycles {
        cpu.nop();
    }
}

/// Program the counter block for measurements.
pub(crate) fn setup_counters<R: Registers>(regs: &mut R, config: &Config) {
    regs.write(Reg::CntCtrlCk, config.counter_clock);
    regs.write(Reg::CntConfig1, config.counter_config1);
    regs.write(Reg::CntConfig2, config.counter_config2);
}

/// Search the trim whose measured count is closest to `target`.
///
/// Takes exactly 12 measurements: one per trim bit, MSB first, plus one for
/// the final ±1 correction.
pub(crate) fn calibrate<R: Registers, C: Cpu>(
    regs: &mut R,
    cpu: &mut C,
    config: &Config,
    target: TargetCount,
) -> Calibration {
    cpu.set_clock_divider(ClockDivider::Div2);

    let mut trim = config.initial_trim;
    write_trim(regs, trim);
    setup_counters(regs, config);

    let mut count = 0;
    let mut last = trim;
    // Count measured at the value `trim` holds, once any trial was kept.
    let mut accepted = None;
    let mut bit = Trim::MSB;
    while bit != 0 {
        let trial = trim.with(bit);
        write_trim(regs, trial);
        settle(cpu, config.settle_cycles);
        count = measure(regs, cpu);
        last = trial;

        // Ties keep the bit.
        if count > target.0 {
            trim = trial.without(bit);
            write_trim(regs, trim);
        } else {
            trim = trial;
            accepted = Some(count);
        }
        trace!(
            "dfll: bit {:#x} trial {:#x} count {} -> trim {:#x}",
            bit,
            trial.value(),
            count,
            trim.value()
        );
        bit >>= 1;
    }

    // Correct around a measured trim. With every trial rejected the only
    // measured one is the last trial, one LSB above `trim`.
    let (base, count) = match accepted {
        Some(count) => (trim, count),
        None => (last, count),
    };
    let diff = target.0 as i32 - count as i32;
    let nudged = if diff > 0 { base.step_up() } else { base.step_down() };
    write_trim(regs, nudged.unwrap_or(base));
    settle(cpu, config.settle_cycles);
    let recount = measure(regs, cpu);
    let rediff = target.0 as i32 - recount as i32;

    let (trim, count) = match nudged {
        Some(nudged) if rediff.abs() <= diff.abs() => (nudged, recount),
        Some(_) => {
            write_trim(regs, base);
            (base, count)
        }
        None => (base, recount),
    };

    cpu.set_clock_divider(ClockDivider::NoDiv);

    let calibration = Calibration { target, trim, count };
    debug!(
        "dfll: target {} trim {:#x} count {}",
        target.0,
        trim.value(),
        count
    );
    calibration
}
