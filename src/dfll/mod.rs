//! DFLL (Digital Frequency-Locked Loop)
//!
//! Trims the internal RC oscillator against the 32.768kHz crystal. The RC
//! frequency is measured as the number of RC cycles counted while the crystal
//! clocks [`WINDOW_TICKS`] cycles, so a target frequency `f` corresponds to a
//! count of `f * WINDOW_TICKS / 32768`, i.e. `f >> 6`.
//!
//! ```rust,ignore
//! let mut dfll = Dfll::new(regs, cpu, Config::default());
//! let cal = dfll.run(Hertz::khz(500));
//! info!("trim {:#x}", cal.trim.value());
//! ```
//!
//! Precision is around 2% at ambient temperature.

mod calibrate;
mod measure;

pub use calibrate::{Calibration, Trim};

use crate::cpu::{ClockDivider, Cpu, Status};
use crate::regs::{Reg, Registers};
use crate::time::Hertz;

/// Crystal reference frequency.
pub const REFERENCE_FREQ: Hertz = Hertz(32_768);

/// Measurement window, in crystal cycles.
pub const WINDOW_TICKS: u16 = 512;

/// Right shift turning a frequency in Hz into a [`TargetCount`].
pub const TARGET_SHIFT: u32 = 6;

const _: () = ::core::assert!(REFERENCE_FREQ.0 / WINDOW_TICKS as u32 == 1 << TARGET_SHIFT);

/// DFLL error.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The frequency does not map to a 16-bit counter value.
    FrequencyOutOfRange { hz: u32 },
}

/// Counter A/B value expected over one window at the wanted RC frequency.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TargetCount(pub u16);

impl TargetCount {
    /// Highest frequency representable by a target count.
    pub const MAX_FREQ: Hertz =
        Hertz(((u16::MAX as u32) << TARGET_SHIFT) | ((1 << TARGET_SHIFT) - 1));

    /// Target count for `freq`.
    ///
    /// Frequencies above [`TargetCount::MAX_FREQ`] are truncated to 16 bits.
    pub const fn from_frequency(freq: Hertz) -> Self {
        Self((freq.0 >> TARGET_SHIFT) as u16)
    }

    /// Target count for `freq`, rejecting frequencies above
    /// [`TargetCount::MAX_FREQ`].
    pub fn try_from_frequency(freq: Hertz) -> Result<Self, Error> {
        u16::try_from(freq.0 >> TARGET_SHIFT)
            .map(Self)
            .map_err(|_| Error::FrequencyOutOfRange { hz: freq.0 })
    }

    /// RC frequency giving this count.
    pub const fn frequency(self) -> Hertz {
        Hertz((self.0 as u32) << TARGET_SHIFT)
    }
}

/// DFLL configuration.
#[non_exhaustive]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Trim loaded before the search starts.
    pub initial_trim: Trim,
    /// `CntCtrlCk` during measurements: A/B on the RC clock, C/D on the crystal.
    pub counter_clock: u8,
    /// `CntConfig1` during measurements: A/B and C/D chained, C/D counting down.
    pub counter_config1: u8,
    /// `CntConfig2` during measurements.
    pub counter_config2: u8,
    /// NOPs executed after each trim change.
    pub settle_cycles: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub const fn new() -> Self {
        Self {
            initial_trim: Trim::new(Trim::MSB),
            counter_clock: 0x11,
            counter_config1: 0x1C,
            counter_config2: 0x00,
            settle_cycles: 4,
        }
    }

    pub const fn with_initial_trim(mut self, initial_trim: Trim) -> Self {
        self.initial_trim = initial_trim;
        self
    }

    pub const fn with_counter_clock(mut self, counter_clock: u8) -> Self {
        self.counter_clock = counter_clock;
        self
    }

    pub const fn with_counter_config1(mut self, counter_config1: u8) -> Self {
        self.counter_config1 = counter_config1;
        self
    }

    pub const fn with_counter_config2(mut self, counter_config2: u8) -> Self {
        self.counter_config2 = counter_config2;
        self
    }

    pub const fn with_settle_cycles(mut self, settle_cycles: u8) -> Self {
        self.settle_cycles = settle_cycles;
        self
    }
}

/// Counter, event and status state saved around a calibration.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SavedContext {
    cnt_on: u8,
    cnt_ctrl_ck: u8,
    cnt_config1: u8,
    cnt_config2: u8,
    cnt: [u8; 4],
    status: Status,
    evn_en: u8,
}

impl SavedContext {
    /// Snapshot the counter block, status and event enables.
    ///
    /// All counters are stopped once `CntOn` has been saved.
    pub fn capture<R: Registers, C: Cpu>(regs: &mut R, cpu: &mut C) -> Self {
        let cnt_on = regs.read(Reg::CntOn);
        regs.write(Reg::CntOn, 0);
        let cnt_ctrl_ck = regs.read(Reg::CntCtrlCk);
        let cnt_config1 = regs.read(Reg::CntConfig1);
        let cnt_config2 = regs.read(Reg::CntConfig2);
        let cnt = [
            regs.read(Reg::CntA),
            regs.read(Reg::CntB),
            regs.read(Reg::CntC),
            regs.read(Reg::CntD),
        ];
        let status = cpu.save_status();
        let evn_en = regs.read(Reg::EvnEn);

        Self {
            cnt_on,
            cnt_ctrl_ck,
            cnt_config1,
            cnt_config2,
            cnt,
            status,
            evn_en,
        }
    }

    /// Write every saved value back.
    pub fn restore<R: Registers, C: Cpu>(&self, regs: &mut R, cpu: &mut C) {
        cpu.restore_status(self.status);
        regs.write(Reg::EvnEn, self.evn_en);

        regs.write(Reg::CntOn, self.cnt_on);
        regs.write(Reg::CntCtrlCk, self.cnt_ctrl_ck);
        regs.write(Reg::CntConfig1, self.cnt_config1);
        regs.write(Reg::CntConfig2, self.cnt_config2);
        regs.write(Reg::CntA, self.cnt[0]);
        regs.write(Reg::CntB, self.cnt[1]);
        regs.write(Reg::CntC, self.cnt[2]);
        regs.write(Reg::CntD, self.cnt[3]);
    }
}

/// Restores a [`SavedContext`] when dropped, so unwinding out of a
/// calibration still puts the counters back.
struct ContextGuard<'a, R: Registers, C: Cpu> {
    regs: &'a mut R,
    cpu: &'a mut C,
    saved: SavedContext,
}

impl<'a, R: Registers, C: Cpu> ContextGuard<'a, R, C> {
    fn new(regs: &'a mut R, cpu: &'a mut C) -> Self {
        let saved = SavedContext::capture(&mut *regs, &mut *cpu);
        Self { regs, cpu, saved }
    }
}

impl<R: Registers, C: Cpu> Drop for ContextGuard<'_, R, C> {
    fn drop(&mut self) {
        self.saved.restore(&mut *self.regs, &mut *self.cpu);
    }
}

/// DFLL driver.
pub struct Dfll<R: Registers, C: Cpu> {
    regs: R,
    cpu: C,
    config: Config,
}

impl<R: Registers, C: Cpu> Dfll<R, C> {
    /// Create a DFLL driver. Nothing is written to the hardware.
    pub fn new(regs: R, cpu: C, config: Config) -> Self {
        Self { regs, cpu, config }
    }

    /// Current configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Release the register and CPU handles.
    pub fn free(self) -> (R, C) {
        (self.regs, self.cpu)
    }

    /// Trim the RC oscillator to `frequency`.
    ///
    /// Counter, event-enable and status registers are saved before and
    /// restored after the search; the counters are stopped meanwhile. The
    /// trim registers keep the result.
    ///
    /// `frequency` is not range checked: anything above
    /// [`TargetCount::MAX_FREQ`] is truncated. See [`Dfll::try_run`].
    pub fn run(&mut self, frequency: Hertz) -> Calibration {
        self.run_target(TargetCount::from_frequency(frequency))
    }

    /// Like [`Dfll::run`], but rejects frequencies above
    /// [`TargetCount::MAX_FREQ`] without touching the hardware.
    pub fn try_run(&mut self, frequency: Hertz) -> Result<Calibration, Error> {
        let target = TargetCount::try_from_frequency(frequency)?;
        Ok(self.run_target(target))
    }

    fn run_target(&mut self, target: TargetCount) -> Calibration {
        let guard = ContextGuard::new(&mut self.regs, &mut self.cpu);
        guard.cpu.clear_status();

        let calibration =
            calibrate::calibrate(&mut *guard.regs, &mut *guard.cpu, &self.config, target);
        drop(guard);

        // 2%
        if calibration.error().unsigned_abs() * 50 > target.0 as u32 {
            warn!(
                "dfll: residual error {} for target {}",
                calibration.error(),
                target.0
            );
        }
        calibration
    }

    /// Run the trim search for `target` without saving or restoring any
    /// register. The counter block is left configured for measurements.
    pub fn calibrate(&mut self, target: TargetCount) -> Calibration {
        calibrate::calibrate(&mut self.regs, &mut self.cpu, &self.config, target)
    }

    /// Measure the RC oscillator once.
    ///
    /// Expects the counter block to be set up as [`Dfll::calibrate`] leaves
    /// it. Counters end stopped and the counter C event disabled.
    pub fn measure(&mut self) -> u16 {
        measure::measure(&mut self.regs, &mut self.cpu)
    }

    /// Measure the current RC frequency under the calibration setup, saving
    /// and restoring the surrounding counter state as [`Dfll::run`] does.
    pub fn measure_frequency(&mut self) -> Hertz {
        let guard = ContextGuard::new(&mut self.regs, &mut self.cpu);
        guard.cpu.clear_status();

        guard.cpu.set_clock_divider(ClockDivider::Div2);
        calibrate::setup_counters(&mut *guard.regs, &self.config);
        let count = measure::measure(&mut *guard.regs, &mut *guard.cpu);
        guard.cpu.set_clock_divider(ClockDivider::NoDiv);
        drop(guard);

        TargetCount(count).frequency()
    }

    /// Wait for the RC oscillator to settle after a trim change.
    pub fn settle(&mut self) {
        calibrate::settle(&mut self.cpu, self.config.settle_cycles);
    }

    /// Trim currently programmed.
    pub fn trim(&mut self) -> Trim {
        calibrate::read_trim(&mut self.regs)
    }

    /// Program a trim found earlier, e.g. one kept across resets.
    pub fn set_trim(&mut self, trim: Trim) {
        calibrate::write_trim(&mut self.regs, trim);
        self.settle();
    }
}
