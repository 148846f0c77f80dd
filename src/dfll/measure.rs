//! RC frequency measurement against the crystal reference.
//!
//! Counter A/B counts RC cycles, counter C/D counts down [`WINDOW_TICKS`]
//! crystal cycles. C/D is started alone and the core halted on its event so
//! that A/B starts on a crystal edge; the second event then closes the window.

use super::WINDOW_TICKS;
use crate::cpu::Cpu;
use crate::regs::{cnt_on, evn, Reg, Registers};

/// Count RC oscillator cycles over one measurement window.
///
/// Leaves both counters stopped and the counter C event disabled.
pub(crate) fn measure<R: Registers, C: Cpu>(regs: &mut R, cpu: &mut C) -> u16 {
    regs.write(Reg::EvnEn, evn::CNT_C);

    // A/B counts up over its full range, C/D counts down the window.
    regs.write(Reg::CntA, 0xFF);
    regs.write(Reg::CntB, 0xFF);
    let [window_lo, window_hi] = WINDOW_TICKS.to_le_bytes();
    regs.write(Reg::CntC, window_lo);
    regs.write(Reg::CntD, window_hi);

    regs.write(Reg::CntOn, cnt_on::CNT_C);
    cpu.halt();

    // Woken on a crystal edge: start the measurement counter now.
    regs.write(Reg::CntOn, cnt_on::CNT_A | cnt_on::CNT_C);
    regs.write(Reg::Evn, evn::CNT_C);
    cpu.clear_event_flag();
    cpu.halt();

    regs.write(Reg::CntOn, 0);
    regs.write(Reg::Evn, evn::CNT_C);
    cpu.clear_event_flag();
    regs.write(Reg::EvnEn, 0);

    u16::from_le_bytes([regs.read(Reg::CntA), regs.read(Reg::CntB)])
}
