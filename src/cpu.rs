//! CPU capabilities the DFLL needs beyond plain register access.
//!
//! The measurement protocol parks the core until the window counter fires,
//! and the calibration runs with the status register cleared and the core
//! clock divided. These are platform primitives (instructions, not
//! registers), so they sit behind the [`Cpu`] trait.

/// Snapshot of the CPU status register.
///
/// The layout is platform defined. Only bit 0, the pending-event flag, is
/// interpreted by this crate.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Status(pub u8);

impl Status {
    /// Event pending flag.
    pub const EVENT: u8 = 0x01;

    /// Whether an enabled event is flagged as pending.
    pub const fn event_pending(self) -> bool {
        self.0 & Self::EVENT != 0
    }
}

/// Core clock divider mode.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockDivider {
    /// Core clock halved. Used for the duration of the trim search.
    Div2,
    /// Core clock undivided.
    NoDiv,
}

/// Platform primitives used by the DFLL.
pub trait Cpu {
    /// Suspend the core until the next enabled event.
    ///
    /// Never returns if the event never fires.
    fn halt(&mut self);

    /// Burn one instruction cycle.
    fn nop(&mut self);

    /// Read the status register.
    fn save_status(&mut self) -> Status;

    /// Write back a status previously returned by [`Cpu::save_status`].
    fn restore_status(&mut self, status: Status);

    /// Clear the whole status register.
    fn clear_status(&mut self);

    /// Clear the pending-event flag, leaving the other status bits alone.
    fn clear_event_flag(&mut self) {
        let status = self.save_status();
        self.restore_status(Status(status.0 & !Status::EVENT));
    }

    /// Select the core clock divider.
    fn set_clock_divider(&mut self, divider: ClockDivider);
}

impl<T: Cpu + ?Sized> Cpu for &mut T {
    fn halt(&mut self) {
        (**self).halt()
    }

    fn nop(&mut self) {
        (**self).nop()
    }

    fn save_status(&mut self) -> Status {
        (**self).save_status()
    }

    fn restore_status(&mut self, status: Status) {
        (**self).restore_status(status)
    }

    fn clear_status(&mut self) {
        (**self).clear_status()
    }

    fn clear_event_flag(&mut self) {
        (**self).clear_event_flag()
    }

    fn set_clock_divider(&mut self, divider: ClockDivider) {
        (**self).set_clock_divider(divider)
    }
}

#[cfg(feature = "cortex-m")]
pub use self::cortex::CortexM;

#[cfg(feature = "cortex-m")]
mod cortex {
    use cortex_m::peripheral::SCB;
    use cortex_m::register::primask;

    use super::{ClockDivider, Cpu, Status};

    /// [`Cpu`] for Cortex-M cores.
    ///
    /// - `halt` is `WFE`. SEVONPEND is set on construction so a pending
    ///   interrupt wakes the core even while PRIMASK masks it.
    /// - The status register is PRIMASK: bit 1 set means interrupts masked.
    ///   Clearing the status masks interrupts, restoring re-enables them only
    ///   if they were enabled when saved.
    /// - The event flag is the WFE event register, consumed by `WFE` itself.
    /// - The core clock divider is board specific and delegated to `divider`.
    pub struct CortexM {
        divider: fn(ClockDivider),
    }

    impl CortexM {
        /// Bit of [`Status`] mirroring PRIMASK.
        pub const PRIMASK: u8 = 0x02;

        /// Create a Cortex-M backend.
        pub fn new(scb: &mut SCB, divider: fn(ClockDivider)) -> Self {
            scb.set_sevonpend();
            Self { divider }
        }
    }

    impl Cpu for CortexM {
        fn halt(&mut self) {
            cortex_m::asm::wfe();
        }

        fn nop(&mut self) {
            cortex_m::asm::nop();
        }

        fn save_status(&mut self) -> Status {
            if primask::read().is_active() {
                Status(Self::PRIMASK)
            } else {
                Status(0)
            }
        }

        fn restore_status(&mut self, status: Status) {
            if status.0 & Self::PRIMASK == 0 {
                // Safety: interrupts were enabled when `status` was saved.
                unsafe { cortex_m::interrupt::enable() };
            } else {
                cortex_m::interrupt::disable();
            }
        }

        fn clear_status(&mut self) {
            cortex_m::interrupt::disable();
        }

        fn clear_event_flag(&mut self) {}

        fn set_clock_divider(&mut self, divider: ClockDivider) {
            (self.divider)(divider);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Flags {
        status: u8,
    }

    impl Cpu for Flags {
        fn halt(&mut self) {}
        fn nop(&mut self) {}
        fn save_status(&mut self) -> Status {
            Status(self.status)
        }
        fn restore_status(&mut self, status: Status) {
            self.status = status.0;
        }
        fn clear_status(&mut self) {
            self.status = 0;
        }
        fn set_clock_divider(&mut self, _divider: ClockDivider) {}
    }

    #[test]
    fn clear_event_flag_keeps_other_bits() {
        let mut cpu = Flags { status: 0xA5 };
        assert!(cpu.save_status().event_pending());
        cpu.clear_event_flag();
        assert_eq!(cpu.status, 0xA4);
        assert!(!cpu.save_status().event_pending());
    }
}
