#![cfg_attr(not(test), no_std)]
#![doc = include_str!("../README.md")]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod cpu;
pub mod dfll;
pub mod regs;
pub mod time;

pub use dfll::{Calibration, Config, Dfll, Error, SavedContext, TargetCount, Trim};
