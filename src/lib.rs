//! [8T49N24x](https://www.renesas.com/en/products/8t49n241) clock synthesizer driver.
//!
//! `frequency::plan` computes divider settings for a rate change without any I/O,
//! `register::settings_sequence` turns them into register writes and
//! `device::Idt8t49n24x` applies those over I2C.

#![cfg_attr(not(test), no_std)]

pub mod constants;
pub mod register;
pub mod errors;
pub mod fixed;
pub mod config;
pub mod divider;
pub mod frequency;
pub mod device;

pub use config::{BoardConfig, ChipProfile, FrequencyRequest, SynthMode};
pub use device::Idt8t49n24x;
pub use errors::{Error, PlanError};
pub use frequency::{plan, SynthesizerSettings};
