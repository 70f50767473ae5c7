//! 8T49N24x registers
//!
//! 16 bit register addresses, 8 bit values. Fields wider than a byte span
//! consecutive addresses, most significant byte first; the top byte only holds
//! the remaining bits of the field.

use crate::{config::SynthMode, errors::PlanError, frequency::SynthesizerSettings};


/// One register access in a programming sequence
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RegisterOp {
    /// Plain write
    Write { addr: u16, value: u8 },
    /// Read-modify-write of the `mask` bits
    Update { addr: u16, value: u8, mask: u8 },
}

impl RegisterOp {
    pub fn addr(self: &Self) -> u16 {
        match *self {
            RegisterOp::Write { addr, .. } | RegisterOp::Update { addr, .. } => addr,
        }
    }
}


/// DPLL / APLL calibration control
pub const CALIBRATION: u16 = 0x0070;

/// Hold off calibration while dividers are written
pub const CALIBRATION_HOLD: u8 = 0x05;

/// Release calibration
pub const CALIBRATION_RUN: u8 = 0x00;

/// Digital PLL control: STATE[1:0], REF0/REF1 disable bits
pub const DPLL_CTRL: u16 = 0x000a;

/// Analog PLL control: SYN_MODE bit
pub const APLL_CTRL: u16 = 0x0069;

const DPLL_STATE_MASK: u8 = 0x03;
const DPLL_STATE_FREERUN: u8 = 0x01;
const SYN_MODE: u8 = 1 << 3;


/// CLK0 / CLK1 reference inputs
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RefInput {
    Clk0,
    Clk1,
}

impl RefInput {
    /// Disable bit in `DPLL_CTRL`
    #[inline]
    pub fn disable_bit(self) -> u8 {
        match self {
            RefInput::Clk0 => 1 << 4,
            RefInput::Clk1 => 1 << 5,
        }
    }
}

/// Fractional Q outputs
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Output {
    Q1,
    Q2,
    Q3,
}

/// Inputs programmed on a rate change, see `SynthesizerSettings::input_paths`
pub const INPUTS: [RefInput; 2] = [RefInput::Clk0, RefInput::Clk1];

/// Outputs programmed on a rate change, see `SynthesizerSettings::output_fractions`
pub const OUTPUTS: [Output; 2] = [Output::Q2, Output::Q3];


/// Multi-byte register field
pub trait Field: Sized {
    /// Field name, for errors and logs
    const NAME: &'static str;

    /// Number of bits in the field
    fn num_bits() -> u8;

    /// Address of the most significant byte
    fn base(self: &Self) -> u16;

    /// Field value, right aligned
    fn value(self: &Self) -> u32;

    #[inline]
    fn mask() -> u32 {
        !(0xFFFFFFFFu32 << Self::num_bits())
    }

    #[inline]
    fn num_bytes() -> u16 {
        (Self::num_bits() as u16 + 7) / 8
    }

    /// Narrows `value` to the field width or reports it as too wide.
    fn check(value: u64) -> Result<u32, PlanError> {
        if value <= Self::mask() as u64 {
            Ok(value as u32)
        } else {
            Err(PlanError::FieldOverflow { field: Self::NAME, value })
        }
    }

    /// Register writes, MSB first
    fn writes(self) -> FieldWrites {
        let n = Self::num_bytes();
        FieldWrites {
            base: self.base(),
            value: self.value() & Self::mask(),
            index: 0,
            len: n,
        }
    }
}

/// Byte writes of one field
#[derive(Debug, Clone)]
pub struct FieldWrites {
    base: u16,
    value: u32,
    index: u16,
    len: u16,
}

impl Iterator for FieldWrites {
    type Item = RegisterOp;

    fn next(&mut self) -> Option<RegisterOp> {
        if self.index >= self.len {
            return None;
        }
        let shift = 8 * (self.len - 1 - self.index);
        let op = RegisterOp::Write {
            addr: self.base + self.index,
            value: (self.value >> shift) as u8,
        };
        self.index += 1;
        Some(op)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = (self.len - self.index) as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for FieldWrites {}


/// Generate a field addressed per input or output
macro_rules! gen_field {
    ($(#[$meta:meta])*, $n:ident, $nb:tt, $sel:ident { $($v:ident => $addr:expr),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq)]
        pub struct $n(pub $sel, pub u32);

        impl Field for $n {
            const NAME: &'static str = stringify!($n);
            #[inline] fn num_bits() -> u8 { $nb }
            #[inline] fn base(self: &Self) -> u16 { match self.0 { $($sel::$v => $addr),+ } }
            #[inline] fn value(self: &Self) -> u32 { self.1 }
        }
    };
    ($(#[$meta:meta])*, $n:ident, $nb:tt, $addr:expr) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq)]
        pub struct $n(pub u32);

        impl Field for $n {
            const NAME: &'static str = stringify!($n);
            #[inline] fn num_bits() -> u8 { $nb }
            #[inline] fn base(self: &Self) -> u16 { $addr }
            #[inline] fn value(self: &Self) -> u32 { self.0 }
        }
    };
}


gen_field!(
    /// PREx[20:0], reference input pre-divider
    , PreDivider, 21, RefInput { Clk0 => 0x000b, Clk1 => 0x000e }
);

gen_field!(
    /// M1x[23:0], lower loop feedback multiplier
    , M1Feedback, 24, RefInput { Clk0 => 0x0011, Clk1 => 0x0014 }
);

gen_field!(
    /// DSM_INT[8:0], upper loop feedback integer part
    , DsmInt, 9, 0x0025
);

gen_field!(
    /// DSM_FRAC[20:0], upper loop feedback fraction
    , DsmFrac, 21, 0x0028
);

gen_field!(
    /// N_Qm[17:0], output divider integer part
    , OutputDivInt, 18, Output { Q1 => 0x0042, Q2 => 0x0045, Q3 => 0x0048 }
);

gen_field!(
    /// NFRAC_Qm[27:0], output divider fraction
    , OutputDivFrac, 28, Output { Q1 => 0x0057, Q2 => 0x005b, Q3 => 0x005f }
);

gen_field!(
    /// LOSx[16:0], input monitor loss-of-signal threshold
    , LosThreshold, 17, RefInput { Clk0 => 0x0071, Clk1 => 0x0074 }
);


/// Enable or disable a reference input
pub fn ref_input_op(input: RefInput, enable: bool) -> RegisterOp {
    let bit = input.disable_bit();
    RegisterOp::Update {
        addr: DPLL_CTRL,
        value: if enable { 0 } else { bit },
        mask: bit,
    }
}

/// DPLL state / reference enables, then APLL SYN_MODE
pub fn mode_ops(mode: SynthMode) -> [RegisterOp; 2] {
    let (state, syn_mode) = match mode {
        SynthMode::FreeRun => (
            DPLL_STATE_FREERUN | RefInput::Clk0.disable_bit() | RefInput::Clk1.disable_bit(),
            SYN_MODE,
        ),
        SynthMode::JitterAttenuator => (RefInput::Clk1.disable_bit(), 0),
    };
    [
        RegisterOp::Update {
            addr: DPLL_CTRL,
            value: state,
            mask: DPLL_STATE_MASK | RefInput::Clk0.disable_bit() | RefInput::Clk1.disable_bit(),
        },
        RegisterOp::Update { addr: APLL_CTRL, value: syn_mode, mask: SYN_MODE },
    ]
}


/// Upper bound on the length of a rate change sequence
pub const SEQUENCE_CAPACITY: usize = 48;

/// Register programming sequence
pub type Sequence = heapless::Vec<RegisterOp, SEQUENCE_CAPACITY>;

/// Full rate change: calibration held off, references disabled, mode,
/// dividers and monitors, calibration released.
pub fn settings_sequence(s: &SynthesizerSettings) -> Sequence {
    let mut seq = Sequence::new();
    // capacity covers every op below
    seq.extend(
        core::iter::once(RegisterOp::Write { addr: CALIBRATION, value: CALIBRATION_HOLD })
            .chain(INPUTS.iter().map(|&i| ref_input_op(i, false)))
            .chain(mode_ops(s.mode))
            .chain(INPUTS.iter().zip(&s.input_paths).flat_map(|(&i, p)| PreDivider(i, p.prescaler).writes()))
            .chain(INPUTS.iter().zip(&s.input_paths).flat_map(|(&i, p)| M1Feedback(i, p.feedback_mult).writes()))
            .chain(DsmInt(s.feedback.integer_part as u32).writes())
            .chain(DsmFrac(s.feedback.fractional_part).writes())
            .chain(OUTPUTS.iter().zip(&s.output_fractions).flat_map(|(&o, f)| OutputDivInt(o, f.n_integer).writes()))
            .chain(OUTPUTS.iter().zip(&s.output_fractions).flat_map(|(&o, f)| OutputDivFrac(o, f.n_fraction).writes()))
            .chain(INPUTS.iter().flat_map(|&i| LosThreshold(i, s.los_threshold).writes()))
            .chain(core::iter::once(RegisterOp::Write { addr: CALIBRATION, value: CALIBRATION_RUN })),
    );
    seq
}


/// Power-on configuration from address 0x0000: jitter attenuator mode,
/// 148.5 MHz on Q2/Q3 from a 148.5 MHz CLK0.
pub static DEFAULT_CONFIG: [u8; 132] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE, 0xEF, 0x00, 0x03, 0x00, 0x20, 0x00,
    0x04, 0x89, 0x00, 0x00, 0x01, 0x00, 0x63, 0xC6, 0x07, 0x00, 0x00, 0x77,
    0x6D, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0x01,
    0x3F, 0x00, 0x28, 0x00, 0x1A, 0xCC, 0xCD, 0x00, 0x01, 0x00, 0x00, 0xD0,
    0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x08, 0x00, 0x00, 0x0C, 0x00, 0x00,
    0x00, 0x44, 0x44, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x0B,
    0x00, 0x00, 0x0B, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x89, 0x02, 0x2B, 0x20,
    0x00, 0x00, 0x00, 0x03, 0x00, 0x00, 0x00, 0x06, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x27, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// First `DEFAULT_CONFIG` address written, below are read-only ID registers
pub const DEFAULT_CONFIG_START: u16 = 0x0008;

/// Writes `DEFAULT_CONFIG` with calibration held off.
/// The calibration register itself is only written to release calibration.
pub fn init_sequence() -> impl Iterator<Item = RegisterOp> {
    let table = DEFAULT_CONFIG
        .iter()
        .enumerate()
        .skip(DEFAULT_CONFIG_START as usize)
        .map(|(addr, &value)| RegisterOp::Write { addr: addr as u16, value })
        .filter(|op| op.addr() != CALIBRATION);

    core::iter::once(RegisterOp::Write { addr: CALIBRATION, value: CALIBRATION_HOLD })
        .chain(table)
        .chain(core::iter::once(RegisterOp::Write { addr: CALIBRATION, value: CALIBRATION_RUN }))
}

/// Route loss-of-lock to the GPIO pins
pub const LOL_GPIO_ENABLE: [RegisterOp; 4] = [
    RegisterOp::Write { addr: 0x0030, value: 0x0F },
    RegisterOp::Write { addr: 0x0034, value: 0x00 },
    RegisterOp::Write { addr: 0x0035, value: 0x00 },
    RegisterOp::Write { addr: 0x0036, value: 0x0F },
];


#[cfg(test)]
use proptest::prelude::*;

#[cfg(test)]
proptest! {
    #[test]
    fn field_bytes_reassemble(v in 0u32..1 << 28) {
        let ops: heapless::Vec<RegisterOp, 4> = OutputDivFrac(Output::Q2, v).writes().collect();
        prop_assert_eq!(ops.len(), 4);
        let mut acc = 0u32;
        for (i, op) in ops.iter().enumerate() {
            match *op {
                RegisterOp::Write { addr, value } => {
                    prop_assert_eq!(addr, 0x005b + i as u16);
                    acc = (acc << 8) | value as u32;
                }
                _ => prop_assert!(false),
            }
        }
        prop_assert_eq!(acc, v);
    }

    #[test]
    fn check_matches_width(v in 0u64..1 << 20) {
        prop_assert_eq!(LosThreshold::check(v).is_ok(), v < 1 << 17);
        prop_assert_eq!(PreDivider::check(v).is_ok(), true);
    }
}
