//! Constants

use crate::config::ChipProfile;

/// Crystal frequency on the reference board, Hz
pub const XTAL_FREQ: u32 = 40_000_000;

/// Fundamental VCO mode, min frequency
pub const FVCO_MIN: u64 = 3_000_000_000;

/// Fundamental VCO mode, max frequency
pub const FVCO_MAX: u64 = 4_000_000_000;

/// Minimum allowed output frequency
pub const FOUT_MIN: u32 = 8_000;

/// Maximum allowed output frequency
pub const FOUT_MAX: u32 = 400_000_000;

/// Minimum allowed CLK0/CLK1 input frequency
pub const FIN_MIN: u32 = 8_000;

/// Maximum allowed CLK0/CLK1 input frequency
pub const FIN_MAX: u32 = 875_000_000;

/// Min Phase Detector Frequency (lower loop)
pub const FPD_MIN: u32 = 8_000;

/// Max Phase Detector Frequency (lower loop)
pub const FPD_MAX: u32 = 128_000;

/// Upper bound of the input pre-divider search, 2^22
pub const P_MAX: u32 = 1 << 22;

/// Upper bound (exclusive) of the M1 feedback multiplier, 2^24
pub const M_MAX: u32 = 1 << 24;

/// Loss-of-signal monitor never goes below this many VCO/8 cycles
pub const LOS_MIN: u32 = 6;

/// Default 7-bit I2C address (ADDR pins strapped low)
pub const I2C_ADDRESS: u8 = 0x7c;

impl ChipProfile {
    /// 8T49N241/8T49N242 limits with a 40 MHz crystal
    pub const IDT_8T49N24X: ChipProfile = ChipProfile {
        xtal_hz: XTAL_FREQ,
        fvco_min: FVCO_MIN,
        fvco_max: FVCO_MAX,
        fout_min: FOUT_MIN,
        fout_max: FOUT_MAX,
        fin_min: FIN_MIN,
        fin_max: FIN_MAX,
        fpd_min: FPD_MIN,
        fpd_max: FPD_MAX,
        p_max: P_MAX,
        m_max: M_MAX,
    };
}
