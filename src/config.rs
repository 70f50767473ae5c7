///! Chip profile, frequency requests and board configuration

use serde::{Deserialize, Serialize};

use crate::constants::*;


/// Absolute device limits the planner honors, Hz unless noted otherwise.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChipProfile {
    /// Crystal feeding the upper loop
    pub xtal_hz: u32,
    pub fvco_min: u64,
    pub fvco_max: u64,
    pub fout_min: u32,
    pub fout_max: u32,
    pub fin_min: u32,
    pub fin_max: u32,
    pub fpd_min: u32,
    pub fpd_max: u32,
    /// Pre-divider search bound, inclusive
    pub p_max: u32,
    /// M1 multiplier bound, exclusive
    pub m_max: u32,
}

impl Default for ChipProfile {
    fn default() -> Self {
        ChipProfile::IDT_8T49N24X
    }
}


/// Digital / analog PLL operating mode
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SynthMode {
    /// Force FREERUN, both reference inputs disabled, analog PLL in synthesizer mode.
    FreeRun,
    /// Track CLK0 automatically, CLK1 disabled, analog PLL in jitter attenuator mode.
    JitterAttenuator,
}

impl From<bool> for SynthMode {
    /// `true` selects the free running synthesizer
    fn from(synthesizer: bool) -> Self {
        if synthesizer {
            SynthMode::FreeRun
        } else {
            SynthMode::JitterAttenuator
        }
    }
}


/// One rate change request
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct FrequencyRequest {
    /// Reference input frequency
    pub freq_in: u32,
    /// Requested output frequency
    pub freq_out: u32,
    /// Allow the divide-by-1 coarse output stage
    pub bypass_output_stage: bool,
    pub mode: SynthMode,
}

impl FrequencyRequest {
    /// Synthesizer mode request, output stage bypass disabled.
    pub fn new(freq_in: u32, freq_out: u32) -> Self {
        FrequencyRequest {
            freq_in,
            freq_out,
            bypass_output_stage: false,
            mode: SynthMode::FreeRun,
        }
    }

    pub fn bypass(self, bypass_output_stage: bool) -> Self {
        FrequencyRequest { bypass_output_stage, ..self }
    }

    pub fn mode(self, mode: SynthMode) -> Self {
        FrequencyRequest { mode, ..self }
    }
}


/// Per-board settings, usually deserialized from the board description.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    /// 7-bit I2C address
    pub address: u8,
    /// Crystal frequency, overrides the chip profile
    pub xtal_hz: u32,
    /// Output frequency to program at probe time
    pub clock_frequency: Option<u32>,
    /// Extra attempts per register write
    pub retries: u8,
}

impl Default for BoardConfig {
    fn default() -> Self {
        BoardConfig {
            address: I2C_ADDRESS,
            xtal_hz: XTAL_FREQ,
            clock_frequency: None,
            retries: 0,
        }
    }
}

impl BoardConfig {
    /// Chip limits with this board's crystal
    pub fn profile(self: &Self) -> ChipProfile {
        ChipProfile { xtal_hz: self.xtal_hz, ..ChipProfile::IDT_8T49N24X }
    }
}
