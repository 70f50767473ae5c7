///! Frequency calculations

use log::debug;

use crate::{
    config::*,
    divider::*,
    errors::*,
    fixed::Fixed,
    register::{DsmFrac, DsmInt, Field, LosThreshold, M1Feedback, OutputDivInt, PreDivider},
};


impl ChipProfile {
    /// Rejects requests outside of the input and output frequency limits.
    pub fn validate(self: &Self, request: &FrequencyRequest) -> Result<(), PlanError> {
        if !(self.fin_min..=self.fin_max).contains(&request.freq_in)
            || !(self.fout_min..=self.fout_max).contains(&request.freq_out)
        {
            Err(PlanError::OutOfRange {
                freq_in: request.freq_in,
                freq_out: request.freq_out,
            })
        } else {
            Ok(())
        }
    }
}


/// Upper loop feedback divider (DSM_INT / DSM_FRAC)
/// f VCO = 2 × f XTAL × (DSM_INT + DSM_FRAC / 2^21)
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct FeedbackSettings {
    /// 9 bit integer part
    pub integer_part: u16,
    /// 21 bit fraction
    pub fractional_part: u32,
}

impl FeedbackSettings {
    pub const FRAC_BITS: u32 = 21;

    /// Feedback divider reproducing `vco_freq` from the doubled crystal.
    pub fn plan(vco_freq: u64, xtal_hz: u32) -> Result<Self, PlanError> {
        let ratio = Fixed::<{ FeedbackSettings::FRAC_BITS }>::from_ratio(vco_freq, 2 * xtal_hz as u64)
            .ok_or(PlanError::FieldOverflow { field: DsmFrac::NAME, value: vco_freq })?;

        Ok(FeedbackSettings {
            integer_part: DsmInt::check(ratio.integer())? as u16,
            fractional_part: DsmFrac::check(ratio.fraction() as u64)?,
        })
    }

    /// VCO frequency these settings lock to, Hz
    pub fn vco_hz(self: &Self, xtal_hz: u32) -> Option<u64> {
        Fixed::<{ FeedbackSettings::FRAC_BITS }>::new(self.integer_part as u64, self.fractional_part)
            .map(|f| f.mul_floor(2 * xtal_hz as u64))
    }
}


/// Lower loop input path: CLKx / PRE at the phase detector, times M1
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct InputPathPlan {
    pub prescaler: u32,
    pub feedback_mult: u32,
    /// Deviation of M1/PRE from f VCO / f IN, scaled as
    /// `(f_vco * p - m * f_in) * 10^6 / (p * f_in / 1000)`
    pub error_ppm: i64,
}

impl InputPathPlan {
    /// Rounded multiplier for pre-divider `p` and its ratio error.
    pub fn evaluate(vco_freq: u64, freq_in: u32, p: u64) -> (u64, i64) {
        let fin = freq_in as u64;
        let m = (vco_freq * p + (fin >> 1)) / fin;
        let diff = (vco_freq * p) as i64 - (m * fin) as i64;
        let error = diff * 1_000_000 / (p * fin / 1000) as i64;
        (m, error)
    }

    /// Walks the pre-divider upwards from the largest phase detector frequency,
    /// keeping the pair with the smallest absolute error.
    /// Stops at the first exact match or once M1 runs out of range.
    pub fn search(profile: &ChipProfile, freq_in: u32, vco_freq: u64) -> Result<Self, PlanError> {
        let fin = freq_in as u64;
        let fpd_max = profile.fpd_max as u64;
        let p_min = ((fin + fpd_max - 1) / fpd_max).max(1);
        let p_max = fin
            .checked_div(profile.fpd_min as u64)
            .unwrap_or(u64::MAX)
            .min(profile.p_max as u64);

        let mut best: Option<InputPathPlan> = None;
        for p in p_min..=p_max {
            let (m, error_ppm) = Self::evaluate(vco_freq, freq_in, p);
            if m >= profile.m_max as u64 {
                break;
            }
            if best.map_or(true, |b| error_ppm.abs() < b.error_ppm.abs()) {
                best = Some(InputPathPlan {
                    prescaler: p as u32,
                    feedback_mult: m as u32,
                    error_ppm,
                });
                if error_ppm == 0 {
                    break;
                }
            }
        }

        best.ok_or(PlanError::PrescalerSearchExhausted)
    }
}


/// Loss-of-signal monitor threshold for CLKx
pub fn los_threshold(vco_freq: u64, freq_in: u32) -> u64 {
    (vco_freq / 8 / freq_in as u64 + 3).max(crate::constants::LOS_MIN as u64)
}


/// Everything a rate change programs.
/// Q2/Q3 and CLK0/CLK1 get identical values.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SynthesizerSettings {
    pub mode: SynthMode,
    pub vco: VcoPlan,
    /// NS1 / NS2, integer-only Q0 divider
    pub dividers: OutputDividerFields,
    pub feedback: FeedbackSettings,
    /// Indexed like `register::OUTPUTS`
    pub output_fractions: [OutputFraction; 2],
    /// Indexed like `register::INPUTS`
    pub input_paths: [InputPathPlan; 2],
    /// 17 bit
    pub los_threshold: u32,
}

impl SynthesizerSettings {
    /// Actual VCO frequency from the feedback divider
    pub fn vco_hz(self: &Self, xtal_hz: u32) -> Option<u64> {
        self.feedback.vco_hz(xtal_hz)
    }

    /// Actual output frequency
    pub fn f_out_hz(self: &Self, xtal_hz: u32) -> Option<u64> {
        Some(self.vco_hz(xtal_hz)? / self.vco.composite_divider as u64)
    }
}


/// Computes all divider settings for `request`. Pure, no I/O.
pub fn plan(profile: &ChipProfile, request: &FrequencyRequest) -> Result<SynthesizerSettings, PlanError> {
    profile.validate(request)?;

    let bypass = request.bypass_output_stage;
    let vco = VcoPlan::search(profile, request.freq_out, bypass)?;
    let dividers = OutputDividerFields::decompose(vco.composite_divider, bypass)?;

    let feedback = FeedbackSettings::plan(vco.vco_freq, profile.xtal_hz)?;

    let fraction = OutputFraction::from_divider(vco.composite_divider);
    OutputDivInt::check(fraction.n_integer as u64)?;

    let input = InputPathPlan::search(profile, request.freq_in, vco.vco_freq)?;
    PreDivider::check(input.prescaler as u64)?;
    M1Feedback::check(input.feedback_mult as u64)?;

    let los_threshold = LosThreshold::check(los_threshold(vco.vco_freq, request.freq_in))?;

    debug!(
        "plan {} -> {} Hz: vco {} Hz, div {}, dsm {}+{}/2^21, pre {} m1 {} ({}), los {}",
        request.freq_in,
        request.freq_out,
        vco.vco_freq,
        vco.composite_divider,
        feedback.integer_part,
        feedback.fractional_part,
        input.prescaler,
        input.feedback_mult,
        input.error_ppm,
        los_threshold,
    );

    Ok(SynthesizerSettings {
        mode: request.mode,
        vco,
        dividers,
        feedback,
        output_fractions: [fraction; 2],
        input_paths: [input; 2],
        los_threshold,
    })
}


#[cfg(test)]
use proptest::prelude::*;

#[cfg(test)]
proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn accepted_plans_hold(freq_in in 8_000u32..=875_000_000, freq_out in 8_000u32..=400_000_000) {
        let profile = ChipProfile::IDT_8T49N24X;
        let request = FrequencyRequest::new(freq_in, freq_out);
        if let Ok(s) = plan(&profile, &request) {
            // VCO in band
            prop_assert!(s.vco.vco_freq >= profile.fvco_min && s.vco.vco_freq <= profile.fvco_max);
            // dividers consistent
            prop_assert_eq!(s.dividers.composite(), s.vco.composite_divider);
            // feedback within one LSB:
            // |(int*2^21 + frac) * 2 f_xtal - f_vco * 2^21| <= 2 f_xtal
            let den = 2 * profile.xtal_hz as i128;
            let bits = ((s.feedback.integer_part as i128) << 21) + s.feedback.fractional_part as i128;
            prop_assert!((bits * den - ((s.vco.vco_freq as i128) << 21)).abs() <= den);
            // same request, same settings
            prop_assert_eq!(plan(&profile, &request), Ok(s));
        }
    }

    #[test]
    fn input_search_is_minimal(freq_in in 8_000u32..=2_000_000, vco in 3_000_000_000u64..=4_000_000_000) {
        let profile = ChipProfile::IDT_8T49N24X;
        let best = InputPathPlan::search(&profile, freq_in, vco).unwrap();
        let fin = freq_in as u64;
        let p_min = ((fin + 127_999) / 128_000).max(1);
        for p in p_min..best.prescaler as u64 {
            let (_, error) = InputPathPlan::evaluate(vco, freq_in, p);
            prop_assert!(error.abs() >= best.error_ppm.abs());
            // halts at the first exact match
            prop_assert_ne!(error, 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::*;

    #[test]
    fn hdmi_148_5_from_crystal() {
        let profile = ChipProfile::IDT_8T49N24X;
        let s = plan(&profile, &FrequencyRequest::new(XTAL_FREQ, 148_500_000)).unwrap();

        assert_eq!(s.vco, VcoPlan { composite_divider: 24, vco_freq: 3_564_000_000 });
        assert_eq!(s.dividers, OutputDividerFields { coarse_sel: CoarseDivider::Div6, fine_div: 2 });
        // 3.564 GHz / 80 MHz = 44.55
        assert_eq!(s.feedback, FeedbackSettings { integer_part: 44, fractional_part: 1_153_434 });
        assert_eq!(s.output_fractions, [OutputFraction { n_integer: 12, n_fraction: 0 }; 2]);
        // 89.1 = 28512 / 320, first exact ratio above p = 313
        assert_eq!(
            s.input_paths,
            [InputPathPlan { prescaler: 320, feedback_mult: 28_512, error_ppm: 0 }; 2]
        );
        assert_eq!(s.los_threshold, 14);
        assert_eq!(s.mode, SynthMode::FreeRun);

        assert_eq!(s.f_out_hz(XTAL_FREQ), Some(148_500_000));
        let vco = s.vco_hz(XTAL_FREQ).unwrap();
        assert!(vco >= 3_564_000_000 && vco - 3_564_000_000 < 40);
    }

    #[test]
    fn rejection_boundaries() {
        let profile = ChipProfile::IDT_8T49N24X;
        assert_eq!(
            plan(&profile, &FrequencyRequest::new(FIN_MIN - 1, 148_500_000)),
            Err(PlanError::OutOfRange { freq_in: FIN_MIN - 1, freq_out: 148_500_000 })
        );
        assert_eq!(
            plan(&profile, &FrequencyRequest::new(XTAL_FREQ, FOUT_MAX + 1)),
            Err(PlanError::OutOfRange { freq_in: XTAL_FREQ, freq_out: FOUT_MAX + 1 })
        );
        assert!(profile.validate(&FrequencyRequest::new(FIN_MAX, FOUT_MIN)).is_ok());
        assert!(profile.validate(&FrequencyRequest::new(FIN_MIN, FOUT_MAX)).is_ok());
    }

    #[test]
    fn exhausted_prescaler_search() {
        let profile = ChipProfile { m_max: 1000, ..ChipProfile::IDT_8T49N24X };
        assert_eq!(
            InputPathPlan::search(&profile, XTAL_FREQ, 3_564_000_000),
            Err(PlanError::PrescalerSearchExhausted)
        );
        assert_eq!(
            plan(&profile, &FrequencyRequest::new(XTAL_FREQ, 148_500_000)),
            Err(PlanError::PrescalerSearchExhausted)
        );
    }

    #[test]
    fn inexact_search_keeps_best() {
        let profile = ChipProfile::IDT_8T49N24X;
        // 3.6 GHz from 9 kHz: single pre-divider, 400000 exactly
        let s = InputPathPlan::search(&profile, 9_000, 3_600_000_000).unwrap();
        assert_eq!(s, InputPathPlan { prescaler: 1, feedback_mult: 400_000, error_ppm: 0 });

        // 3 GHz + 1 Hz is coprime to 27 MHz, no pre-divider is exact
        let s = InputPathPlan::search(&profile, 27_000_000, 3_000_000_001).unwrap();
        assert!(s.prescaler >= 211 && s.prescaler <= 3375);
        let (m, e) = InputPathPlan::evaluate(3_000_000_001, 27_000_000, s.prescaler as u64);
        assert_eq!((m as u32, e), (s.feedback_mult, s.error_ppm));
    }

    #[test]
    fn feedback_overflow() {
        // 9 bit integer part holds at most 511
        assert_eq!(
            FeedbackSettings::plan(4_000_000_000, 1_000_000),
            Err(PlanError::FieldOverflow { field: "DsmInt", value: 2000 })
        );
        assert!(FeedbackSettings::plan(3_000_000_000, 0).is_err());
    }

    #[test]
    fn los_floor() {
        assert_eq!(los_threshold(3_000_000_000, 875_000_000), 6);
        assert_eq!(los_threshold(3_564_000_000, 40_000_000), 14);
        assert_eq!(los_threshold(4_000_000_000, 8_000), 62_503);
    }

    #[test]
    fn jitter_attenuator_request() {
        let profile = ChipProfile::IDT_8T49N24X;
        let request = FrequencyRequest::new(148_500_000, 297_000_000).mode(SynthMode::JitterAttenuator);
        let s = plan(&profile, &request).unwrap();
        assert_eq!(s.mode, SynthMode::JitterAttenuator);
        // 297 MHz: outdiv 11..=13, only 6 * 1 * 2
        assert_eq!(s.vco.composite_divider, 12);
        assert_eq!(s.dividers, OutputDividerFields { coarse_sel: CoarseDivider::Div6, fine_div: 1 });
    }
}
