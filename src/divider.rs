///! Output divider search
///!
///! Q outputs divide the VCO by a coarse stage (NS1: 1, 4, 5 or 6) followed by a
///! fine stage (NS2: bypassed, or an even divide by `2 * fine`).

use crate::{config::ChipProfile, errors::*, fixed::Fixed};


/// NS1 coarse output divider
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CoarseDivider {
    /// Divide-by-1, only with the output stage bypass allowed
    Div1,
    Div4,
    Div5,
    Div6,
}

impl CoarseDivider {
    /// Search order, `Div1` first
    pub const ALL: [CoarseDivider; 4] = [
        CoarseDivider::Div1,
        CoarseDivider::Div4,
        CoarseDivider::Div5,
        CoarseDivider::Div6,
    ];

    pub fn ratio(self) -> u32 {
        match self {
            CoarseDivider::Div1 => 1,
            CoarseDivider::Div4 => 4,
            CoarseDivider::Div5 => 5,
            CoarseDivider::Div6 => 6,
        }
    }

    /// NS1 register encoding
    pub fn bits(self) -> u8 {
        match self {
            CoarseDivider::Div5 => 0,
            CoarseDivider::Div6 => 1,
            CoarseDivider::Div4 => 2,
            CoarseDivider::Div1 => 3,
        }
    }

    /// Coarse ratios the search may use
    pub fn active(bypass: bool) -> &'static [CoarseDivider] {
        if bypass {
            &Self::ALL
        } else {
            &[CoarseDivider::Div4, CoarseDivider::Div5, CoarseDivider::Div6]
        }
    }

    /// True if `composite` splits into this ratio and a bypassed or even fine stage.
    fn splits(self, composite: u32) -> bool {
        let r = self.ratio();
        composite == r || composite % (2 * r) == 0
    }
}


/// Enumerates composite output dividers that keep the VCO inside its band.
#[derive(Debug, Copy, Clone)]
pub struct OutputDividerSearch {
    freq_out: u32,
    fvco_min: u64,
    fvco_max: u64,
    coarse: &'static [CoarseDivider],
    /// Fine stage range, `0` is the bypass
    fine_min: u32,
    fine_max: u32,
}

impl OutputDividerSearch {
    pub fn new(profile: &ChipProfile, freq_out: u32, bypass: bool) -> Self {
        let f = freq_out as u64;
        // ceil(FVCO_MIN / f_out), floor(FVCO_MAX / f_out)
        let outdiv_min = ((profile.fvco_min + f - 1) / f) as u32;
        let outdiv_max = (profile.fvco_max / f) as u32;

        let coarse = CoarseDivider::active(bypass);

        let (fine_min, fine_max) = if coarse
            .iter()
            .any(|c| c.ratio() == outdiv_min || c.ratio() == outdiv_max)
        {
            (0, 0)
        } else {
            let widest = CoarseDivider::Div6.ratio();
            let q = outdiv_min / widest;
            let fine_min = q / 2 + q % 2;
            let fine_max = (outdiv_max / coarse[0].ratio() / 2).max(1);
            (fine_min, fine_max)
        };

        OutputDividerSearch {
            freq_out,
            fvco_min: profile.fvco_min,
            fvco_max: profile.fvco_max,
            coarse,
            fine_min,
            fine_max,
        }
    }

    /// Fine stage range searched, inclusive
    pub fn fine_range(&self) -> (u32, u32) {
        (self.fine_min, self.fine_max)
    }

    /// Valid composite dividers in (fine, coarse) order.
    /// Different splits of the same divider are all yielded.
    pub fn candidates(&self) -> impl Iterator<Item = u32> + '_ {
        (self.fine_min..=self.fine_max)
            .flat_map(move |fine| {
                self.coarse.iter().map(move |c| {
                    if fine == 0 {
                        c.ratio()
                    } else {
                        c.ratio() * fine * 2
                    }
                })
            })
            .filter(move |&div| {
                let vco = self.freq_out as u64 * div as u64;
                (self.fvco_min..=self.fvco_max).contains(&vco)
            })
    }
}


/// Chosen composite divider and the VCO frequency it implies
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct VcoPlan {
    pub composite_divider: u32,
    pub vco_freq: u64,
}

impl VcoPlan {
    /// Largest composite divider, i.e. highest VCO frequency in band.
    pub fn search(profile: &ChipProfile, freq_out: u32, bypass: bool) -> Result<Self, PlanError> {
        let composite_divider = OutputDividerSearch::new(profile, freq_out, bypass)
            .candidates()
            .max()
            .ok_or(PlanError::NoFeasibleDivider)?;

        Ok(VcoPlan {
            composite_divider,
            vco_freq: freq_out as u64 * composite_divider as u64,
        })
    }
}


/// NS1 / NS2 split of a composite divider
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct OutputDividerFields {
    pub coarse_sel: CoarseDivider,
    /// `0` bypasses the fine stage, otherwise it divides by `2 * fine_div`
    pub fine_div: u32,
}

impl OutputDividerFields {
    /// Split `composite` into coarse and fine stages.
    ///
    /// Coarse ratios are tried 1 (bypass only), 4, 5, 6; the last one that
    /// splits wins.
    pub fn decompose(composite: u32, bypass: bool) -> Result<Self, PlanError> {
        let coarse_sel = *CoarseDivider::active(bypass)
            .iter()
            .rev()
            .find(|c| c.splits(composite))
            .ok_or(PlanError::NoFeasibleDivider)?;

        Ok(OutputDividerFields {
            coarse_sel,
            fine_div: composite / coarse_sel.ratio() / 2,
        })
    }

    /// Composite divider these fields realize
    pub fn composite(self: &Self) -> u32 {
        let fine = if self.fine_div == 0 { 1 } else { self.fine_div * 2 };
        self.coarse_sel.ratio() * fine
    }
}


/// Fractional output divider (N_Q / NFRAC_Q) for Q1..Q3
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct OutputFraction {
    pub n_integer: u32,
    /// 28 bit fraction
    pub n_fraction: u32,
}

impl OutputFraction {
    pub const FRAC_BITS: u32 = 28;

    /// Odd dividers program `(c + 1) / 2` with a half fraction,
    /// even ones `c / 2` with none.
    pub fn from_divider(composite: u32) -> Self {
        if composite & 1 == 1 {
            OutputFraction {
                n_integer: (composite + 1) >> 1,
                n_fraction: Fixed::<{ OutputFraction::FRAC_BITS }>::HALF,
            }
        } else {
            OutputFraction {
                n_integer: composite >> 1,
                n_fraction: 0,
            }
        }
    }
}


#[cfg(test)]
use proptest::prelude::*;

#[cfg(test)]
proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn candidates_stay_in_band(freq_out in 8_000u32..=400_000_000, bypass in any::<bool>()) {
        let profile = ChipProfile::IDT_8T49N24X;
        for div in OutputDividerSearch::new(&profile, freq_out, bypass).candidates() {
            let vco = freq_out as u64 * div as u64;
            prop_assert!(vco >= profile.fvco_min && vco <= profile.fvco_max);
        }
    }

    #[test]
    fn decomposition_is_consistent(freq_out in 8_000u32..=400_000_000, bypass in any::<bool>()) {
        let profile = ChipProfile::IDT_8T49N24X;
        if let Ok(vco) = VcoPlan::search(&profile, freq_out, bypass) {
            let fields = OutputDividerFields::decompose(vco.composite_divider, bypass).unwrap();
            prop_assert_eq!(fields.composite(), vco.composite_divider);
            if !bypass {
                prop_assert_ne!(fields.coarse_sel, CoarseDivider::Div1);
            }
        }
    }

    #[test]
    fn odd_even_fraction(c in 1u32..1 << 20) {
        let f = OutputFraction::from_divider(c);
        if c % 2 == 0 {
            prop_assert_eq!(f.n_fraction, 0);
            prop_assert_eq!(f.n_integer * 2, c);
        } else {
            prop_assert_eq!(f.n_fraction, 1 << 27);
            prop_assert_eq!(f.n_integer * 2, c + 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hdmi_148_5() {
        let profile = ChipProfile::IDT_8T49N24X;
        let search = OutputDividerSearch::new(&profile, 148_500_000, false);
        // outdiv 21..=26: fine from ceil(floor(21/6)/2) = 2 to floor(26/4/2) = 3
        assert_eq!(search.fine_range(), (2, 3));

        let candidates: Vec<u32> = search.candidates().collect();
        // 6*2*2 and 4*3*2, both kept
        assert_eq!(candidates, [24, 24]);
        assert!(!candidates.contains(&20));
        assert!(!candidates.contains(&30));

        let vco = VcoPlan::search(&profile, 148_500_000, false).unwrap();
        assert_eq!(vco, VcoPlan { composite_divider: 24, vco_freq: 3_564_000_000 });

        // divide-by-4 and divide-by-6 both split 24, divide-by-6 is checked last
        let fields = OutputDividerFields::decompose(24, false).unwrap();
        assert_eq!(fields, OutputDividerFields { coarse_sel: CoarseDivider::Div6, fine_div: 2 });
        assert_eq!(fields.coarse_sel.bits(), 1);
    }

    #[test]
    fn fine_stage_bypass() {
        let profile = ChipProfile::IDT_8T49N24X;
        // outdiv 4..=5 lands on the coarse ratios themselves
        let search = OutputDividerSearch::new(&profile, 780_000_000, false);
        assert_eq!(search.fine_range(), (0, 0));
        let candidates: Vec<u32> = search.candidates().collect();
        assert_eq!(candidates, [4, 5]);

        let fields = OutputDividerFields::decompose(5, false).unwrap();
        assert_eq!(fields, OutputDividerFields { coarse_sel: CoarseDivider::Div5, fine_div: 0 });
        assert_eq!(fields.composite(), 5);
    }

    #[test]
    fn bypass_allows_div1() {
        let fields = OutputDividerFields::decompose(14, true).unwrap();
        assert_eq!(fields, OutputDividerFields { coarse_sel: CoarseDivider::Div1, fine_div: 7 });
        assert!(OutputDividerFields::decompose(14, false).is_err());
        assert_eq!(
            OutputDividerFields::decompose(1, true).unwrap(),
            OutputDividerFields { coarse_sel: CoarseDivider::Div1, fine_div: 0 }
        );
    }

    #[test]
    fn priority_order() {
        // 120 splits by 4, 5 and 6
        let f = OutputDividerFields::decompose(120, false).unwrap();
        assert_eq!((f.coarse_sel, f.fine_div), (CoarseDivider::Div6, 10));
        // 40 splits by 4 and 5
        let f = OutputDividerFields::decompose(40, false).unwrap();
        assert_eq!((f.coarse_sel, f.fine_div), (CoarseDivider::Div5, 4));
        assert_eq!(OutputDividerFields::decompose(7, false), Err(PlanError::NoFeasibleDivider));
    }

    #[test]
    fn no_divider_in_band() {
        let profile = ChipProfile::IDT_8T49N24X;
        // VCO band is 3..4 GHz, 1.1 GHz has no divider at all
        assert_eq!(
            VcoPlan::search(&profile, 1_100_000_000, false),
            Err(PlanError::NoFeasibleDivider)
        );
    }

    #[test]
    fn fraction_values() {
        assert_eq!(OutputFraction::from_divider(24), OutputFraction { n_integer: 12, n_fraction: 0 });
        assert_eq!(
            OutputFraction::from_divider(5),
            OutputFraction { n_integer: 3, n_fraction: 134_217_728 }
        );
    }
}
