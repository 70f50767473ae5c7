//! Errors

/// Frequency planning errors.
///
/// All of these are deterministic functions of the request, retrying the same
/// request yields the same error.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    /// Input or output frequency outside of the device limits
    #[error("frequency out of range: in {freq_in} Hz, out {freq_out} Hz")]
    OutOfRange { freq_in: u32, freq_out: u32 },

    /// No output divider keeps the VCO inside its band
    #[error("no feasible output divider")]
    NoFeasibleDivider,

    /// Pre-divider search ran into the M1 / PFD limits without a candidate
    #[error("input pre-divider search exhausted")]
    PrescalerSearchExhausted,

    /// Computed value does not fit its register field
    #[error("{field} value {value} does not fit its register field")]
    FieldOverflow { field: &'static str, value: u64 },
}

/// Driver errors, `E` is the bus error type.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error<E> {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error("I2C transfer failed")]
    Transport(E),
}
