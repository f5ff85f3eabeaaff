//! Deterministic gas metering for the phases of an operation.

/// The gas limit of a phase is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("out of gas: required {required}, remaining {remaining}")]
pub struct OutOfGas {
    /// The gas the failed charge asked for.
    pub required: u64,
    /// The gas left before the charge.
    pub remaining: u64,
}

/// Counts gas against a fixed limit.
///
/// A failed charge consumes the whole remaining budget, like an exceptional halt in the EVM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasMeter {
    limit: u64,
    used: u64,
}

impl GasMeter {
    /// Creates a meter with the given limit. Limits above `u64::MAX` are clamped.
    pub fn new(limit: u128) -> Self {
        Self { limit: u64::try_from(limit).unwrap_or(u64::MAX), used: 0 }
    }

    /// Charges `gas`, failing once the limit would be exceeded.
    pub fn charge(&mut self, gas: u64) -> Result<(), OutOfGas> {
        let remaining = self.remaining();
        if gas > remaining {
            self.used = self.limit;
            return Err(OutOfGas { required: gas, remaining });
        }
        self.used += gas;
        Ok(())
    }

    /// Returns the gas limit.
    pub const fn limit(&self) -> u64 {
        self.limit
    }

    /// Returns the gas used so far.
    pub const fn used(&self) -> u64 {
        self.used
    }

    /// Returns the gas left.
    pub const fn remaining(&self) -> u64 {
        self.limit - self.used
    }
}
