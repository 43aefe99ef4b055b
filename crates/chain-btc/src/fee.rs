//! Fee-rate model and transaction size estimation.
//!
//! Sizes are tracked in weight units and rounded up to virtual bytes once per
//! transaction, so mixed input kinds price correctly.

use std::str::FromStr;

use crate::error::BtcError;

/// Weight of a P2SH-P2WPKH input: 32+4+4 outpoint/sequence, 24 byte scriptSig,
/// ~108 byte witness.
pub const NESTED_SEGWIT_INPUT_WEIGHT: u64 = 364;

/// Weight of a key-path P2TR input with a 64 byte Schnorr signature.
pub const TAPROOT_INPUT_WEIGHT: u64 = 230;

/// Weight of a native P2WPKH input.
pub const NATIVE_SEGWIT_INPUT_WEIGHT: u64 = 272;

/// Weight of a P2PKH input with a compressed key.
pub const LEGACY_INPUT_WEIGHT: u64 = 592;

/// Version, locktime, in/out counts and the segwit marker + flag.
pub const TX_OVERHEAD_WEIGHT: u64 = 42;

/// Weight of a P2WPKH output, used when the destination script is unknown.
pub const DEFAULT_OUTPUT_WEIGHT: u64 = 124;

/// Spending shape of an input, as far as size estimation cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputKind {
    NestedSegwit,
    Taproot,
    NativeSegwit,
    Legacy,
}

impl InputKind {
    pub fn weight(self) -> u64 {
        match self {
            InputKind::NestedSegwit => NESTED_SEGWIT_INPUT_WEIGHT,
            InputKind::Taproot => TAPROOT_INPUT_WEIGHT,
            InputKind::NativeSegwit => NATIVE_SEGWIT_INPUT_WEIGHT,
            InputKind::Legacy => LEGACY_INPUT_WEIGHT,
        }
    }
}

/// Weight of an output paying to a scriptPubKey of `script_len` bytes.
pub fn output_weight(script_len: usize) -> u64 {
    // value (8) + compact-size length (1 for any standard script) + script
    (8 + 1 + script_len as u64) * 4
}

/// Estimate the virtual size of a transaction, rounded up to whole vbytes.
pub fn estimate_vsize(inputs: &[InputKind], output_weights: &[u64]) -> u64 {
    let weight = TX_OVERHEAD_WEIGHT
        + inputs.iter().map(|k| k.weight()).sum::<u64>()
        + output_weights.iter().sum::<u64>();
    weight.div_ceil(4)
}

/// Estimate the absolute fee for the given inputs and outputs.
pub fn estimate_fee(inputs: &[InputKind], output_weights: &[u64], rate: FeeRate) -> u64 {
    rate.fee_for_vsize(estimate_vsize(inputs, output_weights))
}

/// Milli-satoshis per satoshi.
const MSAT_PER_SAT: u64 = 1_000;

/// A fee rate, held as whole milli-satoshis per virtual byte so that fee
/// arithmetic stays exact for decimal rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FeeRate(u64);

impl FeeRate {
    /// Build a fee rate from milli-satoshis per vbyte, rejecting zero.
    pub fn from_msat_per_vb(msat: u64) -> Result<Self, BtcError> {
        if msat == 0 {
            return Err(BtcError::InvalidFeeRate(
                "fee rate must be a positive number, got 0".into(),
            ));
        }
        Ok(FeeRate(msat))
    }

    /// Build a fee rate from a float estimate, rounded to the nearest
    /// milli-satoshi. Rejects zero, negative and non-finite values.
    pub fn from_sat_per_vb(rate: f64) -> Result<Self, BtcError> {
        let msat = rate * MSAT_PER_SAT as f64;
        if !msat.is_finite() || msat <= 0.0 || msat >= u64::MAX as f64 {
            return Err(BtcError::InvalidFeeRate(format!(
                "fee rate must be a positive number, got {rate}"
            )));
        }
        FeeRate::from_msat_per_vb(msat.round() as u64)
    }

    /// Whole sat/vB rate for constants; an invalid value fails at compile time.
    pub const fn from_sat_per_vb_const(sat: u64) -> Self {
        assert!(sat > 0 && sat <= u64::MAX / MSAT_PER_SAT, "fee rate out of range");
        FeeRate(sat * MSAT_PER_SAT)
    }

    pub fn msat_per_vb(self) -> u64 {
        self.0
    }

    pub fn sat_per_vb(self) -> f64 {
        self.0 as f64 / MSAT_PER_SAT as f64
    }

    /// Fee for a transaction of `vsize` vbytes, rounded up to the next satoshi.
    pub fn fee_for_vsize(self, vsize: u64) -> u64 {
        let msat = u128::from(vsize) * u128::from(self.0);
        let sat = msat.div_ceil(u128::from(MSAT_PER_SAT));
        u64::try_from(sat).unwrap_or(u64::MAX)
    }
}

impl FromStr for FeeRate {
    type Err = BtcError;

    /// Parses a plain decimal sat/vB string without going through `f64`.
    /// Digits past the third decimal round the rate up.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || BtcError::InvalidFeeRate(format!("not a number: {s:?}"));
        let trimmed = s.trim();
        let (whole, frac) = trimmed.split_once('.').unwrap_or((trimmed, ""));
        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if (whole.is_empty() && frac.is_empty()) || !all_digits(whole) || !all_digits(frac) {
            return Err(invalid());
        }

        let whole: u64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let (head, tail) = frac.split_at(frac.len().min(3));
        let mut milli: u64 = format!("{head:0<3}").parse().map_err(|_| invalid())?;
        if tail.bytes().any(|b| b != b'0') {
            milli += 1;
        }

        let msat = whole
            .checked_mul(MSAT_PER_SAT)
            .and_then(|m| m.checked_add(milli))
            .ok_or_else(invalid)?;
        FeeRate::from_msat_per_vb(msat)
    }
}

impl std::fmt::Display for FeeRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (whole, milli) = (self.0 / MSAT_PER_SAT, self.0 % MSAT_PER_SAT);
        if milli == 0 {
            write!(f, "{whole} sat/vB")
        } else {
            let frac = format!("{milli:03}");
            write!(f, "{whole}.{} sat/vB", frac.trim_end_matches('0'))
        }
    }
}

/// Which of the network's fee tiers to pay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeeTier {
    Slow,
    #[default]
    Regular,
    Fast,
}

impl FromStr for FeeTier {
    type Err = BtcError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "slow" => Ok(FeeTier::Slow),
            "regular" => Ok(FeeTier::Regular),
            "fast" => Ok(FeeTier::Fast),
            other => Err(BtcError::InvalidFeeRate(format!("unknown fee tier: {other}"))),
        }
    }
}

/// Tiered fee-rate estimate as reported by the network.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeRateTiers {
    pub slow: FeeRate,
    pub regular: FeeRate,
    pub fast: FeeRate,
}

impl FeeRateTiers {
    pub fn get(&self, tier: FeeTier) -> FeeRate {
        match tier {
            FeeTier::Slow => self.slow,
            FeeTier::Regular => self.regular,
            FeeTier::Fast => self.fast,
        }
    }
}

/// The fee rate handed to reconciliation: a caller override wins over the
/// fetched tiers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeeRateChoice {
    Override(FeeRate),
    Tiers(FeeRateTiers),
}

impl FeeRateChoice {
    pub fn resolve(&self, tier: FeeTier) -> FeeRate {
        match self {
            FeeRateChoice::Override(rate) => *rate,
            FeeRateChoice::Tiers(tiers) => tiers.get(tier),
        }
    }
}
