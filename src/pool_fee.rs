//naming: pool_fee to distinguish from the fee paid to whatever host executes the pool

use borsh::{BorshDeserialize, BorshSerialize};
use rust_decimal::{prelude::ToPrimitive, Decimal};

use crate::{
    error::PoolError,
    fixed_point::{ONE, U256},
    invariant::{AmountT, Invariant, InvariantResult},
};

//fee rates are stored with a resolution of 10^-10
pub const FEE_DECIMALS: u32 = 10;
pub const FEE_DENOMINATOR: u64 = 10_000_000_000;
//0.5 basis points
pub const MIN_FEE: u64 = 500_000;
pub const MAX_FEE: u64 = FEE_DENOMINATOR;
const FEE_GAMMA_DECIMALS: u32 = 18;

pub type FeeT = u64;

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolFees {
    //invariant: MIN_FEE <= mid_fee <= out_fee <= MAX_FEE
    mid_fee: FeeT,
    out_fee: FeeT,
    //0 < fee_gamma <= 1e18
    fee_gamma: u128,
}

fn decimal_to_fixed(value: Decimal, decimals: u32) -> Result<u128, PoolError> {
    if value.is_sign_negative() {
        return Err(PoolError::InvalidFeeInput);
    }
    let scaled = value * Decimal::from(10u64.pow(decimals));
    if scaled.fract() != Decimal::ZERO {
        //digits beyond what we can represent internally have to be zero
        return Err(PoolError::InvalidFeeInput);
    }
    scaled.to_u128().ok_or(PoolError::InvalidFeeInput)
}

impl PoolFees {
    /// mid_fee/out_fee in units of 1/FEE_DENOMINATOR, fee_gamma in 1e18 fixed point.
    pub fn new(mid_fee: FeeT, out_fee: FeeT, fee_gamma: u128) -> Result<Self, PoolError> {
        if mid_fee < MIN_FEE || mid_fee > out_fee || out_fee > MAX_FEE {
            return Err(PoolError::InvalidFeeInput);
        }
        if fee_gamma == 0 || fee_gamma > ONE.as_u128() {
            return Err(PoolError::InvalidFeeInput);
        }
        Ok(Self {
            mid_fee,
            out_fee,
            fee_gamma,
        })
    }

    /// e.g. `from_decimals(dec!(0.0004), dec!(0.004), dec!(0.01))`
    pub fn from_decimals(mid_fee: Decimal, out_fee: Decimal, fee_gamma: Decimal) -> Result<Self, PoolError> {
        let to_fee = |value| -> Result<FeeT, PoolError> {
            let fee = decimal_to_fixed(value, FEE_DECIMALS)?;
            if fee > MAX_FEE as u128 {
                return Err(PoolError::InvalidFeeInput);
            }
            Ok(fee as FeeT)
        };
        Self::new(
            to_fee(mid_fee)?,
            to_fee(out_fee)?,
            decimal_to_fixed(fee_gamma, FEE_GAMMA_DECIMALS)?,
        )
    }

    pub fn mid_fee(&self) -> FeeT {
        self.mid_fee
    }

    pub fn out_fee(&self) -> FeeT {
        self.out_fee
    }

    pub fn fee_gamma(&self) -> u128 {
        self.fee_gamma
    }

    /// Fee rate (in units of 1/FEE_DENOMINATOR) for the given normalized balances: mid_fee when
    /// perfectly balanced, approaching out_fee the more imbalanced they are.
    pub fn fee<const TOKEN_COUNT: usize>(&self, balances: &[AmountT; TOKEN_COUNT]) -> InvariantResult<U256> {
        let f = Invariant::<TOKEN_COUNT>::reduction_coefficient(balances, U256::from(self.fee_gamma))?;
        Ok((U256::from(self.mid_fee) * f + U256::from(self.out_fee) * (ONE - f)) / ONE)
    }

    pub fn apply(fee_rate: U256, amount: AmountT) -> AmountT {
        fee_rate * amount / FEE_DENOMINATOR
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn default_fees() -> PoolFees {
        PoolFees::from_decimals(dec!(0.0004), dec!(0.004), dec!(0.01)).unwrap()
    }

    #[test]
    fn from_decimals() {
        let fees = default_fees();
        assert_eq!(fees.mid_fee(), 4_000_000);
        assert_eq!(fees.out_fee(), 40_000_000);
        assert_eq!(fees.fee_gamma(), 10_000_000_000_000_000);
    }

    #[test]
    fn invalid_fees() {
        //below minimum
        assert_eq!(PoolFees::new(MIN_FEE - 1, 40_000_000, 1), Err(PoolError::InvalidFeeInput));
        //mid above out
        assert_eq!(PoolFees::new(50_000_000, 40_000_000, 1), Err(PoolError::InvalidFeeInput));
        //100 % or more
        assert_eq!(PoolFees::new(MIN_FEE, MAX_FEE + 1, 1), Err(PoolError::InvalidFeeInput));
        assert_eq!(PoolFees::new(MIN_FEE, MIN_FEE, 0), Err(PoolError::InvalidFeeInput));
        //finer than representable
        assert_eq!(
            PoolFees::from_decimals(dec!(0.00040000000001), dec!(0.004), dec!(0.01)),
            Err(PoolError::InvalidFeeInput)
        );
        assert_eq!(
            PoolFees::from_decimals(dec!(-0.0004), dec!(0.004), dec!(0.01)),
            Err(PoolError::InvalidFeeInput)
        );
    }

    #[test]
    fn balanced_pays_mid_fee() {
        let fees = default_fees();
        let balances = [ONE * 1000; 3];
        assert_eq!(fees.fee(&balances).unwrap(), U256::from(fees.mid_fee()));
    }

    #[test]
    fn fee_rises_with_imbalance() {
        let fees = default_fees();
        let slightly = fees.fee(&[ONE * 1000, ONE * 900, ONE * 1100]).unwrap();
        let heavily = fees.fee(&[ONE * 1000, ONE * 100, ONE * 3000]).unwrap();
        assert!(slightly > U256::from(fees.mid_fee()));
        assert!(heavily > slightly);
        assert!(heavily <= U256::from(fees.out_fee()));
    }

    #[test]
    fn fee_gamma_controls_sharpness() {
        let balances = [ONE * 1000, ONE * 900, ONE * 1100];
        let sharp = PoolFees::from_decimals(dec!(0.0004), dec!(0.004), dec!(0.001)).unwrap();
        let wide = PoolFees::from_decimals(dec!(0.0004), dec!(0.004), dec!(0.1)).unwrap();
        assert!(sharp.fee(&balances).unwrap() > wide.fee(&balances).unwrap());
    }

    #[test]
    fn apply_fee() {
        //0.04 % of 1e18
        assert_eq!(PoolFees::apply(4_000_000.into(), ONE), U256::from(400_000_000_000_000u64));
    }
}
