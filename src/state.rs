use borsh::{BorshDeserialize, BorshSerialize};

use crate::{
    amp_gamma::{AmpGamma, AmpT, CurveParams, GammaT, TimestampT},
    common::create_result_array,
    error::PoolError,
    fixed_point::{self, U256},
    invariant::AmountT,
    pool_fee::{FeeT, PoolFees},
    price_scale::{PriceScaleOracle, PriceT},
};

pub const MAX_DECIMALS: u8 = 18;

/// Parameters a pool is created with.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig<const TOKEN_COUNT: usize> {
    //A * N^N
    pub a: AmpT,
    pub gamma: GammaT,
    //in units of 1/FEE_DENOMINATOR
    pub mid_fee: FeeT,
    pub out_fee: FeeT,
    pub fee_gamma: u128,
    pub price_threshold: u128,
    pub adjustment_step: u128,
    pub ma_half_time: TimestampT,
    pub decimals: [u8; TOKEN_COUNT],
}

impl<const TOKEN_COUNT: usize> Default for PoolConfig<TOKEN_COUNT> {
    fn default() -> Self {
        Self {
            a: 135 * 27,
            gamma: 69_999_999_999_999,
            mid_fee: 4_000_000,
            out_fee: 40_000_000,
            fee_gamma: 10_000_000_000_000_000,
            price_threshold: 2_800_000_000_000_000,
            adjustment_step: 1_500_000_000_000_000,
            ma_half_time: 600,
            decimals: [MAX_DECIMALS; TOKEN_COUNT],
        }
    }
}

impl<const TOKEN_COUNT: usize> PoolConfig<TOKEN_COUNT> {
    /// Checks everything that isn't already checked by the constructors of the individual components.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.decimals.iter().any(|&decimals| decimals > MAX_DECIMALS) {
            return Err(PoolError::InvalidDecimals);
        }
        //price_threshold (1e18) has to exceed mid_fee (1e10)
        if U256::from(self.price_threshold) <= U256::from(self.mid_fee) * 100_000_000u64 {
            return Err(PoolError::InvalidOracleParameter);
        }
        Ok(())
    }

    /// 10^(18 - decimals) per token, i.e. what raw amounts are multiplied by to get 1e18 based values.
    pub fn precisions(&self) -> Result<[AmountT; TOKEN_COUNT], PoolError> {
        create_result_array(|i| {
            MAX_DECIMALS
                .checked_sub(self.decimals[i])
                .map(fixed_point::ten_to_the)
                .ok_or(PoolError::InvalidDecimals)
        })
    }
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolState<const TOKEN_COUNT: usize> {
    //incremented with every committed transition
    pub version: u64,
    //raw token amounts
    pub balances: [AmountT; TOKEN_COUNT],
    pub precisions: [AmountT; TOKEN_COUNT],
    pub depth: AmountT,
    //(A, gamma) that depth was computed with
    pub depth_params: CurveParams,
    pub amp_gamma: AmpGamma,
    pub pool_fees: PoolFees,
    pub oracle: PriceScaleOracle<TOKEN_COUNT>,
    pub last_update_ts: TimestampT,
}

impl<const TOKEN_COUNT: usize> PoolState<TOKEN_COUNT> {
    /// Raw amounts multiplied by their precisions, still in their own units.
    pub fn scale_by_precision(&self, amounts: &[AmountT; TOKEN_COUNT]) -> Result<[AmountT; TOKEN_COUNT], PoolError> {
        create_result_array(|i| amounts[i].checked_mul(self.precisions[i]).ok_or(PoolError::MathOverflow))
    }

    /// Raw amounts converted to units of token 0 (1e18 based), as the invariant sees them.
    pub fn normalize(&self, amounts: &[AmountT; TOKEN_COUNT]) -> Result<[AmountT; TOKEN_COUNT], PoolError> {
        self.oracle.normalize(&self.scale_by_precision(amounts)?)
    }

    pub fn normalized_balances(&self) -> Result<[AmountT; TOKEN_COUNT], PoolError> {
        self.normalize(&self.balances)
    }

    /// (A precise, gamma) in effect at `current_ts`, where A precise is A * N^N * A_MULTIPLIER.
    ///
    /// Integer A would lose up to one unit mid-ramp, see `AmpGamma::a`.
    pub fn get_a_gamma(&self, current_ts: TimestampT) -> (AmpT, GammaT) {
        let params = self.amp_gamma.get(current_ts);
        (params.a_precise, params.gamma)
    }

    pub fn get_d(&self) -> AmountT {
        self.depth
    }

    pub fn get_price_scale(&self) -> &[PriceT; TOKEN_COUNT] {
        self.oracle.price_scale()
    }

    pub fn price_oracle(&self, current_ts: TimestampT) -> Result<[PriceT; TOKEN_COUNT], PoolError> {
        self.oracle.price_oracle(current_ts)
    }

    pub fn last_prices(&self) -> &[PriceT; TOKEN_COUNT] {
        self.oracle.last_prices()
    }

    pub fn balances(&self) -> &[AmountT; TOKEN_COUNT] {
        &self.balances
    }

    pub fn version(&self) -> u64 {
        self.version
    }
}
