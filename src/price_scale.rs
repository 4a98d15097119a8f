// Price scale and its oracle.
//
// All price arrays hold one entry per token, priced in units of token 0 (the base asset), so entry 0
// is always exactly 1e18 and is never touched.
//
// The oracle is an exponential moving average of the price signal left behind by trades. The price
// scale (which the invariant uses to normalize balances) only moves toward the oracle once the two
// have drifted apart by more than price_threshold, and then by at most adjustment_step per update.

use borsh::{BorshDeserialize, BorshSerialize};
use tracing::{debug, info};

use crate::{
    amp_gamma::TimestampT,
    common::create_result_array,
    error::PoolError,
    fixed_point::{self, halfpow, AbsDiff, ONE, U256},
    invariant::AmountT,
};

pub type PriceT = U256;

//longest allowed half time of the moving average
pub const MAX_MA_HALF_TIME: TimestampT = 7 * 24 * 60 * 60;

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceScaleOracle<const TOKEN_COUNT: usize> {
    price_scale: [PriceT; TOKEN_COUNT],
    price_oracle: [PriceT; TOKEN_COUNT],
    last_prices: [PriceT; TOKEN_COUNT],
    last_prices_ts: TimestampT,
    //all three 1e18 fixed point
    price_threshold: U256,
    adjustment_step: U256,
    ma_half_time: TimestampT,
}

impl<const TOKEN_COUNT: usize> PriceScaleOracle<TOKEN_COUNT> {
    /// `initial_prices` are the prices of tokens 1..TOKEN_COUNT in units of token 0.
    pub fn new(
        initial_prices: &[PriceT],
        price_threshold: U256,
        adjustment_step: U256,
        ma_half_time: TimestampT,
        current_ts: TimestampT,
    ) -> Result<Self, PoolError> {
        if initial_prices.len() != TOKEN_COUNT - 1 || initial_prices.iter().any(|price| price.is_zero()) {
            return Err(PoolError::InvalidPriceInput);
        }
        if ma_half_time == 0
            || ma_half_time > MAX_MA_HALF_TIME
            || price_threshold.is_zero()
            || price_threshold > ONE
            || adjustment_step > ONE
        {
            return Err(PoolError::InvalidOracleParameter);
        }

        let mut prices = [ONE; TOKEN_COUNT];
        prices[1..].copy_from_slice(initial_prices);
        Ok(Self {
            price_scale: prices,
            price_oracle: prices,
            last_prices: prices,
            last_prices_ts: current_ts,
            price_threshold,
            adjustment_step,
            ma_half_time,
        })
    }

    pub fn price_scale(&self) -> &[PriceT; TOKEN_COUNT] {
        &self.price_scale
    }

    pub fn last_prices(&self) -> &[PriceT; TOKEN_COUNT] {
        &self.last_prices
    }

    pub fn last_prices_ts(&self) -> TimestampT {
        self.last_prices_ts
    }

    /// The moving average as it will be once `current_ts` is reached (without a new price signal).
    pub fn price_oracle(&self, current_ts: TimestampT) -> Result<[PriceT; TOKEN_COUNT], PoolError> {
        let mut projected = *self;
        projected.tick(current_ts)?;
        Ok(projected.price_oracle)
    }

    /// Folds the last price signal into the moving average for the time passed since it was recorded.
    pub fn tick(&mut self, current_ts: TimestampT) -> Result<(), PoolError> {
        if current_ts <= self.last_prices_ts {
            return Ok(());
        }
        let elapsed = U256::from(current_ts - self.last_prices_ts);
        let alpha = halfpow(elapsed * ONE / self.ma_half_time)?;
        for k in 1..TOKEN_COUNT {
            self.price_oracle[k] = (self.last_prices[k] * (ONE - alpha) + self.price_oracle[k] * alpha) / ONE;
        }
        self.last_prices_ts = current_ts;
        Ok(())
    }

    pub fn record_price(&mut self, index: usize, price: PriceT) -> Result<(), PoolError> {
        if index == 0 || index >= TOKEN_COUNT {
            return Err(PoolError::InvalidIndex);
        }
        if price.is_zero() {
            return Err(PoolError::InvalidPriceInput);
        }
        self.last_prices[index] = price;
        Ok(())
    }

    /// Distance between oracle and price scale: sqrt(sum_k (oracle_k / scale_k - 1)^2)
    pub fn deviation(&self) -> Result<U256, PoolError> {
        let mut sum_of_squares = U256::zero();
        for k in 1..TOKEN_COUNT {
            let ratio = fixed_point::div_fp(self.price_oracle[k], self.price_scale[k]).ok_or(PoolError::MathOverflow)?;
            let deviation = ratio.abs_diff(ONE);
            sum_of_squares += fixed_point::mul_fp(deviation, deviation).ok_or(PoolError::MathOverflow)?;
        }
        fixed_point::sqrt_fp(sum_of_squares)
    }

    /// New price scale if the oracle has drifted far enough away from the current one.
    ///
    /// Moves every price toward the oracle along the same relative path, by at most
    /// adjustment_step (in terms of deviation) and never beyond the oracle itself.
    pub fn propose_repeg(&self) -> Result<Option<[PriceT; TOKEN_COUNT]>, PoolError> {
        let norm = self.deviation()?;
        if norm <= self.price_threshold {
            return Ok(None);
        }
        let step = std::cmp::min(self.adjustment_step, norm);
        let proposed = create_result_array(|k| {
            if k == 0 {
                return Ok(ONE);
            }
            let moved = self.price_scale[k] * (norm - step) + step * self.price_oracle[k];
            Ok(moved / norm)
        })?;
        debug!(%norm, %step, ?proposed, "price scale re-peg proposed");
        Ok(Some(proposed))
    }

    pub fn set_price_scale(&mut self, price_scale: [PriceT; TOKEN_COUNT]) {
        info!(old = ?self.price_scale, new = ?price_scale, "price scale updated");
        self.price_scale = price_scale;
    }

    /// Converts raw token amounts (already multiplied by their precisions) into units of token 0.
    pub fn normalize(&self, amounts: &[AmountT; TOKEN_COUNT]) -> Result<[AmountT; TOKEN_COUNT], PoolError> {
        Self::normalize_with(&self.price_scale, amounts)
    }

    pub fn normalize_with(
        price_scale: &[PriceT; TOKEN_COUNT],
        amounts: &[AmountT; TOKEN_COUNT],
    ) -> Result<[AmountT; TOKEN_COUNT], PoolError> {
        create_result_array(|k| fixed_point::mul_fp(amounts[k], price_scale[k]).ok_or(PoolError::MathOverflow))
    }

    /// Inverse of normalize for a single token.
    pub fn denormalize(&self, index: usize, amount: AmountT) -> Result<AmountT, PoolError> {
        fixed_point::div_fp(amount, self.price_scale[index]).ok_or(PoolError::MathOverflow)
    }
}
