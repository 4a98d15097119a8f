// State transitions of the pool.
//
// Every mutating operation takes the current state by reference and returns a complete new state.
// Nothing is written back on failure, so a rejected operation leaves the caller's state untouched.

use borsh::BorshDeserialize;
use tracing::{debug, info, warn};

use crate::{
    amp_gamma::{AmpGamma, AmpT, CurveParams, GammaT, TimestampT},
    error::PoolError,
    fixed_point::{self, ONE, U256},
    instruction::PoolInstruction,
    invariant::{AmountT, Invariant},
    pool_fee::PoolFees,
    price_scale::{PriceScaleOracle, PriceT},
    state::{PoolConfig, PoolState},
};

//trades with fewer raw units than this on either side leave no price signal of their own
const MIN_PRICE_SIGNAL_AMOUNT: u64 = 100_000;
//marginal prices are probed with this fraction of the normalized base balance
const MARGINAL_PRICE_PROBE_DIVISOR: u64 = 1_000_000;

struct SwapOutcome<const TOKEN_COUNT: usize> {
    output_amount: AmountT,
    fee_amount: AmountT,
    balances: [AmountT; TOKEN_COUNT],
    depth_before: AmountT,
    params: CurveParams,
}

pub struct Processor<const TOKEN_COUNT: usize>;
impl<const TOKEN_COUNT: usize> Processor<TOKEN_COUNT> {
    pub fn process(
        state: &PoolState<TOKEN_COUNT>,
        instruction_data: &[u8],
        current_ts: TimestampT,
    ) -> Result<PoolState<TOKEN_COUNT>, PoolError> {
        let instruction =
            PoolInstruction::try_from_slice(instruction_data).map_err(|_| PoolError::InvalidInstruction)?;

        match instruction {
            PoolInstruction::Swap {
                input_index,
                output_index,
                input_amount,
                minimum_output_amount,
            } => Self::swap(
                state,
                input_index as usize,
                output_index as usize,
                input_amount.into(),
                minimum_output_amount.into(),
                current_ts,
            )
            .map(|(new_state, _)| new_state),

            PoolInstruction::RampAGamma {
                future_a,
                future_gamma,
                future_ts,
            } => Self::ramp_a_gamma(state, future_a, future_gamma, future_ts, current_ts),

            PoolInstruction::StopRampAGamma => Ok(Self::stop_ramp_a_gamma(state, current_ts)),
        }
    }

    /// Creates a pool holding `balances` (raw amounts), with `initial_prices` of tokens
    /// 1..TOKEN_COUNT in units of token 0 as the initial price scale.
    pub fn init(
        config: &PoolConfig<TOKEN_COUNT>,
        balances: [AmountT; TOKEN_COUNT],
        initial_prices: &[PriceT],
        current_ts: TimestampT,
    ) -> Result<PoolState<TOKEN_COUNT>, PoolError> {
        config.validate()?;
        if balances.iter().any(|balance| balance.is_zero()) {
            return Err(PoolError::ZeroBalance);
        }
        let amp_gamma = AmpGamma::new(config.a, config.gamma)?;
        let pool_fees = PoolFees::new(config.mid_fee, config.out_fee, config.fee_gamma)?;
        let oracle = PriceScaleOracle::new(
            initial_prices,
            config.price_threshold.into(),
            config.adjustment_step.into(),
            config.ma_half_time,
            current_ts,
        )?;
        let params = amp_gamma.get(current_ts);

        let mut state = PoolState {
            version: 0,
            balances,
            precisions: config.precisions()?,
            depth: AmountT::zero(),
            depth_params: params,
            amp_gamma,
            pool_fees,
            oracle,
            last_update_ts: current_ts,
        };
        let xp = state.normalized_balances()?;
        state.depth = Invariant::<TOKEN_COUNT>::solve_d(params.amp(), params.gamma(), &xp)?;
        if !Invariant::<TOKEN_COUNT>::is_safe(&xp, state.depth) {
            warn!(?xp, depth = %state.depth, "pool initialized outside of the safety band");
        }

        info!(?balances, depth = %state.depth, a = config.a, gamma = config.gamma, "pool initialized");
        Ok(state)
    }

    /// Output amount (raw, after fees) and fee (raw, in the output token) of a swap, without
    /// committing anything.
    pub fn quote(
        state: &PoolState<TOKEN_COUNT>,
        input_index: usize,
        output_index: usize,
        input_amount: AmountT,
        current_ts: TimestampT,
    ) -> Result<(AmountT, AmountT), PoolError> {
        let outcome = Self::compute_swap(state, input_index, output_index, input_amount, current_ts)?;
        debug!(
            input_index,
            output_index,
            %input_amount,
            output_amount = %outcome.output_amount,
            fee_amount = %outcome.fee_amount,
            "quote"
        );
        Ok((outcome.output_amount, outcome.fee_amount))
    }

    pub fn swap(
        state: &PoolState<TOKEN_COUNT>,
        input_index: usize,
        output_index: usize,
        input_amount: AmountT,
        minimum_output_amount: AmountT,
        current_ts: TimestampT,
    ) -> Result<(PoolState<TOKEN_COUNT>, AmountT), PoolError> {
        let outcome = Self::compute_swap(state, input_index, output_index, input_amount, current_ts)?;
        if outcome.output_amount < minimum_output_amount {
            debug!(
                output_amount = %outcome.output_amount,
                %minimum_output_amount,
                "swap rejected: slippage"
            );
            return Err(PoolError::Slippage);
        }

        let params = outcome.params;
        let mut new_state = *state;
        new_state.balances = outcome.balances;
        let xp = new_state.normalized_balances()?;
        let depth_after = Invariant::<TOKEN_COUNT>::solve_d(params.amp(), params.gamma(), &xp)?;
        Invariant::<TOKEN_COUNT>::check_no_loss(outcome.depth_before, depth_after)?;
        if !Invariant::<TOKEN_COUNT>::is_safe(&xp, depth_after) {
            warn!(?xp, depth = %depth_after, "swap leaves the safety band");
        }
        new_state.depth = depth_after;
        new_state.depth_params = params;

        //the average absorbs the previous signal before it gets overwritten
        new_state.oracle.tick(current_ts)?;
        match Self::trade_price(
            state,
            input_index,
            output_index,
            input_amount,
            outcome.output_amount,
        )? {
            Some((index, price)) => new_state.oracle.record_price(index, price)?,
            None => Self::record_marginal_prices(&mut new_state.oracle, params, &xp, depth_after)?,
        }
        Self::repeg(&mut new_state, params)?;

        new_state.version += 1;
        new_state.last_update_ts = current_ts;
        debug!(
            input_index,
            output_index,
            %input_amount,
            output_amount = %outcome.output_amount,
            fee_amount = %outcome.fee_amount,
            depth = %new_state.depth,
            version = new_state.version,
            "swap"
        );
        Ok((new_state, outcome.output_amount))
    }

    /// `future_a` is given as A * N^N.
    pub fn ramp_a_gamma(
        state: &PoolState<TOKEN_COUNT>,
        future_a: AmpT,
        future_gamma: GammaT,
        future_ts: TimestampT,
        current_ts: TimestampT,
    ) -> Result<PoolState<TOKEN_COUNT>, PoolError> {
        let mut new_state = *state;
        new_state
            .amp_gamma
            .set_target(current_ts, future_a, future_gamma, future_ts)?;
        new_state.version += 1;
        new_state.last_update_ts = current_ts;
        Ok(new_state)
    }

    pub fn stop_ramp_a_gamma(state: &PoolState<TOKEN_COUNT>, current_ts: TimestampT) -> PoolState<TOKEN_COUNT> {
        let mut new_state = *state;
        new_state.amp_gamma.stop_adjustment(current_ts);
        new_state.version += 1;
        new_state.last_update_ts = current_ts;
        new_state
    }

    fn compute_swap(
        state: &PoolState<TOKEN_COUNT>,
        input_index: usize,
        output_index: usize,
        input_amount: AmountT,
        current_ts: TimestampT,
    ) -> Result<SwapOutcome<TOKEN_COUNT>, PoolError> {
        if input_index == output_index || input_index >= TOKEN_COUNT || output_index >= TOKEN_COUNT {
            return Err(PoolError::InvalidIndex);
        }
        if input_amount.is_zero() {
            return Err(PoolError::ZeroAmount);
        }

        let params = state.amp_gamma.get(current_ts);
        let depth_before = Self::current_depth(state, params)?;

        let mut balances = state.balances;
        balances[input_index] = balances[input_index]
            .checked_add(input_amount)
            .ok_or(PoolError::MathOverflow)?;
        let mut xp = state.normalize(&balances)?;

        let output_balance =
            Invariant::<TOKEN_COUNT>::solve_balance(params.amp(), params.gamma(), &xp, depth_before, output_index)?;
        //the extra unit taken off keeps truncation on the pool's side
        let normalized_output = xp[output_index]
            .checked_sub(output_balance)
            .and_then(|output| output.checked_sub(U256::one()))
            .filter(|output| !output.is_zero())
            .ok_or(PoolError::Convergence)?;
        xp[output_index] = output_balance;

        let gross_output = state.oracle.denormalize(output_index, normalized_output)? / state.precisions[output_index];
        let fee_amount = PoolFees::apply(state.pool_fees.fee(&xp)?, gross_output);
        let output_amount = gross_output - fee_amount;
        if output_amount.is_zero() {
            return Err(PoolError::Convergence);
        }
        balances[output_index] = balances[output_index]
            .checked_sub(output_amount)
            .ok_or(PoolError::Convergence)?;

        Ok(SwapOutcome {
            output_amount,
            fee_amount,
            balances,
            depth_before,
            params,
        })
    }

    //the stored depth is only valid for the (A, gamma) it was computed with
    fn current_depth(state: &PoolState<TOKEN_COUNT>, params: CurveParams) -> Result<AmountT, PoolError> {
        if params == state.depth_params {
            return Ok(state.depth);
        }
        debug!(?params, stored = ?state.depth_params, "recomputing depth for changed A/gamma");
        Invariant::<TOKEN_COUNT>::solve_d(params.amp(), params.gamma(), &state.normalized_balances()?)
    }

    /// Price (in units of token 0) implied by a trade, and which token it prices.
    fn trade_price(
        state: &PoolState<TOKEN_COUNT>,
        input_index: usize,
        output_index: usize,
        input_amount: AmountT,
        output_amount: AmountT,
    ) -> Result<Option<(usize, PriceT)>, PoolError> {
        let threshold = U256::from(MIN_PRICE_SIGNAL_AMOUNT);
        if input_amount <= threshold || output_amount <= threshold {
            return Ok(None);
        }
        let dx = input_amount
            .checked_mul(state.precisions[input_index])
            .ok_or(PoolError::MathOverflow)?;
        let dy = output_amount
            .checked_mul(state.precisions[output_index])
            .ok_or(PoolError::MathOverflow)?;
        let overflow = || PoolError::MathOverflow;

        let (index, price) = if input_index == 0 {
            (output_index, fixed_point::mul_div(dx, ONE, dy).ok_or_else(overflow)?)
        } else if output_index == 0 {
            (input_index, fixed_point::mul_div(dy, ONE, dx).ok_or_else(overflow)?)
        } else {
            let input_price = state.oracle.last_prices()[input_index];
            (output_index, fixed_point::mul_div(input_price, dx, dy).ok_or_else(overflow)?)
        };
        if price.is_zero() {
            return Ok(None);
        }
        Ok(Some((index, price)))
    }

    /// Prices every token by probing the curve with a tiny trade out of token 0.
    fn record_marginal_prices(
        oracle: &mut PriceScaleOracle<TOKEN_COUNT>,
        params: CurveParams,
        xp: &[AmountT; TOKEN_COUNT],
        depth: AmountT,
    ) -> Result<(), PoolError> {
        let probe_amount = xp[0] / MARGINAL_PRICE_PROBE_DIVISOR;
        let mut probe = *xp;
        probe[0] += probe_amount;
        for k in 1..TOKEN_COUNT {
            let balance = Invariant::<TOKEN_COUNT>::solve_balance(params.amp(), params.gamma(), &probe, depth, k)?;
            let output = xp[k]
                .checked_sub(balance)
                .filter(|output| !output.is_zero())
                .ok_or(PoolError::Convergence)?;
            let price = fixed_point::mul_div(oracle.price_scale()[k], probe_amount, output)
                .ok_or(PoolError::MathOverflow)?;
            oracle.record_price(k, price)?;
        }
        Ok(())
    }

    /// Moves the price scale toward the oracle if they have drifted apart, as long as the re-pegged
    /// balances still lie within the safety band.
    fn repeg(state: &mut PoolState<TOKEN_COUNT>, params: CurveParams) -> Result<(), PoolError> {
        let price_scale = match state.oracle.propose_repeg()? {
            Some(price_scale) => price_scale,
            None => return Ok(()),
        };
        let scaled = state.scale_by_precision(&state.balances)?;
        let xp = PriceScaleOracle::normalize_with(&price_scale, &scaled)?;
        let depth = Invariant::<TOKEN_COUNT>::solve_d(params.amp(), params.gamma(), &xp)?;
        if !Invariant::<TOKEN_COUNT>::is_safe(&xp, depth) {
            warn!(?price_scale, ?xp, %depth, "re-peg skipped: balances would leave the safety band");
            return Ok(());
        }
        state.oracle.set_price_scale(price_scale);
        state.depth = depth;
        Ok(())
    }
}
