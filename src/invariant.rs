// Invariant of the crypto pool (a "cryptoswap" curve): a stableswap curve whose amplification is
// itself reduced by K0, a measure of how evenly the balances are distributed. Close to balance the curve
// behaves like stableswap (flat), far away from balance it degrades to constant product.
//
//   K0 = N^N * prod(x) / D^N
//   K  = A * K0 * gamma^2 / (gamma + 1 - K0)^2
//   K * D^(N-1) * sum(x) + prod(x) = K * D^N + (D/N)^N
//
// All values are 1e18 fixed point. A is passed as "A precise", i.e. A * N^N * A_MULTIPLIER.
//
// Both directions of the equation are solved with Newton's method. Neither solver retries or falls
// back to a default: if the iteration doesn't settle within MAX_ITERATIONS (or an intermediate value
// becomes meaningless) the result is a PoolError::Convergence which the caller has to treat as a
// rejection of the operation that required it. Extremely imbalanced pools are supposed to fail here.

use crate::{
    amp_gamma::A_MULTIPLIER,
    common::sorted_descending,
    error::PoolError,
    fixed_point::{self, AbsDiff, MAX_ITERATIONS, ONE, U256},
};
use tracing::{debug, warn};

pub type InvariantResult<T> = Result<T, PoolError>;
pub type AmountT = U256;

//normalized balance to D ratio (in 1e18) outside of which solver results aren't trusted
pub const MIN_XD: U256 = U256::const_from(10u128.pow(16));
pub const MAX_XD: U256 = U256::const_from(10u128.pow(20));

//maximal relative decrease of D that a trade may cause: 2 * (D0 - D1) / (D0 + D1) < 5e-5
pub const NOLOSS_TOLERANCE: U256 = U256::const_from(5 * 10u128.pow(13));

//inside the iterations an unrepresentable value means we've diverged
fn muldiv(a: U256, b: U256, denominator: U256) -> InvariantResult<U256> {
    fixed_point::mul_div(a, b, denominator).ok_or(PoolError::Convergence)
}

fn sum_balances<const TOKEN_COUNT: usize>(balances: &[AmountT; TOKEN_COUNT]) -> AmountT {
    balances.iter().fold(AmountT::zero(), |acc, &balance| acc + balance)
}

// |gamma + 1 - K0| + 1 (the +1 keeps it away from zero)
fn g1k0(gamma: U256, k0: U256) -> U256 {
    (gamma + ONE).abs_diff(k0) + 1
}

// D / (A * N^N) * g1k0^2 / gamma^2
fn mul1(amp: U256, gamma: U256, d: U256, g1k0: U256) -> InvariantResult<U256> {
    let t = muldiv(ONE, d, gamma)?;
    let t = muldiv(t, g1k0, gamma)?;
    muldiv(t, g1k0 * A_MULTIPLIER, amp)
}

pub struct Invariant<const TOKEN_COUNT: usize>;
impl<const TOKEN_COUNT: usize> Invariant<TOKEN_COUNT> {
    /// Geometric mean of the given (positive) values.
    ///
    /// Newton iteration on the n-th root of the product without ever forming the product itself,
    /// started from the largest value so the estimate approaches the root from above.
    pub fn geometric_mean(values: &[AmountT; TOKEN_COUNT]) -> InvariantResult<AmountT> {
        Self::geometric_mean_sorted(&sorted_descending(values))
    }

    fn geometric_mean_sorted(sorted: &[AmountT; TOKEN_COUNT]) -> InvariantResult<AmountT> {
        if sorted[TOKEN_COUNT - 1].is_zero() {
            return Err(PoolError::Convergence);
        }
        let n = U256::from(TOKEN_COUNT);
        let mut mean = sorted[0];
        for _ in 0..MAX_ITERATIONS {
            let previous_mean = mean;
            let mut quotient = ONE;
            for &value in sorted.iter() {
                quotient = muldiv(quotient, value, mean)?;
            }
            mean = muldiv(mean, (n - 1) * ONE + quotient, n * ONE)?;
            let diff = mean.abs_diff(previous_mean);
            if diff <= U256::one() || diff * ONE < mean {
                return Ok(mean);
            }
        }
        Err(PoolError::Convergence)
    }

    /// K = N^N * prod(x) / sum(x)^N, optionally flattened by gamma to gamma / (gamma + 1 - K).
    ///
    /// 1e18 for perfectly balanced values, smaller the more imbalanced they are, never above 1e18.
    pub fn reduction_coefficient(values: &[AmountT; TOKEN_COUNT], gamma: U256) -> InvariantResult<U256> {
        let n = U256::from(TOKEN_COUNT);
        let sum = sum_balances(values);
        if sum.is_zero() {
            return Err(PoolError::ZeroBalance);
        }
        let mut k = ONE;
        for &value in values.iter() {
            k = muldiv(k, n * value, sum)?;
        }
        if !gamma.is_zero() {
            k = muldiv(gamma, ONE, gamma + ONE - k)?;
        }
        Ok(k)
    }

    pub fn solve_d(amp: U256, gamma: U256, balances: &[AmountT; TOKEN_COUNT]) -> InvariantResult<AmountT> {
        let result = Self::newton_d(amp, gamma, balances);
        if let Err(e) = &result {
            warn!(%amp, %gamma, ?balances, "solve_d failed: {}", e);
        }
        result
    }

    fn newton_d(amp: U256, gamma: U256, balances: &[AmountT; TOKEN_COUNT]) -> InvariantResult<AmountT> {
        let sorted = sorted_descending(balances);
        if sorted[TOKEN_COUNT - 1].is_zero() {
            return Err(PoolError::Convergence);
        }
        let n = U256::from(TOKEN_COUNT);
        let sum = sum_balances(&sorted);
        let balances_times_n = sorted.map(|balance| balance * n);

        let mut depth = n * Self::geometric_mean_sorted(&sorted)?;
        for iteration in 0..MAX_ITERATIONS {
            let previous_depth = depth;

            let mut k0 = ONE;
            for &balance_times_n in balances_times_n.iter() {
                k0 = muldiv(k0, balance_times_n, depth)?;
            }
            if k0.is_zero() {
                return Err(PoolError::Convergence);
            }

            let g1k0 = g1k0(gamma, k0);
            let mul1 = mul1(amp, gamma, depth, g1k0)?;
            // 2 * N * K0 / g1k0
            let mul2 = muldiv(ONE * 2 * n, k0, g1k0)?;

            let neg_fprime = (sum + muldiv(sum, mul2, ONE)?) + muldiv(mul1, n, k0)?;
            let neg_fprime = neg_fprime
                .checked_sub(muldiv(mul2, depth, ONE)?)
                .filter(|v| !v.is_zero())
                .ok_or(PoolError::Convergence)?;

            // D -= f / fprime, split into positive and negative parts to stay unsigned
            let mut depth_plus = muldiv(depth, neg_fprime + sum, neg_fprime)?;
            let mut depth_minus = muldiv(depth, depth, neg_fprime)?;
            let correction = muldiv(muldiv(depth, mul1 / neg_fprime, ONE)?, ONE.abs_diff(k0), k0)?;
            if ONE > k0 {
                depth_minus += correction;
            } else {
                depth_plus += correction;
            }
            depth = if depth_plus > depth_minus {
                depth_plus - depth_minus
            } else {
                (depth_minus - depth_plus) / 2
            };

            let diff = depth.abs_diff(previous_depth);
            if diff * 100_000_000_000_000u64 < std::cmp::max(U256::from(10_000_000_000_000_000u64), depth) {
                if depth.is_zero() {
                    return Err(PoolError::Convergence);
                }
                debug!(%depth, iterations = iteration + 1, "solve_d converged");
                return Ok(depth);
            }
        }
        Err(PoolError::Convergence)
    }

    /// Finds the balance at `index` that, together with all other balances, yields `depth`.
    ///
    /// The value at `index` of the passed in balances is ignored.
    pub fn solve_balance(
        amp: U256,
        gamma: U256,
        balances: &[AmountT; TOKEN_COUNT],
        depth: AmountT,
        index: usize,
    ) -> InvariantResult<AmountT> {
        if index >= TOKEN_COUNT {
            return Err(PoolError::InvalidIndex);
        }
        let result = Self::newton_y(amp, gamma, balances, depth, index);
        if let Err(e) = &result {
            warn!(%amp, %gamma, ?balances, %depth, index, "solve_balance failed: {}", e);
        }
        result
    }

    fn newton_y(
        amp: U256,
        gamma: U256,
        balances: &[AmountT; TOKEN_COUNT],
        depth: AmountT,
        index: usize,
    ) -> InvariantResult<AmountT> {
        if depth.is_zero() {
            return Err(PoolError::Convergence);
        }
        let n = U256::from(TOKEN_COUNT);
        let mut known_balances = *balances;
        known_balances[index] = U256::zero();
        //the zeroed out entry ends up last, the known balances come first (largest first)
        let known_balances = sorted_descending(&known_balances);
        let known_balances = &known_balances[..TOKEN_COUNT - 1];
        if known_balances.iter().any(|balance| balance.is_zero()) {
            return Err(PoolError::Convergence);
        }

        let convergence_limit = std::cmp::max(
            std::cmp::max(known_balances[0], depth) / 100_000_000_000_000u64,
            U256::from(100),
        );

        let mut unknown_balance = depth / n;
        let mut known_balance_sum = U256::zero();
        for &balance in known_balances.iter().rev() {
            //small balances first
            unknown_balance = muldiv(unknown_balance, depth, balance * n)?;
            known_balance_sum += balance;
        }
        let mut partial_k0 = ONE;
        for &balance in known_balances.iter() {
            //large balances first
            partial_k0 = muldiv(partial_k0, balance * n, depth)?;
        }

        for iteration in 0..MAX_ITERATIONS {
            let previous_unknown_balance = unknown_balance;

            let k0 = muldiv(partial_k0, unknown_balance * n, depth)?;
            if k0.is_zero() {
                return Err(PoolError::Convergence);
            }
            let sum = known_balance_sum + unknown_balance;

            let g1k0 = g1k0(gamma, k0);
            let mul1 = mul1(amp, gamma, depth, g1k0)?;
            // 1 + 2 * K0 / g1k0
            let mul2 = ONE + muldiv(ONE * 2, k0, g1k0)?;

            let yfprime = ONE * unknown_balance + sum * mul2 + mul1;
            let dyfprime = depth * mul2;
            if yfprime < dyfprime {
                unknown_balance = previous_unknown_balance / 2;
                continue;
            }
            let yfprime = yfprime - dyfprime;
            let fprime = yfprime / unknown_balance;
            if fprime.is_zero() {
                return Err(PoolError::Convergence);
            }

            // y -= f / fprime, split into positive and negative parts to stay unsigned
            let y_minus = mul1 / fprime;
            let y_plus = (yfprime + ONE * depth) / fprime + muldiv(y_minus, ONE, k0)?;
            let y_minus = y_minus + ONE * sum / fprime;

            unknown_balance = if y_plus < y_minus {
                previous_unknown_balance / 2
            } else {
                y_plus - y_minus
            };

            let diff = unknown_balance.abs_diff(previous_unknown_balance);
            if diff < std::cmp::max(convergence_limit, unknown_balance / 100_000_000_000_000u64) {
                if unknown_balance.is_zero() {
                    return Err(PoolError::Convergence);
                }
                debug!(%unknown_balance, iterations = iteration + 1, "solve_balance converged");
                return Ok(unknown_balance);
            }
        }
        Err(PoolError::Convergence)
    }

    /// Output amount (in normalized units, before fees) for adding `input_amount` to balance
    /// `input_index` while keeping the invariant of the given balances.
    pub fn quote_swap(
        amp: U256,
        gamma: U256,
        balances: &[AmountT; TOKEN_COUNT],
        input_index: usize,
        output_index: usize,
        input_amount: AmountT,
    ) -> InvariantResult<AmountT> {
        if input_index == output_index || input_index >= TOKEN_COUNT || output_index >= TOKEN_COUNT {
            return Err(PoolError::InvalidIndex);
        }
        if input_amount.is_zero() {
            return Err(PoolError::ZeroAmount);
        }
        let depth = Self::solve_d(amp, gamma, balances)?;
        let mut updated_balances = *balances;
        updated_balances[input_index] = updated_balances[input_index]
            .checked_add(input_amount)
            .ok_or(PoolError::MathOverflow)?;
        let unknown_balance = Self::solve_balance(amp, gamma, &updated_balances, depth, output_index)?;
        balances[output_index]
            .checked_sub(unknown_balance)
            .filter(|output| !output.is_zero())
            .ok_or(PoolError::Convergence)
    }

    /// Whether every balance lies within [MIN_XD, MAX_XD] relative to depth.
    pub fn is_safe(balances: &[AmountT; TOKEN_COUNT], depth: AmountT) -> bool {
        !depth.is_zero()
            && balances.iter().all(|&balance| match fixed_point::mul_div(balance, ONE, depth) {
                Some(ratio) => ratio >= MIN_XD && ratio <= MAX_XD,
                None => false,
            })
    }

    /// Rejects a transition that lowered the invariant by more than NOLOSS_TOLERANCE (relative).
    pub fn check_no_loss(depth_before: AmountT, depth_after: AmountT) -> InvariantResult<()> {
        if depth_after >= depth_before {
            return Ok(());
        }
        // 2 * (D0 - D1) / (D0 + D1) < tolerance
        let loss = muldiv((depth_before - depth_after) * 2, ONE, depth_before + depth_after)?;
        if loss < NOLOSS_TOLERANCE {
            Ok(())
        } else {
            warn!(%depth_before, %depth_after, "invariant decreased beyond tolerance");
            Err(PoolError::Convergence)
        }
    }
}
