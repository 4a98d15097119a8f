mod helpers;

use crypto_pool::{
    amp_gamma::{AmpGamma, A_MULTIPLIER},
    error::PoolError,
    fixed_point::{ONE, U256},
    invariant::{AmountT, Invariant, MAX_XD, MIN_XD},
    processor::Processor,
    TOKEN_COUNT,
};
use helpers::*;
use proptest::prelude::*;

type Inv = Invariant<TOKEN_COUNT>;

const PERMUTATIONS: [[usize; TOKEN_COUNT]; 6] = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];

//values spread over many orders of magnitude: 4 significant digits times 10^(exp - 3)
fn magnitude(min_exp: u32, max_exp: u32) -> impl Strategy<Value = u128> {
    (1000u128..10_000, min_exp..max_exp).prop_map(|(mantissa, exp)| mantissa * 10u128.pow(exp) / 1000)
}

fn amp() -> impl Strategy<Value = U256> {
    (1u64..=10_000).prop_map(|a| U256::from(a * A_MULTIPLIER))
}

fn gamma() -> impl Strategy<Value = U256> {
    (10_000_000_000u128..=10_000_000_000_000_000).prop_map(U256::from)
}

fn fraction_of(value: u128, ratio: u128) -> U256 {
    std::cmp::max(U256::from(value) * U256::from(ratio) / ONE, U256::one())
}

fn loss(depth_before: U256, depth_after: U256) -> f64 {
    let (before, after) = (to_f64(depth_before), to_f64(depth_after));
    2.0 * (before - after) / (before + after)
}

fn in_safety_band(balances: &[AmountT; TOKEN_COUNT], depth: AmountT) -> bool {
    balances.iter().all(|&balance| {
        let ratio = balance * ONE / depth;
        ratio >= MIN_XD && ratio <= MAX_XD
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    #[test]
    fn solve_d_converges(
        amp in amp(),
        gamma in gamma(),
        x in magnitude(9, 33),
        y_ratio in magnitude(11, 18),
        z_ratio in magnitude(11, 18),
        permutation in 0usize..6,
    ) {
        let order = PERMUTATIONS[permutation];
        let mut balances = [U256::zero(); TOKEN_COUNT];
        balances[order[0]] = U256::from(x);
        balances[order[1]] = fraction_of(x, y_ratio);
        balances[order[2]] = fraction_of(x, z_ratio);
        let depth = Inv::solve_d(amp, gamma, &balances).unwrap();
        prop_assert!(!depth.is_zero());
    }

    #[test]
    fn geometric_mean_is_accurate(a in magnitude(9, 33), b in magnitude(9, 33), c in magnitude(9, 33)) {
        let values = [U256::from(a), U256::from(b), U256::from(c)];
        let mean = to_f64(Inv::geometric_mean(&values).unwrap());
        let expected = (a as f64 * b as f64 * c as f64).cbrt();
        let min = a.min(b).min(c) as f64;
        prop_assert!((mean - expected).abs() / mean <= f64::max(1e-10, 1.0 / min));
    }

    #[test]
    fn reduction_coefficient_matches_closed_form(
        a in magnitude(9, 33),
        b in magnitude(9, 33),
        c in magnitude(9, 33),
        gamma in 10_000_000_000u128..=1_000_000_000_000_000_000,
    ) {
        let values = [U256::from(a), U256::from(b), U256::from(c)];
        let coefficient = Inv::reduction_coefficient(&values, U256::from(gamma)).unwrap();
        prop_assert!(coefficient <= ONE);

        let (a, b, c) = (a as f64, b as f64, c as f64);
        let k = 27.0 * a * b * c / (a + b + c).powi(3);
        let gamma = gamma as f64 / 1e18;
        let expected = gamma / (gamma + 1.0 - k);
        prop_assert!((to_f64(coefficient) / 1e18 - expected).abs() <= 1e-7);
    }

    #[test]
    fn reconstructed_balance_preserves_depth(
        amp in amp(),
        gamma in gamma(),
        depth in magnitude(17, 33),
        ratios in [magnitude(16, 20), magnitude(16, 20), magnitude(16, 20)],
        index in 0usize..TOKEN_COUNT,
    ) {
        let depth = U256::from(depth);
        let mut balances = [U256::zero(); TOKEN_COUNT];
        for k in 0..TOKEN_COUNT {
            balances[k] = depth * U256::from(ratios[k]) / ONE;
        }
        balances[index] = Inv::solve_balance(amp, gamma, &balances, depth, index).unwrap();
        let recomputed = Inv::solve_d(amp, gamma, &balances).unwrap();
        prop_assert!(loss(depth, recomputed).abs() < 5e-5);
    }

    #[test]
    fn swaps_within_the_safety_band_do_not_lose_value(
        amp in amp(),
        gamma in gamma(),
        x in magnitude(17, 33),
        y_ratio in magnitude(15, 21),
        z_ratio in magnitude(15, 21),
        input_ratio in magnitude(15, 21),
        indices in (0usize..TOKEN_COUNT, 0usize..TOKEN_COUNT).prop_filter("distinct", |(i, j)| i != j),
    ) {
        let (i, j) = indices;
        let mut balances = [U256::from(x), fraction_of(x, y_ratio), fraction_of(x, z_ratio)];
        let depth_before = match Inv::solve_d(amp, gamma, &balances) {
            Ok(depth) => depth,
            Err(_) => return Ok(()),
        };
        let mut after = balances;
        after[i] = fraction_of(x, input_ratio);
        let output_balance = match Inv::solve_balance(amp, gamma, &after, depth_before, j) {
            Ok(balance) => balance,
            Err(_) => return Ok(()),
        };
        let safe_before = in_safety_band(&balances, depth_before);
        balances = after;
        balances[j] = output_balance;
        let depth_after = match Inv::solve_d(amp, gamma, &balances) {
            Ok(depth) => depth,
            Err(_) => return Ok(()),
        };
        if safe_before && in_safety_band(&balances, depth_after) {
            prop_assert!(loss(depth_before, depth_after) < 5e-5);
        }
    }

    #[test]
    fn ramp_stays_between_endpoints(
        initial_a in 27u64..=27_000,
        change in 1u64..=10,
        increase in any::<bool>(),
        duration in 86_400u64..=30 * 86_400,
        elapsed in 0u64..=40 * 86_400,
    ) {
        let future_a = if increase {
            initial_a * change
        } else {
            std::cmp::max((initial_a + change - 1) / change, 27)
        };
        let future_a = std::cmp::min(future_a, 27_000);
        let mut amp_gamma = AmpGamma::new(initial_a, 100_000_000_000_000).unwrap();
        amp_gamma.set_target(0, future_a, 100_000_000_000_000, duration).unwrap();
        let current = amp_gamma.a_precise(elapsed);
        let (low, high) = if initial_a < future_a { (initial_a, future_a) } else { (future_a, initial_a) };
        prop_assert!(current >= low * A_MULTIPLIER && current <= high * A_MULTIPLIER);
        if elapsed >= duration {
            prop_assert_eq!(current, future_a * A_MULTIPLIER);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(40))]

    #[test]
    fn random_swap_sequences(
        swaps in prop::collection::vec((0usize..TOKEN_COUNT, 0usize..TOKEN_COUNT, 1u64..500_000, 0u64..3600), 1..25)
    ) {
        let dollar_prices = [1, BTC_PRICE, ETH_PRICE];
        let mut pool = TestPool::tricrypto();
        for (input_index, output_index, dollars, wait) in swaps {
            if input_index == output_index {
                continue;
            }
            pool.advance(wait);
            let input_amount = pool.amount(input_index, dollars) / dollar_prices[input_index];
            if input_amount.is_zero() {
                continue;
            }
            let before = pool.state;
            let quoted = pool.quote(input_index, output_index, input_amount);
            match pool.swap(input_index, output_index, input_amount, AmountT::zero()) {
                Ok(output_amount) => {
                    prop_assert_eq!(quoted.map(|(output, _)| output), Ok(output_amount));
                    prop_assert_eq!(pool.state.version(), before.version() + 1);
                    prop_assert_eq!(
                        pool.state.balances()[input_index],
                        before.balances()[input_index] + input_amount
                    );
                    prop_assert_eq!(
                        pool.state.balances()[output_index],
                        before.balances()[output_index] - output_amount
                    );
                    //a re-peg rescales depth, otherwise fees make it grow
                    if pool.state.get_price_scale() == before.get_price_scale() {
                        prop_assert!(loss(before.get_d(), pool.state.get_d()) < 5e-5);
                    }
                }
                Err(e) => {
                    prop_assert_eq!(e, PoolError::Convergence);
                    prop_assert_eq!(pool.state, before);
                }
            }
        }
    }

    #[test]
    fn failed_swaps_never_commit(min_output_factor in 1u64..10, dollars in 1u64..1_000_000) {
        let mut pool = TestPool::tricrypto();
        pool.advance(60);
        let input_amount = pool.amount(0, dollars);
        let before = pool.state;
        let (quoted, _) = pool.quote(0, 2, input_amount).unwrap();
        let minimum = quoted * U256::from(min_output_factor) + 1;
        prop_assert_eq!(pool.swap(0, 2, input_amount, minimum), Err(PoolError::Slippage));
        prop_assert_eq!(pool.state, before);
        let quoted_again = Processor::quote(&pool.state, 0, 2, input_amount, pool.now).unwrap().0;
        prop_assert_eq!(quoted_again, quoted);
    }
}
