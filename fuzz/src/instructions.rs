use borsh::BorshSerialize;
use crypto_pool::{
    amp_gamma::{AmpT, GammaT, TimestampT, A_MULTIPLIER, MAX_GAMMA, MIN_GAMMA},
    error::PoolError,
    fixed_point::{ten_to_the, ONE, U256},
    instruction::PoolInstruction,
    invariant::{AmountT, Invariant},
    processor::Processor,
    state::{PoolConfig, PoolState},
    TOKEN_COUNT,
};
use roots::{find_root_brent, SimpleConvergency};
use {
    arbitrary::{Arbitrary, Result as ArbResult, Unstructured},
    honggfuzz::fuzz,
};

const START_TS: TimestampT = 1_640_995_200;
const MAX_WAIT: TimestampT = 2 * 86_400;
const MAX_RAMP_DURATION: TimestampT = 30 * 86_400;
const DECIMALS: [u8; TOKEN_COUNT] = [6, 8, 18];

/// An instruction plus the time that passes before it is applied.
///
/// The `future_ts` of a ramp is drawn as a duration and made absolute when applied.
#[derive(Debug)]
pub struct FuzzInstruction {
    instruction: PoolInstruction,
    wait: TimestampT,
}

impl<'a> Arbitrary<'a> for FuzzInstruction {
    fn arbitrary(u: &mut Unstructured<'a>) -> ArbResult<Self> {
        //one index past the end so out of bounds swaps get exercised too
        let input_index = u.int_in_range(0..=TOKEN_COUNT as u8)?;
        let output_index = u.int_in_range(0..=TOKEN_COUNT as u8)?;
        let instruction = match u.arbitrary()? {
            PoolInstruction::Swap {
                input_amount,
                minimum_output_amount,
                ..
            } => PoolInstruction::Swap {
                input_index,
                output_index,
                //up to roughly a third of the pool on the 18 decimal token
                input_amount: input_amount % 10u128.pow(24),
                minimum_output_amount: minimum_output_amount % 10u128.pow(24),
            },
            PoolInstruction::RampAGamma {
                future_a, future_gamma, ..
            } => PoolInstruction::RampAGamma {
                future_a: future_a % (27 * 2_000),
                future_gamma: future_gamma % (MAX_GAMMA + MIN_GAMMA),
                future_ts: u.int_in_range(0..=MAX_RAMP_DURATION)?,
            },
            other => other,
        };
        Ok(FuzzInstruction {
            instruction,
            wait: u.int_in_range(0..=MAX_WAIT)?,
        })
    }
}

fn main() {
    loop {
        fuzz!(|fuzz_ixs: Vec<FuzzInstruction>| {
            if fuzz_ixs.is_empty() {
                return;
            }
            run_fuzz_instructions(fuzz_ixs);
        });
    }
}

fn tricrypto_pool() -> PoolState<TOKEN_COUNT> {
    let config = PoolConfig {
        decimals: DECIMALS,
        ..Default::default()
    };
    //$3M of USDT, WBTC at $40k and WETH at $3k
    let balances = [
        U256::from(3_000_000u64) * ten_to_the(6),
        U256::from(75u64) * ten_to_the(8),
        U256::from(1_000u64) * ten_to_the(18),
    ];
    let initial_prices = [U256::from(40_000u64) * ONE, U256::from(3_000u64) * ONE];
    Processor::init(&config, balances, &initial_prices, START_TS).unwrap()
}

fn run_fuzz_instructions(fuzz_instructions: Vec<FuzzInstruction>) {
    let mut state = tricrypto_pool();
    let mut now = START_TS;
    for fuzz_ix in fuzz_instructions {
        now += fuzz_ix.wait;
        let instruction = match fuzz_ix.instruction {
            PoolInstruction::RampAGamma {
                future_a,
                future_gamma,
                future_ts,
            } => PoolInstruction::RampAGamma {
                future_a,
                future_gamma,
                future_ts: now + future_ts,
            },
            other => other,
        };
        let data = instruction.try_to_vec().unwrap();
        match Processor::process(&state, &data, now) {
            Ok(new_state) => {
                assert_eq!(new_state.version(), state.version() + 1);
                if let PoolInstruction::Swap { .. } = instruction {
                    check_depth(&new_state, now);
                }
                state = new_state;
            }
            Err(e) => {
                let expected = match instruction {
                    PoolInstruction::Swap { .. } => matches!(
                        e,
                        PoolError::Convergence
                            | PoolError::Slippage
                            | PoolError::InvalidIndex
                            | PoolError::ZeroAmount
                            | PoolError::InvalidPriceInput
                            | PoolError::MathOverflow
                    ),
                    PoolInstruction::RampAGamma { .. } => matches!(
                        e,
                        PoolError::InvalidAmpGammaValue | PoolError::InvalidRampTimestamp
                    ),
                    PoolInstruction::StopRampAGamma => false,
                };
                assert!(expected, "unexpected error {:?} for {:?}", e, instruction);
                if let PoolInstruction::Swap {
                    input_index,
                    output_index,
                    input_amount,
                    minimum_output_amount,
                } = instruction
                {
                    let quoted = Processor::quote(
                        &state,
                        input_index as usize,
                        output_index as usize,
                        input_amount.into(),
                        now,
                    );
                    match quoted {
                        Ok((output_amount, _)) if e == PoolError::Slippage => {
                            assert!(output_amount < U256::from(minimum_output_amount));
                        }
                        //the quote only covers the trade itself, not the oracle update after it
                        Ok(_) => {}
                        Err(quote_error) => assert_eq!(quote_error, e),
                    }
                }
            }
        }
    }
}

/// Compares the stored depth against a root of the invariant found in floating point.
fn check_depth(state: &PoolState<TOKEN_COUNT>, now: TimestampT) {
    let params = state.amp_gamma.get(now);
    let xp = state.normalized_balances().unwrap();
    let recomputed = Invariant::<TOKEN_COUNT>::solve_d(params.amp(), params.gamma(), &xp).unwrap();
    assert_eq!(recomputed, state.get_d());

    if let Some(reference) = reference_depth(params.a_precise, params.gamma, &xp) {
        let depth = to_f64(recomputed);
        assert!(
            (depth - reference).abs() / reference < 1e-9,
            "depth {} vs reference {} for {:?}",
            depth,
            reference,
            xp
        );
    }
}

//K * (S / D - 1) + K0 - 1 = 0 with K0 = N^N * prod(x) / D^N and K = A * K0 * gamma^2 / (gamma + 1 - K0)^2
fn reference_depth(a_precise: AmpT, gamma: GammaT, xp: &[AmountT; TOKEN_COUNT]) -> Option<f64> {
    let amp = a_precise as f64 / A_MULTIPLIER as f64;
    let gamma = gamma as f64 / 1e18;
    //rescaled so the root is of order one
    let largest = xp.iter().map(|&x| to_f64(x)).fold(0.0, f64::max);
    let x: Vec<f64> = xp.iter().map(|&v| to_f64(v) / largest).collect();
    let n = TOKEN_COUNT as f64;
    let sum: f64 = x.iter().sum();
    let product: f64 = x.iter().product();

    let invariant = |depth: f64| {
        let k0 = n.powi(TOKEN_COUNT as i32) * product / depth.powi(TOKEN_COUNT as i32);
        let k = amp * k0 * gamma * gamma / (gamma + 1.0 - k0).powi(2);
        k * (sum / depth - 1.0) + k0 - 1.0
    };
    //the root lies between N times the geometric mean (K0 = 1) and the sum (K0 <= 1)
    let lower = n * product.powf(1.0 / n);
    if sum - lower < 1e-12 * sum {
        return None;
    }
    let mut convergency = SimpleConvergency {
        eps: 1e-15f64,
        max_iter: 200,
    };
    find_root_brent(lower, sum, &invariant, &mut convergency)
        .ok()
        .map(|depth| depth * largest)
}

fn to_f64(value: U256) -> f64 {
    value.to_string().parse().unwrap()
}
