#![allow(dead_code)]

use arrayvec::ArrayVec;
use crypto_pool::{
    amp_gamma::TimestampT,
    error::PoolError,
    fixed_point::{ten_to_the, ONE, U256},
    invariant::AmountT,
    processor::Processor,
    state::{PoolConfig, PoolState},
    TOKEN_COUNT,
};

pub const START_TS: TimestampT = 1_640_995_200;
pub const DAY: TimestampT = 86400;

//USDT, WBTC, WETH
pub const DECIMALS: [u8; TOKEN_COUNT] = [6, 8, 18];
pub const BTC_PRICE: u64 = 40_000;
pub const ETH_PRICE: u64 = 3_000;

pub fn price(value: u64) -> U256 {
    U256::from(value) * ONE
}

pub fn to_f64(value: U256) -> f64 {
    value.to_string().parse().unwrap()
}

pub fn relative_diff(v1: U256, v2: U256) -> f64 {
    let (f1, f2) = (to_f64(v1), to_f64(v2));
    (f1 - f2).abs() / f1.max(f2)
}

/// A pool and a clock, driven the way a host would drive it.
pub struct TestPool {
    pub state: PoolState<TOKEN_COUNT>,
    pub config: PoolConfig<TOKEN_COUNT>,
    pub now: TimestampT,
}

impl TestPool {
    /// `value_per_token` is the value of each token's balance in units of token 0.
    pub fn new(config: PoolConfig<TOKEN_COUNT>, prices: [u64; TOKEN_COUNT - 1], value_per_token: u64) -> Self {
        let mut all_prices = [1u64; TOKEN_COUNT];
        all_prices[1..].copy_from_slice(&prices);
        let balances: [AmountT; TOKEN_COUNT] = (0..TOKEN_COUNT)
            .map(|i| Self::raw_amount(&config, i, value_per_token) / all_prices[i])
            .collect::<ArrayVec<_, TOKEN_COUNT>>()
            .into_inner()
            .unwrap();
        let initial_prices: Vec<U256> = prices.iter().map(|&p| price(p)).collect();
        let state = Processor::init(&config, balances, &initial_prices, START_TS).unwrap();
        println!("initialized pool with balances {:?}, D: {}", balances, state.get_d());
        Self {
            state,
            config,
            now: START_TS,
        }
    }

    /// USDT/WBTC/WETH with the default parameters and $3M of each.
    pub fn tricrypto() -> Self {
        let config = PoolConfig {
            decimals: DECIMALS,
            ..Default::default()
        };
        Self::new(config, [BTC_PRICE, ETH_PRICE], 3_000_000)
    }

    pub fn raw_amount(config: &PoolConfig<TOKEN_COUNT>, index: usize, whole_tokens: u64) -> AmountT {
        U256::from(whole_tokens) * ten_to_the(config.decimals[index])
    }

    pub fn amount(&self, index: usize, whole_tokens: u64) -> AmountT {
        Self::raw_amount(&self.config, index, whole_tokens)
    }

    pub fn advance(&mut self, seconds: TimestampT) {
        self.now += seconds;
    }

    pub fn quote(&self, input_index: usize, output_index: usize, input_amount: AmountT) -> Result<(AmountT, AmountT), PoolError> {
        Processor::quote(&self.state, input_index, output_index, input_amount, self.now)
    }

    /// Commits only on success, like a host would.
    pub fn swap(
        &mut self,
        input_index: usize,
        output_index: usize,
        input_amount: AmountT,
        minimum_output_amount: AmountT,
    ) -> Result<AmountT, PoolError> {
        let (new_state, output_amount) = Processor::swap(
            &self.state,
            input_index,
            output_index,
            input_amount,
            minimum_output_amount,
            self.now,
        )?;
        self.state = new_state;
        Ok(output_amount)
    }

    pub fn process(&mut self, instruction_data: &[u8]) -> Result<(), PoolError> {
        self.state = Processor::process(&self.state, instruction_data, self.now)?;
        Ok(())
    }
}
