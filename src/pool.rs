use parking_lot::RwLock;
use std::sync::Arc;

use crate::{
    amp_gamma::{AmpT, GammaT, TimestampT},
    error::PoolError,
    invariant::AmountT,
    price_scale::PriceT,
    processor::Processor,
    state::{PoolConfig, PoolState},
};

/// Pool state shared between threads.
///
/// Readers work on a snapshot and never block writers for longer than it takes to clone an Arc.
/// Mutations hold the write lock from reading the current state until the new state has replaced
/// it, so they are applied one after the other and always see each other's results.
pub struct SharedPool<const TOKEN_COUNT: usize> {
    state: RwLock<Arc<PoolState<TOKEN_COUNT>>>,
}

impl<const TOKEN_COUNT: usize> SharedPool<TOKEN_COUNT> {
    pub fn new(state: PoolState<TOKEN_COUNT>) -> Self {
        Self {
            state: RwLock::new(Arc::new(state)),
        }
    }

    pub fn init(
        config: &PoolConfig<TOKEN_COUNT>,
        balances: [AmountT; TOKEN_COUNT],
        initial_prices: &[PriceT],
        current_ts: TimestampT,
    ) -> Result<Self, PoolError> {
        Processor::init(config, balances, initial_prices, current_ts).map(Self::new)
    }

    pub fn snapshot(&self) -> Arc<PoolState<TOKEN_COUNT>> {
        Arc::clone(&self.state.read())
    }

    fn commit<T>(
        &self,
        transition: impl FnOnce(&PoolState<TOKEN_COUNT>) -> Result<(PoolState<TOKEN_COUNT>, T), PoolError>,
    ) -> Result<T, PoolError> {
        let mut guard = self.state.write();
        let current: &PoolState<TOKEN_COUNT> = &guard;
        let (new_state, result) = transition(current)?;
        *guard = Arc::new(new_state);
        Ok(result)
    }

    pub fn quote(
        &self,
        input_index: usize,
        output_index: usize,
        input_amount: AmountT,
        current_ts: TimestampT,
    ) -> Result<(AmountT, AmountT), PoolError> {
        Processor::quote(&self.snapshot(), input_index, output_index, input_amount, current_ts)
    }

    pub fn swap(
        &self,
        input_index: usize,
        output_index: usize,
        input_amount: AmountT,
        minimum_output_amount: AmountT,
        current_ts: TimestampT,
    ) -> Result<AmountT, PoolError> {
        self.commit(|state| {
            Processor::swap(
                state,
                input_index,
                output_index,
                input_amount,
                minimum_output_amount,
                current_ts,
            )
        })
    }

    pub fn ramp_a_gamma(
        &self,
        future_a: AmpT,
        future_gamma: GammaT,
        future_ts: TimestampT,
        current_ts: TimestampT,
    ) -> Result<(), PoolError> {
        self.commit(|state| {
            Processor::ramp_a_gamma(state, future_a, future_gamma, future_ts, current_ts).map(|state| (state, ()))
        })
    }

    pub fn stop_ramp_a_gamma(&self, current_ts: TimestampT) {
        let mut guard = self.state.write();
        *guard = Arc::new(Processor::stop_ramp_a_gamma(&guard, current_ts));
    }

    /// Applies a borsh encoded `PoolInstruction`.
    pub fn process(&self, instruction_data: &[u8], current_ts: TimestampT) -> Result<(), PoolError> {
        self.commit(|state| Processor::process(state, instruction_data, current_ts).map(|state| (state, ())))
    }

    pub fn get_a_gamma(&self, current_ts: TimestampT) -> (AmpT, GammaT) {
        self.snapshot().get_a_gamma(current_ts)
    }

    pub fn get_d(&self) -> AmountT {
        self.snapshot().get_d()
    }

    pub fn get_price_scale(&self) -> [PriceT; TOKEN_COUNT] {
        *self.snapshot().get_price_scale()
    }

    pub fn price_oracle(&self, current_ts: TimestampT) -> Result<[PriceT; TOKEN_COUNT], PoolError> {
        self.snapshot().price_oracle(current_ts)
    }

    pub fn last_prices(&self) -> [PriceT; TOKEN_COUNT] {
        *self.snapshot().last_prices()
    }

    pub fn balances(&self) -> [AmountT; TOKEN_COUNT] {
        *self.snapshot().balances()
    }

    pub fn version(&self) -> u64 {
        self.snapshot().version()
    }
}
