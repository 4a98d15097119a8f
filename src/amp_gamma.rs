use borsh::{BorshDeserialize, BorshSerialize};
use tracing::info;

use crate::{error::PoolError, fixed_point::U256, TOKEN_COUNT};

pub type TimestampT = u64;
pub type AmpT = u64;
pub type GammaT = u128;

//A is stored with two extra decimals so ramps don't move in discontinuous integer steps
pub const A_MULTIPLIER: AmpT = 100;
const N_POW_N: AmpT = (TOKEN_COUNT as AmpT).pow(TOKEN_COUNT as u32);
//bounds on "A precise", i.e. A * A_MULTIPLIER where A already includes the N^N factor
pub const MIN_A: AmpT = N_POW_N * A_MULTIPLIER / 100;
pub const MAX_A: AmpT = N_POW_N * A_MULTIPLIER * 1000;

pub const MIN_GAMMA: GammaT = 10_000_000_000;
pub const MAX_GAMMA: GammaT = 10_000_000_000_000_000;

pub const MIN_RAMP_TIME: TimestampT = 60 * 60 * 24;
pub const MAX_A_CHANGE: u128 = 10;

/// (A, gamma) as used by a single solve. `a_precise` includes both N^N and A_MULTIPLIER.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurveParams {
    pub a_precise: AmpT,
    pub gamma: GammaT,
}

impl CurveParams {
    pub fn amp(&self) -> U256 {
        U256::from(self.a_precise)
    }

    pub fn gamma(&self) -> U256 {
        U256::from(self.gamma)
    }
}

fn check_bounds(a_precise: AmpT, gamma: GammaT) -> Result<(), PoolError> {
    if !(MIN_A..=MAX_A).contains(&a_precise) || !(MIN_GAMMA..=MAX_GAMMA).contains(&gamma) {
        Err(PoolError::InvalidAmpGammaValue)
    } else {
        Ok(())
    }
}

fn within_max_change(initial: u128, future: u128) -> bool {
    future <= initial * MAX_A_CHANGE && initial <= future * MAX_A_CHANGE
}

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmpGamma {
    //invariants:
    // initial_ts <= future_ts
    // MIN_A <= initial_a, future_a <= MAX_A
    // MIN_GAMMA <= initial_gamma, future_gamma <= MAX_GAMMA
    initial_a: AmpT,
    initial_gamma: GammaT,
    initial_ts: TimestampT,
    future_a: AmpT,
    future_gamma: GammaT,
    future_ts: TimestampT,
}

impl AmpGamma {
    /// `a` is given as A * N^N (e.g. 135 * 27), gamma in 1e18 fixed point.
    pub fn new(a: AmpT, gamma: GammaT) -> Result<AmpGamma, PoolError> {
        let a_precise = a.checked_mul(A_MULTIPLIER).ok_or(PoolError::InvalidAmpGammaValue)?;
        check_bounds(a_precise, gamma)?;
        Ok(AmpGamma {
            initial_a: a_precise,
            initial_gamma: gamma,
            initial_ts: 0,
            future_a: a_precise,
            future_gamma: gamma,
            future_ts: 0,
        })
    }

    pub fn get(&self, current_ts: TimestampT) -> CurveParams {
        if current_ts >= self.future_ts {
            //not in an adjustment window (anymore)
            return CurveParams {
                a_precise: self.future_a,
                gamma: self.future_gamma,
            };
        }
        if current_ts <= self.initial_ts {
            return CurveParams {
                a_precise: self.initial_a,
                gamma: self.initial_gamma,
            };
        }

        //weighted average of both endpoints, each truncated
        let total = (self.future_ts - self.initial_ts) as u128;
        let elapsed = (current_ts - self.initial_ts) as u128;
        let remaining = total - elapsed;
        let interpolate = |initial: u128, future: u128| (initial * remaining + future * elapsed) / total;

        CurveParams {
            a_precise: interpolate(self.initial_a as u128, self.future_a as u128) as AmpT,
            gamma: interpolate(self.initial_gamma, self.future_gamma),
        }
    }

    /// A * N^N, truncated to an integer.
    pub fn a(&self, current_ts: TimestampT) -> AmpT {
        self.get(current_ts).a_precise / A_MULTIPLIER
    }

    pub fn a_precise(&self, current_ts: TimestampT) -> AmpT {
        self.get(current_ts).a_precise
    }

    pub fn gamma(&self, current_ts: TimestampT) -> GammaT {
        self.get(current_ts).gamma
    }

    pub fn is_ramping(&self, current_ts: TimestampT) -> bool {
        current_ts < self.future_ts
    }

    pub fn future_ts(&self) -> TimestampT {
        self.future_ts
    }

    /// Starts a new ramp from whatever values are in effect at `current_ts` (which also
    /// supersedes a ramp that is still in progress).
    pub fn set_target(
        &mut self,
        current_ts: TimestampT,
        future_a: AmpT,
        future_gamma: GammaT,
        future_ts: TimestampT,
    ) -> Result<(), PoolError> {
        let future_a = future_a.checked_mul(A_MULTIPLIER).ok_or(PoolError::InvalidAmpGammaValue)?;
        check_bounds(future_a, future_gamma)?;

        if future_ts < current_ts.saturating_add(MIN_RAMP_TIME) {
            return Err(PoolError::InvalidRampTimestamp);
        }

        let initial = self.get(current_ts);
        if !within_max_change(initial.a_precise as u128, future_a as u128)
            || !within_max_change(initial.gamma, future_gamma)
        {
            return Err(PoolError::InvalidAmpGammaValue);
        }

        self.initial_a = initial.a_precise;
        self.initial_gamma = initial.gamma;
        self.initial_ts = current_ts;
        self.future_a = future_a;
        self.future_gamma = future_gamma;
        self.future_ts = future_ts;

        info!(
            initial_a = initial.a_precise,
            initial_gamma = initial.gamma,
            future_a,
            future_gamma,
            current_ts,
            future_ts,
            "A/gamma ramp started"
        );
        Ok(())
    }

    pub fn stop_adjustment(&mut self, current_ts: TimestampT) {
        let current = self.get(current_ts);
        self.initial_a = current.a_precise;
        self.initial_gamma = current.gamma;
        self.initial_ts = current_ts;
        self.future_a = current.a_precise;
        self.future_gamma = current.gamma;
        self.future_ts = current_ts;
        info!(a = current.a_precise, gamma = current.gamma, current_ts, "A/gamma ramp stopped");
    }
}
