// Fixed point arithmetic on 256 bit unsigned integers with a scaling factor of 10^18.
//
// Every product is immediately followed by a division that truncates towards zero. Nothing in here
// ever rounds up.
//
// Helpers that can overflow return Option so callers decide which error an overflow maps to.

use borsh::{BorshDeserialize, BorshSerialize};
use uint::construct_uint;

use crate::error::PoolError;

construct_uint! {
    #[derive(BorshSerialize, BorshDeserialize)]
    pub struct U256(4);
}

pub const PRECISION: u64 = 1_000_000_000_000_000_000;
pub const ONE: U256 = U256([PRECISION, 0, 0, 0]);

//shared iteration budget of all Newton style loops
pub const MAX_ITERATIONS: usize = 255;

//halfpow terminates once the series terms drop below this (i.e. relative precision of 1e-8)
const EXP_PRECISION: u64 = 10_000_000_000;
const MAX_HALFPOW_EXPONENT: u64 = 59;

impl U256 {
    pub const fn const_from(value: u128) -> Self {
        Self([value as u64, (value >> 64) as u64, 0, 0])
    }
}

pub trait AbsDiff {
    fn abs_diff(self, other: Self) -> Self;
}

impl AbsDiff for U256 {
    fn abs_diff(self, other: Self) -> Self {
        if self > other {
            self - other
        } else {
            other - self
        }
    }
}

pub fn ten_to_the(exp: u8) -> U256 {
    U256::exp10(exp as usize)
}

pub fn mul_div(a: U256, b: U256, denominator: U256) -> Option<U256> {
    a.checked_mul(b)?.checked_div(denominator)
}

pub fn mul_fp(a: U256, b: U256) -> Option<U256> {
    mul_div(a, b, ONE)
}

pub fn div_fp(a: U256, b: U256) -> Option<U256> {
    mul_div(a, ONE, b)
}

//plain integer power (not fixed point), square and multiply
pub fn pow(base: U256, exp: u32) -> Option<U256> {
    let mut result = U256::one();
    let mut base = base;
    let mut exp = exp;
    while exp > 0 {
        if exp & 1 == 1 {
            result = result.checked_mul(base)?;
        }
        exp >>= 1;
        if exp > 0 {
            base = base.checked_mul(base)?;
        }
    }
    Some(result)
}

/// Fixed point n-th root: returns r such that (r/1e18)^n ~= x/1e18, truncated.
///
/// Newton iteration started from above the root (max(x, 1e18) always is), which makes the sequence
/// decrease monotonically until it stops improving.
pub fn nth_root_fp(x: U256, n: u32) -> Result<U256, PoolError> {
    if n == 0 {
        return Err(PoolError::MathOverflow);
    }
    if x.is_zero() || n == 1 {
        return Ok(x);
    }
    let n_minus_one = U256::from(n - 1);
    let n_u256 = U256::from(n);
    let mut root = std::cmp::max(x, ONE);
    for _ in 0..MAX_ITERATIONS {
        let mut quotient = x;
        for _ in 1..n {
            quotient = mul_div(quotient, ONE, root).ok_or(PoolError::MathOverflow)?;
        }
        let next = (root * n_minus_one + quotient) / n_u256;
        if next >= root {
            return Ok(root);
        }
        root = next;
    }
    Err(PoolError::Convergence)
}

pub fn sqrt_fp(x: U256) -> Result<U256, PoolError> {
    nth_root_fp(x, 2)
}

/// 1e18 * 0.5^(power/1e18)
///
/// The integer part of the exponent is a shift, the fractional part is evaluated as the binomial
/// series of (1 - 0.5)^frac.
pub fn halfpow(power: U256) -> Result<U256, PoolError> {
    let intpow = power / ONE;
    let otherpow = power - intpow * ONE;
    if intpow > U256::from(MAX_HALFPOW_EXPONENT) {
        return Ok(U256::zero());
    }
    let result = ONE >> intpow.as_usize();
    if otherpow.is_zero() {
        return Ok(result);
    }

    let half = ONE / 2;
    let mut term = ONE;
    let mut sum = ONE;
    let mut neg = false;
    for i in 1..=MAX_ITERATIONS {
        let k = U256::from(i) * ONE;
        let mut c = k - ONE;
        if otherpow > c {
            c = otherpow - c;
            neg = !neg;
        } else {
            c -= otherpow;
        }
        term = term * (c * half / ONE) / k;
        sum = if neg {
            sum.checked_sub(term).ok_or(PoolError::Convergence)?
        } else {
            sum + term
        };
        if term < U256::from(EXP_PRECISION) {
            return Ok(result * sum / ONE);
        }
    }
    Err(PoolError::Convergence)
}
