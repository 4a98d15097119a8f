use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use thiserror::Error;

//the numeric values are part of the host-facing interface (see to_error_msg) so variants may only
// ever be appended, never reordered
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, FromPrimitive)]
pub enum PoolError {
    #[error("Newton iteration did not converge or produced an invalid result")]
    Convergence = 0,
    #[error("Output amount is below the specified minimum")]
    Slippage,
    #[error("Token index is out of bounds or input and output index coincide")]
    InvalidIndex,
    #[error("Amount must be positive")]
    ZeroAmount,
    #[error("Pool balances must be positive")]
    ZeroBalance,
    #[error("Specified A or gamma is out of bounds")]
    InvalidAmpGammaValue,
    #[error("A/gamma ramp window is too short")]
    InvalidRampTimestamp,
    #[error("Given fee is invalid")]
    InvalidFeeInput,
    #[error("Given price is invalid")]
    InvalidPriceInput,
    #[error("Given oracle parameter is invalid")]
    InvalidOracleParameter,
    #[error("Token decimals exceed 18")]
    InvalidDecimals,
    #[error("Instruction data could not be decoded")]
    InvalidInstruction,
    #[error("Arithmetic overflow")]
    MathOverflow,
}

impl PoolError {
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Self::from_u32(code)
    }
}

impl From<PoolError> for u32 {
    fn from(e: PoolError) -> Self {
        e.code()
    }
}

pub fn to_error_msg(code: u32) -> String {
    match PoolError::from_code(code) {
        Some(e) => e.to_string(),
        None => format!("Unknown pool error code {}", code),
    }
}
