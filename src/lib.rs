pub mod amp_gamma;
pub mod common;
pub mod error;
pub mod fixed_point;
pub mod instruction;
pub mod invariant;
pub mod pool;
pub mod pool_fee;
pub mod price_scale;
pub mod processor;
pub mod state;

pub const TOKEN_COUNT: usize = 3;

pub type CryptoPool = pool::SharedPool<TOKEN_COUNT>;
pub type CryptoPoolState = state::PoolState<TOKEN_COUNT>;
