use borsh::{BorshDeserialize, BorshSerialize};

#[cfg(feature = "fuzz")]
use arbitrary::Arbitrary;

use crate::amp_gamma::{AmpT, GammaT, TimestampT};

/// Mutating requests a host can hand to `Processor::process` in their borsh encoding.
///
/// Amounts are raw token amounts.
#[cfg_attr(feature = "fuzz", derive(Arbitrary))]
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolInstruction {
    Swap {
        input_index: u8,
        output_index: u8,
        input_amount: u128,
        minimum_output_amount: u128,
    },
    RampAGamma {
        //A * N^N
        future_a: AmpT,
        future_gamma: GammaT,
        future_ts: TimestampT,
    },
    StopRampAGamma,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_is_tagged_by_variant_order() {
        let swap = PoolInstruction::Swap {
            input_index: 0,
            output_index: 2,
            input_amount: 1_000_000,
            minimum_output_amount: 0,
        };
        let bytes = swap.try_to_vec().unwrap();
        assert_eq!(bytes[0], 0);
        assert_eq!(bytes.len(), 1 + 1 + 1 + 16 + 16);
        assert_eq!(PoolInstruction::try_from_slice(&bytes).unwrap(), swap);

        assert_eq!(PoolInstruction::StopRampAGamma.try_to_vec().unwrap(), vec![2]);
    }

    #[test]
    fn garbage_does_not_decode() {
        assert!(PoolInstruction::try_from_slice(&[7]).is_err());
        assert!(PoolInstruction::try_from_slice(&[0, 1]).is_err());
    }
}
