use arrayvec::ArrayVec;
use std::fmt::Debug;

//the unwrap is safe, the iterator yields exactly SIZE items
pub fn create_result_array<T: Debug, E: Debug, const SIZE: usize>(
    closure: impl FnMut(usize) -> Result<T, E>,
) -> Result<[T; SIZE], E> {
    Ok((0..SIZE)
        .map(closure)
        .collect::<Result<ArrayVec<_, SIZE>, _>>()?
        .into_inner()
        .unwrap())
}

//largest value first, which is the order all Newton seeds in the invariant expect
pub fn sorted_descending<T: Ord + Copy, const SIZE: usize>(array: &[T; SIZE]) -> [T; SIZE] {
    let mut sorted = *array;
    sorted.sort_unstable_by(|a, b| b.cmp(a));
    sorted
}
