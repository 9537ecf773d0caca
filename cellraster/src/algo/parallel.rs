//! Parallel per-image processing
//!
//! Images in a batch are rendered independently, so the per-image work is
//! spread over the rayon pool. Results come back in input order regardless of
//! which worker finished first. If any item fails, one of the errors is
//! returned and the partial results are dropped.

use rayon::prelude::*;

/// Apply `f` to every item on the rayon pool, preserving input order.
///
/// ```
/// use cellraster::algo::map_in_order;
///
/// let doubled: Result<Vec<i32>, String> = map_in_order(&[1, 2, 3], |v| Ok(v * 2));
/// assert_eq!(doubled.unwrap(), vec![2, 4, 6]);
/// ```
pub fn map_in_order<T, U, E, F>(items: &[T], f: F) -> Result<Vec<U>, E>
where
    T: Sync,
    U: Send,
    E: Send,
    F: Fn(&T) -> Result<U, E> + Send + Sync,
{
    items.par_iter().map(f).collect()
}
