//! Global inner product of two distributed vectors.

use std::ops::Mul;
use std::time::{Duration, Instant};

use crate::algs::collective::{AllReduce, Reducible};
use crate::data::array::Array;
use crate::runtime::Context;

/// `sum(x[i] * y[i])` over the first `n` owned entries of every partition.
///
/// Passing the same array as `x` and `y` takes a sum-of-squares path that
/// reads the buffer once; the result is identical to the general path.
/// Partial sums run in index order, and `coll` combines them; every partition
/// receives the same value. Time spent inside `coll` alone is added to
/// `time_allreduce`.
///
/// # Panics
/// If either array holds fewer than `n` entries.
pub fn compute_dot_product<T, C>(
    ctx: &Context,
    n: usize,
    x: &Array<T>,
    y: &Array<T>,
    coll: &C,
    time_allreduce: &mut Duration,
) -> T
where
    T: Reducible + Mul<Output = T>,
    C: AllReduce<T> + ?Sized,
{
    assert!(x.len() >= n, "x has {} entries, need {n}", x.len());
    assert!(y.len() >= n, "y has {} entries, need {n}", y.len());

    let xv = &x.values()[..n];
    let local = if std::ptr::eq(x, y) {
        xv.iter().fold(T::zero(), |acc, &v| acc + v * v)
    } else {
        xv.iter()
            .zip(&y.values()[..n])
            .fold(T::zero(), |acc, (&a, &b)| acc + a * b)
    };

    let start = Instant::now();
    let global = coll.all_reduce(local);
    let elapsed = start.elapsed();
    *time_allreduce += elapsed;
    log::trace!(
        "partition {}: dot over {n} entries, all-reduce took {elapsed:?}",
        ctx.partition()
    );
    global
}
