mod util;

use std::sync::{Arc, Barrier};
use std::time::Duration;

use proptest::prelude::*;
use serial_test::serial;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use spmd_halo::prelude::*;
use util::*;

/// Split `data` into `parts` contiguous chunks, the last ones possibly empty.
fn chunks(data: &[f64], parts: usize) -> Vec<Vec<f64>> {
    let per = data.len().div_ceil(parts).max(1);
    let mut out: Vec<Vec<f64>> = data.chunks(per).map(<[f64]>::to_vec).collect();
    out.resize(parts, Vec::new());
    out
}

/// Distributed dot of `x` and `y`, split over `parts` partitions. Returns the
/// value every partition computed.
fn distributed_dot(x: &[f64], y: &[f64], parts: usize, same: bool) -> Vec<f64> {
    let xs = chunks(x, parts);
    let ys = chunks(y, parts);
    let rows: Vec<usize> = xs.iter().map(Vec::len).collect();
    let config = RuntimeConfig {
        worker_threads: Some(1),
        ..RuntimeConfig::default()
    };
    World::<f64>::new(isolated(&rows), config)
        .unwrap()
        .run(|ctx, m| {
            let p = ctx.partition();
            let coll = ctx.collective::<f64>(ReduceOp::Sum);
            let xa = Array::new(xs[p].clone());
            let ya = Array::new(ys[p].clone());
            let mut t = Duration::ZERO;
            if same {
                compute_dot_product(ctx, m.local_rows(), &xa, &xa, &coll, &mut t)
            } else {
                compute_dot_product(ctx, m.local_rows(), &xa, &ya, &coll, &mut t)
            }
        })
        .unwrap()
}

fn sequential_dot(x: &[f64], y: &[f64]) -> f64 {
    x.iter().zip(y).map(|(a, b)| a * b).sum()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn partial_sums_add_up_for_any_partitioning(
        pairs in proptest::collection::vec((-100i32..100, -100i32..100), 0..64),
        parts in prop_oneof![Just(1usize), Just(2usize), Just(4usize)],
    ) {
        // integer-valued entries keep every partial sum exact
        let x: Vec<f64> = pairs.iter().map(|&(a, _)| f64::from(a)).collect();
        let y: Vec<f64> = pairs.iter().map(|&(_, b)| f64::from(b)).collect();
        let expected = sequential_dot(&x, &y);
        let got = distributed_dot(&x, &y, parts, false);
        prop_assert_eq!(got.len(), parts);
        for v in got {
            prop_assert_eq!(v, expected);
        }
    }
}

#[test]
fn squares_of_one_two_three() {
    let got = distributed_dot(&[1.0, 2.0, 3.0], &[], 1, true);
    assert_eq!(got, vec![14.0]);
}

#[test]
fn same_instance_is_bit_identical_to_general_path() {
    let mut rng = SmallRng::seed_from_u64(0x5eed);
    let x: Vec<f64> = (0..301).map(|_| rng.gen_range(-1.0..1.0)).collect();
    for parts in [1, 2, 4] {
        let squares = distributed_dot(&x, &[], parts, true);
        let general = distributed_dot(&x, &x, parts, false);
        for (a, b) in squares.iter().zip(&general) {
            assert_eq!(a.to_bits(), b.to_bits(), "P = {parts}");
        }
        // every partition receives the same bits
        assert!(squares.iter().all(|v| v.to_bits() == squares[0].to_bits()));
        // and the same partitioning reproduces them
        let again = distributed_dot(&x, &[], parts, true);
        assert_eq!(again[0].to_bits(), squares[0].to_bits());
    }
}

#[test]
#[serial]
fn reduction_time_accumulates_monotonically() {
    let world = World::<f64>::new(isolated(&[3, 3]), small_config()).unwrap();
    let start = Arc::new(Barrier::new(2));
    let times = world
        .run(|ctx, m| {
            let coll = ctx.collective::<f64>(ReduceOp::Sum);
            let x = Array::new(vec![1.0; 3]);
            let mut t = Duration::ZERO;
            let mut seen = Vec::new();
            start.wait();
            for round in 0..5 {
                if ctx.partition() == 1 && round == 0 {
                    std::thread::sleep(Duration::from_millis(50));
                }
                let d = compute_dot_product(ctx, m.local_rows(), &x, &x, &coll, &mut t);
                assert_eq!(d, 6.0);
                seen.push(t);
            }
            seen
        })
        .unwrap();
    for seen in &times {
        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{seen:?}");
    }
    // partition 0 spent the late partner's sleep inside the collective
    assert!(times[0][0] >= Duration::from_millis(10), "{:?}", times[0]);
}
