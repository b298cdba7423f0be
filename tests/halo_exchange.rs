mod util;

use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serial_test::serial;
use spmd_halo::prelude::*;
use util::*;

#[test]
fn two_partitions_exchange_boundary_values() {
    let world = World::<f64>::new(two_partition_example(), small_config()).unwrap();
    let out = world
        .run(|ctx, m| {
            let owned: Vec<f64> = match ctx.partition() {
                0 => vec![1.0, 2.0, 3.0, 4.0],
                _ => vec![10.0, 20.0],
            };
            let mut x = Array::new(owned.clone());
            exchange_halo(ctx, m, &mut x).unwrap();
            let nid = m.neighbors()[0];
            assert_eq!(x.values(), owned.as_slice(), "owned entries must not change");
            x.ghost_values(nid).unwrap()
        })
        .unwrap();
    assert_eq!(out[1], vec![3.0, 4.0]);
    assert_eq!(out[0], vec![10.0]);
}

#[test]
fn ring_of_four_sees_both_neighbors() {
    let (parts, rows) = (4, 5);
    let world = World::<f64>::new(ring(parts, rows), small_config()).unwrap();
    world
        .run(|ctx, m| {
            let p = ctx.partition();
            let left = (p + parts - 1) % parts;
            let right = (p + 1) % parts;

            let mut x = Array::zeros(rows + 2);
            x.values_mut()[..rows].copy_from_slice(&owned_values(p, rows, 1));
            exchange_halo(ctx, m, &mut x).unwrap();

            // left neighbor sends us its last row, right neighbor its first
            assert_eq!(x.ghost_values(left).unwrap(), vec![tagged(left, rows - 1, 1)]);
            assert_eq!(x.ghost_values(right).unwrap(), vec![tagged(right, 0, 1)]);

            x.map_externals(rows);
            assert_eq!(
                &x.values()[rows..],
                &[tagged(left, rows - 1, 1), tagged(right, 0, 1)]
            );
            assert_eq!(ctx.tasks_issued(), 2);
        })
        .unwrap();
}

#[test]
#[serial]
fn enforced_discipline_never_observes_stale_or_torn_data() {
    let (parts, rows, rounds) = (4, 8, 200);
    let mut descriptors = ring(parts, rows);
    // widen every send set so a torn copy would mix rounds
    for d in &mut descriptors {
        let (l, r) = (d.neighbors[0], d.neighbors[1]);
        *d = MatrixDescriptor::new(d.partition, rows)
            .with_neighbor(l, vec![0, 1, 2], 3)
            .with_neighbor(r, vec![5, 6, 7], 3);
    }
    let world = World::<f64>::new(descriptors, small_config()).unwrap();
    world
        .run(|ctx, m| {
            let mut rng = SmallRng::seed_from_u64(ctx.partition() as u64);
            let mut x = Array::zeros(rows);
            for round in 1..=rounds {
                if rng.gen_ratio(1, 8) {
                    std::thread::sleep(Duration::from_micros(rng.gen_range(0..500)));
                }
                x.values_mut()
                    .copy_from_slice(&owned_values(ctx.partition(), rows, round));
                exchange_halo(ctx, m, &mut x).unwrap();
                for &nid in m.neighbors() {
                    let ghost = x.ghost_values(nid).unwrap();
                    assert_eq!(ghost.len(), 3);
                    for v in ghost {
                        assert_eq!(
                            round_of(v),
                            round,
                            "partition {} saw round {} data from {nid} in round {round}",
                            ctx.partition(),
                            round_of(v)
                        );
                    }
                }
            }
        })
        .unwrap();
}

#[test]
fn several_arrays_share_one_matrix() {
    let world = World::<f64>::new(two_partition_example(), small_config()).unwrap();
    world
        .run(|ctx, m| {
            let p = ctx.partition();
            let rows = m.local_rows();
            let nid = m.neighbors()[0];
            let mut x = Array::new(owned_values(p, rows, 1));
            let mut y = Array::new(owned_values(p, rows, 2));
            exchange_halo(ctx, m, &mut x).unwrap();
            exchange_halo(ctx, m, &mut y).unwrap();
            let gx = x.ghost_values(nid).unwrap();
            let gy = y.ghost_values(nid).unwrap();
            assert!(gx.iter().all(|&v| round_of(v) == 1));
            assert!(gy.iter().all(|&v| round_of(v) == 2));
            assert_eq!(gx.len(), gy.len());
        })
        .unwrap();
}

#[test]
fn unwired_matrix_fails_before_any_barrier_moves() {
    let world = World::<f64>::new(two_partition_example(), small_config()).unwrap();
    let (ctx, wired) = world.into_partitions().remove(1).into_parts();
    let mut x = Array::new(vec![10.0, 20.0]);
    ensure_ghosts(&ctx, &mut x, &wired).unwrap();

    // same neighbor ids, but no ghost sources or barrier links
    let detached = SparseMatrix::<f64>::detached(wired.descriptor().clone());
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        exchange_halo(&ctx, &detached, &mut x)
    }));
    let payload = outcome.expect_err("missing wiring must be fatal");
    let msg = payload
        .downcast_ref::<String>()
        .cloned()
        .unwrap_or_default();
    assert!(msg.contains("no ghost source for neighbor 0"), "{msg}");

    let syncs = detached.lock_synchronizers();
    assert_eq!(syncs.mine.ready.generation(), 0);
    assert_eq!(syncs.mine.done.generation(), 0);
    assert!(!syncs.mine.ready.has_triggered());
    assert!(detached.pull_buffer().read().iter().all(|&v| v == 0.0));
    assert_eq!(ctx.tasks_issued(), 0);
}

#[test]
#[should_panic(expected = "shadow container")]
fn shadow_from_another_matrix_is_fatal() {
    // same neighbor ids, different receive sizes
    let big = World::<f64>::new(two_partition_example(), small_config()).unwrap();
    let small = World::<f64>::new(
        vec![
            MatrixDescriptor::new(0, 4).with_neighbor(1, vec![2], 2),
            MatrixDescriptor::new(1, 2).with_neighbor(0, vec![0, 1], 1),
        ],
        small_config(),
    )
    .unwrap();
    let (ctx, small_m) = small.into_partitions().remove(1).into_parts();
    let mut x = Array::zeros(2);
    ensure_ghosts(&ctx, &mut x, &small_m).unwrap();
    assert_eq!(x.ghosts().unwrap().get(0).unwrap().len(), 1);

    let (big_ctx, big_m) = big.into_partitions().remove(1).into_parts();
    let _ = exchange_halo(&big_ctx, &big_m, &mut x);
}
