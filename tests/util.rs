#![allow(dead_code)]
use spmd_halo::prelude::*;

/// Partition 0 owns four rows and sends its last two to partition 1;
/// partition 1 owns two rows and sends its first back.
pub fn two_partition_example() -> Vec<MatrixDescriptor> {
    vec![
        MatrixDescriptor::new(0, 4).with_neighbor(1, vec![2, 3], 1),
        MatrixDescriptor::new(1, 2).with_neighbor(0, vec![0], 2),
    ]
}

/// `parts` partitions of `rows` rows each on a ring. Every partition sends its
/// first row to the left neighbor and its last row to the right one.
pub fn ring(parts: usize, rows: usize) -> Vec<MatrixDescriptor> {
    assert!(parts >= 3 && rows >= 2, "ring needs distinct left/right neighbors");
    (0..parts)
        .map(|p| {
            let left = (p + parts - 1) % parts;
            let right = (p + 1) % parts;
            MatrixDescriptor::new(p, rows)
                .with_neighbor(left, vec![0], 1)
                .with_neighbor(right, vec![rows - 1], 1)
        })
        .collect()
}

/// Descriptors for partitions that never exchange, one per entry of `rows`.
pub fn isolated(rows: &[usize]) -> Vec<MatrixDescriptor> {
    rows.iter()
        .enumerate()
        .map(|(p, &n)| MatrixDescriptor::new(p, n))
        .collect()
}

/// Owned value of row `i` on partition `p` during `round`. Every value is
/// unique across partitions, rows and rounds.
pub fn tagged(p: usize, i: usize, round: usize) -> f64 {
    (round * 1_000_000 + p * 1_000 + i) as f64
}

/// Round a tagged value was written in.
pub fn round_of(v: f64) -> usize {
    (v as usize) / 1_000_000
}

pub fn owned_values(p: usize, rows: usize, round: usize) -> Vec<f64> {
    (0..rows).map(|i| tagged(p, i, round)).collect()
}

/// Runtime config with a small worker pool for tests.
pub fn small_config() -> RuntimeConfig {
    RuntimeConfig {
        worker_threads: Some(2),
        ..RuntimeConfig::default()
    }
}
