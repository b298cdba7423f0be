mod util;

use spmd_halo::prelude::*;
use util::*;

#[test]
fn runtime_config_json_round_trip() {
    let cfg = RuntimeConfig {
        worker_threads: Some(3),
        thread_name_prefix: "solver".into(),
        barrier_discipline: BarrierDiscipline::SkipDoneWait,
    };
    let json = serde_json::to_string(&cfg).unwrap();
    assert!(json.contains("\"skip-done-wait\""), "{json}");
    let back: RuntimeConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back, cfg);
}

#[test]
fn missing_fields_take_defaults() {
    let cfg: RuntimeConfig = serde_json::from_str(r#"{ "worker_threads": 2 }"#).unwrap();
    assert_eq!(cfg.worker_threads, Some(2));
    assert_eq!(cfg.thread_name_prefix, "halo");
    assert_eq!(cfg.barrier_discipline, BarrierDiscipline::Enforced);
}

#[test]
fn world_rejects_invalid_runtime_config() {
    let cfg = RuntimeConfig {
        worker_threads: Some(0),
        ..RuntimeConfig::default()
    };
    assert!(matches!(
        World::<f64>::new(two_partition_example(), cfg),
        Err(HaloError::InvalidConfig(_))
    ));
}

#[test]
fn descriptors_load_from_json() {
    let json = serde_json::to_string(&two_partition_example()).unwrap();
    let descriptors: Vec<MatrixDescriptor> = serde_json::from_str(&json).unwrap();
    assert_eq!(descriptors, two_partition_example());
    let world = World::<f64>::new(descriptors, small_config()).unwrap();
    assert_eq!(world.len(), 2);
}

#[test]
fn inconsistent_descriptors_from_json_are_rejected() {
    let mut descriptors = two_partition_example();
    descriptors[1].receive_lengths[0] = 3;
    let json = serde_json::to_string(&descriptors).unwrap();
    let loaded: Vec<MatrixDescriptor> = serde_json::from_str(&json).unwrap();
    let err = World::<f64>::new(loaded, small_config()).unwrap_err();
    assert!(matches!(
        err,
        HaloError::Configuration(ConfigurationError::ContributionMismatch {
            partition: 1,
            neighbor: 0,
            expected: 3,
            provided: 2
        })
    ));
    assert!(err.to_string().contains("expects 3 values from neighbor 0"));
}
