use super::*;

#[test]
fn defaults_match_classic_limits() {
    let config = VmConfig::default();
    assert_eq!(config.stack_capacity, 1000);
    assert_eq!(config.frame_capacity, 512);
    assert!((config.epsilon - 1e-11).abs() < f64::EPSILON);
    assert_eq!(config.template_nesting, 20);
    assert_eq!(config.object_context_depth, 10);
    assert_eq!(config.fault_policy, FaultPolicy::Recover);
}

#[test]
fn mode_policies() {
    assert!(ExecMode::Interactive.shows_messages());
    assert!(!ExecMode::Interactive.stops_on_fault());
    assert!(ExecMode::Batch.stops_on_fault());
    assert!(!ExecMode::Embedded.shows_messages());
}

#[test]
fn builders_clamp_zero_sizes() {
    let config = VmConfig::for_mode(ExecMode::Embedded)
        .with_defer_slots(0)
        .with_segment_count(0)
        .with_frame_capacity(8);
    assert_eq!(config.mode, ExecMode::Embedded);
    assert_eq!(config.defer_slots, 1);
    assert_eq!(config.segment_count, 1);
    assert_eq!(config.frame_capacity, 8);
}
