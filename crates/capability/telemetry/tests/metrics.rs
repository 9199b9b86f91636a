use ems_telemetry::{metrics, new_tick_id, record_events_lagged, record_tick};

#[test]
fn tick_ids_are_unique() {
    let a = new_tick_id();
    let b = new_tick_id();
    assert!(!a.is_empty());
    assert_ne!(a, b);
}

#[test]
fn counters_accumulate() {
    let before = metrics().snapshot();
    record_tick(12);
    record_events_lagged(3);
    let after = metrics().snapshot();
    assert!(after.ticks > before.ticks);
    assert!(after.tick_latency_ms_total >= before.tick_latency_ms_total + 12);
    assert!(after.events_lagged >= before.events_lagged + 3);
}
