use domain::{
    AlarmRule, ConnectionConfig, DataPointConfig, Protocol, RegisterType, RuleCondition,
    RuleScope, Severity,
};
use proptest::prelude::*;

#[test]
fn scaling_applies_factor_and_offset() {
    let mut point = DataPointConfig::new("dp-1", "dev-1", 0);
    point.scale_factor = Some(0.1);
    point.offset = Some(-5.0);

    let value = point.convert(2300);
    assert!((value - 225.0).abs() < 1e-9);
}

#[test]
fn scaling_defaults_to_identity() {
    let point = DataPointConfig::new("dp-1", "dev-1", 0);
    assert_eq!(point.convert(1234), 1234.0);
    assert_eq!(point.convert(-7), -7.0);
}

proptest! {
    #[test]
    fn scaling_matches_linear_formula(
        raw in -32_768i64..=65_535,
        scale in -1_000.0f64..1_000.0,
        offset in -1.0e6f64..1.0e6,
    ) {
        let mut point = DataPointConfig::new("dp-1", "dev-1", 0);
        point.scale_factor = Some(scale);
        point.offset = Some(offset);

        let expected = raw as f64 * scale + offset;
        let tolerance = 1e-9 * expected.abs().max(1.0);
        prop_assert!((point.convert(raw) - expected).abs() <= tolerance);
    }

    #[test]
    fn missing_scale_and_offset_is_identity(raw in any::<i32>()) {
        let point = DataPointConfig::new("dp-1", "dev-1", 0);
        prop_assert_eq!(point.convert(raw as i64), raw as f64);
    }
}

#[test]
fn condition_truth_table() {
    assert!(RuleCondition::Gt.evaluate(10.1, 10.0, None));
    assert!(!RuleCondition::Gt.evaluate(10.0, 10.0, None));
    assert!(RuleCondition::Lt.evaluate(9.9, 10.0, None));
    assert!(!RuleCondition::Lt.evaluate(10.0, 10.0, None));
    assert!(RuleCondition::Eq.evaluate(10.0, 10.0, None));
    assert!(!RuleCondition::Eq.evaluate(10.5, 10.0, None));
    assert!(RuleCondition::Ne.evaluate(10.5, 10.0, None));
    assert!(!RuleCondition::Ne.evaluate(10.0, 10.0, None));
}

#[test]
fn between_and_outside_boundaries() {
    let between = RuleCondition::Between;
    assert!(between.evaluate(10.0, 10.0, Some(20.0)));
    assert!(between.evaluate(20.0, 10.0, Some(20.0)));
    assert!(!between.evaluate(9.99, 10.0, Some(20.0)));
    assert!(!between.evaluate(20.01, 10.0, Some(20.0)));

    let outside = RuleCondition::Outside;
    assert!(!outside.evaluate(10.0, 10.0, Some(20.0)));
    assert!(!outside.evaluate(20.0, 10.0, Some(20.0)));
    assert!(outside.evaluate(9.99, 10.0, Some(20.0)));
    assert!(outside.evaluate(20.01, 10.0, Some(20.0)));
}

#[test]
fn range_conditions_without_upper_bound_never_trigger() {
    for value in [-1000.0, 0.0, 10.0, 1000.0] {
        assert!(!RuleCondition::Between.evaluate(value, 10.0, None));
        assert!(!RuleCondition::Outside.evaluate(value, 10.0, None));
    }
}

#[test]
fn scope_from_fields_picks_most_specific() {
    let scope = RuleScope::from_fields(
        Some("dp-1".to_string()),
        Some("dev-1".to_string()),
        Some("st-1".to_string()),
    );
    assert_eq!(scope, RuleScope::Point("dp-1".to_string()));

    let scope = RuleScope::from_fields(None, None, Some("st-1".to_string()));
    assert_eq!(scope, RuleScope::Station("st-1".to_string()));
    assert!(scope.applies_to("any-point", "any-device", "st-1"));
    assert!(!scope.applies_to("any-point", "any-device", "st-2"));

    assert_eq!(RuleScope::from_fields(None, None, None), RuleScope::Global);
}

#[test]
fn rule_parses_from_json() {
    let json = r#"{
        "id": "r1",
        "scope": {"station": "st-1"},
        "condition": "OUTSIDE",
        "threshold1": 49.5,
        "threshold2": 50.5,
        "severity": "critical"
    }"#;
    let rule: AlarmRule = serde_json::from_str(json).expect("rule json");
    assert_eq!(rule.scope, RuleScope::Station("st-1".to_string()));
    assert_eq!(rule.condition, RuleCondition::Outside);
    assert_eq!(rule.severity, Severity::Critical);
    assert!(rule.is_active);
    assert_eq!(rule.alarm_key("dp-9"), "rule_r1_dp-9");
}

#[test]
fn connection_config_defaults_from_json() {
    let json = r#"{"station_id": "st-1", "host": "10.0.0.5", "port": 502}"#;
    let config: ConnectionConfig = serde_json::from_str(json).expect("connection json");
    assert_eq!(config.protocol, Protocol::Tcp);
    assert_eq!(config.unit_id, 1);
    assert!(config.enabled);
    assert_eq!(config.timeout_ms, 3000);

    let point: DataPointConfig =
        serde_json::from_str(r#"{"id": "dp-1", "device_id": "dev-1", "register_address": 4}"#)
            .expect("point json");
    assert_eq!(point.register_type, RegisterType::Holding);
    assert!(point.is_active);
}
