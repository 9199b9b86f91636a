use async_trait::async_trait;
use domain::{
    AlarmEventKind, AlarmRule, ConnectionConfig, DataPointConfig, DeviceConfig, PointReading,
    Quality, Reading, ReadingBatch, RuleCondition, RuleScope, Severity,
};
use ems_alarm::{AlarmEngine, AlarmError, AlarmTrigger, spawn_alarm_worker};
use ems_storage::{
    AlarmRecord, AlarmStatus, AlarmStore, InMemoryAlarmRuleStore, InMemoryAlarmStore,
    InMemoryConnectionStore, InMemoryEventLogStore, NewAlarm, StorageError,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

struct Fixture {
    engine: Arc<AlarmEngine>,
    alarms: Arc<InMemoryAlarmStore>,
    rules: Arc<InMemoryAlarmRuleStore>,
    events: Arc<InMemoryEventLogStore>,
}

fn voltage_point() -> DataPointConfig {
    let mut point = DataPointConfig::new("p-v", "dev-1", 0);
    point.name = "voltage".to_string();
    point.scale_factor = Some(0.1);
    point.alarm_high = Some(240.0);
    point.warning_high = Some(230.0);
    point
}

type Parts = (
    Arc<AlarmEngine>,
    Arc<InMemoryAlarmRuleStore>,
    Arc<InMemoryEventLogStore>,
);

fn fixture_with_store(alarms: Arc<dyn AlarmStore>) -> Parts {
    let stations = Arc::new(InMemoryConnectionStore::new());
    stations
        .upsert_station(
            ConnectionConfig::tcp("st-1", "127.0.0.1", 502),
            vec![DeviceConfig {
                id: "dev-1".to_string(),
                station_id: "st-1".to_string(),
                name: String::new(),
                data_points: vec![voltage_point()],
            }],
        )
        .expect("seed station");
    let rules = Arc::new(InMemoryAlarmRuleStore::new());
    let events = Arc::new(InMemoryEventLogStore::new());
    let engine = Arc::new(AlarmEngine::new(
        alarms,
        rules.clone(),
        stations,
        events.clone(),
        64,
    ));
    (engine, rules, events)
}

fn fixture() -> Fixture {
    let alarms = Arc::new(InMemoryAlarmStore::new());
    let (engine, rules, events) = fixture_with_store(alarms.clone());
    Fixture {
        engine,
        alarms,
        rules,
        events,
    }
}

fn batch(station_id: &str, point: &DataPointConfig, value: f64) -> ReadingBatch {
    let mut batch = ReadingBatch::new(station_id, &point.device_id);
    batch.items.push(PointReading {
        reading: Reading {
            station_id: station_id.to_string(),
            device_id: point.device_id.clone(),
            data_point_id: point.id.clone(),
            raw_value: (value * 10.0) as i64,
            value,
            quality: Quality::Good,
            timestamp_ms: domain::now_epoch_ms(),
        },
        point: point.clone(),
    });
    batch
}

fn trigger(key: &str) -> AlarmTrigger {
    AlarmTrigger {
        alarm_key: key.to_string(),
        data_point_id: "p-v".to_string(),
        device_id: "dev-1".to_string(),
        station_id: "st-1".to_string(),
        severity: Severity::Warning,
        message: "manual".to_string(),
        value: Some(1.0),
        threshold: None,
    }
}

fn station_rule() -> AlarmRule {
    AlarmRule {
        id: "r-st".to_string(),
        name: "station over".to_string(),
        scope: RuleScope::Station("st-1".to_string()),
        condition: RuleCondition::Gt,
        threshold1: 100.0,
        threshold2: None,
        severity: Severity::Info,
        is_active: true,
    }
}

#[tokio::test]
async fn trigger_is_idempotent() {
    let f = fixture();
    let mut rx = f.engine.subscribe();

    let first = f.engine.trigger_alarm(trigger("k1")).await;
    let second = f.engine.trigger_alarm(trigger("k1")).await;
    assert!(first.is_some());
    assert!(second.is_none());

    assert_eq!(f.engine.active_alarm_keys().await, vec!["k1".to_string()]);
    assert_eq!(f.alarms.all().len(), 1);
    assert_eq!(rx.recv().await.expect("event").kind, AlarmEventKind::Triggered);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn clearing_absent_key_is_noop() {
    let f = fixture();
    let mut rx = f.engine.subscribe();
    assert!(f.engine.clear_alarm_if_exists("missing").await.is_none());
    assert!(rx.try_recv().is_err());
    assert!(f.events.list_by_type("alarm_cleared").is_empty());
}

#[tokio::test]
async fn trigger_then_clear_emits_in_order() {
    let f = fixture();
    let mut rx = f.engine.subscribe();

    let triggered = f.engine.trigger_alarm(trigger("k1")).await.expect("trigger");
    let cleared = f.engine.clear_alarm_if_exists("k1").await.expect("clear");
    assert_eq!(triggered.alarm_id, cleared.alarm_id);

    let kinds = vec![
        rx.recv().await.expect("first").kind,
        rx.recv().await.expect("second").kind,
    ];
    assert_eq!(kinds, vec![AlarmEventKind::Triggered, AlarmEventKind::Cleared]);

    let record = f.alarms.find(&triggered.alarm_id).expect("record");
    assert_eq!(record.status, AlarmStatus::Cleared);
    assert!(record.cleared_at_ms.is_some());
    assert_eq!(f.events.list_by_type("alarm_triggered").len(), 1);
    assert_eq!(f.events.list_by_type("alarm_cleared").len(), 1);
}

#[tokio::test]
async fn builtin_priority_keeps_single_alarm() {
    let f = fixture();
    let point = voltage_point();

    let events = f.engine.process_batch(&batch("st-1", &point, 245.0)).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].alarm_key, "builtin_p-v_high");
    assert_eq!(events[0].severity, Severity::Critical);
    assert_eq!(events[0].threshold, Some(240.0));

    // 持续越限不重复触发
    assert!(f.engine.process_batch(&batch("st-1", &point, 246.0)).await.is_empty());

    let events = f.engine.process_batch(&batch("st-1", &point, 225.0)).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, AlarmEventKind::Cleared);
    assert_eq!(events[0].alarm_key, "builtin_p-v_high");
    assert!(f.engine.active_alarm_keys().await.is_empty());
}

#[tokio::test]
async fn downgrade_keeps_critical_until_value_returns_to_normal() {
    let f = fixture();
    let point = voltage_point();

    f.engine.process_batch(&batch("st-1", &point, 250.0)).await;
    let events = f.engine.process_batch(&batch("st-1", &point, 235.0)).await;
    let summary: Vec<_> = events
        .iter()
        .map(|e| (e.kind, e.alarm_key.as_str()))
        .collect();
    assert_eq!(
        summary,
        vec![(AlarmEventKind::Triggered, "builtin_p-v_warning_high")]
    );
    assert_eq!(
        f.engine.active_alarm_keys().await,
        vec![
            "builtin_p-v_high".to_string(),
            "builtin_p-v_warning_high".to_string()
        ]
    );

    let events = f.engine.process_batch(&batch("st-1", &point, 220.0)).await;
    let summary: Vec<_> = events
        .iter()
        .map(|e| (e.kind, e.alarm_key.as_str()))
        .collect();
    assert_eq!(
        summary,
        vec![
            (AlarmEventKind::Cleared, "builtin_p-v_high"),
            (AlarmEventKind::Cleared, "builtin_p-v_warning_high"),
        ]
    );
    assert!(f.engine.active_alarm_keys().await.is_empty());
}

#[tokio::test]
async fn station_scoped_rule_only_matches_its_station() {
    let f = fixture();
    f.rules.upsert_rule(station_rule()).expect("rule");
    assert_eq!(f.engine.reload_rules().await.expect("reload"), 1);

    let mut point = voltage_point();
    point.alarm_high = None;
    point.warning_high = None;

    let events = f.engine.process_batch(&batch("st-2", &point, 150.0)).await;
    assert!(events.is_empty());

    let events = f.engine.process_batch(&batch("st-1", &point, 150.0)).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].alarm_key, "rule_r-st_p-v");
    assert_eq!(events[0].severity, Severity::Info);

    let events = f.engine.process_batch(&batch("st-1", &point, 50.0)).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, AlarmEventKind::Cleared);
}

#[tokio::test]
async fn condition_truth_table_through_engine() {
    let cases = [
        (RuleCondition::Gt, 10.0, None, 10.0, false),
        (RuleCondition::Gt, 10.0, None, 10.5, true),
        (RuleCondition::Lt, 10.0, None, 9.5, true),
        (RuleCondition::Eq, 10.0, None, 10.0, true),
        (RuleCondition::Ne, 10.0, None, 10.0, false),
        (RuleCondition::Between, 10.0, Some(20.0), 20.0, true),
        (RuleCondition::Between, 10.0, None, 15.0, false),
        (RuleCondition::Outside, 10.0, Some(20.0), 10.0, false),
        (RuleCondition::Outside, 10.0, Some(20.0), 20.5, true),
        (RuleCondition::Outside, 10.0, None, 50.0, false),
    ];
    let mut point = voltage_point();
    point.alarm_high = None;
    point.warning_high = None;

    for (condition, threshold1, threshold2, value, expected) in cases {
        let f = fixture();
        f.rules
            .upsert_rule(AlarmRule {
                id: "r".to_string(),
                name: String::new(),
                scope: RuleScope::Point("p-v".to_string()),
                condition,
                threshold1,
                threshold2,
                severity: Severity::Warning,
                is_active: true,
            })
            .expect("rule");
        f.engine.reload_rules().await.expect("reload");
        let events = f.engine.process_batch(&batch("st-1", &point, value)).await;
        assert_eq!(
            !events.is_empty(),
            expected,
            "{:?} {} {:?} at {}",
            condition,
            threshold1,
            threshold2,
            value
        );
    }
}

#[tokio::test]
async fn manual_check_does_not_mutate_state() {
    let f = fixture();
    let mut rx = f.engine.subscribe();

    let result = f.engine.manual_check("p-v", 245.0).await.expect("check");
    assert_eq!(result.station_id, "st-1");
    assert_eq!(result.triggered.len(), 1);
    assert_eq!(result.triggered[0].alarm_key, "builtin_p-v_high");
    assert!(result.cleared.is_empty());
    assert!(f.engine.active_alarm_keys().await.is_empty());
    assert!(f.alarms.all().is_empty());
    assert!(rx.try_recv().is_err());

    f.engine
        .process_batch(&batch("st-1", &voltage_point(), 245.0))
        .await;
    let result = f.engine.manual_check("p-v", 200.0).await.expect("check");
    assert!(result.triggered.is_empty());
    assert_eq!(result.cleared, vec!["builtin_p-v_high".to_string()]);
    assert_eq!(
        f.engine.active_alarm_keys().await,
        vec!["builtin_p-v_high".to_string()]
    );
}

#[tokio::test]
async fn manual_check_unknown_point() {
    let f = fixture();
    let err = f.engine.manual_check("nope", 1.0).await.expect_err("missing");
    assert!(matches!(err, AlarmError::PointNotFound(_)));
}

#[tokio::test]
async fn restore_rebuilds_active_map() {
    let alarms = Arc::new(InMemoryAlarmStore::new());
    alarms
        .create_alarm(NewAlarm {
            alarm_id: "a-1".to_string(),
            alarm_key: "builtin_p-v_high".to_string(),
            data_point_id: "p-v".to_string(),
            device_id: "dev-1".to_string(),
            station_id: "st-1".to_string(),
            severity: Severity::Critical,
            message: "restored".to_string(),
            value: Some(250.0),
            threshold: Some(240.0),
            triggered_at_ms: 1,
        })
        .await
        .expect("seed alarm");
    let (engine, _, _) = fixture_with_store(alarms.clone());

    assert_eq!(engine.restore_active_alarms().await.expect("restore"), 1);
    assert!(engine.trigger_alarm(trigger("builtin_p-v_high")).await.is_none());

    let event = engine
        .process_batch(&batch("st-1", &voltage_point(), 220.0))
        .await
        .pop()
        .expect("cleared");
    assert_eq!(event.alarm_id, "a-1");
    assert_eq!(
        alarms.find("a-1").expect("record").status,
        AlarmStatus::Cleared
    );
}

struct FailingAlarmStore;

#[async_trait]
impl AlarmStore for FailingAlarmStore {
    async fn create_alarm(&self, _alarm: NewAlarm) -> Result<String, StorageError> {
        Err(StorageError::new("database unavailable"))
    }

    async fn update_alarm_status(
        &self,
        _alarm_id: &str,
        _status: AlarmStatus,
        _ts_ms: i64,
    ) -> Result<bool, StorageError> {
        Err(StorageError::new("database unavailable"))
    }

    async fn list_active_alarms(&self) -> Result<Vec<AlarmRecord>, StorageError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn persist_failure_still_tracks_and_emits() {
    let (engine, _, _) = fixture_with_store(Arc::new(FailingAlarmStore));
    let mut rx = engine.subscribe();

    let event = engine.trigger_alarm(trigger("k1")).await.expect("trigger");
    assert!(!event.alarm_id.is_empty());
    assert_eq!(engine.active_alarm_keys().await, vec!["k1".to_string()]);
    assert!(engine.trigger_alarm(trigger("k1")).await.is_none());

    assert!(engine.clear_alarm_if_exists("k1").await.is_some());
    assert_eq!(rx.recv().await.expect("triggered").kind, AlarmEventKind::Triggered);
    assert_eq!(rx.recv().await.expect("cleared").kind, AlarmEventKind::Cleared);
}

#[tokio::test]
async fn worker_consumes_batches_in_order() {
    let f = fixture();
    let mut rx = f.engine.subscribe();
    let (tx, readings_rx) = mpsc::channel(8);
    let worker = spawn_alarm_worker(f.engine.clone(), readings_rx);

    let point = voltage_point();
    for value in [245.0, 225.0, 245.0] {
        tx.send(batch("st-1", &point, value)).await.expect("send");
    }
    drop(tx);
    tokio::time::timeout(Duration::from_secs(2), worker)
        .await
        .expect("worker exits")
        .expect("join");

    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        kinds.push(event.kind);
    }
    assert_eq!(
        kinds,
        vec![
            AlarmEventKind::Triggered,
            AlarmEventKind::Cleared,
            AlarmEventKind::Triggered
        ]
    );
    assert_eq!(f.alarms.all().len(), 2);
}
