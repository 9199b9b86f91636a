//! 告警引擎
//!
//! 活动告警表以 `alarm_key` 为键。触发与清除在持有表锁期间完成持久化和事件发布，
//! 同一个键不会被并发路径重复触发。

use crate::AlarmError;
use crate::evaluate::{AlarmCandidate, Transition, evaluate};
use domain::{AlarmEvent, AlarmEventKind, AlarmRule, ReadingBatch, Severity, now_epoch_ms};
use ems_storage::{
    AlarmRuleStore, AlarmStatus, AlarmStore, DataPointStore, EventLogRecord, EventLogStore,
    NewAlarm,
};
use ems_telemetry::{record_alarm_cleared, record_alarm_persist_failure, record_alarm_triggered};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 告警触发请求。
#[derive(Debug, Clone)]
pub struct AlarmTrigger {
    pub alarm_key: String,
    pub data_point_id: String,
    pub device_id: String,
    pub station_id: String,
    pub severity: Severity,
    pub message: String,
    pub value: Option<f64>,
    pub threshold: Option<f64>,
}

/// 手动检查结果（不改变任何状态）。
#[derive(Debug, Clone)]
pub struct ManualCheckResult {
    pub data_point_id: String,
    pub station_id: String,
    pub value: f64,
    /// 条件成立的告警（含已处于活动状态的）
    pub triggered: Vec<AlarmCandidate>,
    /// 当前活动、且会被本值清除的告警键
    pub cleared: Vec<String>,
}

#[derive(Debug, Clone)]
struct ActiveAlarm {
    alarm_id: String,
    data_point_id: String,
    device_id: String,
    station_id: String,
    severity: Severity,
}

/// 告警引擎。
pub struct AlarmEngine {
    rules: RwLock<Arc<Vec<AlarmRule>>>,
    active: Mutex<HashMap<String, ActiveAlarm>>,
    alarm_store: Arc<dyn AlarmStore>,
    rule_store: Arc<dyn AlarmRuleStore>,
    point_store: Arc<dyn DataPointStore>,
    event_log: Arc<dyn EventLogStore>,
    events_tx: broadcast::Sender<AlarmEvent>,
}

impl AlarmEngine {
    pub fn new(
        alarm_store: Arc<dyn AlarmStore>,
        rule_store: Arc<dyn AlarmRuleStore>,
        point_store: Arc<dyn DataPointStore>,
        event_log: Arc<dyn EventLogStore>,
        event_capacity: usize,
    ) -> Self {
        let (events_tx, _) = broadcast::channel(event_capacity.max(1));
        Self {
            rules: RwLock::new(Arc::new(Vec::new())),
            active: Mutex::new(HashMap::new()),
            alarm_store,
            rule_store,
            point_store,
            event_log,
            events_tx,
        }
    }

    /// 订阅告警事件（落后的订阅方丢弃最旧事件）。
    pub fn subscribe(&self) -> broadcast::Receiver<AlarmEvent> {
        self.events_tx.subscribe()
    }

    /// 从规则源重新加载规则，整体替换。返回生效规则数。
    pub async fn reload_rules(&self) -> Result<usize, AlarmError> {
        let rules: Vec<AlarmRule> = self
            .rule_store
            .list_active_rules()
            .await?
            .into_iter()
            .filter(|rule| rule.is_active)
            .collect();
        let count = rules.len();
        *self.rules.write().await = Arc::new(rules);
        info!(target: "ems.alarm", rules = count, "alarm_rules_reloaded");
        Ok(count)
    }

    pub async fn rules(&self) -> Arc<Vec<AlarmRule>> {
        self.rules.read().await.clone()
    }

    /// 活动告警键快照（已排序）。
    pub async fn active_alarm_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.active.lock().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// 启动时从告警存储重建活动告警表。返回恢复条数。
    pub async fn restore_active_alarms(&self) -> Result<usize, AlarmError> {
        let records = self.alarm_store.list_active_alarms().await?;
        let mut active = self.active.lock().await;
        let mut restored = 0;
        for record in records {
            if active.contains_key(&record.alarm_key) {
                continue;
            }
            active.insert(
                record.alarm_key,
                ActiveAlarm {
                    alarm_id: record.alarm_id,
                    data_point_id: record.data_point_id,
                    device_id: record.device_id,
                    station_id: record.station_id,
                    severity: record.severity,
                },
            );
            restored += 1;
        }
        info!(target: "ems.alarm", restored = restored, "active_alarms_restored");
        Ok(restored)
    }

    /// 处理一个设备批次，返回产生的告警事件（按读数顺序）。
    pub async fn process_batch(&self, batch: &ReadingBatch) -> Vec<AlarmEvent> {
        let rules = self.rules().await;
        let mut events = Vec::new();
        for item in &batch.items {
            let reading = &item.reading;
            for transition in evaluate(&item.point, &reading.station_id, reading.value, &rules) {
                let event = match transition {
                    Transition::Trigger(candidate) => {
                        self.trigger_alarm(AlarmTrigger {
                            alarm_key: candidate.alarm_key,
                            data_point_id: reading.data_point_id.clone(),
                            device_id: reading.device_id.clone(),
                            station_id: reading.station_id.clone(),
                            severity: candidate.severity,
                            message: candidate.message,
                            value: Some(reading.value),
                            threshold: candidate.threshold,
                        })
                        .await
                    }
                    Transition::Clear(key) => self.clear(&key, Some(reading.value)).await,
                };
                events.extend(event);
            }
        }
        events
    }

    /// 触发告警；同一键已活动时为空操作并返回 `None`。
    ///
    /// 持久化失败只记录日志和计数，内存状态照常更新，事件照常发布。
    pub async fn trigger_alarm(&self, alarm: AlarmTrigger) -> Option<AlarmEvent> {
        let mut active = self.active.lock().await;
        if active.contains_key(&alarm.alarm_key) {
            return None;
        }

        let timestamp_ms = now_epoch_ms();
        let proposed_id = uuid::Uuid::new_v4().to_string();
        let alarm_id = match self
            .alarm_store
            .create_alarm(NewAlarm {
                alarm_id: proposed_id.clone(),
                alarm_key: alarm.alarm_key.clone(),
                data_point_id: alarm.data_point_id.clone(),
                device_id: alarm.device_id.clone(),
                station_id: alarm.station_id.clone(),
                severity: alarm.severity,
                message: alarm.message.clone(),
                value: alarm.value,
                threshold: alarm.threshold,
                triggered_at_ms: timestamp_ms,
            })
            .await
        {
            Ok(alarm_id) => alarm_id,
            Err(err) => {
                record_alarm_persist_failure();
                warn!(
                    target: "ems.alarm",
                    alarm_key = %alarm.alarm_key,
                    error = %err,
                    "alarm_persist_failed"
                );
                proposed_id
            }
        };

        active.insert(
            alarm.alarm_key.clone(),
            ActiveAlarm {
                alarm_id: alarm_id.clone(),
                data_point_id: alarm.data_point_id.clone(),
                device_id: alarm.device_id.clone(),
                station_id: alarm.station_id.clone(),
                severity: alarm.severity,
            },
        );

        let event = AlarmEvent {
            kind: AlarmEventKind::Triggered,
            alarm_id,
            alarm_key: alarm.alarm_key,
            data_point_id: alarm.data_point_id,
            device_id: alarm.device_id,
            station_id: alarm.station_id,
            severity: alarm.severity,
            message: alarm.message,
            value: alarm.value,
            threshold: alarm.threshold,
            timestamp_ms,
        };
        record_alarm_triggered();
        info!(
            target: "ems.alarm",
            alarm_key = %event.alarm_key,
            alarm_id = %event.alarm_id,
            severity = event.severity.as_str(),
            value = ?event.value,
            "alarm_triggered"
        );
        self.publish(&event);
        drop(active);

        self.log_event(&event).await;
        Some(event)
    }

    /// 清除告警；不存在时为空操作并返回 `None`。
    pub async fn clear_alarm_if_exists(&self, alarm_key: &str) -> Option<AlarmEvent> {
        self.clear(alarm_key, None).await
    }

    async fn clear(&self, alarm_key: &str, value: Option<f64>) -> Option<AlarmEvent> {
        let mut active = self.active.lock().await;
        let alarm = active.remove(alarm_key)?;

        let timestamp_ms = now_epoch_ms();
        match self
            .alarm_store
            .update_alarm_status(&alarm.alarm_id, AlarmStatus::Cleared, timestamp_ms)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                debug!(
                    target: "ems.alarm",
                    alarm_key = %alarm_key,
                    alarm_id = %alarm.alarm_id,
                    "alarm_record_missing"
                );
            }
            Err(err) => {
                record_alarm_persist_failure();
                warn!(
                    target: "ems.alarm",
                    alarm_key = %alarm_key,
                    error = %err,
                    "alarm_persist_failed"
                );
            }
        }

        let event = AlarmEvent {
            kind: AlarmEventKind::Cleared,
            alarm_id: alarm.alarm_id,
            alarm_key: alarm_key.to_string(),
            data_point_id: alarm.data_point_id,
            device_id: alarm.device_id,
            station_id: alarm.station_id,
            severity: alarm.severity,
            message: format!("{} cleared", alarm_key),
            value,
            threshold: None,
            timestamp_ms,
        };
        record_alarm_cleared();
        info!(
            target: "ems.alarm",
            alarm_key = %event.alarm_key,
            alarm_id = %event.alarm_id,
            "alarm_cleared"
        );
        self.publish(&event);
        drop(active);

        self.log_event(&event).await;
        Some(event)
    }

    /// 手动检查：与实时链路相同的判定，不修改活动表、不发布事件。
    pub async fn manual_check(
        &self,
        data_point_id: &str,
        value: f64,
    ) -> Result<ManualCheckResult, AlarmError> {
        let context = self
            .point_store
            .find_data_point(data_point_id)
            .await?
            .ok_or_else(|| AlarmError::PointNotFound(data_point_id.to_string()))?;
        let rules = self.rules().await;
        let transitions = evaluate(&context.point, &context.station_id, value, &rules);

        let active = self.active.lock().await;
        let mut triggered = Vec::new();
        let mut cleared = Vec::new();
        for transition in transitions {
            match transition {
                Transition::Trigger(candidate) => triggered.push(candidate),
                Transition::Clear(key) if active.contains_key(&key) => cleared.push(key),
                Transition::Clear(_) => {}
            }
        }
        Ok(ManualCheckResult {
            data_point_id: data_point_id.to_string(),
            station_id: context.station_id,
            value,
            triggered,
            cleared,
        })
    }

    fn publish(&self, event: &AlarmEvent) {
        // 没有订阅方时发送失败，忽略即可
        let _ = self.events_tx.send(event.clone());
    }

    async fn log_event(&self, event: &AlarmEvent) {
        let event_type = match event.kind {
            AlarmEventKind::Triggered => "alarm_triggered",
            AlarmEventKind::Cleared => "alarm_cleared",
        };
        let record = EventLogRecord {
            event_type: event_type.to_string(),
            entity_type: "data_point".to_string(),
            entity_id: event.data_point_id.clone(),
            description: event.message.clone(),
            metadata: serde_json::json!({
                "alarm_id": event.alarm_id,
                "alarm_key": event.alarm_key,
                "severity": event.severity.as_str(),
                "value": event.value,
                "threshold": event.threshold,
            }),
            ts_ms: event.timestamp_ms,
        };
        if let Err(err) = self.event_log.log_event(record).await {
            warn!(
                target: "ems.alarm",
                alarm_key = %event.alarm_key,
                error = %err,
                "alarm_event_log_failed"
            );
        }
    }
}

/// 启动告警工作任务：按到达顺序消费读数批次，通道关闭后退出。
pub fn spawn_alarm_worker(
    engine: Arc<AlarmEngine>,
    mut readings_rx: mpsc::Receiver<ReadingBatch>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(batch) = readings_rx.recv().await {
            let events = engine.process_batch(&batch).await;
            if !events.is_empty() {
                debug!(
                    target: "ems.alarm",
                    station_id = %batch.station_id,
                    device_id = %batch.device_id,
                    events = events.len(),
                    "alarm_batch_processed"
                );
            }
        }
        info!(target: "ems.alarm", "alarm_worker_stopped");
    })
}
