//! 告警记录内存实现

use crate::error::StorageError;
use crate::models::{AlarmRecord, AlarmStatus, NewAlarm};
use crate::traits::AlarmStore;
use std::sync::RwLock;

/// 告警内存存储
#[derive(Default)]
pub struct InMemoryAlarmStore {
    alarms: RwLock<Vec<AlarmRecord>>,
}

impl InMemoryAlarmStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 全部告警记录（含已恢复，用于测试）
    pub fn all(&self) -> Vec<AlarmRecord> {
        self.alarms.read().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn find(&self, alarm_id: &str) -> Option<AlarmRecord> {
        self.alarms
            .read()
            .ok()?
            .iter()
            .find(|a| a.alarm_id == alarm_id)
            .cloned()
    }
}

#[async_trait::async_trait]
impl AlarmStore for InMemoryAlarmStore {
    async fn create_alarm(&self, alarm: NewAlarm) -> Result<String, StorageError> {
        let mut alarms = self
            .alarms
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        if let Some(existing) = alarms
            .iter()
            .find(|a| a.alarm_key == alarm.alarm_key && a.status == AlarmStatus::Active)
        {
            return Ok(existing.alarm_id.clone());
        }
        let alarm_id = alarm.alarm_id.clone();
        alarms.push(AlarmRecord::from_new(alarm));
        Ok(alarm_id)
    }

    async fn update_alarm_status(
        &self,
        alarm_id: &str,
        status: AlarmStatus,
        ts_ms: i64,
    ) -> Result<bool, StorageError> {
        let mut alarms = self
            .alarms
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let Some(record) = alarms.iter_mut().find(|a| a.alarm_id == alarm_id) else {
            return Ok(false);
        };
        record.status = status;
        record.cleared_at_ms = match status {
            AlarmStatus::Cleared => Some(ts_ms),
            AlarmStatus::Active => None,
        };
        Ok(true)
    }

    async fn list_active_alarms(&self) -> Result<Vec<AlarmRecord>, StorageError> {
        let alarms = self
            .alarms
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(alarms
            .iter()
            .filter(|a| a.status == AlarmStatus::Active)
            .cloned()
            .collect())
    }
}
