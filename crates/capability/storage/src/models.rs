//! 数据模型
//!
//! 定义存储接口使用的记录结构：
//! - 告警模型：NewAlarm, AlarmRecord, AlarmStatus
//! - 事件日志：EventLogRecord
//! - 通知记录：NotificationRecord

use domain::Severity;

/// 告警记录状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmStatus {
    Active,
    Cleared,
}

impl AlarmStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Cleared => "cleared",
        }
    }
}

/// 新建告警输入。
///
/// `alarm_id` 由调用方在写入前生成；`alarm_key` 作为幂等键，
/// 同一 key 已有活动告警时存储返回已有 ID。
#[derive(Debug, Clone)]
pub struct NewAlarm {
    pub alarm_id: String,
    pub alarm_key: String,
    pub data_point_id: String,
    pub device_id: String,
    pub station_id: String,
    pub severity: Severity,
    pub message: String,
    pub value: Option<f64>,
    pub threshold: Option<f64>,
    pub triggered_at_ms: i64,
}

/// 告警记录。
#[derive(Debug, Clone)]
pub struct AlarmRecord {
    pub alarm_id: String,
    pub alarm_key: String,
    pub data_point_id: String,
    pub device_id: String,
    pub station_id: String,
    pub severity: Severity,
    pub message: String,
    pub value: Option<f64>,
    pub threshold: Option<f64>,
    pub status: AlarmStatus,
    pub triggered_at_ms: i64,
    pub cleared_at_ms: Option<i64>,
}

impl AlarmRecord {
    pub fn from_new(alarm: NewAlarm) -> Self {
        Self {
            alarm_id: alarm.alarm_id,
            alarm_key: alarm.alarm_key,
            data_point_id: alarm.data_point_id,
            device_id: alarm.device_id,
            station_id: alarm.station_id,
            severity: alarm.severity,
            message: alarm.message,
            value: alarm.value,
            threshold: alarm.threshold,
            status: AlarmStatus::Active,
            triggered_at_ms: alarm.triggered_at_ms,
            cleared_at_ms: None,
        }
    }
}

/// 事件日志记录。
#[derive(Debug, Clone)]
pub struct EventLogRecord {
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub description: String,
    pub metadata: serde_json::Value,
    pub ts_ms: i64,
}

/// 通知记录。
#[derive(Debug, Clone)]
pub struct NotificationRecord {
    pub notification_id: String,
    pub alarm_id: String,
    pub severity: Severity,
    pub title: String,
    pub message: String,
    /// 实际尝试的外发渠道（email / sms / internal）
    pub channels: Vec<String>,
    pub created_at_ms: i64,
}
