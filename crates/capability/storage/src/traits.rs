//! 存储接口 Trait 定义
//!
//! 定义采集与告警核心依赖的外部协作方接口：
//! - ReadingStore：读数持久化
//! - AlarmStore：告警记录
//! - EventLogStore：事件日志
//! - NotificationStore：通知记录
//! - ConnectionStore：站点连接配置源
//! - AlarmRuleStore：自定义告警规则源
//! - DataPointStore：点位反查
//!
//! 设计原则：
//! - 所有接口返回 StorageError
//! - 使用 async_trait 支持动态分发

use crate::error::StorageError;
use crate::models::{AlarmRecord, AlarmStatus, EventLogRecord, NewAlarm, NotificationRecord};
use async_trait::async_trait;
use domain::{
    AlarmRule, ConnectionConfig, ConnectionStatus, ConnectionWithDevices, DataPointContext,
    Reading,
};

/// 读数存储接口
#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// 批量写入读数，返回写入条数
    async fn save_readings(&self, readings: &[Reading]) -> Result<usize, StorageError>;

    /// 删除早于指定时间的读数，返回删除条数
    async fn delete_readings_before(&self, ts_ms: i64) -> Result<u64, StorageError>;
}

/// 告警存储接口
#[async_trait]
pub trait AlarmStore: Send + Sync {
    /// 创建告警；同一 `alarm_key` 已有活动告警时返回已有 ID
    async fn create_alarm(&self, alarm: NewAlarm) -> Result<String, StorageError>;

    /// 更新告警状态
    async fn update_alarm_status(
        &self,
        alarm_id: &str,
        status: AlarmStatus,
        ts_ms: i64,
    ) -> Result<bool, StorageError>;

    /// 列出活动告警
    async fn list_active_alarms(&self) -> Result<Vec<AlarmRecord>, StorageError>;
}

/// 事件日志接口
#[async_trait]
pub trait EventLogStore: Send + Sync {
    async fn log_event(&self, record: EventLogRecord) -> Result<(), StorageError>;
}

/// 通知记录接口
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn create_notification(&self, record: NotificationRecord) -> Result<(), StorageError>;
}

/// 站点连接配置源
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// 列出已启用的连接及其设备、点位（按声明顺序）
    async fn list_enabled_connections(&self) -> Result<Vec<ConnectionWithDevices>, StorageError>;

    async fn find_connection(
        &self,
        station_id: &str,
    ) -> Result<Option<ConnectionConfig>, StorageError>;

    /// 记录连接状态；`Connected` 时同时刷新 `last_connect_at_ms`
    async fn update_connection_status(
        &self,
        station_id: &str,
        status: ConnectionStatus,
        ts_ms: i64,
    ) -> Result<bool, StorageError>;
}

/// 告警规则源
#[async_trait]
pub trait AlarmRuleStore: Send + Sync {
    async fn list_active_rules(&self) -> Result<Vec<AlarmRule>, StorageError>;
}

/// 点位反查接口
#[async_trait]
pub trait DataPointStore: Send + Sync {
    async fn find_data_point(
        &self,
        data_point_id: &str,
    ) -> Result<Option<DataPointContext>, StorageError>;
}
