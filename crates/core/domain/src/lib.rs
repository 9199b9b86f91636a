//! 电网监测采集与告警核心的领域模型。

pub mod alarm;
pub mod data;
pub mod station;

pub use alarm::{AlarmEvent, AlarmEventKind, AlarmRule, RuleCondition, RuleScope, Severity};
pub use data::{PointReading, Quality, Reading, ReadingBatch};
pub use station::{
    ConnectionConfig, ConnectionStatus, ConnectionWithDevices, DataPointConfig,
    DataPointContext, DeviceConfig, Protocol, RegisterType,
};

/// 获取当前时间戳（毫秒）
pub fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
