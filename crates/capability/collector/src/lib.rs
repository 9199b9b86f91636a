//! # 采集能力模块
//!
//! - **连接注册表**（`registry`）：已启用站点及其设备、活动点位；连接状态记录；一次性连通测试
//! - **数据采集器**（`collector`）：周期轮询、按站点并发、读数换算与分批下发
//! - **保留期清理**（`retention`）：按天清理过期读数
//!
//! ```text
//! ConnectionRegistry ──▶ DataCollector ──(ModbusTransport)──▶ 读寄存器
//!                              │
//!                              ├──▶ ReadingStore
//!                              └──▶ mpsc<ReadingBatch> ──▶ AlarmEngine
//! ```

mod collector;
mod registry;
mod retention;

pub use collector::{
    CollectionReport, CollectorConfig, CollectorState, DataCollector, PointFailure,
};
pub use registry::{ConnectionRegistry, TestConnectionResult, TestParams};
pub use retention::{RetentionConfig, purge_expired_readings, spawn_retention_job};

use ems_protocol::ProtocolError;
use ems_storage::StorageError;

/// 采集链路错误。
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("station not found: {0}")]
    StationNotFound(String),
    #[error("invalid poll interval: {0} ms")]
    InvalidInterval(u64),
    #[error("storage error: {0}")]
    Storage(String),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl From<StorageError> for CollectorError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err.to_string())
    }
}
