//! # 告警能力模块
//!
//! - **判定**（`evaluate`）：内置四级限值 + 按作用域匹配的自定义规则，纯函数
//! - **引擎**（`engine`）：活动告警表、幂等触发/清除、持久化、事件发布
//!
//! ```text
//! mpsc<ReadingBatch> ──▶ spawn_alarm_worker ──▶ AlarmEngine::process_batch
//!                                                   │
//!                                                   ├──▶ AlarmStore / EventLogStore
//!                                                   └──▶ broadcast<AlarmEvent>
//! ```

mod engine;
mod evaluate;

pub use engine::{AlarmEngine, AlarmTrigger, ManualCheckResult, spawn_alarm_worker};
pub use evaluate::{AlarmCandidate, Transition, builtin_key, evaluate};

use ems_storage::StorageError;

/// 告警链路错误。
#[derive(Debug, thiserror::Error)]
pub enum AlarmError {
    #[error("storage error: {0}")]
    Storage(String),
    #[error("data point not found: {0}")]
    PointNotFound(String),
}

impl From<StorageError> for AlarmError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err.to_string())
    }
}
