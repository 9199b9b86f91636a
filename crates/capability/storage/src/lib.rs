//! # EMS Storage 模块
//!
//! 采集与告警核心的外部协作方抽象层。持久化本身不在本工作区范围内，
//! 这里只定义接口并提供内存实现。
//!
//! ## 架构设计
//!
//! 1. **接口抽象层** (`traits.rs`)：定义所有协作方的异步 Trait 接口
//! 2. **数据模型层** (`models.rs`)：告警、事件日志、通知记录
//! 3. **错误处理层** (`error.rs`)：统一的存储错误类型
//! 4. **实现层** (`in_memory/`)：内存实现（用于测试、演示和单进程运行）
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use ems_storage::{InMemoryAlarmStore, AlarmStore};
//!
//! let store = InMemoryAlarmStore::new();
//! let active = store.list_active_alarms().await?;
//! ```
//!
//! ## 设计约束
//!
//! - **幂等建告警**：`create_alarm` 以 `alarm_key` 为幂等键
//! - **单锁写状态**：连接状态写入经由存储内部的单一锁串行化

pub mod error;
pub mod in_memory;
pub mod models;
pub mod traits;

pub use error::*;
pub use models::*;
pub use traits::*;

pub use in_memory::{
    InMemoryAlarmRuleStore, InMemoryAlarmStore, InMemoryConnectionStore, InMemoryEventLogStore,
    InMemoryNotificationStore, InMemoryReadingStore,
};
