//! 内存存储实现模块
//!
//! 用于测试、演示和单进程运行。
//!
//! 包含以下实现：
//! - ReadingStore: InMemoryReadingStore
//! - AlarmStore: InMemoryAlarmStore
//! - EventLogStore: InMemoryEventLogStore
//! - NotificationStore: InMemoryNotificationStore
//! - ConnectionStore + DataPointStore: InMemoryConnectionStore
//! - AlarmRuleStore: InMemoryAlarmRuleStore

pub mod alarm;
pub mod event_log;
pub mod notification;
pub mod reading;
pub mod rule;
pub mod station;

pub use alarm::*;
pub use event_log::*;
pub use notification::*;
pub use reading::*;
pub use rule::*;
pub use station::*;
