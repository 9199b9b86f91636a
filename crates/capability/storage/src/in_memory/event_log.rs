//! 事件日志内存实现
//!
//! 仅用于本地测试和占位。

use crate::error::StorageError;
use crate::models::EventLogRecord;
use crate::traits::EventLogStore;
use std::sync::RwLock;

/// 事件日志内存存储
#[derive(Default)]
pub struct InMemoryEventLogStore {
    events: RwLock<Vec<EventLogRecord>>,
}

impl InMemoryEventLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按事件类型过滤（用于测试）
    pub fn list_by_type(&self, event_type: &str) -> Vec<EventLogRecord> {
        self.events
            .read()
            .map(|items| {
                items
                    .iter()
                    .filter(|e| e.event_type == event_type)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl EventLogStore for InMemoryEventLogStore {
    async fn log_event(&self, record: EventLogRecord) -> Result<(), StorageError> {
        let mut events = self
            .events
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        events.push(record);
        Ok(())
    }
}
