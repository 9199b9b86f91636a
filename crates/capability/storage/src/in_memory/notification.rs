//! 通知记录内存实现

use crate::error::StorageError;
use crate::models::NotificationRecord;
use crate::traits::NotificationStore;
use std::sync::RwLock;

/// 通知记录内存存储
#[derive(Default)]
pub struct InMemoryNotificationStore {
    records: RwLock<Vec<NotificationRecord>>,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list(&self) -> Vec<NotificationRecord> {
        self.records.read().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn create_notification(&self, record: NotificationRecord) -> Result<(), StorageError> {
        let mut records = self
            .records
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        records.push(record);
        Ok(())
    }
}
