//! 读数内存实现

use crate::error::StorageError;
use crate::traits::ReadingStore;
use domain::Reading;
use std::sync::RwLock;

/// 读数内存存储
#[derive(Default)]
pub struct InMemoryReadingStore {
    readings: RwLock<Vec<Reading>>,
}

impl InMemoryReadingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前累计读数条数（用于测试）
    pub fn len(&self) -> usize {
        self.readings.read().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 指定点位的全部读数（按写入顺序）
    pub fn readings_for(&self, data_point_id: &str) -> Vec<Reading> {
        self.readings
            .read()
            .map(|items| {
                items
                    .iter()
                    .filter(|r| r.data_point_id == data_point_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl ReadingStore for InMemoryReadingStore {
    async fn save_readings(&self, readings: &[Reading]) -> Result<usize, StorageError> {
        let mut store = self
            .readings
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        store.extend(readings.iter().cloned());
        Ok(readings.len())
    }

    async fn delete_readings_before(&self, ts_ms: i64) -> Result<u64, StorageError> {
        let mut store = self
            .readings
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let before = store.len();
        store.retain(|r| r.timestamp_ms >= ts_ms);
        Ok((before - store.len()) as u64)
    }
}
