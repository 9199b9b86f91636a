use crate::station::DataPointConfig;
use serde::{Deserialize, Serialize};

/// 读数质量。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Good,
    Bad,
}

/// 单次轮询得到的点位读数。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reading {
    pub station_id: String,
    pub device_id: String,
    pub data_point_id: String,
    pub raw_value: i64,
    /// 工程值：raw_value * scale_factor + offset
    pub value: f64,
    pub quality: Quality,
    pub timestamp_ms: i64,
}

/// 读数与产生它的点位配置。
#[derive(Debug, Clone)]
pub struct PointReading {
    pub reading: Reading,
    pub point: DataPointConfig,
}

/// 同一设备在一个采集轮次内的读数批次（按点位声明顺序）。
#[derive(Debug, Clone)]
pub struct ReadingBatch {
    pub station_id: String,
    pub device_id: String,
    pub items: Vec<PointReading>,
}

impl ReadingBatch {
    pub fn new(station_id: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            station_id: station_id.into(),
            device_id: device_id.into(),
            items: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// 批次内的读数副本（用于持久化）。
    pub fn readings(&self) -> Vec<Reading> {
        self.items.iter().map(|item| item.reading.clone()).collect()
    }
}
