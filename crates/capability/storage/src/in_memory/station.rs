//! 站点拓扑内存实现
//!
//! 同时提供连接配置源（ConnectionStore）与点位反查（DataPointStore）。
//! 状态写入经由同一把锁串行化。

use crate::error::StorageError;
use crate::traits::{ConnectionStore, DataPointStore};
use domain::{
    ConnectionConfig, ConnectionStatus, ConnectionWithDevices, DataPointContext, DeviceConfig,
};
use std::sync::RwLock;

/// 站点拓扑内存存储
#[derive(Default)]
pub struct InMemoryConnectionStore {
    stations: RwLock<Vec<ConnectionWithDevices>>,
}

impl InMemoryConnectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 新增或替换站点（按 station_id 唯一）
    pub fn upsert_station(
        &self,
        connection: ConnectionConfig,
        devices: Vec<DeviceConfig>,
    ) -> Result<(), StorageError> {
        let mut stations = self
            .stations
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let entry = ConnectionWithDevices {
            connection,
            devices,
        };
        match stations
            .iter_mut()
            .find(|s| s.connection.station_id == entry.connection.station_id)
        {
            Some(existing) => *existing = entry,
            None => stations.push(entry),
        }
        Ok(())
    }

    pub fn set_enabled(&self, station_id: &str, enabled: bool) -> Result<bool, StorageError> {
        let mut stations = self
            .stations
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let Some(station) = stations
            .iter_mut()
            .find(|s| s.connection.station_id == station_id)
        else {
            return Ok(false);
        };
        station.connection.enabled = enabled;
        Ok(true)
    }

    /// 当前记录的连接状态（用于测试）
    pub fn status_of(&self, station_id: &str) -> Option<ConnectionStatus> {
        self.stations
            .read()
            .ok()?
            .iter()
            .find(|s| s.connection.station_id == station_id)
            .map(|s| s.connection.status)
    }
}

#[async_trait::async_trait]
impl ConnectionStore for InMemoryConnectionStore {
    async fn list_enabled_connections(&self) -> Result<Vec<ConnectionWithDevices>, StorageError> {
        let stations = self
            .stations
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(stations
            .iter()
            .filter(|s| s.connection.enabled)
            .cloned()
            .collect())
    }

    async fn find_connection(
        &self,
        station_id: &str,
    ) -> Result<Option<ConnectionConfig>, StorageError> {
        let stations = self
            .stations
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(stations
            .iter()
            .find(|s| s.connection.station_id == station_id)
            .map(|s| s.connection.clone()))
    }

    async fn update_connection_status(
        &self,
        station_id: &str,
        status: ConnectionStatus,
        ts_ms: i64,
    ) -> Result<bool, StorageError> {
        let mut stations = self
            .stations
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let Some(station) = stations
            .iter_mut()
            .find(|s| s.connection.station_id == station_id)
        else {
            return Ok(false);
        };
        station.connection.status = status;
        if status == ConnectionStatus::Connected {
            station.connection.last_connect_at_ms = Some(ts_ms);
        }
        Ok(true)
    }
}

#[async_trait::async_trait]
impl DataPointStore for InMemoryConnectionStore {
    async fn find_data_point(
        &self,
        data_point_id: &str,
    ) -> Result<Option<DataPointContext>, StorageError> {
        let stations = self
            .stations
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        for station in stations.iter() {
            for device in &station.devices {
                if let Some(point) = device.data_points.iter().find(|p| p.id == data_point_id) {
                    return Ok(Some(DataPointContext {
                        point: point.clone(),
                        station_id: station.connection.station_id.clone(),
                    }));
                }
            }
        }
        Ok(None)
    }
}
