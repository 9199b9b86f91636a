//! 连接注册表
//!
//! 以 `ConnectionStore` 为配置源，向采集器提供已启用站点（仅活动点位），
//! 并记录连接状态变化。

use crate::CollectorError;
use domain::{ConnectionStatus, ConnectionWithDevices, RegisterType, now_epoch_ms};
use ems_protocol::ModbusClientManager;
use ems_storage::{ConnectionStore, EventLogRecord, EventLogStore};
use std::sync::Arc;
use tracing::{info, warn};

/// 连通测试参数。
#[derive(Debug, Clone, Copy)]
pub struct TestParams {
    pub register_type: RegisterType,
    pub address: u16,
    pub count: u16,
}

impl Default for TestParams {
    fn default() -> Self {
        Self {
            register_type: RegisterType::Holding,
            address: 0,
            count: 1,
        }
    }
}

/// 连通测试结果。
#[derive(Debug, Clone)]
pub struct TestConnectionResult {
    pub station_id: String,
    pub success: bool,
    pub values: Vec<u16>,
    pub latency_ms: u64,
    pub error: Option<String>,
}

/// 连接注册表。
pub struct ConnectionRegistry {
    store: Arc<dyn ConnectionStore>,
    event_log: Arc<dyn EventLogStore>,
}

impl ConnectionRegistry {
    pub fn new(store: Arc<dyn ConnectionStore>, event_log: Arc<dyn EventLogStore>) -> Self {
        Self { store, event_log }
    }

    /// 已启用站点，设备下只保留活动点位（保持声明顺序）。
    pub async fn list_enabled_connections(
        &self,
    ) -> Result<Vec<ConnectionWithDevices>, CollectorError> {
        let mut stations = self.store.list_enabled_connections().await?;
        for station in &mut stations {
            for device in &mut station.devices {
                device.data_points.retain(|p| p.is_active);
            }
        }
        Ok(stations)
    }

    /// 记录连接状态；状态变化时写入 `connection_status` 事件。
    pub async fn update_status(
        &self,
        station_id: &str,
        status: ConnectionStatus,
    ) -> Result<(), CollectorError> {
        let previous = self
            .store
            .find_connection(station_id)
            .await?
            .map(|c| c.status);
        let ts_ms = now_epoch_ms();
        let updated = self
            .store
            .update_connection_status(station_id, status, ts_ms)
            .await?;
        if !updated {
            return Err(CollectorError::StationNotFound(station_id.to_string()));
        }
        if previous == Some(status) {
            return Ok(());
        }

        info!(
            target: "ems.collector",
            station_id = %station_id,
            status = status.as_str(),
            "connection_status_changed"
        );
        let record = EventLogRecord {
            event_type: "connection_status".to_string(),
            entity_type: "station".to_string(),
            entity_id: station_id.to_string(),
            description: format!("station {} is {}", station_id, status.as_str()),
            metadata: serde_json::json!({
                "previous": previous.map(|s| s.as_str()),
                "status": status.as_str(),
            }),
            ts_ms,
        };
        if let Err(err) = self.event_log.log_event(record).await {
            warn!(
                target: "ems.collector",
                station_id = %station_id,
                error = %err,
                "connection_event_log_failed"
            );
        }
        Ok(())
    }

    /// 一次性连通测试：独立的短期会话，不触碰轮询会话。
    pub async fn test_connection(
        &self,
        station_id: &str,
        params: TestParams,
    ) -> Result<TestConnectionResult, CollectorError> {
        let config = self
            .store
            .find_connection(station_id)
            .await?
            .ok_or_else(|| CollectorError::StationNotFound(station_id.to_string()))?;

        let session = ModbusClientManager::new();
        let session_id = format!("test-{}", station_id);
        let connected = session.connect(&session_id, &config).await;
        let mut latency_ms = connected.latency_ms;

        let outcome = match connected.result {
            Ok(()) => {
                let op = session
                    .read_by_type(&session_id, params.register_type, params.address, params.count)
                    .await;
                latency_ms += op.latency_ms;
                session.disconnect(&session_id).await;
                op.result
            }
            Err(err) => Err(err),
        };

        let failed = outcome.is_err();
        let result = match outcome {
            Ok(values) => TestConnectionResult {
                station_id: station_id.to_string(),
                success: true,
                values,
                latency_ms,
                error: None,
            },
            Err(err) => TestConnectionResult {
                station_id: station_id.to_string(),
                success: false,
                values: Vec::new(),
                latency_ms,
                error: Some(err.to_string()),
            },
        };
        info!(
            target: "ems.collector",
            station_id = %station_id,
            success = result.success,
            latency_ms = result.latency_ms,
            "connection_tested"
        );
        let record = EventLogRecord {
            event_type: "connection_test".to_string(),
            entity_type: "station".to_string(),
            entity_id: station_id.to_string(),
            description: format!(
                "station {} test {}",
                station_id,
                if result.success { "succeeded" } else { "failed" }
            ),
            metadata: serde_json::json!({
                "success": result.success,
                "latency_ms": result.latency_ms,
                "values": result.values,
                "error": result.error,
            }),
            ts_ms: now_epoch_ms(),
        };
        if let Err(err) = self.event_log.log_event(record).await {
            warn!(
                target: "ems.collector",
                station_id = %station_id,
                error = %err,
                "connection_event_log_failed"
            );
        }
        // 成功只说明测试会话可达，不覆盖轮询会话的状态
        if failed {
            self.update_status(station_id, ConnectionStatus::Error).await?;
        }
        Ok(result)
    }
}
