//! 采集与告警链路装配
//!
//! ```text
//! DataCollector ──mpsc<ReadingBatch>──▶ alarm worker ──broadcast<AlarmEvent>──▶ notifier
//!       │                                     │                                   │
//!  ReadingStore                          AlarmStore                       NotificationStore
//! ```

use crate::topology::{self, TopologyError};
use ems_alarm::{AlarmEngine, AlarmError, spawn_alarm_worker};
use ems_collector::{
    CollectorConfig, CollectorError, ConnectionRegistry, DataCollector, RetentionConfig,
    spawn_retention_job,
};
use ems_config::AppConfig;
use ems_notify::{NotificationConfig, NotificationDispatcher, spawn_notifier};
use ems_protocol::ModbusClientManager;
use ems_storage::{
    InMemoryAlarmRuleStore, InMemoryAlarmStore, InMemoryConnectionStore, InMemoryEventLogStore,
    InMemoryNotificationStore, InMemoryReadingStore,
};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum WiringError {
    #[error(transparent)]
    Topology(#[from] TopologyError),
    #[error(transparent)]
    Alarm(#[from] AlarmError),
    #[error(transparent)]
    Collector(#[from] CollectorError),
}

/// 运行中的链路。
pub struct Runtime {
    pub collector: Arc<DataCollector>,
    pub engine: Arc<AlarmEngine>,
    workers: Vec<JoinHandle<()>>,
}

impl Runtime {
    /// 停止采集并关闭会话，再结束后台任务。
    pub async fn shutdown(self) {
        self.collector.stop_collection().await;
        self.collector.disconnect_all().await;
        for worker in self.workers {
            worker.abort();
        }
        info!(target: "ems.gridmon", "runtime_stopped");
    }
}

/// 装配并启动全部组件。`simulator_addr` 仅在未提供站点文件时用于演示站点。
pub async fn start(
    config: &AppConfig,
    simulator_addr: Option<SocketAddr>,
) -> Result<Runtime, WiringError> {
    let stations = Arc::new(InMemoryConnectionStore::new());
    let station_entries = match config.stations_file.as_deref() {
        Some(path) => topology::load_stations(Path::new(path))?,
        None => match simulator_addr {
            Some(addr) => vec![topology::demo_station(addr)],
            None => Vec::new(),
        },
    };
    let station_count = topology::seed_stations(&stations, station_entries)?;

    let rules = Arc::new(InMemoryAlarmRuleStore::new());
    if let Some(path) = config.alarm_rules_file.as_deref() {
        topology::seed_rules(&rules, topology::load_rules(Path::new(path))?)?;
    }

    let event_log = Arc::new(InMemoryEventLogStore::new());
    let alarm_store = Arc::new(InMemoryAlarmStore::new());
    let reading_store = Arc::new(InMemoryReadingStore::new());
    let notification_store = Arc::new(InMemoryNotificationStore::new());

    let engine = Arc::new(AlarmEngine::new(
        alarm_store,
        rules,
        stations.clone(),
        event_log.clone(),
        config.alarm_event_capacity,
    ));
    engine.restore_active_alarms().await?;
    let rule_count = engine.reload_rules().await?;

    let dispatcher = Arc::new(NotificationDispatcher::new(
        NotificationConfig {
            critical_enabled: config.critical_notifications,
            email_enabled: config.email_notifications,
            sms_enabled: config.sms_notifications,
            max_retries: config.notify_max_retries,
            backoff_ms: config.notify_backoff_ms,
        },
        notification_store,
    ));
    let notifier = spawn_notifier(dispatcher, engine.subscribe());

    let (readings_tx, readings_rx) = mpsc::channel(config.reading_channel_capacity.max(1));
    let alarm_worker = spawn_alarm_worker(engine.clone(), readings_rx);

    let registry = Arc::new(ConnectionRegistry::new(stations, event_log));
    let collector = Arc::new(DataCollector::new(
        CollectorConfig {
            poll_interval_ms: config.poll_interval_ms,
            max_concurrent_stations: config.collector_max_concurrency,
            ..CollectorConfig::default()
        },
        registry,
        Arc::new(ModbusClientManager::new()),
        reading_store.clone(),
        readings_tx,
    ));
    collector.start_collection().await?;

    let retention = spawn_retention_job(
        reading_store,
        RetentionConfig {
            retention_days: config.reading_retention_days,
            interval: Duration::from_secs(config.retention_interval_seconds),
        },
    );

    info!(
        target: "ems.gridmon",
        stations = station_count,
        rules = rule_count,
        poll_interval_ms = config.poll_interval_ms,
        "runtime_started"
    );
    Ok(Runtime {
        collector,
        engine,
        workers: vec![retention, notifier, alarm_worker],
    })
}
