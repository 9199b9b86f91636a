//! 数据采集器
//!
//! 状态机 `Stopped → Starting → Running → Stopping → Stopped`。
//! 单个调度任务按周期触发采集轮次；每轮按站点并发（信号量限流），
//! 站点断线时在各自任务内重连。读数按设备成批写入 `ReadingStore`
//! 并送入有界通道（满时阻塞生产者）。

use crate::CollectorError;
use crate::registry::ConnectionRegistry;
use domain::{
    ConnectionConfig, ConnectionStatus, ConnectionWithDevices, PointReading, Quality, Reading,
    ReadingBatch, now_epoch_ms,
};
use ems_protocol::{ModbusTransport, ProtocolError};
use ems_storage::ReadingStore;
use ems_telemetry::{
    new_tick_id, record_read_failure, record_read_latency_ms, record_readings_collected,
    record_reconnect_attempt, record_reconnect_failure, record_tick,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore, mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{Instrument, debug, info, info_span, warn};

/// 采集器参数。
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub poll_interval_ms: u64,
    pub max_concurrent_stations: usize,
    /// 停止时等待在途轮次完成的上限
    pub stop_grace_ms: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5000,
            max_concurrent_stations: 4,
            stop_grace_ms: 10_000,
        }
    }
}

impl CollectorConfig {
    fn sanitized(mut self) -> Self {
        if self.poll_interval_ms == 0 {
            self.poll_interval_ms = 1;
        }
        if self.max_concurrent_stations == 0 {
            self.max_concurrent_stations = 1;
        }
        self
    }
}

/// 采集器状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// 单点读取失败。
#[derive(Debug, Clone)]
pub struct PointFailure {
    pub device_id: String,
    pub data_point_id: String,
    pub error: String,
}

/// 单站采集结果。
#[derive(Debug, Clone)]
pub struct CollectionReport {
    pub station_id: String,
    pub devices: usize,
    pub readings: usize,
    pub failures: Vec<PointFailure>,
    /// 轮询中途会话丢失且重连失败
    pub link_lost: bool,
    pub latency_ms: u64,
}

struct Ticker {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

struct CollectorInner {
    registry: Arc<ConnectionRegistry>,
    transport: Arc<dyn ModbusTransport>,
    reading_store: Arc<dyn ReadingStore>,
    readings_tx: mpsc::Sender<ReadingBatch>,
    semaphore: Arc<Semaphore>,
    state_tx: watch::Sender<CollectorState>,
    interval_tx: watch::Sender<Duration>,
}

/// 数据采集器。
pub struct DataCollector {
    inner: Arc<CollectorInner>,
    config: CollectorConfig,
    // 同时串行化 start / stop
    ticker: Mutex<Option<Ticker>>,
}

impl DataCollector {
    pub fn new(
        config: CollectorConfig,
        registry: Arc<ConnectionRegistry>,
        transport: Arc<dyn ModbusTransport>,
        reading_store: Arc<dyn ReadingStore>,
        readings_tx: mpsc::Sender<ReadingBatch>,
    ) -> Self {
        let config = config.sanitized();
        let (state_tx, _) = watch::channel(CollectorState::Stopped);
        let (interval_tx, _) = watch::channel(Duration::from_millis(config.poll_interval_ms));
        Self {
            inner: Arc::new(CollectorInner {
                registry,
                transport,
                reading_store,
                readings_tx,
                semaphore: Arc::new(Semaphore::new(config.max_concurrent_stations)),
                state_tx,
                interval_tx,
            }),
            config,
            ticker: Mutex::new(None),
        }
    }

    pub fn state(&self) -> CollectorState {
        *self.inner.state_tx.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == CollectorState::Running
    }

    /// 订阅状态变化。
    pub fn subscribe_state(&self) -> watch::Receiver<CollectorState> {
        self.inner.state_tx.subscribe()
    }

    pub fn poll_interval(&self) -> Duration {
        *self.inner.interval_tx.borrow()
    }

    /// 启动采集；已在运行时为空操作。
    ///
    /// 逐站尽力连接，失败的站点记为 `Error`，下一轮重试。
    pub async fn start_collection(&self) -> Result<(), CollectorError> {
        let mut ticker = self.ticker.lock().await;
        if ticker.is_some() {
            return Ok(());
        }
        self.inner.state_tx.send_replace(CollectorState::Starting);

        let stations = match self.inner.registry.list_enabled_connections().await {
            Ok(stations) => stations,
            Err(err) => {
                self.inner.state_tx.send_replace(CollectorState::Stopped);
                return Err(err);
            }
        };

        let mut connects = JoinSet::new();
        for station in &stations {
            let inner = self.inner.clone();
            let connection = station.connection.clone();
            connects.spawn(async move {
                let Ok(_permit) = inner.semaphore.clone().acquire_owned().await else {
                    return;
                };
                let _ = inner.connect_station(&connection).await;
            });
        }
        while connects.join_next().await.is_some() {}

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(run_ticker(
            self.inner.clone(),
            shutdown_rx,
            self.inner.interval_tx.subscribe(),
        ));
        *ticker = Some(Ticker { shutdown_tx, join });
        self.inner.state_tx.send_replace(CollectorState::Running);
        info!(
            target: "ems.collector",
            stations = stations.len(),
            poll_interval_ms = self.poll_interval().as_millis() as u64,
            "collection_started"
        );
        Ok(())
    }

    /// 停止采集：不再触发新轮次，在途轮次完成（或超时放弃）后进入 `Stopped`。
    /// 传输会话保持空闲，进程退出时由 `disconnect_all` 关闭。
    pub async fn stop_collection(&self) {
        let mut ticker = self.ticker.lock().await;
        let Some(Ticker { shutdown_tx, mut join }) = ticker.take() else {
            return;
        };
        self.inner.state_tx.send_replace(CollectorState::Stopping);
        let _ = shutdown_tx.send(true);

        let grace = Duration::from_millis(self.config.stop_grace_ms);
        if tokio::time::timeout(grace, &mut join).await.is_err() {
            warn!(
                target: "ems.collector",
                grace_ms = self.config.stop_grace_ms,
                "collect_tick_abandoned"
            );
            join.abort();
        }
        self.inner.state_tx.send_replace(CollectorState::Stopped);
        info!(target: "ems.collector", "collection_stopped");
    }

    /// 修改轮询周期：调度器在下一个边界按新周期重启，状态保持不变，不会产生重复轮次。
    pub fn set_poll_interval(&self, interval_ms: u64) -> Result<(), CollectorError> {
        if interval_ms == 0 {
            return Err(CollectorError::InvalidInterval(interval_ms));
        }
        self.inner
            .interval_tx
            .send_replace(Duration::from_millis(interval_ms));
        Ok(())
    }

    /// 立即采集单个站点（必要时先重连），返回结构化结果。
    pub async fn collect_station_data(
        &self,
        station_id: &str,
    ) -> Result<CollectionReport, CollectorError> {
        let station = self
            .inner
            .registry
            .list_enabled_connections()
            .await?
            .into_iter()
            .find(|s| s.station_id() == station_id)
            .ok_or_else(|| CollectorError::StationNotFound(station_id.to_string()))?;
        self.inner.poll_station(&station).await
    }

    /// 关闭全部传输会话，并将已启用站点记为断开。
    pub async fn disconnect_all(&self) {
        self.inner.transport.disconnect_all().await;
        let stations = match self.inner.registry.list_enabled_connections().await {
            Ok(stations) => stations,
            Err(err) => {
                warn!(target: "ems.collector", error = %err, "disconnect_status_skipped");
                return;
            }
        };
        for station in stations {
            if let Err(err) = self
                .inner
                .registry
                .update_status(station.station_id(), ConnectionStatus::Disconnected)
                .await
            {
                debug!(
                    target: "ems.collector",
                    station_id = %station.station_id(),
                    error = %err,
                    "station_status_update_failed"
                );
            }
        }
    }
}

async fn run_ticker(
    inner: Arc<CollectorInner>,
    mut shutdown: watch::Receiver<bool>,
    mut interval_rx: watch::Receiver<Duration>,
) {
    let mut period = *interval_rx.borrow_and_update();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            changed = interval_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                period = *interval_rx.borrow_and_update();
                ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                info!(
                    target: "ems.collector",
                    poll_interval_ms = period.as_millis() as u64,
                    "poll_interval_changed"
                );
            }
            _ = ticker.tick() => {
                inner.run_tick().await;
            }
        }
    }
    debug!(target: "ems.collector", "ticker_exited");
}

impl CollectorInner {
    async fn run_tick(self: &Arc<Self>) {
        let tick_id = new_tick_id();
        let span = info_span!("collect_tick", tick_id = %tick_id);
        async {
            let started = Instant::now();
            let stations = match self.registry.list_enabled_connections().await {
                Ok(stations) => stations,
                Err(err) => {
                    warn!(target: "ems.collector", error = %err, "station_list_failed");
                    return;
                }
            };
            let station_count = stations.len();

            let mut tasks = JoinSet::new();
            for station in stations {
                let inner = self.clone();
                tasks.spawn(
                    async move {
                        let Ok(_permit) = inner.semaphore.clone().acquire_owned().await else {
                            return None;
                        };
                        Some(inner.poll_station(&station).await)
                    }
                    .in_current_span(),
                );
            }

            let mut readings = 0usize;
            let mut failures = 0usize;
            let mut unreachable = 0usize;
            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok(Some(Ok(report))) => {
                        readings += report.readings;
                        failures += report.failures.len();
                    }
                    Ok(Some(Err(err))) => {
                        unreachable += 1;
                        debug!(target: "ems.collector", error = %err, "station_skipped");
                    }
                    Ok(None) => {}
                    Err(err) => {
                        warn!(target: "ems.collector", error = %err, "station_task_failed");
                    }
                }
            }

            let latency_ms = started.elapsed().as_millis() as u64;
            record_tick(latency_ms);
            info!(
                target: "ems.collector",
                stations = station_count,
                unreachable = unreachable,
                readings = readings,
                failures = failures,
                latency_ms = latency_ms,
                "collect_tick_done"
            );
        }
        .instrument(span)
        .await
    }

    /// 站点未连接时先重连（超时由传输层按 `timeout_ms` 限定），再逐点读取。
    async fn poll_station(
        &self,
        station: &ConnectionWithDevices,
    ) -> Result<CollectionReport, CollectorError> {
        if !self.transport.is_connected(station.station_id()).await {
            self.connect_station(&station.connection).await?;
        }
        Ok(self.collect_connected(station).await)
    }

    async fn connect_station(&self, connection: &ConnectionConfig) -> Result<(), ProtocolError> {
        let station_id = connection.station_id.as_str();
        record_reconnect_attempt();
        self.set_status(station_id, ConnectionStatus::Connecting)
            .await;
        match self
            .transport
            .connect(station_id, connection)
            .await
            .into_result()
        {
            Ok(()) => {
                self.set_status(station_id, ConnectionStatus::Connected)
                    .await;
                Ok(())
            }
            Err(err) => {
                record_reconnect_failure();
                warn!(
                    target: "ems.collector",
                    station_id = %station_id,
                    error = %err,
                    "station_connect_failed"
                );
                self.set_status(station_id, ConnectionStatus::Error).await;
                Err(err)
            }
        }
    }

    async fn set_status(&self, station_id: &str, status: ConnectionStatus) {
        if let Err(err) = self.registry.update_status(station_id, status).await {
            warn!(
                target: "ems.collector",
                station_id = %station_id,
                status = status.as_str(),
                error = %err,
                "station_status_update_failed"
            );
        }
    }

    async fn collect_connected(&self, station: &ConnectionWithDevices) -> CollectionReport {
        let started = Instant::now();
        let station_id = station.station_id();
        let mut report = CollectionReport {
            station_id: station_id.to_string(),
            devices: 0,
            readings: 0,
            failures: Vec::new(),
            link_lost: false,
            latency_ms: 0,
        };

        'devices: for device in &station.devices {
            let mut batch = ReadingBatch::new(station_id, &device.id);
            for point in device.data_points.iter().filter(|p| p.is_active) {
                let op = self
                    .transport
                    .read(station_id, point.register_type, point.register_address, 1)
                    .await;
                record_read_latency_ms(op.latency_ms);

                let raw = op.result.and_then(|values| {
                    values
                        .first()
                        .copied()
                        .ok_or_else(|| ProtocolError::Protocol("empty response".to_string()))
                });
                match raw {
                    Ok(raw) => {
                        let raw_value = raw as i64;
                        batch.items.push(PointReading {
                            reading: Reading {
                                station_id: station_id.to_string(),
                                device_id: device.id.clone(),
                                data_point_id: point.id.clone(),
                                raw_value,
                                value: point.convert(raw_value),
                                quality: Quality::Good,
                                timestamp_ms: now_epoch_ms(),
                            },
                            point: point.clone(),
                        });
                    }
                    Err(err) => {
                        record_read_failure();
                        warn!(
                            target: "ems.collector",
                            station_id = %station_id,
                            device_id = %device.id,
                            data_point_id = %point.id,
                            register = point.register_address,
                            error = %err,
                            "point_read_failed"
                        );
                        let link_failure = err.is_link_failure();
                        report.failures.push(PointFailure {
                            device_id: device.id.clone(),
                            data_point_id: point.id.clone(),
                            error: err.to_string(),
                        });
                        // 会话仍在则只跳过该点；会话被移除则先重连，重连失败才放弃本站
                        if link_failure
                            && !self.transport.is_connected(station_id).await
                            && self.connect_station(&station.connection).await.is_err()
                        {
                            report.link_lost = true;
                            self.dispatch_batch(batch, &mut report).await;
                            break 'devices;
                        }
                    }
                }
            }
            self.dispatch_batch(batch, &mut report).await;
        }

        report.latency_ms = started.elapsed().as_millis() as u64;
        report
    }

    async fn dispatch_batch(&self, batch: ReadingBatch, report: &mut CollectionReport) {
        if batch.is_empty() {
            return;
        }
        report.devices += 1;
        report.readings += batch.len();
        record_readings_collected(batch.len() as u64);

        let readings = batch.readings();
        if let Err(err) = self.reading_store.save_readings(&readings).await {
            warn!(
                target: "ems.collector",
                station_id = %batch.station_id,
                device_id = %batch.device_id,
                error = %err,
                "readings_persist_failed"
            );
        }
        debug!(
            target: "ems.collector",
            station_id = %batch.station_id,
            device_id = %batch.device_id,
            readings = batch.len(),
            "readings_batch_ready"
        );
        if self.readings_tx.send(batch).await.is_err() {
            debug!(target: "ems.collector", "reading_channel_closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitized_config_never_zero() {
        let config = CollectorConfig {
            poll_interval_ms: 0,
            max_concurrent_stations: 0,
            stop_grace_ms: 0,
        }
        .sanitized();
        assert_eq!(config.poll_interval_ms, 1);
        assert_eq!(config.max_concurrent_stations, 1);
    }
}
