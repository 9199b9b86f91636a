//! 追踪初始化、采集轮次 ID 与进程级计数指标。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 基础指标快照。
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub ticks: u64,
    pub tick_latency_ms_total: u64,
    pub tick_latency_ms_count: u64,
    pub readings_collected: u64,
    pub read_failures: u64,
    pub read_latency_ms_total: u64,
    pub read_latency_ms_count: u64,
    pub reconnect_attempts: u64,
    pub reconnect_failures: u64,
    pub alarms_triggered: u64,
    pub alarms_cleared: u64,
    pub alarm_persist_failures: u64,
    pub notifications_sent: u64,
    pub notification_failures: u64,
    pub events_lagged: u64,
    pub readings_purged: u64,
}

/// 基础指标。
pub struct TelemetryMetrics {
    ticks: AtomicU64,
    tick_latency_ms_total: AtomicU64,
    tick_latency_ms_count: AtomicU64,
    readings_collected: AtomicU64,
    read_failures: AtomicU64,
    read_latency_ms_total: AtomicU64,
    read_latency_ms_count: AtomicU64,
    reconnect_attempts: AtomicU64,
    reconnect_failures: AtomicU64,
    alarms_triggered: AtomicU64,
    alarms_cleared: AtomicU64,
    alarm_persist_failures: AtomicU64,
    notifications_sent: AtomicU64,
    notification_failures: AtomicU64,
    events_lagged: AtomicU64,
    readings_purged: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            ticks: AtomicU64::new(0),
            tick_latency_ms_total: AtomicU64::new(0),
            tick_latency_ms_count: AtomicU64::new(0),
            readings_collected: AtomicU64::new(0),
            read_failures: AtomicU64::new(0),
            read_latency_ms_total: AtomicU64::new(0),
            read_latency_ms_count: AtomicU64::new(0),
            reconnect_attempts: AtomicU64::new(0),
            reconnect_failures: AtomicU64::new(0),
            alarms_triggered: AtomicU64::new(0),
            alarms_cleared: AtomicU64::new(0),
            alarm_persist_failures: AtomicU64::new(0),
            notifications_sent: AtomicU64::new(0),
            notification_failures: AtomicU64::new(0),
            events_lagged: AtomicU64::new(0),
            readings_purged: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            tick_latency_ms_total: self.tick_latency_ms_total.load(Ordering::Relaxed),
            tick_latency_ms_count: self.tick_latency_ms_count.load(Ordering::Relaxed),
            readings_collected: self.readings_collected.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            read_latency_ms_total: self.read_latency_ms_total.load(Ordering::Relaxed),
            read_latency_ms_count: self.read_latency_ms_count.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            reconnect_failures: self.reconnect_failures.load(Ordering::Relaxed),
            alarms_triggered: self.alarms_triggered.load(Ordering::Relaxed),
            alarms_cleared: self.alarms_cleared.load(Ordering::Relaxed),
            alarm_persist_failures: self.alarm_persist_failures.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
            notification_failures: self.notification_failures.load(Ordering::Relaxed),
            events_lagged: self.events_lagged.load(Ordering::Relaxed),
            readings_purged: self.readings_purged.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的采集轮次 ID。
pub fn new_tick_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// 记录采集轮次及其耗时（毫秒）。
pub fn record_tick(latency_ms: u64) {
    let metrics = metrics();
    metrics.ticks.fetch_add(1, Ordering::Relaxed);
    metrics
        .tick_latency_ms_total
        .fetch_add(latency_ms, Ordering::Relaxed);
    metrics
        .tick_latency_ms_count
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录成功采集的读数条数。
pub fn record_readings_collected(count: u64) {
    metrics()
        .readings_collected
        .fetch_add(count, Ordering::Relaxed);
}

/// 记录点位读取失败次数。
pub fn record_read_failure() {
    metrics().read_failures.fetch_add(1, Ordering::Relaxed);
}

/// 记录单次读取延迟（毫秒）。
pub fn record_read_latency_ms(latency_ms: u64) {
    let metrics = metrics();
    metrics
        .read_latency_ms_total
        .fetch_add(latency_ms, Ordering::Relaxed);
    metrics
        .read_latency_ms_count
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录重连尝试次数。
pub fn record_reconnect_attempt() {
    metrics().reconnect_attempts.fetch_add(1, Ordering::Relaxed);
}

/// 记录重连失败次数。
pub fn record_reconnect_failure() {
    metrics().reconnect_failures.fetch_add(1, Ordering::Relaxed);
}

pub fn record_alarm_triggered() {
    metrics().alarms_triggered.fetch_add(1, Ordering::Relaxed);
}

pub fn record_alarm_cleared() {
    metrics().alarms_cleared.fetch_add(1, Ordering::Relaxed);
}

/// 记录告警持久化失败次数（内存状态仍已更新）。
pub fn record_alarm_persist_failure() {
    metrics()
        .alarm_persist_failures
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录通知发送成功次数（按渠道计）。
pub fn record_notification_sent() {
    metrics().notifications_sent.fetch_add(1, Ordering::Relaxed);
}

/// 记录通知发送失败次数（重试耗尽后计一次）。
pub fn record_notification_failure() {
    metrics()
        .notification_failures
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录订阅方落后导致丢弃的事件数。
pub fn record_events_lagged(count: u64) {
    metrics().events_lagged.fetch_add(count, Ordering::Relaxed);
}

/// 记录保留期清理删除的读数条数。
pub fn record_readings_purged(count: u64) {
    metrics().readings_purged.fetch_add(count, Ordering::Relaxed);
}
