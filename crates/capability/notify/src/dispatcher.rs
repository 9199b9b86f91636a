//! 告警通知分发
//!
//! | 事件 | 严重度 | 渠道 |
//! |------|--------|------|
//! | 触发 | critical（开关打开） | 通知记录 + 邮件/短信（各自开关）+ 内部 |
//! | 触发 | critical（开关关闭）/ warning | 内部 |
//! | 触发 | info | 无 |
//! | 恢复 | 任意 | 内部 |

use crate::NotifyError;
use crate::channel::{LoggingChannel, Notification, NotificationChannel};
use domain::{AlarmEvent, AlarmEventKind, Severity, now_epoch_ms};
use ems_storage::{NotificationRecord, NotificationStore};
use ems_telemetry::{record_events_lagged, record_notification_failure, record_notification_sent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct NotificationConfig {
    pub critical_enabled: bool,
    pub email_enabled: bool,
    pub sms_enabled: bool,
    pub max_retries: u64,
    pub backoff_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            critical_enabled: true,
            email_enabled: false,
            sms_enabled: false,
            max_retries: 2,
            backoff_ms: 200,
        }
    }
}

/// 单个事件的分发结果。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub delivered: Vec<String>,
    pub failed: Vec<String>,
    /// 是否写入了通知记录
    pub recorded: bool,
}

/// 通知分发器。
pub struct NotificationDispatcher {
    config: NotificationConfig,
    store: Arc<dyn NotificationStore>,
    internal: Arc<dyn NotificationChannel>,
    email: Option<Arc<dyn NotificationChannel>>,
    sms: Option<Arc<dyn NotificationChannel>>,
}

impl NotificationDispatcher {
    pub fn new(config: NotificationConfig, store: Arc<dyn NotificationStore>) -> Self {
        Self {
            config,
            store,
            internal: Arc::new(LoggingChannel),
            email: None,
            sms: None,
        }
    }

    pub fn with_internal(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.internal = channel;
        self
    }

    pub fn with_email(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.email = Some(channel);
        self
    }

    pub fn with_sms(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.sms = Some(channel);
        self
    }

    /// 处理一个告警事件。渠道失败不会中断其余渠道。
    pub async fn handle_event(&self, event: &AlarmEvent) -> DispatchOutcome {
        let notification = build_notification(event);
        let channels = self.channels_for(event);
        let mut outcome = DispatchOutcome::default();
        if channels.is_empty() {
            return outcome;
        }

        if event.kind == AlarmEventKind::Triggered
            && event.severity == Severity::Critical
            && self.config.critical_enabled
        {
            let record = NotificationRecord {
                notification_id: uuid::Uuid::new_v4().to_string(),
                alarm_id: event.alarm_id.clone(),
                severity: event.severity,
                title: notification.title.clone(),
                message: notification.message.clone(),
                channels: channels.iter().map(|c| c.name().to_string()).collect(),
                created_at_ms: now_epoch_ms(),
            };
            match self.store.create_notification(record).await {
                Ok(()) => outcome.recorded = true,
                Err(err) => {
                    warn!(
                        target: "ems.notify",
                        alarm_id = %event.alarm_id,
                        error = %err,
                        "notification_record_failed"
                    );
                }
            }
        }

        for channel in channels {
            let name = channel.name().to_string();
            match send_with_retry(
                channel,
                &notification,
                self.config.max_retries,
                self.config.backoff_ms,
            )
            .await
            {
                Ok(()) => {
                    record_notification_sent();
                    outcome.delivered.push(name);
                }
                Err(err) => {
                    record_notification_failure();
                    warn!(
                        target: "ems.notify",
                        alarm_id = %event.alarm_id,
                        channel = %name,
                        error = %err,
                        "notification_send_failed"
                    );
                    outcome.failed.push(name);
                }
            }
        }
        info!(
            target: "ems.notify",
            alarm_id = %event.alarm_id,
            kind = ?event.kind,
            severity = event.severity.as_str(),
            delivered = outcome.delivered.len(),
            failed = outcome.failed.len(),
            "notification_dispatched"
        );
        outcome
    }

    fn channels_for(&self, event: &AlarmEvent) -> Vec<Arc<dyn NotificationChannel>> {
        let mut channels = Vec::new();
        match (event.kind, event.severity) {
            (AlarmEventKind::Cleared, _) => channels.push(self.internal.clone()),
            (AlarmEventKind::Triggered, Severity::Info) => {}
            (AlarmEventKind::Triggered, Severity::Warning) => channels.push(self.internal.clone()),
            (AlarmEventKind::Triggered, Severity::Critical) => {
                if self.config.critical_enabled {
                    self.push_optional(&mut channels, "email", self.config.email_enabled, &self.email);
                    self.push_optional(&mut channels, "sms", self.config.sms_enabled, &self.sms);
                }
                channels.push(self.internal.clone());
            }
        }
        channels
    }

    fn push_optional(
        &self,
        channels: &mut Vec<Arc<dyn NotificationChannel>>,
        label: &str,
        enabled: bool,
        channel: &Option<Arc<dyn NotificationChannel>>,
    ) {
        if !enabled {
            return;
        }
        match channel {
            Some(channel) => channels.push(channel.clone()),
            None => debug!(target: "ems.notify", channel = label, "notification_channel_missing"),
        }
    }
}

fn build_notification(event: &AlarmEvent) -> Notification {
    let title = match event.kind {
        AlarmEventKind::Triggered => format!(
            "[{}] alarm at station {}",
            event.severity.as_str().to_uppercase(),
            event.station_id
        ),
        AlarmEventKind::Cleared => format!("alarm cleared at station {}", event.station_id),
    };
    Notification {
        alarm_id: event.alarm_id.clone(),
        alarm_key: event.alarm_key.clone(),
        station_id: event.station_id.clone(),
        data_point_id: event.data_point_id.clone(),
        severity: event.severity,
        title,
        message: event.message.clone(),
    }
}

async fn send_with_retry(
    channel: Arc<dyn NotificationChannel>,
    notification: &Notification,
    max_retries: u64,
    backoff_ms: u64,
) -> Result<(), NotifyError> {
    let mut attempt = 0u64;
    loop {
        match channel.send(notification).await {
            Ok(()) => return Ok(()),
            Err(err) => {
                attempt += 1;
                if attempt > max_retries {
                    return Err(err);
                }
                if backoff_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                }
            }
        }
    }
}

/// 启动通知任务：订阅告警事件直到发送端关闭。落后时丢弃最旧事件并计数。
pub fn spawn_notifier(
    dispatcher: Arc<NotificationDispatcher>,
    mut events_rx: broadcast::Receiver<AlarmEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events_rx.recv().await {
                Ok(event) => {
                    dispatcher.handle_event(&event).await;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    record_events_lagged(skipped);
                    warn!(target: "ems.notify", skipped = skipped, "alarm_events_lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        info!(target: "ems.notify", "notifier_stopped");
    })
}
