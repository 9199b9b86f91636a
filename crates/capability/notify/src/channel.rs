use crate::NotifyError;
use async_trait::async_trait;
use domain::Severity;
use tracing::info;

/// 待发送的通知。
#[derive(Debug, Clone)]
pub struct Notification {
    pub alarm_id: String,
    pub alarm_key: String,
    pub station_id: String,
    pub data_point_id: String,
    pub severity: Severity,
    pub title: String,
    pub message: String,
}

/// 通知渠道抽象（邮件、短信等由宿主注入）。
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &str;
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// 内部渠道：只写日志。
#[derive(Debug, Default)]
pub struct LoggingChannel;

#[async_trait]
impl NotificationChannel for LoggingChannel {
    fn name(&self) -> &str {
        "internal"
    }

    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            target: "ems.notify",
            alarm_id = %notification.alarm_id,
            station_id = %notification.station_id,
            severity = notification.severity.as_str(),
            title = %notification.title,
            "notification_internal"
        );
        Ok(())
    }
}
