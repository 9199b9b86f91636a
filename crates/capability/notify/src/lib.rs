//! # 通知能力模块
//!
//! 订阅告警事件，按严重度与开关选择渠道，失败按退避重试。

mod channel;
mod dispatcher;

pub use channel::{LoggingChannel, Notification, NotificationChannel};
pub use dispatcher::{DispatchOutcome, NotificationConfig, NotificationDispatcher, spawn_notifier};

/// 通知链路错误。
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("channel {channel} failed: {message}")]
    Channel { channel: String, message: String },
}
