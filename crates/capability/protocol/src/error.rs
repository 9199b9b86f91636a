//! 协议错误类型定义

/// 协议通信错误
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// 连接 ID 未打开
    #[error("not connected: {0}")]
    NotConnected(String),

    /// 超时错误
    #[error("timeout: {0}")]
    Timeout(String),

    /// 帧格式错误
    #[error("protocol error: {0}")]
    Protocol(String),

    /// 从站返回异常响应
    #[error("device exception: {0}")]
    Device(String),

    /// 配置错误
    #[error("config error: {0}")]
    Config(String),

    /// 连接错误
    #[error("connection error: {0}")]
    Connection(String),

    /// IO 错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// 是否为链路级错误（需要重连）。
    pub fn is_link_failure(&self) -> bool {
        matches!(
            self,
            Self::NotConnected(_) | Self::Timeout(_) | Self::Connection(_) | Self::Io(_)
        )
    }
}

impl From<tokio_modbus::Error> for ProtocolError {
    fn from(err: tokio_modbus::Error) -> Self {
        match err {
            tokio_modbus::Error::Transport(e) => Self::Connection(e.to_string()),
            other => Self::Protocol(other.to_string()),
        }
    }
}

impl From<tokio_modbus::ExceptionCode> for ProtocolError {
    fn from(code: tokio_modbus::ExceptionCode) -> Self {
        Self::Device(format!("exception: {:?}", code))
    }
}
