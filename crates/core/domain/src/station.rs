//! 站点、设备与点位配置模型。

use serde::{Deserialize, Serialize};

/// 站点通信协议。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Modbus TCP
    #[default]
    Tcp,
    /// Modbus RTU（串口）
    Rtu,
}

/// 连接状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    #[default]
    Disconnected,
    Error,
    Connecting,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
            Self::Connecting => "connecting",
        }
    }
}

/// 寄存器类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RegisterType {
    /// 保持寄存器（未配置时的默认值）
    #[default]
    Holding,
    /// 输入寄存器
    Input,
    /// 线圈
    Coil,
    /// 离散输入
    Discrete,
}

/// 站点连接配置（每个站点一条，station_id 唯一）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub station_id: String,
    #[serde(default)]
    pub protocol: Protocol,
    /// TCP 主机地址
    #[serde(default)]
    pub host: Option<String>,
    /// TCP 端口
    #[serde(default)]
    pub port: Option<u16>,
    /// RTU 串口路径
    #[serde(default)]
    pub serial_port: Option<String>,
    /// RTU 波特率
    #[serde(default)]
    pub baud_rate: Option<u32>,
    /// 从站 ID
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,
    /// 响应超时（毫秒）
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub status: ConnectionStatus,
    #[serde(default)]
    pub last_connect_at_ms: Option<i64>,
}

fn default_unit_id() -> u8 {
    1
}

fn default_poll_interval_seconds() -> u64 {
    5
}

fn default_timeout_ms() -> u64 {
    3000
}

fn default_enabled() -> bool {
    true
}

impl ConnectionConfig {
    /// 构造 TCP 连接配置（其余字段取默认值）。
    pub fn tcp(station_id: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            station_id: station_id.into(),
            protocol: Protocol::Tcp,
            host: Some(host.into()),
            port: Some(port),
            serial_port: None,
            baud_rate: None,
            unit_id: default_unit_id(),
            poll_interval_seconds: default_poll_interval_seconds(),
            timeout_ms: default_timeout_ms(),
            enabled: true,
            status: ConnectionStatus::Disconnected,
            last_connect_at_ms: None,
        }
    }

    /// 构造 RTU 连接配置。
    pub fn rtu(station_id: impl Into<String>, serial_port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            protocol: Protocol::Rtu,
            host: None,
            port: None,
            serial_port: Some(serial_port.into()),
            baud_rate: Some(baud_rate),
            ..Self::tcp(station_id, "", 0)
        }
    }
}

/// 数据点配置（一个轮询周期内只读）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPointConfig {
    pub id: String,
    pub device_id: String,
    #[serde(default)]
    pub name: String,
    pub register_address: u16,
    #[serde(default)]
    pub register_type: RegisterType,
    #[serde(default)]
    pub scale_factor: Option<f64>,
    #[serde(default)]
    pub offset: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default = "default_enabled")]
    pub is_active: bool,
    #[serde(default)]
    pub alarm_high: Option<f64>,
    #[serde(default)]
    pub warning_high: Option<f64>,
    #[serde(default)]
    pub alarm_low: Option<f64>,
    #[serde(default)]
    pub warning_low: Option<f64>,
}

impl DataPointConfig {
    pub fn new(id: impl Into<String>, device_id: impl Into<String>, register_address: u16) -> Self {
        Self {
            id: id.into(),
            device_id: device_id.into(),
            name: String::new(),
            register_address,
            register_type: RegisterType::Holding,
            scale_factor: None,
            offset: None,
            unit: None,
            is_active: true,
            alarm_high: None,
            warning_high: None,
            alarm_low: None,
            warning_low: None,
        }
    }

    /// 原始值换算为工程值：`raw * scale_factor + offset`（缺省 1 / 0）。
    pub fn convert(&self, raw_value: i64) -> f64 {
        raw_value as f64 * self.scale_factor.unwrap_or(1.0) + self.offset.unwrap_or(0.0)
    }

    /// 显示名称，未命名时回落到 id。
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() { &self.id } else { &self.name }
    }
}

/// 设备配置。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub id: String,
    pub station_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub data_points: Vec<DataPointConfig>,
}

/// 已启用连接及其设备、活动点位（采集器每轮的工作单元）。
#[derive(Debug, Clone)]
pub struct ConnectionWithDevices {
    pub connection: ConnectionConfig,
    pub devices: Vec<DeviceConfig>,
}

impl ConnectionWithDevices {
    pub fn station_id(&self) -> &str {
        &self.connection.station_id
    }

    /// 活动点位总数。
    pub fn active_point_count(&self) -> usize {
        self.devices
            .iter()
            .map(|device| device.data_points.iter().filter(|p| p.is_active).count())
            .sum()
    }
}

/// 点位及其归属站点（用于按点位 id 反查）。
#[derive(Debug, Clone)]
pub struct DataPointContext {
    pub point: DataPointConfig,
    pub station_id: String,
}
