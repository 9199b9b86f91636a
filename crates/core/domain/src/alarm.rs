//! 告警规则与告警事件模型。

use serde::{Deserialize, Serialize};

/// 告警级别（Critical 最高，Info 最低）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

/// 规则作用域：点位 / 设备 / 站点 / 全局。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleScope {
    Point(String),
    Device(String),
    Station(String),
    Global,
}

impl RuleScope {
    /// 由三个可空字段构造作用域，取最具体的一个。
    pub fn from_fields(
        data_point_id: Option<String>,
        device_id: Option<String>,
        station_id: Option<String>,
    ) -> Self {
        match (data_point_id, device_id, station_id) {
            (Some(point), _, _) => Self::Point(point),
            (None, Some(device), _) => Self::Device(device),
            (None, None, Some(station)) => Self::Station(station),
            (None, None, None) => Self::Global,
        }
    }

    pub fn applies_to(&self, data_point_id: &str, device_id: &str, station_id: &str) -> bool {
        match self {
            Self::Point(id) => id == data_point_id,
            Self::Device(id) => id == device_id,
            Self::Station(id) => id == station_id,
            Self::Global => true,
        }
    }
}

/// 规则条件。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RuleCondition {
    Gt,
    Lt,
    Eq,
    Ne,
    /// 闭区间 `t1 <= v <= t2`
    Between,
    /// `v < t1 || v > t2`
    Outside,
}

impl RuleCondition {
    /// 判定条件是否成立。BETWEEN / OUTSIDE 缺少 `threshold2` 时恒为 false。
    pub fn evaluate(&self, value: f64, threshold1: f64, threshold2: Option<f64>) -> bool {
        match self {
            Self::Gt => value > threshold1,
            Self::Lt => value < threshold1,
            Self::Eq => value == threshold1,
            Self::Ne => value != threshold1,
            Self::Between => threshold2.is_some_and(|upper| value >= threshold1 && value <= upper),
            Self::Outside => threshold2.is_some_and(|upper| value < threshold1 || value > upper),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gt => "GT",
            Self::Lt => "LT",
            Self::Eq => "EQ",
            Self::Ne => "NE",
            Self::Between => "BETWEEN",
            Self::Outside => "OUTSIDE",
        }
    }
}

/// 自定义告警规则。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmRule {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub scope: RuleScope,
    pub condition: RuleCondition,
    pub threshold1: f64,
    #[serde(default)]
    pub threshold2: Option<f64>,
    pub severity: Severity,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl AlarmRule {
    /// 规则告警键：`rule_<ruleId>_<pointId>`。
    pub fn alarm_key(&self, data_point_id: &str) -> String {
        format!("rule_{}_{}", self.id, data_point_id)
    }
}

/// 告警事件类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmEventKind {
    Triggered,
    Cleared,
}

/// 告警状态变更事件（同一 key 严格按 触发/恢复 交替）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmEvent {
    pub kind: AlarmEventKind,
    pub alarm_id: String,
    pub alarm_key: String,
    pub data_point_id: String,
    pub device_id: String,
    pub station_id: String,
    pub severity: Severity,
    pub message: String,
    pub value: Option<f64>,
    pub threshold: Option<f64>,
    pub timestamp_ms: i64,
}
