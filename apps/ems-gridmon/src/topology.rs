//! 站点拓扑与告警规则加载
//!
//! 站点文件为 JSON 数组，每项是连接配置（平铺）加 `devices`：
//!
//! ```json
//! [{ "station_id": "st-1", "host": "10.0.0.5", "port": 502,
//!    "devices": [{ "id": "dev-1", "station_id": "st-1",
//!                  "data_points": [{ "id": "p-v", "device_id": "dev-1", "register_address": 0 }] }] }]
//! ```

use domain::{AlarmRule, ConnectionConfig, DataPointConfig, DeviceConfig, RegisterType};
use ems_storage::{InMemoryAlarmRuleStore, InMemoryConnectionStore, StorageError};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    #[error("read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("parse {path}: {source}")]
    Json {
        path: String,
        source: serde_json::Error,
    },
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Deserialize)]
pub struct StationEntry {
    #[serde(flatten)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, TopologyError> {
    let display = path.display().to_string();
    let raw = std::fs::read_to_string(path).map_err(|source| TopologyError::Io {
        path: display.clone(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| TopologyError::Json {
        path: display,
        source,
    })
}

pub fn parse_stations(raw: &str) -> Result<Vec<StationEntry>, serde_json::Error> {
    serde_json::from_str(raw)
}

pub fn load_stations(path: &Path) -> Result<Vec<StationEntry>, TopologyError> {
    read_json(path)
}

pub fn load_rules(path: &Path) -> Result<Vec<AlarmRule>, TopologyError> {
    read_json(path)
}

/// 写入站点存储，返回站点数。
pub fn seed_stations(
    store: &InMemoryConnectionStore,
    stations: Vec<StationEntry>,
) -> Result<usize, TopologyError> {
    let count = stations.len();
    for station in stations {
        store.upsert_station(station.connection, station.devices)?;
    }
    Ok(count)
}

pub fn seed_rules(
    store: &InMemoryAlarmRuleStore,
    rules: Vec<AlarmRule>,
) -> Result<usize, TopologyError> {
    let count = rules.len();
    for rule in rules {
        store.upsert_rule(rule)?;
    }
    Ok(count)
}

fn holding(id: &str, address: u16, name: &str, scale: f64, unit: &str) -> DataPointConfig {
    let mut point = DataPointConfig::new(id, "sim-meter", address);
    point.name = name.to_string();
    point.scale_factor = Some(scale);
    point.unit = Some(unit.to_string());
    point
}

/// 演示站点：一台指向模拟器的电表。
pub fn demo_station(addr: SocketAddr) -> StationEntry {
    let mut connection = ConnectionConfig::tcp("sim-station", addr.ip().to_string(), addr.port());
    connection.timeout_ms = 2000;

    let mut voltage = holding("sim-voltage", 0, "voltage", 0.1, "V");
    voltage.alarm_high = Some(240.0);
    voltage.warning_high = Some(235.0);
    voltage.warning_low = Some(210.0);
    voltage.alarm_low = Some(200.0);

    let mut frequency = holding("sim-frequency", 3, "frequency", 0.01, "Hz");
    frequency.alarm_high = Some(50.5);
    frequency.alarm_low = Some(49.5);

    let mut temperature = holding("sim-temperature", 4, "temperature", 0.1, "℃");
    temperature.warning_high = Some(38.0);
    temperature.alarm_high = Some(40.0);

    let mut trip = DataPointConfig::new("sim-trip", "sim-meter", 0);
    trip.name = "breaker trip".to_string();
    trip.register_type = RegisterType::Discrete;
    trip.alarm_high = Some(1.0);

    StationEntry {
        connection,
        devices: vec![DeviceConfig {
            id: "sim-meter".to_string(),
            station_id: "sim-station".to_string(),
            name: "simulated meter".to_string(),
            data_points: vec![
                voltage,
                holding("sim-current", 1, "current", 0.1, "A"),
                holding("sim-power", 2, "power", 1.0, "W"),
                frequency,
                temperature,
                holding("sim-energy", 5, "energy", 1.0, "kWh"),
                trip,
            ],
        }],
    }
}
