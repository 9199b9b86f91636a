//! 电网监测采集与告警宿主进程。

mod topology;
mod wiring;

use ems_config::AppConfig;
use ems_protocol::{ModbusSimulator, SimulatorConfig};
use ems_telemetry::{init_tracing, metrics};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在）
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    init_tracing();

    // 本地联调：内置 Modbus TCP 模拟器
    let simulator = if config.simulator_enabled {
        let simulator = Arc::new(ModbusSimulator::new(SimulatorConfig {
            listen_addr: config.simulator_addr.clone(),
            tick_ms: config.simulator_tick_ms,
            seed: config.simulator_seed,
        }));
        Some(simulator.start().await?)
    } else {
        None
    };

    let runtime = wiring::start(&config, simulator.as_ref().map(|s| s.local_addr())).await?;

    tokio::signal::ctrl_c().await?;
    info!(target: "ems.gridmon", "shutdown_requested");

    let active_alarms = runtime.engine.active_alarm_keys().await.len();
    runtime.shutdown().await;
    if let Some(simulator) = simulator {
        simulator.shutdown();
    }

    let snapshot = metrics().snapshot();
    info!(
        target: "ems.gridmon",
        ticks = snapshot.ticks,
        readings_collected = snapshot.readings_collected,
        read_failures = snapshot.read_failures,
        alarms_triggered = snapshot.alarms_triggered,
        alarms_cleared = snapshot.alarms_cleared,
        active_alarms = active_alarms,
        "gridmon_stopped"
    );
    Ok(())
}
