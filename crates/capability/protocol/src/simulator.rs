//! Modbus TCP 协议模拟器
//!
//! 最小化的 Modbus TCP 从站，作为采集链路的测试替身：
//! - 支持功能码 1/2/3/4/5/6，其余返回异常码 1
//! - 后台周期性扰动保持寄存器（电压、电流、频率、温度），重算功率，累加电量
//! - 可设定随机种子；`tick()` 公开，测试可逐步驱动
//!
//! ## 保持寄存器布局
//!
//! | 地址 | 含义 | 初值 | 单位 |
//! |------|------|------|------|
//! | 0 | 电压 | 2300 | 0.1 V |
//! | 1 | 电流 | 150 | 0.1 A |
//! | 2 | 功率 | 3450 | W |
//! | 3 | 频率 | 5000 | 0.01 Hz |
//! | 4 | 温度 | 350 | 0.1 ℃ |
//! | 5 | 电量 | 0 | 计数 |

use crate::error::ProtocolError;
use crate::frame::{
    self, Request, EXCEPTION_ILLEGAL_DATA_ADDRESS, EXCEPTION_ILLEGAL_DATA_VALUE,
    EXCEPTION_ILLEGAL_FUNCTION, MAX_FRAME_LEN, MAX_READ_BITS, MAX_READ_REGISTERS,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, RwLock};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

/// 每类数据表的容量
pub const TABLE_SIZE: usize = 100;

pub const HR_VOLTAGE: u16 = 0;
pub const HR_CURRENT: u16 = 1;
pub const HR_POWER: u16 = 2;
pub const HR_FREQUENCY: u16 = 3;
pub const HR_TEMPERATURE: u16 = 4;
pub const HR_ENERGY: u16 = 5;

const VOLTAGE_RANGE: (u16, u16) = (2200, 2400);
const CURRENT_RANGE: (u16, u16) = (100, 200);
const FREQUENCY_RANGE: (u16, u16) = (4990, 5010);
const TEMPERATURE_RANGE: (u16, u16) = (300, 400);

/// 模拟器配置
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// 监听地址（测试用 `127.0.0.1:0`）
    pub listen_addr: String,
    /// 扰动周期（毫秒），0 表示不启动后台扰动
    pub tick_ms: u64,
    /// 随机种子
    pub seed: Option<u64>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:5020".to_string(),
            tick_ms: 1000,
            seed: None,
        }
    }
}

struct Tables {
    holding: Vec<u16>,
    input: Vec<u16>,
    coils: Vec<bool>,
    discrete: Vec<bool>,
}

impl Tables {
    fn initial() -> Self {
        let mut holding = vec![0u16; TABLE_SIZE];
        holding[HR_VOLTAGE as usize] = 2300;
        holding[HR_CURRENT as usize] = 150;
        holding[HR_POWER as usize] = power_watts(2300, 150);
        holding[HR_FREQUENCY as usize] = 5000;
        holding[HR_TEMPERATURE as usize] = 350;
        holding[HR_ENERGY as usize] = 0;

        Self {
            holding,
            input: (0..TABLE_SIZE).map(|i| (i as u16) * 10).collect(),
            coils: vec![false; TABLE_SIZE],
            discrete: vec![false; TABLE_SIZE],
        }
    }
}

/// Modbus TCP 模拟器
pub struct ModbusSimulator {
    config: SimulatorConfig,
    tables: RwLock<Tables>,
    rng: Mutex<StdRng>,
}

/// 运行中的模拟器句柄
pub struct SimulatorHandle {
    local_addr: SocketAddr,
    server: JoinHandle<()>,
    ticker: Option<JoinHandle<()>>,
}

impl SimulatorHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 停止监听并关闭所有客户端连接
    pub fn shutdown(self) {
        self.server.abort();
        if let Some(ticker) = self.ticker {
            ticker.abort();
        }
        info!(target: "ems.simulator", addr = %self.local_addr, "simulator_stopped");
    }
}

impl ModbusSimulator {
    pub fn new(config: SimulatorConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            tables: RwLock::new(Tables::initial()),
            rng: Mutex::new(rng),
        }
    }

    /// 绑定监听地址并启动接入循环与后台扰动任务
    pub async fn start(self: Arc<Self>) -> Result<SimulatorHandle, ProtocolError> {
        let listener = TcpListener::bind(&self.config.listen_addr).await?;
        let local_addr = listener.local_addr()?;
        info!(target: "ems.simulator", addr = %local_addr, "simulator_listening");

        let ticker = (self.config.tick_ms > 0).then(|| {
            let sim = self.clone();
            let period = Duration::from_millis(self.config.tick_ms);
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                // 首次 tick 立即返回
                interval.tick().await;
                loop {
                    interval.tick().await;
                    sim.tick().await;
                }
            })
        });

        let server = tokio::spawn(self.accept_loop(listener));

        Ok(SimulatorHandle {
            local_addr,
            server,
            ticker,
        })
    }

    async fn accept_loop(self: Arc<Self>, listener: TcpListener) {
        // 任务被 abort 时 JoinSet 随之释放，所有连接一起关闭
        let mut connections = JoinSet::new();
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(target: "ems.simulator", peer = %peer, "simulator_client_connected");
                        connections.spawn(self.clone().serve_connection(stream, peer));
                    }
                    Err(err) => {
                        warn!(target: "ems.simulator", error = %err, "simulator_accept_failed");
                        break;
                    }
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }
    }

    async fn serve_connection(self: Arc<Self>, mut stream: TcpStream, peer: SocketAddr) {
        let mut pending: Vec<u8> = Vec::with_capacity(MAX_FRAME_LEN);
        let mut chunk = [0u8; MAX_FRAME_LEN];

        loop {
            let n = match stream.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) => {
                    debug!(target: "ems.simulator", peer = %peer, error = %err, "simulator_read_failed");
                    break;
                }
            };
            pending.extend_from_slice(&chunk[..n]);

            loop {
                match frame::take_frame(&mut pending) {
                    Ok(Some(raw)) => {
                        let Some(response) = self.handle_frame(&raw).await else {
                            continue;
                        };
                        if let Err(err) = stream.write_all(&response).await {
                            debug!(target: "ems.simulator", peer = %peer, error = %err, "simulator_write_failed");
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        warn!(target: "ems.simulator", peer = %peer, error = %err, "simulator_frame_dropped");
                        pending.clear();
                        break;
                    }
                }
            }
        }
        debug!(target: "ems.simulator", peer = %peer, "simulator_client_disconnected");
    }

    /// 处理单帧请求；返回 None 表示不应答
    pub async fn handle_frame(&self, raw: &[u8]) -> Option<Vec<u8>> {
        let request = match frame::parse_request(raw) {
            Ok(request) => request,
            Err(err) => {
                debug!(target: "ems.simulator", error = %err, "simulator_request_invalid");
                return None;
            }
        };
        if request.header.protocol_id != 0 {
            return None;
        }

        let header = &request.header;
        let fc = request.function_code;
        let response = match request.request {
            Request::ReadHoldingRegisters { address, quantity } => {
                let tables = self.tables.read().await;
                checked_slice(&tables.holding, address, quantity, MAX_READ_REGISTERS)
                    .map(|values| frame::encode_register_response(header, fc, &values))
            }
            Request::ReadInputRegisters { address, quantity } => {
                let tables = self.tables.read().await;
                checked_slice(&tables.input, address, quantity, MAX_READ_REGISTERS)
                    .map(|values| frame::encode_register_response(header, fc, &values))
            }
            Request::ReadCoils { address, quantity } => {
                let tables = self.tables.read().await;
                checked_slice(&tables.coils, address, quantity, MAX_READ_BITS)
                    .map(|bits| frame::encode_bit_response(header, fc, &bits))
            }
            Request::ReadDiscreteInputs { address, quantity } => {
                let tables = self.tables.read().await;
                checked_slice(&tables.discrete, address, quantity, MAX_READ_BITS)
                    .map(|bits| frame::encode_bit_response(header, fc, &bits))
            }
            Request::WriteSingleRegister { address, value } => {
                let mut tables = self.tables.write().await;
                match tables.holding.get_mut(address as usize) {
                    Some(slot) => {
                        *slot = value;
                        Ok(request.raw.clone())
                    }
                    None => Err(EXCEPTION_ILLEGAL_DATA_ADDRESS),
                }
            }
            Request::WriteSingleCoil { address, value } => {
                let state = match value {
                    0xFF00 => Ok(true),
                    0x0000 => Ok(false),
                    _ => Err(EXCEPTION_ILLEGAL_DATA_VALUE),
                };
                match state {
                    Ok(state) => {
                        let mut tables = self.tables.write().await;
                        match tables.coils.get_mut(address as usize) {
                            Some(slot) => {
                                *slot = state;
                                Ok(request.raw.clone())
                            }
                            None => Err(EXCEPTION_ILLEGAL_DATA_ADDRESS),
                        }
                    }
                    Err(code) => Err(code),
                }
            }
            Request::Truncated => {
                warn!(
                    target: "ems.simulator",
                    function_code = fc,
                    bytes = raw.len(),
                    "simulator_request_truncated"
                );
                Err(EXCEPTION_ILLEGAL_DATA_VALUE)
            }
            Request::Unsupported => Err(EXCEPTION_ILLEGAL_FUNCTION),
        };

        Some(response.unwrap_or_else(|code| {
            debug!(
                target: "ems.simulator",
                function_code = fc,
                exception_code = code,
                "simulator_exception_response"
            );
            frame::encode_exception(header, fc, code)
        }))
    }

    /// 扰动一次：电压 / 电流 / 频率 / 温度随机漂移（有界），重算功率，电量 +1
    pub async fn tick(&self) {
        let (dv, di, df, dt) = {
            let mut rng = self.rng.lock().await;
            (
                rng.gen_range(-5i32..=5),
                rng.gen_range(-3i32..=3),
                rng.gen_range(-2i32..=2),
                rng.gen_range(-2i32..=2),
            )
        };

        let mut tables = self.tables.write().await;
        let holding = &mut tables.holding;
        holding[HR_VOLTAGE as usize] = drift(holding[HR_VOLTAGE as usize], dv, VOLTAGE_RANGE);
        holding[HR_CURRENT as usize] = drift(holding[HR_CURRENT as usize], di, CURRENT_RANGE);
        holding[HR_FREQUENCY as usize] =
            drift(holding[HR_FREQUENCY as usize], df, FREQUENCY_RANGE);
        holding[HR_TEMPERATURE as usize] =
            drift(holding[HR_TEMPERATURE as usize], dt, TEMPERATURE_RANGE);
        holding[HR_POWER as usize] =
            power_watts(holding[HR_VOLTAGE as usize], holding[HR_CURRENT as usize]);
        holding[HR_ENERGY as usize] = holding[HR_ENERGY as usize].wrapping_add(1);
    }

    pub async fn set_register(&self, address: u16, value: u16) -> Result<(), ProtocolError> {
        let mut tables = self.tables.write().await;
        let slot = tables
            .holding
            .get_mut(address as usize)
            .ok_or_else(|| out_of_range("holding register", address))?;
        *slot = value;
        Ok(())
    }

    pub async fn get_register(&self, address: u16) -> Option<u16> {
        self.tables.read().await.holding.get(address as usize).copied()
    }

    pub async fn set_input_register(&self, address: u16, value: u16) -> Result<(), ProtocolError> {
        let mut tables = self.tables.write().await;
        let slot = tables
            .input
            .get_mut(address as usize)
            .ok_or_else(|| out_of_range("input register", address))?;
        *slot = value;
        Ok(())
    }

    pub async fn get_input_register(&self, address: u16) -> Option<u16> {
        self.tables.read().await.input.get(address as usize).copied()
    }

    pub async fn set_coil(&self, address: u16, value: bool) -> Result<(), ProtocolError> {
        let mut tables = self.tables.write().await;
        let slot = tables
            .coils
            .get_mut(address as usize)
            .ok_or_else(|| out_of_range("coil", address))?;
        *slot = value;
        Ok(())
    }

    pub async fn get_coil(&self, address: u16) -> Option<bool> {
        self.tables.read().await.coils.get(address as usize).copied()
    }

    /// 置位告警离散输入
    pub async fn trigger_alarm(&self, index: u16) -> Result<(), ProtocolError> {
        self.set_discrete(index, true).await
    }

    /// 复位告警离散输入
    pub async fn clear_alarm(&self, index: u16) -> Result<(), ProtocolError> {
        self.set_discrete(index, false).await
    }

    pub async fn get_discrete_input(&self, index: u16) -> Option<bool> {
        self.tables.read().await.discrete.get(index as usize).copied()
    }

    async fn set_discrete(&self, index: u16, value: bool) -> Result<(), ProtocolError> {
        let mut tables = self.tables.write().await;
        let slot = tables
            .discrete
            .get_mut(index as usize)
            .ok_or_else(|| out_of_range("discrete input", index))?;
        *slot = value;
        Ok(())
    }
}

fn checked_slice<T: Copy>(table: &[T], address: u16, quantity: u16, max: u16) -> Result<Vec<T>, u8> {
    if quantity == 0 || quantity > max {
        return Err(EXCEPTION_ILLEGAL_DATA_VALUE);
    }
    let start = address as usize;
    let end = start + quantity as usize;
    if end > table.len() {
        return Err(EXCEPTION_ILLEGAL_DATA_ADDRESS);
    }
    Ok(table[start..end].to_vec())
}

fn drift(current: u16, delta: i32, (low, high): (u16, u16)) -> u16 {
    (current as i32 + delta).clamp(low as i32, high as i32) as u16
}

/// 功率（W）= 电压（0.1 V）* 电流（0.1 A）/ 100
fn power_watts(voltage: u16, current: u16) -> u16 {
    (voltage as u32 * current as u32 / 100).min(u16::MAX as u32) as u16
}

fn out_of_range(table: &str, address: u16) -> ProtocolError {
    ProtocolError::Config(format!("{} address out of range: {}", table, address))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simulator(seed: u64) -> ModbusSimulator {
        ModbusSimulator::new(SimulatorConfig {
            listen_addr: "127.0.0.1:0".to_string(),
            tick_ms: 0,
            seed: Some(seed),
        })
    }

    fn request(tid: u16, fc: u8, first: u16, second: u16) -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&tid.to_be_bytes());
        raw.extend_from_slice(&[0, 0, 0, 6, 1, fc]);
        raw.extend_from_slice(&first.to_be_bytes());
        raw.extend_from_slice(&second.to_be_bytes());
        raw
    }

    #[tokio::test]
    async fn initial_power_matches_voltage_times_current() {
        let sim = simulator(1);
        assert_eq!(sim.get_register(HR_VOLTAGE).await, Some(2300));
        assert_eq!(sim.get_register(HR_POWER).await, Some(3450));
    }

    #[tokio::test]
    async fn tick_stays_in_bounds_and_counts_energy() {
        let sim = simulator(42);
        for _ in 0..500 {
            sim.tick().await;
        }
        let voltage = sim.get_register(HR_VOLTAGE).await.expect("voltage");
        let current = sim.get_register(HR_CURRENT).await.expect("current");
        assert!((VOLTAGE_RANGE.0..=VOLTAGE_RANGE.1).contains(&voltage));
        assert!((CURRENT_RANGE.0..=CURRENT_RANGE.1).contains(&current));
        assert_eq!(sim.get_register(HR_POWER).await, Some(power_watts(voltage, current)));
        assert_eq!(sim.get_register(HR_ENERGY).await, Some(500));
    }

    #[tokio::test]
    async fn same_seed_same_drift() {
        let a = simulator(7);
        let b = simulator(7);
        for _ in 0..20 {
            a.tick().await;
            b.tick().await;
        }
        for address in HR_VOLTAGE..=HR_ENERGY {
            assert_eq!(a.get_register(address).await, b.get_register(address).await);
        }
    }

    #[tokio::test]
    async fn write_single_register_echoes_request() {
        let sim = simulator(1);
        let raw = request(3, frame::FC_WRITE_SINGLE_REGISTER, 10, 0xBEEF);
        let response = sim.handle_frame(&raw).await.expect("response");
        assert_eq!(response, raw);
        assert_eq!(sim.get_register(10).await, Some(0xBEEF));
    }

    #[tokio::test]
    async fn write_single_coil_rejects_invalid_value() {
        let sim = simulator(1);
        let raw = request(4, frame::FC_WRITE_SINGLE_COIL, 2, 0x1234);
        let response = sim.handle_frame(&raw).await.expect("response");
        assert_eq!(response[7], frame::FC_WRITE_SINGLE_COIL | 0x80);
        assert_eq!(response[8], EXCEPTION_ILLEGAL_DATA_VALUE);

        let raw = request(5, frame::FC_WRITE_SINGLE_COIL, 2, 0xFF00);
        assert_eq!(sim.handle_frame(&raw).await, Some(raw.clone()));
        assert_eq!(sim.get_coil(2).await, Some(true));
    }

    #[tokio::test]
    async fn out_of_range_read_is_illegal_address() {
        let sim = simulator(1);
        let raw = request(6, frame::FC_READ_HOLDING_REGISTERS, 98, 5);
        let response = sim.handle_frame(&raw).await.expect("response");
        assert_eq!(response[7], 0x83);
        assert_eq!(response[8], EXCEPTION_ILLEGAL_DATA_ADDRESS);

        let raw = request(7, frame::FC_READ_INPUT_REGISTERS, 0, 0);
        let response = sim.handle_frame(&raw).await.expect("response");
        assert_eq!(response[8], EXCEPTION_ILLEGAL_DATA_VALUE);
    }

    #[tokio::test]
    async fn non_modbus_protocol_id_is_dropped() {
        let sim = simulator(1);
        let mut raw = request(8, frame::FC_READ_HOLDING_REGISTERS, 0, 1);
        raw[3] = 1;
        assert!(sim.handle_frame(&raw).await.is_none());
    }

    #[tokio::test]
    async fn alarm_inputs_toggle() {
        let sim = simulator(1);
        sim.trigger_alarm(3).await.expect("trigger");
        assert_eq!(sim.get_discrete_input(3).await, Some(true));
        sim.clear_alarm(3).await.expect("clear");
        assert_eq!(sim.get_discrete_input(3).await, Some(false));
        assert!(sim.trigger_alarm(500).await.is_err());
    }
}
