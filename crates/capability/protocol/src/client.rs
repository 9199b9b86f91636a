//! Modbus 传输客户端
//!
//! 按连接 ID 管理 TCP / RTU 会话，每个会话由独立的异步互斥锁串行化 I/O。
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! let manager = ModbusClientManager::new();
//! manager.connect("station-1", &ConnectionConfig::tcp("station-1", "192.168.1.100", 502)).await.result?;
//! let op = manager.read_holding_registers("station-1", 0, 4).await;
//! println!("{:?} in {} ms", op.result, op.latency_ms);
//! ```

use crate::error::ProtocolError;
use async_trait::async_trait;
use domain::{ConnectionConfig, Protocol, RegisterType};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;
use tokio_modbus::client::Context;
use tokio_modbus::ExceptionCode;
use tokio_modbus::prelude::*;
use tokio_serial::SerialStream;
use tracing::{debug, info, warn};

/// 单次操作结果（附带耗时）
#[derive(Debug)]
pub struct OperationResult<T> {
    pub result: Result<T, ProtocolError>,
    pub latency_ms: u64,
}

impl<T> OperationResult<T> {
    fn finish(result: Result<T, ProtocolError>, started: Instant) -> Self {
        Self {
            result,
            latency_ms: started.elapsed().as_millis() as u64,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn into_result(self) -> Result<T, ProtocolError> {
        self.result
    }
}

struct Session {
    ctx: Arc<Mutex<Context>>,
    timeout: Duration,
}

/// Modbus 连接管理器
#[derive(Default)]
pub struct ModbusClientManager {
    sessions: RwLock<HashMap<String, Session>>,
}

impl ModbusClientManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 打开连接。已存在同 ID 连接时先拆除旧连接；失败不留下任何条目。
    pub async fn connect(&self, id: &str, config: &ConnectionConfig) -> OperationResult<()> {
        let started = Instant::now();
        self.disconnect(id).await;

        let session_timeout = Duration::from_millis(config.timeout_ms.max(1));
        let opened = match config.protocol {
            Protocol::Tcp => open_tcp(config, session_timeout).await,
            Protocol::Rtu => open_rtu(config, session_timeout),
        };

        let result = match opened {
            Ok(ctx) => {
                self.sessions.write().await.insert(
                    id.to_string(),
                    Session {
                        ctx: Arc::new(Mutex::new(ctx)),
                        timeout: session_timeout,
                    },
                );
                info!(
                    target: "ems.protocol",
                    connection_id = %id,
                    protocol = ?config.protocol,
                    unit_id = config.unit_id,
                    "modbus_connected"
                );
                Ok(())
            }
            Err(err) => {
                warn!(
                    target: "ems.protocol",
                    connection_id = %id,
                    error = %err,
                    "modbus_connect_failed"
                );
                Err(err)
            }
        };
        OperationResult::finish(result, started)
    }

    /// 关闭并移除连接；不存在时为空操作。
    pub async fn disconnect(&self, id: &str) -> bool {
        let removed = self.sessions.write().await.remove(id);
        let Some(session) = removed else {
            return false;
        };
        let mut ctx = session.ctx.lock().await;
        match timeout(session.timeout, ctx.disconnect()).await {
            Ok(Err(err)) => {
                debug!(target: "ems.protocol", connection_id = %id, error = %err, "modbus_disconnect_error");
            }
            Err(_) => {
                debug!(target: "ems.protocol", connection_id = %id, "modbus_disconnect_timeout");
            }
            Ok(Ok(_)) => {}
        }
        info!(target: "ems.protocol", connection_id = %id, "modbus_disconnected");
        true
    }

    pub async fn is_connected(&self, id: &str) -> bool {
        self.sessions.read().await.contains_key(id)
    }

    pub async fn list_connected_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn disconnect_all(&self) {
        let ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        for id in ids {
            self.disconnect(&id).await;
        }
    }

    /// 读保持寄存器 (0x03)
    pub async fn read_holding_registers(
        &self,
        id: &str,
        address: u16,
        count: u16,
    ) -> OperationResult<Vec<u16>> {
        let started = Instant::now();
        let result = async {
            let (ctx, limit) = self.session(id).await?;
            let mut guard = ctx.lock().await;
            call(limit, guard.read_holding_registers(address, count)).await
        }
        .await;
        self.finish(id, result, started).await
    }

    /// 读输入寄存器 (0x04)
    pub async fn read_input_registers(
        &self,
        id: &str,
        address: u16,
        count: u16,
    ) -> OperationResult<Vec<u16>> {
        let started = Instant::now();
        let result = async {
            let (ctx, limit) = self.session(id).await?;
            let mut guard = ctx.lock().await;
            call(limit, guard.read_input_registers(address, count)).await
        }
        .await;
        self.finish(id, result, started).await
    }

    /// 读线圈 (0x01)，结果归一化为 0 / 1
    pub async fn read_coils(&self, id: &str, address: u16, count: u16) -> OperationResult<Vec<u16>> {
        let started = Instant::now();
        let result = async {
            let (ctx, limit) = self.session(id).await?;
            let mut guard = ctx.lock().await;
            call(limit, guard.read_coils(address, count)).await
        }
        .await
        .map(bits_to_words);
        self.finish(id, result, started).await
    }

    /// 读离散输入 (0x02)，结果归一化为 0 / 1
    pub async fn read_discrete_inputs(
        &self,
        id: &str,
        address: u16,
        count: u16,
    ) -> OperationResult<Vec<u16>> {
        let started = Instant::now();
        let result = async {
            let (ctx, limit) = self.session(id).await?;
            let mut guard = ctx.lock().await;
            call(limit, guard.read_discrete_inputs(address, count)).await
        }
        .await
        .map(bits_to_words);
        self.finish(id, result, started).await
    }

    /// 按寄存器类型读取
    pub async fn read_by_type(
        &self,
        id: &str,
        register_type: RegisterType,
        address: u16,
        count: u16,
    ) -> OperationResult<Vec<u16>> {
        match register_type {
            RegisterType::Holding => self.read_holding_registers(id, address, count).await,
            RegisterType::Input => self.read_input_registers(id, address, count).await,
            RegisterType::Coil => self.read_coils(id, address, count).await,
            RegisterType::Discrete => self.read_discrete_inputs(id, address, count).await,
        }
    }

    /// 写单个寄存器 (0x06)
    pub async fn write_single_register(&self, id: &str, address: u16, value: u16) -> OperationResult<()> {
        let started = Instant::now();
        let result = async {
            let (ctx, limit) = self.session(id).await?;
            let mut guard = ctx.lock().await;
            call(limit, guard.write_single_register(address, value)).await
        }
        .await;
        self.finish(id, result, started).await
    }

    /// 写多个寄存器 (0x10)
    pub async fn write_multiple_registers(
        &self,
        id: &str,
        address: u16,
        values: &[u16],
    ) -> OperationResult<()> {
        let started = Instant::now();
        let result = async {
            let (ctx, limit) = self.session(id).await?;
            let mut guard = ctx.lock().await;
            call(limit, guard.write_multiple_registers(address, values)).await
        }
        .await;
        self.finish(id, result, started).await
    }

    /// 写单个线圈 (0x05)
    pub async fn write_single_coil(&self, id: &str, address: u16, value: bool) -> OperationResult<()> {
        let started = Instant::now();
        let result = async {
            let (ctx, limit) = self.session(id).await?;
            let mut guard = ctx.lock().await;
            call(limit, guard.write_single_coil(address, value)).await
        }
        .await;
        self.finish(id, result, started).await
    }

    async fn session(&self, id: &str) -> Result<(Arc<Mutex<Context>>, Duration), ProtocolError> {
        self.sessions
            .read()
            .await
            .get(id)
            .map(|s| (s.ctx.clone(), s.timeout))
            .ok_or_else(|| ProtocolError::NotConnected(id.to_string()))
    }

    /// 链路失效（超时 / 连接错误）的会话被移除，由调用方重连。
    async fn finish<T>(
        &self,
        id: &str,
        result: Result<T, ProtocolError>,
        started: Instant,
    ) -> OperationResult<T> {
        if let Err(err @ (ProtocolError::Timeout(_) | ProtocolError::Connection(_))) = &result {
            if self.sessions.write().await.remove(id).is_some() {
                warn!(
                    target: "ems.protocol",
                    connection_id = %id,
                    error = %err,
                    "modbus_session_evicted"
                );
            }
        }
        OperationResult::finish(result, started)
    }
}

async fn call<T>(
    limit: Duration,
    request: impl Future<Output = Result<Result<T, ExceptionCode>, tokio_modbus::Error>>,
) -> Result<T, ProtocolError> {
    timeout(limit, request)
        .await
        .map_err(|_| ProtocolError::Timeout(format!("no response within {} ms", limit.as_millis())))?
        .map_err(ProtocolError::from)?
        .map_err(ProtocolError::from)
}

fn bits_to_words(bits: Vec<bool>) -> Vec<u16> {
    bits.into_iter().map(u16::from).collect()
}

async fn open_tcp(config: &ConnectionConfig, limit: Duration) -> Result<Context, ProtocolError> {
    let host = config
        .host
        .as_deref()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| ProtocolError::Config(format!("station {} has no host", config.station_id)))?;
    let port = config
        .port
        .ok_or_else(|| ProtocolError::Config(format!("station {} has no port", config.station_id)))?;

    let addr = timeout(limit, tokio::net::lookup_host((host, port)))
        .await
        .map_err(|_| ProtocolError::Timeout(format!("resolve {}:{} timed out", host, port)))?
        .map_err(|e| ProtocolError::Config(format!("invalid address {}:{}: {}", host, port, e)))?
        .next()
        .ok_or_else(|| ProtocolError::Config(format!("no address for {}:{}", host, port)))?;

    timeout(limit, tcp::connect_slave(addr, Slave(config.unit_id)))
        .await
        .map_err(|_| ProtocolError::Timeout(format!("connect {} timed out", addr)))?
        .map_err(|e| ProtocolError::Connection(format!("connect {}: {}", addr, e)))
}

fn open_rtu(config: &ConnectionConfig, limit: Duration) -> Result<Context, ProtocolError> {
    let path = config
        .serial_port
        .as_deref()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| {
            ProtocolError::Config(format!("station {} has no serial port", config.station_id))
        })?;
    let baud_rate = config.baud_rate.unwrap_or(9600);

    let builder = tokio_serial::new(path, baud_rate).timeout(limit);
    let serial = SerialStream::open(&builder)
        .map_err(|e| ProtocolError::Connection(format!("open serial {}: {}", path, e)))?;
    Ok(rtu::attach_slave(serial, Slave(config.unit_id)))
}

/// 采集侧使用的传输接口（测试中可替换为假实现）
#[async_trait]
pub trait ModbusTransport: Send + Sync {
    async fn connect(&self, id: &str, config: &ConnectionConfig) -> OperationResult<()>;
    async fn disconnect(&self, id: &str) -> bool;
    async fn is_connected(&self, id: &str) -> bool;
    async fn read(
        &self,
        id: &str,
        register_type: RegisterType,
        address: u16,
        count: u16,
    ) -> OperationResult<Vec<u16>>;
    async fn disconnect_all(&self);
}

#[async_trait]
impl ModbusTransport for ModbusClientManager {
    async fn connect(&self, id: &str, config: &ConnectionConfig) -> OperationResult<()> {
        ModbusClientManager::connect(self, id, config).await
    }

    async fn disconnect(&self, id: &str) -> bool {
        ModbusClientManager::disconnect(self, id).await
    }

    async fn is_connected(&self, id: &str) -> bool {
        ModbusClientManager::is_connected(self, id).await
    }

    async fn read(
        &self,
        id: &str,
        register_type: RegisterType,
        address: u16,
        count: u16,
    ) -> OperationResult<Vec<u16>> {
        self.read_by_type(id, register_type, address, count).await
    }

    async fn disconnect_all(&self) {
        ModbusClientManager::disconnect_all(self).await
    }
}
