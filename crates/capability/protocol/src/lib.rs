//! # 协议通信能力模块
//!
//! 提供 Modbus 数据采集的传输能力：
//! - **传输客户端**：按连接 ID 管理 Modbus TCP / RTU 会话，读写寄存器、线圈、离散输入
//! - **帧编解码**：MBAP 头与请求/响应 PDU
//! - **协议模拟器**：最小化 Modbus TCP 从站，用作测试替身
//!
//! ## 架构设计
//!
//! ```text
//! ConnectionConfig (protocol + host/port | serial_port/baud_rate + unit_id)
//!       │
//!       ▼
//! ModbusClientManager ──(ModbusTransport)──▶ DataCollector
//!       │
//!       ├── tcp::connect_slave
//!       └── rtu::attach_slave (tokio-serial)
//!
//! ModbusSimulator ── frame::{take_frame, parse_request, encode_*}
//! ```

mod client;
mod error;
pub mod frame;
pub mod simulator;

pub use client::{ModbusClientManager, ModbusTransport, OperationResult};
pub use error::ProtocolError;
pub use simulator::{ModbusSimulator, SimulatorConfig, SimulatorHandle};
