//! Modbus TCP 帧编解码（MBAP 头 + PDU）
//!
//! 仅覆盖模拟器需要的功能码：1/2/3/4 读，5/6 单写。
//!
//! ```text
//! | transaction_id (2) | protocol_id (2) | length (2) | unit_id (1) | function_code (1) | data ... |
//! ```

use crate::error::ProtocolError;

/// MBAP 头长度（含 unit_id）
pub const MBAP_HEADER_LEN: usize = 7;
/// 单帧最大长度
pub const MAX_FRAME_LEN: usize = 260;
/// 单次读寄存器最大数量
pub const MAX_READ_REGISTERS: u16 = 125;
/// 单次读位最大数量
pub const MAX_READ_BITS: u16 = 2000;

pub const FC_READ_COILS: u8 = 0x01;
pub const FC_READ_DISCRETE_INPUTS: u8 = 0x02;
pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;
pub const FC_READ_INPUT_REGISTERS: u8 = 0x04;
pub const FC_WRITE_SINGLE_COIL: u8 = 0x05;
pub const FC_WRITE_SINGLE_REGISTER: u8 = 0x06;

/// 异常码：非法功能
pub const EXCEPTION_ILLEGAL_FUNCTION: u8 = 0x01;
/// 异常码：非法数据地址
pub const EXCEPTION_ILLEGAL_DATA_ADDRESS: u8 = 0x02;
/// 异常码：非法数据值
pub const EXCEPTION_ILLEGAL_DATA_VALUE: u8 = 0x03;

/// MBAP 头
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbapHeader {
    pub transaction_id: u16,
    pub protocol_id: u16,
    /// 后续字节数（unit_id + PDU）
    pub length: u16,
    pub unit_id: u8,
}

impl MbapHeader {
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < MBAP_HEADER_LEN {
            return None;
        }
        Some(Self {
            transaction_id: u16::from_be_bytes([buf[0], buf[1]]),
            protocol_id: u16::from_be_bytes([buf[2], buf[3]]),
            length: u16::from_be_bytes([buf[4], buf[5]]),
            unit_id: buf[6],
        })
    }

    fn encode(&self, pdu_len: usize, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.transaction_id.to_be_bytes());
        out.extend_from_slice(&[0x00, 0x00]);
        out.extend_from_slice(&((pdu_len + 1) as u16).to_be_bytes());
        out.push(self.unit_id);
    }
}

/// 解析后的请求 PDU
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    ReadCoils { address: u16, quantity: u16 },
    ReadDiscreteInputs { address: u16, quantity: u16 },
    ReadHoldingRegisters { address: u16, quantity: u16 },
    ReadInputRegisters { address: u16, quantity: u16 },
    WriteSingleCoil { address: u16, value: u16 },
    WriteSingleRegister { address: u16, value: u16 },
    /// 支持的功能码但数据段不足 4 字节
    Truncated,
    /// 不支持的功能码
    Unsupported,
}

/// 请求帧
#[derive(Debug, Clone)]
pub struct RequestFrame {
    pub header: MbapHeader,
    pub function_code: u8,
    pub request: Request,
    /// 原始字节（单写响应原样回显）
    pub raw: Vec<u8>,
}

/// 从接收缓冲区切出一个完整帧。
///
/// 数据不足返回 `Ok(None)`；长度字段非法返回错误，调用方应丢弃缓冲区。
pub fn take_frame(buf: &mut Vec<u8>) -> Result<Option<Vec<u8>>, ProtocolError> {
    if buf.len() < 6 {
        return Ok(None);
    }
    let length = u16::from_be_bytes([buf[4], buf[5]]) as usize;
    let total = 6 + length;
    if length < 2 || total > MAX_FRAME_LEN {
        return Err(ProtocolError::Protocol(format!(
            "invalid mbap length: {}",
            length
        )));
    }
    if buf.len() < total {
        return Ok(None);
    }
    let rest = buf.split_off(total);
    let frame = std::mem::replace(buf, rest);
    Ok(Some(frame))
}

/// 解析单个请求帧
pub fn parse_request(frame: &[u8]) -> Result<RequestFrame, ProtocolError> {
    let header = MbapHeader::parse(frame)
        .ok_or_else(|| ProtocolError::Protocol("frame too short".to_string()))?;
    if frame.len() < MBAP_HEADER_LEN + 1 {
        return Err(ProtocolError::Protocol("missing function code".to_string()));
    }
    let function_code = frame[7];

    let request = match function_code {
        FC_READ_COILS
        | FC_READ_DISCRETE_INPUTS
        | FC_READ_HOLDING_REGISTERS
        | FC_READ_INPUT_REGISTERS
        | FC_WRITE_SINGLE_COIL
        | FC_WRITE_SINGLE_REGISTER => {
            if frame.len() < 12 {
                return Ok(RequestFrame {
                    header,
                    function_code,
                    request: Request::Truncated,
                    raw: frame.to_vec(),
                });
            }
            let first = u16::from_be_bytes([frame[8], frame[9]]);
            let second = u16::from_be_bytes([frame[10], frame[11]]);
            match function_code {
                FC_READ_COILS => Request::ReadCoils {
                    address: first,
                    quantity: second,
                },
                FC_READ_DISCRETE_INPUTS => Request::ReadDiscreteInputs {
                    address: first,
                    quantity: second,
                },
                FC_READ_HOLDING_REGISTERS => Request::ReadHoldingRegisters {
                    address: first,
                    quantity: second,
                },
                FC_READ_INPUT_REGISTERS => Request::ReadInputRegisters {
                    address: first,
                    quantity: second,
                },
                FC_WRITE_SINGLE_COIL => Request::WriteSingleCoil {
                    address: first,
                    value: second,
                },
                _ => Request::WriteSingleRegister {
                    address: first,
                    value: second,
                },
            }
        }
        _ => Request::Unsupported,
    };

    Ok(RequestFrame {
        header,
        function_code,
        request,
        raw: frame.to_vec(),
    })
}

/// 寄存器读响应：字节数 = 2 * 数量，大端
pub fn encode_register_response(header: &MbapHeader, function_code: u8, values: &[u16]) -> Vec<u8> {
    let byte_count = values.len() * 2;
    let mut out = Vec::with_capacity(MBAP_HEADER_LEN + 2 + byte_count);
    header.encode(2 + byte_count, &mut out);
    out.push(function_code);
    out.push(byte_count as u8);
    for value in values {
        out.extend_from_slice(&value.to_be_bytes());
    }
    out
}

/// 位读响应：字节数 = ceil(数量 / 8)，LSB 优先
pub fn encode_bit_response(header: &MbapHeader, function_code: u8, bits: &[bool]) -> Vec<u8> {
    let packed = pack_bits(bits);
    let mut out = Vec::with_capacity(MBAP_HEADER_LEN + 2 + packed.len());
    header.encode(2 + packed.len(), &mut out);
    out.push(function_code);
    out.push(packed.len() as u8);
    out.extend_from_slice(&packed);
    out
}

/// 异常响应：功能码最高位置 1，附一个异常码字节
pub fn encode_exception(header: &MbapHeader, function_code: u8, exception_code: u8) -> Vec<u8> {
    let mut out = Vec::with_capacity(MBAP_HEADER_LEN + 2);
    header.encode(2, &mut out);
    out.push(function_code | 0x80);
    out.push(exception_code);
    out
}

/// 位打包（每字节低位在前）
pub fn pack_bits(bits: &[bool]) -> Vec<u8> {
    let mut packed = vec![0u8; bits.len().div_ceil(8)];
    for (i, bit) in bits.iter().enumerate() {
        if *bit {
            packed[i / 8] |= 1 << (i % 8);
        }
    }
    packed
}
