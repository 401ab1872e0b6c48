//! MIT License
//!
//! Copyright (c) 2026 Moka Developers
//!
//! UDP 协议
//!
//! 接收侧按目的端口查回调表并同步调用处理函数；
//! 发送侧构造 8 字节头部后委托给 IPv4 层。
//! 校验和恒为 0：IPv4 下 UDP 校验和是可选的，0 表示未计算，这不是缺陷。

use log::trace;

use crate::config::UDP_MAX_CALLBACKS;
use crate::net::device::NetDevice;
use crate::net::ipv4::{self, IP_PROTO_UDP};
use crate::net::{Ipv4Address, NetError, NetStack};

use alloc::vec::Vec;

/// UDP 头部长度
pub const UDP_HLEN: usize = 8;

/// UDP 头部
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpHeader {
    /// 源端口
    pub src_port: u16,
    /// 目标端口
    pub dest_port: u16,
    /// 长度（头部 + 数据）
    pub length: u16,
    /// 校验和（本实现恒为 0）
    pub checksum: u16,
}

impl UdpHeader {
    /// 从字节切片解析 UDP 头部
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < UDP_HLEN {
            return None;
        }

        Some(Self {
            src_port: u16::from_be_bytes([data[0], data[1]]),
            dest_port: u16::from_be_bytes([data[2], data[3]]),
            length: u16::from_be_bytes([data[4], data[5]]),
            checksum: u16::from_be_bytes([data[6], data[7]]),
        })
    }

    /// 序列化头部到 `buf` 开头
    ///
    /// 调用方保证 `buf.len() >= UDP_HLEN`
    pub fn write_to(&self, buf: &mut [u8]) {
        buf[0..2].copy_from_slice(&self.src_port.to_be_bytes());
        buf[2..4].copy_from_slice(&self.dest_port.to_be_bytes());
        buf[4..6].copy_from_slice(&self.length.to_be_bytes());
        buf[6..8].copy_from_slice(&self.checksum.to_be_bytes());
    }
}

/// UDP 接收回调
///
/// 在接收路径内同步调用，参数为（源 IP, 源端口, 载荷）。
/// 回调运行完毕前不会处理下一帧（单执行流，无重入问题）。
pub type UdpCallback = fn(src_ip: Ipv4Address, src_port: u16, payload: &[u8]);

#[derive(Debug, Clone, Copy)]
struct CallbackEntry {
    port: u16,
    callback: UdpCallback,
}

/// 端口 → 回调 的固定容量注册表
///
/// 不变式：每个端口至多一个有效回调；重复注册原地替换。
pub struct UdpCallbackTable {
    entries: [Option<CallbackEntry>; UDP_MAX_CALLBACKS],
}

impl UdpCallbackTable {
    pub const fn new() -> Self {
        const EMPTY: Option<CallbackEntry> = None;
        Self {
            entries: [EMPTY; UDP_MAX_CALLBACKS],
        }
    }

    /// 注册端口回调
    ///
    /// # 返回
    /// 表满且端口为新端口时返回 [`NetError::TableFull`]
    pub fn register(&mut self, port: u16, callback: UdpCallback) -> Result<(), NetError> {
        // 已注册端口原地替换
        for slot in self.entries.iter_mut() {
            if let Some(entry) = slot {
                if entry.port == port {
                    entry.callback = callback;
                    return Ok(());
                }
            }
        }

        for slot in self.entries.iter_mut() {
            if slot.is_none() {
                *slot = Some(CallbackEntry { port, callback });
                return Ok(());
            }
        }
        Err(NetError::TableFull)
    }

    /// 查找端口的回调
    pub fn find(&self, port: u16) -> Option<UdpCallback> {
        self.entries
            .iter()
            .flatten()
            .find(|entry| entry.port == port)
            .map(|entry| entry.callback)
    }

    /// 有效条目数
    pub fn len(&self) -> usize {
        self.entries.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 处理接收到的 UDP 数据包
///
/// # 说明
/// 长度门：载荷不足头部、或声明长度超过实际收到都丢弃。
/// 未注册端口静默丢弃，不生成 ICMP port-unreachable。
pub fn udp_input(stack: &mut NetStack, src_ip: Ipv4Address, payload: &[u8]) {
    let header = match UdpHeader::from_bytes(payload) {
        Some(h) => h,
        None => {
            trace!("udp: short packet ({} bytes), dropped", payload.len());
            stack.stats.frames_dropped += 1;
            return;
        }
    };

    let udp_len = header.length as usize;
    if udp_len < UDP_HLEN || udp_len > payload.len() {
        trace!("udp: bad length field {}, dropped", udp_len);
        stack.stats.frames_dropped += 1;
        return;
    }

    stack.stats.udp_packets_received += 1;

    let data = &payload[UDP_HLEN..udp_len];
    match stack.udp_table.find(header.dest_port) {
        Some(callback) => {
            stack.stats.udp_callbacks_invoked += 1;
            callback(src_ip, header.src_port, data);
        }
        None => {
            trace!("udp: no handler for port {}, dropped", header.dest_port);
        }
    }
}

/// 发送一个 UDP 数据包
///
/// 校验和字段写 0（IPv4 下可选），随后委托 [`ipv4::ip_output`]。
pub fn udp_output(
    stack: &mut NetStack,
    dev: &mut dyn NetDevice,
    dest_ip: Ipv4Address,
    dest_port: u16,
    src_port: u16,
    data: &[u8],
) -> Result<usize, NetError> {
    let header = UdpHeader {
        src_port,
        dest_port,
        length: (UDP_HLEN + data.len()) as u16,
        checksum: 0,
    };

    let mut packet = Vec::with_capacity(UDP_HLEN + data.len());
    packet.resize(UDP_HLEN, 0);
    header.write_to(&mut packet);
    packet.extend_from_slice(data);

    ipv4::ip_output(stack, dev, dest_ip, IP_PROTO_UDP, &packet)
}
