//! MIT License
//!
//! Copyright (c) 2026 Moka Developers
//!
//! ARP 协议
//!
//! IPv4 → MAC 的地址解析：固定容量缓存 + 请求/应答报文处理。
//! 查询是即发即弃的：缓存未命中时广播一个请求并立即向调用方报告未命中，
//! 不等待应答；重试策略完全交给调用方（IPv4 发送路径退化为广播帧）。

use log::{debug, trace};

use crate::config::ARP_CACHE_SIZE;
use crate::net::device::NetDevice;
use crate::net::ethernet::{EthHeader, ETH_ALEN, ETH_HLEN, ETH_P_ARP, ETH_P_IP};
use crate::net::{Ipv4Address, MacAddress, NetError, NetStack};

/// ARP 报文长度（以太网 + IPv4）
pub const ARP_PLEN: usize = 28;

/// 硬件类型：以太网
pub const ARP_HW_ETHERNET: u16 = 1;

/// 操作码：请求
pub const ARP_OP_REQUEST: u16 = 1;

/// 操作码：应答
pub const ARP_OP_REPLY: u16 = 2;

/// ARP 报文（以太网 + IPv4 专用布局）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpPacket {
    /// 硬件类型 (以太网 = 1)
    pub hw_type: u16,
    /// 协议类型 (IPv4 = 0x0800)
    pub proto_type: u16,
    /// 硬件地址长度 (以太网 = 6)
    pub hw_len: u8,
    /// 协议地址长度 (IPv4 = 4)
    pub proto_len: u8,
    /// 操作码 (REQUEST/REPLY)
    pub opcode: u16,
    /// 发送方硬件地址
    pub sender_mac: MacAddress,
    /// 发送方协议地址
    pub sender_ip: Ipv4Address,
    /// 目标硬件地址
    pub target_mac: MacAddress,
    /// 目标协议地址
    pub target_ip: Ipv4Address,
}

impl ArpPacket {
    /// 从字节切片解析 ARP 报文
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < ARP_PLEN {
            return None;
        }

        let mut sender_mac = [0u8; ETH_ALEN];
        let mut target_mac = [0u8; ETH_ALEN];
        let mut sender_ip = [0u8; 4];
        let mut target_ip = [0u8; 4];
        sender_mac.copy_from_slice(&data[8..14]);
        sender_ip.copy_from_slice(&data[14..18]);
        target_mac.copy_from_slice(&data[18..24]);
        target_ip.copy_from_slice(&data[24..28]);

        Some(Self {
            hw_type: u16::from_be_bytes([data[0], data[1]]),
            proto_type: u16::from_be_bytes([data[2], data[3]]),
            hw_len: data[4],
            proto_len: data[5],
            opcode: u16::from_be_bytes([data[6], data[7]]),
            sender_mac: MacAddress(sender_mac),
            sender_ip: Ipv4Address(sender_ip),
            target_mac: MacAddress(target_mac),
            target_ip: Ipv4Address(target_ip),
        })
    }

    /// 序列化报文到 `buf` 开头
    ///
    /// 调用方保证 `buf.len() >= ARP_PLEN`
    pub fn write_to(&self, buf: &mut [u8]) {
        buf[0..2].copy_from_slice(&self.hw_type.to_be_bytes());
        buf[2..4].copy_from_slice(&self.proto_type.to_be_bytes());
        buf[4] = self.hw_len;
        buf[5] = self.proto_len;
        buf[6..8].copy_from_slice(&self.opcode.to_be_bytes());
        buf[8..14].copy_from_slice(&self.sender_mac.0);
        buf[14..18].copy_from_slice(&self.sender_ip.0);
        buf[18..24].copy_from_slice(&self.target_mac.0);
        buf[24..28].copy_from_slice(&self.target_ip.0);
    }
}

/// ARP 缓存条目
#[derive(Debug, Clone, Copy)]
struct ArpEntry {
    ip: Ipv4Address,
    mac: MacAddress,
    /// 最后更新时间，当前恒为 0（TTL 未实现）
    timestamp: u64,
    valid: bool,
}

/// ARP 缓存
///
/// 固定容量表。插入策略：同 IP 原地更新；否则占用首个空槽；
/// 表满时覆盖 0 号槽（没有真正的 LRU，这是已知的简化）。
/// 不变式：每个 IP 至多一个条目。
pub struct ArpCache {
    entries: [ArpEntry; ARP_CACHE_SIZE],
}

impl ArpCache {
    pub const fn new() -> Self {
        const EMPTY: ArpEntry = ArpEntry {
            ip: Ipv4Address([0; 4]),
            mac: MacAddress([0; ETH_ALEN]),
            timestamp: 0,
            valid: false,
        };
        Self {
            entries: [EMPTY; ARP_CACHE_SIZE],
        }
    }

    /// 查找 IP 对应的 MAC
    pub fn lookup(&self, ip: Ipv4Address) -> Option<MacAddress> {
        self.entries
            .iter()
            .find(|e| e.valid && e.ip == ip)
            .map(|e| e.mac)
    }

    /// 插入或更新映射
    pub fn insert(&mut self, ip: Ipv4Address, mac: MacAddress) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.valid && e.ip == ip) {
            entry.mac = mac;
            entry.timestamp = 0;
            return;
        }

        let slot = match self.entries.iter().position(|e| !e.valid) {
            Some(idx) => idx,
            None => 0,
        };
        self.entries[slot] = ArpEntry {
            ip,
            mac,
            timestamp: 0,
            valid: true,
        };
    }

    /// 有效条目数
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.valid).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 处理接收到的 ARP 报文
///
/// # 说明
/// 无论操作码如何都先学习发送方的 (IP, MAC) 映射；
/// 之后只对询问本机 IP 的 REQUEST 回送单播 REPLY，REPLY 报文不再有动作。
pub fn arp_input(stack: &mut NetStack, dev: &mut dyn NetDevice, payload: &[u8]) {
    let packet = match ArpPacket::from_bytes(payload) {
        Some(p) => p,
        None => {
            trace!("arp: short packet ({} bytes), dropped", payload.len());
            stack.stats.frames_dropped += 1;
            return;
        }
    };

    if packet.hw_type != ARP_HW_ETHERNET || packet.proto_type != ETH_P_IP {
        trace!(
            "arp: unsupported hw/proto type {:#06x}/{:#06x}, dropped",
            packet.hw_type,
            packet.proto_type
        );
        stack.stats.frames_dropped += 1;
        return;
    }

    stack.stats.arp_packets_received += 1;

    // 学习发送方映射，REQUEST 和 REPLY 一视同仁
    stack.arp_cache.insert(packet.sender_ip, packet.sender_mac);

    if packet.opcode == ARP_OP_REQUEST && packet.target_ip == stack.ip() {
        debug!("arp: who-has {} from {}, replying", packet.target_ip, packet.sender_ip);
        let _ = send_reply(stack, dev, packet.sender_mac, packet.sender_ip);
    }
}

/// 广播一个 ARP 请求
pub fn send_request(
    stack: &mut NetStack,
    dev: &mut dyn NetDevice,
    target_ip: Ipv4Address,
) -> Result<usize, NetError> {
    let packet = ArpPacket {
        hw_type: ARP_HW_ETHERNET,
        proto_type: ETH_P_IP,
        hw_len: ETH_ALEN as u8,
        proto_len: 4,
        opcode: ARP_OP_REQUEST,
        sender_mac: stack.mac(),
        sender_ip: stack.ip(),
        target_mac: MacAddress([0; ETH_ALEN]),
        target_ip,
    };

    stack.stats.arp_requests_sent += 1;
    send_packet(stack, dev, MacAddress::BROADCAST, &packet)
}

/// 单播一个 ARP 应答
fn send_reply(
    stack: &mut NetStack,
    dev: &mut dyn NetDevice,
    requester_mac: MacAddress,
    requester_ip: Ipv4Address,
) -> Result<usize, NetError> {
    let packet = ArpPacket {
        hw_type: ARP_HW_ETHERNET,
        proto_type: ETH_P_IP,
        hw_len: ETH_ALEN as u8,
        proto_len: 4,
        opcode: ARP_OP_REPLY,
        sender_mac: stack.mac(),
        sender_ip: stack.ip(),
        target_mac: requester_mac,
        target_ip: requester_ip,
    };

    send_packet(stack, dev, requester_mac, &packet)
}

fn send_packet(
    stack: &NetStack,
    dev: &mut dyn NetDevice,
    dest: MacAddress,
    packet: &ArpPacket,
) -> Result<usize, NetError> {
    let mut frame = [0u8; ETH_HLEN + ARP_PLEN];
    let eth = EthHeader {
        dest,
        src: stack.mac(),
        ethertype: ETH_P_ARP,
    };
    eth.write_to(&mut frame);
    packet.write_to(&mut frame[ETH_HLEN..]);
    dev.send_frame(&frame)
}

/// 解析目标 MAC（出站路径）
///
/// 缓存命中直接返回；未命中时广播一个请求作为副作用并返回 None，
/// 调用方自行决定是否退化为广播帧，绝不阻塞等待应答。
pub fn resolve(
    stack: &mut NetStack,
    dev: &mut dyn NetDevice,
    ip: Ipv4Address,
) -> Option<MacAddress> {
    if let Some(mac) = stack.arp_cache.lookup(ip) {
        return Some(mac);
    }

    let _ = send_request(stack, dev, ip);
    None
}
