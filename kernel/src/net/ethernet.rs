//! MIT License
//!
//! Copyright (c) 2026 Moka Developers
//!
//! 以太网层
//!
//! 帧头的解析与构造，以及接收路径的第一道分发：
//! 目的地址过滤（广播或本机单播）后按 ethertype 送往 ARP / IPv4。

use log::trace;

use crate::net::arp;
use crate::net::device::NetDevice;
use crate::net::ipv4;
use crate::net::{MacAddress, NetStack};

/// 以太网地址长度 (MAC 地址)
pub const ETH_ALEN: usize = 6;

/// 以太网头部长度
pub const ETH_HLEN: usize = 14;

/// 以太网最大帧长度 (不含 FCS)
pub const ETH_FRAME_MAX: usize = 1514;

/// Ethertype: IPv4
pub const ETH_P_IP: u16 = 0x0800;

/// Ethertype: ARP
pub const ETH_P_ARP: u16 = 0x0806;

/// 以太网帧头部
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthHeader {
    /// 目标 MAC 地址
    pub dest: MacAddress,
    /// 源 MAC 地址
    pub src: MacAddress,
    /// 协议类型 (ETH_P_IP, ETH_P_ARP, ...)
    pub ethertype: u16,
}

impl EthHeader {
    /// 从字节切片解析以太网头部
    ///
    /// # 返回
    /// 不足 [`ETH_HLEN`] 字节时返回 None
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < ETH_HLEN {
            return None;
        }

        let mut dest = [0u8; ETH_ALEN];
        let mut src = [0u8; ETH_ALEN];
        dest.copy_from_slice(&data[0..6]);
        src.copy_from_slice(&data[6..12]);

        Some(Self {
            dest: MacAddress(dest),
            src: MacAddress(src),
            ethertype: u16::from_be_bytes([data[12], data[13]]),
        })
    }

    /// 序列化头部到 `buf` 开头
    ///
    /// 调用方保证 `buf.len() >= ETH_HLEN`
    pub fn write_to(&self, buf: &mut [u8]) {
        buf[0..6].copy_from_slice(&self.dest.0);
        buf[6..12].copy_from_slice(&self.src.0);
        buf[12..14].copy_from_slice(&self.ethertype.to_be_bytes());
    }
}

/// 接收一帧并分发到上层
///
/// # 说明
/// 过滤规则：目的地址为广播（全 FF）或与本机 MAC 完全一致才继续处理，
/// 其余帧静默丢弃，不产生任何副作用。未知 ethertype 同样静默丢弃。
pub fn eth_input(stack: &mut NetStack, dev: &mut dyn NetDevice, frame: &[u8]) {
    let header = match EthHeader::from_bytes(frame) {
        Some(h) => h,
        None => {
            trace!("eth: runt frame ({} bytes), dropped", frame.len());
            stack.stats.frames_dropped += 1;
            return;
        }
    };

    if !header.dest.is_broadcast() && header.dest != stack.mac() {
        stack.stats.frames_dropped += 1;
        return;
    }

    let payload = &frame[ETH_HLEN..];
    match header.ethertype {
        ETH_P_ARP => arp::arp_input(stack, dev, payload),
        ETH_P_IP => ipv4::ip_input(stack, payload),
        other => {
            trace!("eth: unknown ethertype {:#06x}, dropped", other);
            stack.stats.frames_dropped += 1;
        }
    }
}
