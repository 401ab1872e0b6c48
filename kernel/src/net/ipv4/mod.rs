//! MIT License
//!
//! Copyright (c) 2026 Moka Developers
//!
//! IPv4 协议
//!
//! 无连接、逐包处理：接收路径是一串验证门（长度、IHL、校验和、目的地址），
//! 发送路径构造固定 20 字节头部（不支持选项）并交给以太网层。
//! 不支持分片与重组。

pub mod checksum;

use bitflags::bitflags;
use log::{debug, trace};

use crate::net::arp;
use crate::net::device::NetDevice;
use crate::net::ethernet::{EthHeader, ETH_FRAME_MAX, ETH_HLEN, ETH_P_IP};
use crate::net::udp;
use crate::net::{Ipv4Address, MacAddress, NetError, NetStack};

/// IPv4 头部长度（无选项）
pub const IPV4_HLEN: usize = 20;

/// 默认 TTL
pub const IP_DEFAULT_TTL: u8 = 64;

/// 协议号：UDP
pub const IP_PROTO_UDP: u8 = 17;

bitflags! {
    /// IPv4 分片标志位（头部第 6 字节高 3 位）
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Ipv4Flags: u16 {
        /// 不分片
        const DONT_FRAGMENT = 0x4000;
        /// 还有分片
        const MORE_FRAGMENTS = 0x2000;
    }
}

/// IPv4 头部
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    /// 版本（恒为 4）
    pub version: u8,
    /// 头部长度（32 位字数）
    pub ihl: u8,
    /// 服务类型
    pub tos: u8,
    /// 总长度（头部 + 数据）
    pub total_len: u16,
    /// 标识
    pub id: u16,
    /// 分片标志 + 分片偏移
    pub flags_frag: u16,
    /// 生存时间
    pub ttl: u8,
    /// 上层协议号
    pub protocol: u8,
    /// 头部校验和
    pub checksum: u16,
    /// 源地址
    pub src: Ipv4Address,
    /// 目标地址
    pub dest: Ipv4Address,
}

impl Ipv4Header {
    /// 从字节切片解析头部
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < IPV4_HLEN {
            return None;
        }

        let mut src = [0u8; 4];
        let mut dest = [0u8; 4];
        src.copy_from_slice(&data[12..16]);
        dest.copy_from_slice(&data[16..20]);

        Some(Self {
            version: data[0] >> 4,
            ihl: data[0] & 0x0F,
            tos: data[1],
            total_len: u16::from_be_bytes([data[2], data[3]]),
            id: u16::from_be_bytes([data[4], data[5]]),
            flags_frag: u16::from_be_bytes([data[6], data[7]]),
            ttl: data[8],
            protocol: data[9],
            checksum: u16::from_be_bytes([data[10], data[11]]),
            src: Ipv4Address(src),
            dest: Ipv4Address(dest),
        })
    }

    /// 序列化头部到 `buf` 开头，校验和字段按 `self.checksum` 原样写入
    ///
    /// 调用方保证 `buf.len() >= IPV4_HLEN`
    pub fn write_to(&self, buf: &mut [u8]) {
        buf[0] = (self.version << 4) | (self.ihl & 0x0F);
        buf[1] = self.tos;
        buf[2..4].copy_from_slice(&self.total_len.to_be_bytes());
        buf[4..6].copy_from_slice(&self.id.to_be_bytes());
        buf[6..8].copy_from_slice(&self.flags_frag.to_be_bytes());
        buf[8] = self.ttl;
        buf[9] = self.protocol;
        buf[10..12].copy_from_slice(&self.checksum.to_be_bytes());
        buf[12..16].copy_from_slice(&self.src.0);
        buf[16..20].copy_from_slice(&self.dest.0);
    }

    /// 分片标志位
    pub fn flags(&self) -> Ipv4Flags {
        Ipv4Flags::from_bits_truncate(self.flags_frag)
    }
}

/// 处理接收到的 IPv4 数据包
///
/// # 说明
/// 验证门依次为：最小长度、IHL ≥ 5 且实际收到 ≥ IHL×4、头部校验和、
/// 声明总长 ≤ 实际收到、目的地址为本机或广播（首字节 255 的近似判断）。
/// 任何一道未通过都静默丢弃。通过后按协议号分发（仅支持 UDP）。
pub fn ip_input(stack: &mut NetStack, payload: &[u8]) {
    let header = match Ipv4Header::from_bytes(payload) {
        Some(h) => h,
        None => {
            trace!("ipv4: short packet ({} bytes), dropped", payload.len());
            stack.stats.frames_dropped += 1;
            return;
        }
    };

    let header_len = header.ihl as usize * 4;
    if header.ihl < 5 || payload.len() < header_len {
        trace!("ipv4: bad ihl {}, dropped", header.ihl);
        stack.stats.frames_dropped += 1;
        return;
    }

    // 校验和覆盖收到的整个头部（字段置 0 重新计算后比较）
    let mut header_bytes = [0u8; IPV4_HLEN];
    header_bytes.copy_from_slice(&payload[..IPV4_HLEN]);
    header_bytes[10] = 0;
    header_bytes[11] = 0;
    if checksum::ip_checksum(&header_bytes) != header.checksum {
        debug!("ipv4: checksum mismatch from {}, dropped", header.src);
        stack.stats.frames_dropped += 1;
        return;
    }

    let total_len = header.total_len as usize;
    if total_len > payload.len() || total_len < header_len {
        trace!("ipv4: bad total length {}, dropped", total_len);
        stack.stats.frames_dropped += 1;
        return;
    }

    // 广播判断只看首字节 255，是对真实（子网）广播检测的近似
    if header.dest != stack.ip() && header.dest.0[0] != 255 {
        stack.stats.frames_dropped += 1;
        return;
    }

    let data = &payload[header_len..total_len];
    match header.protocol {
        IP_PROTO_UDP => udp::udp_input(stack, header.src, data),
        other => {
            trace!("ipv4: unsupported protocol {}, dropped", other);
            stack.stats.frames_dropped += 1;
        }
    }
}

/// 发送一个 IPv4 数据包
///
/// # 说明
/// 先经 ARP 解析目的 MAC；未命中时不失败，而是退化为以太网广播地址
/// 发送（同子网可达，代价是打扰邻居），绝不阻塞等待 ARP 应答。
/// 头部固定 version=4、IHL=5、TTL=64，标识字段取自 16 位自增计数器。
///
/// # 返回
/// 载荷放不进单个以太网帧时返回 [`NetError::PayloadTooLarge`]（无分片支持）
pub fn ip_output(
    stack: &mut NetStack,
    dev: &mut dyn NetDevice,
    dest: Ipv4Address,
    protocol: u8,
    data: &[u8],
) -> Result<usize, NetError> {
    let frame_len = ETH_HLEN + IPV4_HLEN + data.len();
    if frame_len > ETH_FRAME_MAX {
        return Err(NetError::PayloadTooLarge);
    }

    let dest_mac = match arp::resolve(stack, dev, dest) {
        Some(mac) => mac,
        // ARP 未命中：退化为广播帧
        None => MacAddress::BROADCAST,
    };

    let mut header = Ipv4Header {
        version: 4,
        ihl: 5,
        tos: 0,
        total_len: (IPV4_HLEN + data.len()) as u16,
        id: stack.next_ip_id(),
        flags_frag: Ipv4Flags::empty().bits(),
        ttl: IP_DEFAULT_TTL,
        protocol,
        checksum: 0,
        src: stack.ip(),
        dest,
    };

    let mut frame = [0u8; ETH_FRAME_MAX];
    let eth = EthHeader {
        dest: dest_mac,
        src: stack.mac(),
        ethertype: ETH_P_IP,
    };
    eth.write_to(&mut frame);

    // 先按校验和为 0 序列化，再回填计算结果
    header.write_to(&mut frame[ETH_HLEN..]);
    header.checksum = checksum::ip_checksum(&frame[ETH_HLEN..ETH_HLEN + IPV4_HLEN]);
    header.write_to(&mut frame[ETH_HLEN..]);

    frame[ETH_HLEN + IPV4_HLEN..frame_len].copy_from_slice(data);
    dev.send_frame(&frame[..frame_len])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> Ipv4Header {
        Ipv4Header {
            version: 4,
            ihl: 5,
            tos: 0,
            total_len: 48,
            id: 0x1c46,
            flags_frag: Ipv4Flags::DONT_FRAGMENT.bits(),
            ttl: IP_DEFAULT_TTL,
            protocol: IP_PROTO_UDP,
            checksum: 0,
            src: Ipv4Address([10, 0, 2, 15]),
            dest: Ipv4Address([10, 0, 2, 2]),
        }
    }

    #[test]
    fn test_header_roundtrip() {
        let header = sample_header();
        let mut buf = [0u8; IPV4_HLEN];
        header.write_to(&mut buf);

        let parsed = Ipv4Header::from_bytes(&buf).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.flags(), Ipv4Flags::DONT_FRAGMENT);
    }

    #[test]
    fn test_built_header_checksum_verifies() {
        let mut header = sample_header();
        let mut buf = [0u8; IPV4_HLEN];
        header.write_to(&mut buf);
        header.checksum = checksum::ip_checksum(&buf);
        header.write_to(&mut buf);

        assert!(checksum::verify_ip_checksum(&buf));
    }

    #[test]
    fn test_corrupted_header_fails_verification() {
        let mut header = sample_header();
        let mut buf = [0u8; IPV4_HLEN];
        header.write_to(&mut buf);
        header.checksum = checksum::ip_checksum(&buf);
        header.write_to(&mut buf);

        for byte in 0..IPV4_HLEN {
            for bit in 0..8 {
                let mut corrupted = buf;
                corrupted[byte] ^= 1 << bit;
                assert!(!checksum::verify_ip_checksum(&corrupted));
            }
        }
    }

    #[test]
    fn test_short_packet_rejected() {
        assert!(Ipv4Header::from_bytes(&[0u8; IPV4_HLEN - 1]).is_none());
    }
}
