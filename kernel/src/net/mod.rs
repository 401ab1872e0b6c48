//! MIT License
//!
//! Copyright (c) 2026 Moka Developers
//!
//! 网络子系统
//!
//! 分层的帧处理管线：Ethernet → ARP/IPv4 → UDP。
//! 每层都是带验证门的纯变换，没有连接状态；非法或不支持的输入
//! 在检测到的那一层静默丢弃，绝不向上抛错，也绝不使内核停机。
//!
//! 驱动通过 [`device::NetDevice`] 接入；[`NetStack::poll`] 以
//! 非阻塞轮询驱动整个接收管线，运行到完成后返回调用方（引导循环）。
//!
//! 字节序：线上所有多字节字段均为大端，解析/序列化统一走
//! `from_be_bytes`/`to_be_bytes`，不做运行时字节序探测。

pub mod arp;
pub mod device;
pub mod ethernet;
pub mod ipv4;
pub mod udp;

use core::fmt;

use log::info;
use spin::Mutex;

use crate::config::DEFAULT_IPV4_ADDR;
use arp::ArpCache;
use device::NetDevice;
use ethernet::{ETH_ALEN, ETH_FRAME_MAX};
use udp::{UdpCallback, UdpCallbackTable};

/// MAC 地址
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacAddress(pub [u8; ETH_ALEN]);

impl MacAddress {
    /// 广播地址（全 FF）
    pub const BROADCAST: MacAddress = MacAddress([0xFF; ETH_ALEN]);

    /// 是否为广播地址
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

/// IPv4 地址
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Address(pub [u8; 4]);

impl fmt::Display for Ipv4Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.0[0], self.0[1], self.0[2], self.0[3])
    }
}

/// 网络子系统错误
///
/// 只有主动操作（发送、注册）才会返回错误；
/// 接收路径的异常输入一律就地丢弃，不经过这里。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetError {
    /// 设备发送失败
    DeviceError,
    /// 帧超过设备可发送的最大长度
    FrameTooLarge,
    /// 载荷放不进单个以太网帧（无分片支持）
    PayloadTooLarge,
    /// 回调表已满
    TableFull,
    /// 地址未解析
    NotFound,
    /// 网络栈尚未初始化
    NotInitialized,
}

impl NetError {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetError::DeviceError => "device error",
            NetError::FrameTooLarge => "frame too large",
            NetError::PayloadTooLarge => "payload too large",
            NetError::TableFull => "callback table full",
            NetError::NotFound => "address not resolved",
            NetError::NotInitialized => "network not initialized",
        }
    }
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 网络统计计数器
///
/// 诊断用，控制台可随时读取
#[derive(Debug, Clone, Copy, Default)]
pub struct NetStats {
    /// 收到的帧总数
    pub frames_received: u64,
    /// 各层验证门丢弃的帧/包总数
    pub frames_dropped: u64,
    /// 通过验证的 ARP 报文数
    pub arp_packets_received: u64,
    /// 发出的 ARP 请求数
    pub arp_requests_sent: u64,
    /// 通过验证的 UDP 数据包数
    pub udp_packets_received: u64,
    /// 实际调用的 UDP 回调次数
    pub udp_callbacks_invoked: u64,
    /// poll 被调用的次数
    pub poll_calls: u64,
}

/// 网络栈上下文
///
/// 本机身份（MAC/IPv4/标识计数器）、ARP 缓存、UDP 回调表与统计的聚合。
/// 单执行流独占访问；全局单例见 [`init`] / [`with_net`]。
pub struct NetStack {
    mac: MacAddress,
    ip: Ipv4Address,
    ip_id: u16,
    pub(crate) arp_cache: ArpCache,
    pub(crate) udp_table: UdpCallbackTable,
    pub(crate) stats: NetStats,
}

impl NetStack {
    /// 创建网络栈，MAC 地址在此一次性读自设备
    pub fn new(dev: &dyn NetDevice) -> Self {
        let mac = dev.mac_address();
        let ip = Ipv4Address(DEFAULT_IPV4_ADDR);
        info!("net: stack up, mac {} ip {}", mac, ip);

        Self {
            mac,
            ip,
            ip_id: 0,
            arp_cache: ArpCache::new(),
            udp_table: UdpCallbackTable::new(),
            stats: NetStats::default(),
        }
    }

    /// 本机 MAC 地址
    pub fn mac(&self) -> MacAddress {
        self.mac
    }

    /// 本机 IPv4 地址
    pub fn ip(&self) -> Ipv4Address {
        self.ip
    }

    /// 设置本机 IPv4 地址
    pub fn set_ip(&mut self, ip: Ipv4Address) {
        self.ip = ip;
    }

    /// 下一个 IPv4 标识，16 位回绕自增
    pub(crate) fn next_ip_id(&mut self) -> u16 {
        let id = self.ip_id;
        self.ip_id = self.ip_id.wrapping_add(1);
        id
    }

    /// ARP 缓存（只读，诊断用）
    pub fn arp_cache(&self) -> &ArpCache {
        &self.arp_cache
    }

    /// 统计计数器
    pub fn stats(&self) -> &NetStats {
        &self.stats
    }

    /// 注册 UDP 端口回调，重复注册原地替换
    pub fn register_udp_callback(
        &mut self,
        port: u16,
        callback: UdpCallback,
    ) -> Result<(), NetError> {
        self.udp_table.register(port, callback)
    }

    /// 解析目标 MAC，未命中时广播请求并返回 None（不阻塞）
    pub fn arp_resolve(
        &mut self,
        dev: &mut dyn NetDevice,
        ip: Ipv4Address,
    ) -> Option<MacAddress> {
        arp::resolve(self, dev, ip)
    }

    /// 发送 IPv4 数据包
    pub fn send_ipv4(
        &mut self,
        dev: &mut dyn NetDevice,
        dest: Ipv4Address,
        protocol: u8,
        data: &[u8],
    ) -> Result<usize, NetError> {
        ipv4::ip_output(self, dev, dest, protocol, data)
    }

    /// 发送 UDP 数据包
    pub fn send_udp(
        &mut self,
        dev: &mut dyn NetDevice,
        dest_ip: Ipv4Address,
        dest_port: u16,
        src_port: u16,
        data: &[u8],
    ) -> Result<usize, NetError> {
        udp::udp_output(self, dev, dest_ip, dest_port, src_port, data)
    }

    /// 轮询设备并处理所有待收帧
    ///
    /// # 说明
    /// 每帧依次穿过 Ethernet → ARP/IPv4 → UDP 管线，回调同步执行；
    /// 队列抽干后返回调用方。任何帧都不会让本函数失败。
    pub fn poll(&mut self, dev: &mut dyn NetDevice) {
        self.stats.poll_calls += 1;

        let mut buf = [0u8; ETH_FRAME_MAX];
        loop {
            let len = dev.receive_frame(&mut buf);
            if len == 0 {
                break;
            }
            self.stats.frames_received += 1;
            ethernet::eth_input(self, dev, &buf[..len]);
        }
    }
}

// ============================================================
// 全局单例
// ============================================================

/// 全局网络栈
static NET_STACK: Mutex<Option<NetStack>> = Mutex::new(None);

/// 初始化全局网络栈，重复调用为空操作
pub fn init(dev: &dyn NetDevice) {
    let mut guard = NET_STACK.lock();
    if guard.is_none() {
        *guard = Some(NetStack::new(dev));
    }
}

/// 在全局网络栈上执行操作
///
/// # 返回
/// [`init`] 之前调用返回 [`NetError::NotInitialized`]
pub fn with_net<R>(f: impl FnOnce(&mut NetStack) -> Result<R, NetError>) -> Result<R, NetError> {
    let mut guard = NET_STACK.lock();
    match guard.as_mut() {
        Some(stack) => f(stack),
        None => Err(NetError::NotInitialized),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::net::loopback::Loopback;
    use crate::net::arp::{ArpPacket, ARP_OP_REPLY, ARP_OP_REQUEST, ARP_PLEN};
    use crate::net::ethernet::{EthHeader, ETH_HLEN, ETH_P_ARP, ETH_P_IP};
    use crate::net::ipv4::{checksum, Ipv4Header, IPV4_HLEN, IP_PROTO_UDP};
    use crate::net::udp::{UdpHeader, UDP_HLEN};
    use alloc::vec::Vec;
    use core::sync::atomic::{AtomicUsize, Ordering};

    const PEER_MAC: MacAddress = MacAddress([0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01]);
    const PEER_IP: Ipv4Address = Ipv4Address([10, 0, 2, 2]);

    fn setup() -> (NetStack, Loopback) {
        let dev = Loopback::new();
        let stack = NetStack::new(&dev);
        (stack, dev)
    }

    fn build_arp_request(target_ip: Ipv4Address) -> Vec<u8> {
        let mut frame = alloc::vec![0u8; ETH_HLEN + ARP_PLEN];
        EthHeader {
            dest: MacAddress::BROADCAST,
            src: PEER_MAC,
            ethertype: ETH_P_ARP,
        }
        .write_to(&mut frame);
        ArpPacket {
            hw_type: 1,
            proto_type: ETH_P_IP,
            hw_len: 6,
            proto_len: 4,
            opcode: ARP_OP_REQUEST,
            sender_mac: PEER_MAC,
            sender_ip: PEER_IP,
            target_mac: MacAddress([0; 6]),
            target_ip,
        }
        .write_to(&mut frame[ETH_HLEN..]);
        frame
    }

    fn build_udp_frame(
        dest_mac: MacAddress,
        dest_ip: Ipv4Address,
        src_port: u16,
        dest_port: u16,
        payload: &[u8],
    ) -> Vec<u8> {
        let total = ETH_HLEN + IPV4_HLEN + UDP_HLEN + payload.len();
        let mut frame = alloc::vec![0u8; total];

        EthHeader {
            dest: dest_mac,
            src: PEER_MAC,
            ethertype: ETH_P_IP,
        }
        .write_to(&mut frame);

        let mut ip = Ipv4Header {
            version: 4,
            ihl: 5,
            tos: 0,
            total_len: (IPV4_HLEN + UDP_HLEN + payload.len()) as u16,
            id: 1,
            flags_frag: 0,
            ttl: 64,
            protocol: IP_PROTO_UDP,
            checksum: 0,
            src: PEER_IP,
            dest: dest_ip,
        };
        ip.write_to(&mut frame[ETH_HLEN..]);
        ip.checksum = checksum::ip_checksum(&frame[ETH_HLEN..ETH_HLEN + IPV4_HLEN]);
        ip.write_to(&mut frame[ETH_HLEN..]);

        UdpHeader {
            src_port,
            dest_port,
            length: (UDP_HLEN + payload.len()) as u16,
            checksum: 0,
        }
        .write_to(&mut frame[ETH_HLEN + IPV4_HLEN..]);
        frame[ETH_HLEN + IPV4_HLEN + UDP_HLEN..].copy_from_slice(payload);
        frame
    }

    #[test]
    fn test_broadcast_accepted_unrelated_unicast_dropped() {
        let (mut stack, mut dev) = setup();

        // 广播帧：无论本机 MAC 如何都被接受，副作用是学到发送方映射
        dev.inject(&build_arp_request(stack.ip()));
        stack.poll(&mut dev);
        assert_eq!(stack.arp_cache().lookup(PEER_IP), Some(PEER_MAC));
        assert_eq!(stack.stats().arp_packets_received, 1);

        // 发给别人的单播帧：直接丢弃，不产生任何协议处理副作用
        let mut frame = build_arp_request(stack.ip());
        frame[0..6].copy_from_slice(&[0x66; 6]);
        let dropped_before = stack.stats().frames_dropped;
        dev.drain();
        dev.inject(&frame);
        stack.poll(&mut dev);
        assert_eq!(stack.stats().arp_packets_received, 1);
        assert_eq!(stack.stats().frames_dropped, dropped_before + 1);
    }

    #[test]
    fn test_arp_request_for_us_generates_reply() {
        let (mut stack, mut dev) = setup();

        let payload = build_arp_request(stack.ip());
        arp::arp_input(&mut stack, &mut dev, &payload[ETH_HLEN..]);

        // 应答帧已进入设备队列：单播给请求方，携带本机 MAC/IP
        let mut buf = [0u8; ETH_FRAME_MAX];
        let len = dev.receive_frame(&mut buf);
        assert_eq!(len, ETH_HLEN + ARP_PLEN);

        let eth = EthHeader::from_bytes(&buf[..len]).unwrap();
        assert_eq!(eth.dest, PEER_MAC);
        assert_eq!(eth.src, stack.mac());

        let reply = ArpPacket::from_bytes(&buf[ETH_HLEN..len]).unwrap();
        assert_eq!(reply.opcode, ARP_OP_REPLY);
        assert_eq!(reply.sender_mac, stack.mac());
        assert_eq!(reply.sender_ip, stack.ip());
        assert_eq!(reply.target_mac, PEER_MAC);
        assert_eq!(reply.target_ip, PEER_IP);
    }

    #[test]
    fn test_arp_request_for_other_ip_no_reply() {
        let (mut stack, mut dev) = setup();

        let payload = build_arp_request(Ipv4Address([10, 0, 2, 99]));
        arp::arp_input(&mut stack, &mut dev, &payload[ETH_HLEN..]);

        // 映射照学，但不应答
        assert_eq!(stack.arp_cache().lookup(PEER_IP), Some(PEER_MAC));
        let mut buf = [0u8; ETH_FRAME_MAX];
        assert_eq!(dev.receive_frame(&mut buf), 0);
    }

    static PING_CALLS: AtomicUsize = AtomicUsize::new(0);
    static PING_SEEN: Mutex<Option<(Ipv4Address, u16, Vec<u8>)>> = Mutex::new(None);

    fn ping_handler(src_ip: Ipv4Address, src_port: u16, payload: &[u8]) {
        PING_CALLS.fetch_add(1, Ordering::SeqCst);
        *PING_SEEN.lock() = Some((src_ip, src_port, payload.to_vec()));
    }

    #[test]
    fn test_udp_dispatch() {
        let (mut stack, mut dev) = setup();
        stack.register_udp_callback(12345, ping_handler).unwrap();

        dev.inject(&build_udp_frame(stack.mac(), stack.ip(), 7777, 12345, b"ping"));
        stack.poll(&mut dev);

        assert_eq!(PING_CALLS.load(Ordering::SeqCst), 1);
        let seen = PING_SEEN.lock().clone().unwrap();
        assert_eq!(seen.0, PEER_IP);
        assert_eq!(seen.1, 7777);
        assert_eq!(seen.2, b"ping");

        // 未注册端口：静默丢弃，回调不被调用
        dev.inject(&build_udp_frame(stack.mac(), stack.ip(), 7777, 54321, b"pong"));
        stack.poll(&mut dev);
        assert_eq!(PING_CALLS.load(Ordering::SeqCst), 1);
        assert_eq!(stack.stats().udp_packets_received, 2);
        assert_eq!(stack.stats().udp_callbacks_invoked, 1);
    }

    static CORRUPT_CALLS: AtomicUsize = AtomicUsize::new(0);

    fn corrupt_handler(_src_ip: Ipv4Address, _src_port: u16, _payload: &[u8]) {
        CORRUPT_CALLS.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn test_corrupted_ipv4_checksum_dropped() {
        let (mut stack, mut dev) = setup();
        stack.register_udp_callback(5000, corrupt_handler).unwrap();

        let mut frame = build_udp_frame(stack.mac(), stack.ip(), 1, 5000, b"x");
        frame[ETH_HLEN + 8] ^= 0x01; // 翻转 TTL 的一位
        dev.inject(&frame);

        let dropped_before = stack.stats().frames_dropped;
        stack.poll(&mut dev);
        assert_eq!(CORRUPT_CALLS.load(Ordering::SeqCst), 0);
        assert_eq!(stack.stats().frames_dropped, dropped_before + 1);
    }

    #[test]
    fn test_broadcast_ip_accepted() {
        let (mut stack, mut dev) = setup();
        stack.register_udp_callback(6000, bcast_handler).unwrap();

        dev.inject(&build_udp_frame(
            MacAddress::BROADCAST,
            Ipv4Address([255, 255, 255, 255]),
            1,
            6000,
            b"hello",
        ));
        stack.poll(&mut dev);
        assert_eq!(BCAST_CALLS.load(Ordering::SeqCst), 1);
    }

    static BCAST_CALLS: AtomicUsize = AtomicUsize::new(0);

    fn bcast_handler(_src_ip: Ipv4Address, _src_port: u16, _payload: &[u8]) {
        BCAST_CALLS.fetch_add(1, Ordering::SeqCst);
    }

    static ECHO_CALLS: AtomicUsize = AtomicUsize::new(0);
    static ECHO_SEEN: Mutex<Option<(Ipv4Address, u16, Vec<u8>)>> = Mutex::new(None);

    fn echo_handler(src_ip: Ipv4Address, src_port: u16, payload: &[u8]) {
        ECHO_CALLS.fetch_add(1, Ordering::SeqCst);
        *ECHO_SEEN.lock() = Some((src_ip, src_port, payload.to_vec()));
    }

    #[test]
    fn test_send_udp_over_loopback_end_to_end() {
        let (mut stack, mut dev) = setup();
        stack.register_udp_callback(4242, echo_handler).unwrap();

        // ARP 缓存为空：发送方先广播请求，数据帧退化为广播 MAC
        let our_ip = stack.ip();
        stack.send_udp(&mut dev, our_ip, 4242, 9999, b"espresso").unwrap();
        assert_eq!(stack.stats().arp_requests_sent, 1);

        stack.poll(&mut dev);

        assert_eq!(ECHO_CALLS.load(Ordering::SeqCst), 1);
        let seen = ECHO_SEEN.lock().clone().unwrap();
        assert_eq!(seen.0, our_ip);
        assert_eq!(seen.1, 9999);
        assert_eq!(seen.2, b"espresso");

        // 自己的请求也教会了缓存自己的映射
        assert_eq!(stack.arp_cache().lookup(our_ip), Some(stack.mac()));
    }

    #[test]
    fn test_ip_id_counter_wraps() {
        let (mut stack, _dev) = setup();

        stack.ip_id = u16::MAX;
        assert_eq!(stack.next_ip_id(), u16::MAX);
        assert_eq!(stack.next_ip_id(), 0);
        assert_eq!(stack.next_ip_id(), 1);
    }

    #[test]
    fn test_payload_too_large_rejected() {
        let (mut stack, mut dev) = setup();

        let data = alloc::vec![0u8; ETH_FRAME_MAX - ETH_HLEN - IPV4_HLEN + 1];
        assert_eq!(
            stack.send_ipv4(&mut dev, PEER_IP, IP_PROTO_UDP, &data),
            Err(NetError::PayloadTooLarge)
        );
    }

    #[test]
    fn test_set_ip() {
        let (mut stack, _dev) = setup();

        assert_eq!(stack.ip(), Ipv4Address(crate::config::DEFAULT_IPV4_ADDR));
        stack.set_ip(Ipv4Address([192, 168, 7, 1]));
        assert_eq!(stack.ip(), Ipv4Address([192, 168, 7, 1]));
    }

    #[test]
    fn test_global_requires_init() {
        assert_eq!(
            with_net(|_| Ok(())).err(),
            Some(NetError::NotInitialized)
        );

        let dev = Loopback::new();
        init(&dev);
        with_net(|stack| {
            assert_eq!(stack.mac(), dev.mac_address());
            Ok(())
        })
        .unwrap();
    }
}
