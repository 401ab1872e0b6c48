//! MIT License
//!
//! Copyright (c) 2026 Moka Developers
//!
//! 网络设备边界
//!
//! 协议栈与 NIC 驱动之间的最小接口：收发原始以太网帧、读取 MAC 地址。
//! 接收是非阻塞轮询，每次调用最多取出一帧。

use crate::net::{MacAddress, NetError};

/// 网络设备抽象
///
/// 驱动实现本 trait 后即可挂接到 [`crate::net::NetStack`]。
/// 发送与接收都以完整的以太网帧为单位，协议栈不做分片。
pub trait NetDevice {
    /// 设备的 MAC 地址
    fn mac_address(&self) -> MacAddress;

    /// 发送一帧
    ///
    /// # 返回
    /// 成功返回已发送的字节数
    fn send_frame(&mut self, frame: &[u8]) -> Result<usize, NetError>;

    /// 非阻塞接收一帧到 `buf`
    ///
    /// # 返回
    /// 帧长度；没有待收帧时返回 0
    fn receive_frame(&mut self, buf: &mut [u8]) -> usize;
}
