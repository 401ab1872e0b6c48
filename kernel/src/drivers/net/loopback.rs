//! MIT License
//!
//! Copyright (c) 2026 Moka Developers
//!
//! 回环网络设备
//!
//! 发送的帧原样排入自己的接收队列，下次轮询时被协议栈收到。
//! 没有硬件、没有中断，是协议栈测试与单机自通信的最小设备。

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use log::trace;

use crate::net::device::NetDevice;
use crate::net::ethernet::ETH_FRAME_MAX;
use crate::net::{MacAddress, NetError};

/// 回环设备的固定 MAC 地址
const LOOPBACK_MAC: MacAddress = MacAddress([0x52, 0x54, 0x00, 0x12, 0x34, 0x56]);

/// 回环设备
pub struct Loopback {
    mac: MacAddress,
    queue: VecDeque<Vec<u8>>,
}

impl Loopback {
    pub fn new() -> Self {
        Self {
            mac: LOOPBACK_MAC,
            queue: VecDeque::new(),
        }
    }

    /// 直接向接收队列注入一帧，模拟来自线路的输入
    pub fn inject(&mut self, frame: &[u8]) {
        self.queue.push_back(frame.to_vec());
    }

    /// 清空接收队列
    pub fn drain(&mut self) {
        self.queue.clear();
    }

    /// 当前排队的帧数
    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

impl Default for Loopback {
    fn default() -> Self {
        Self::new()
    }
}

impl NetDevice for Loopback {
    fn mac_address(&self) -> MacAddress {
        self.mac
    }

    fn send_frame(&mut self, frame: &[u8]) -> Result<usize, NetError> {
        if frame.len() > ETH_FRAME_MAX {
            return Err(NetError::FrameTooLarge);
        }

        trace!("loopback: tx {} bytes", frame.len());
        self.queue.push_back(frame.to_vec());
        Ok(frame.len())
    }

    fn receive_frame(&mut self, buf: &mut [u8]) -> usize {
        match self.queue.pop_front() {
            Some(frame) if frame.len() <= buf.len() => {
                buf[..frame.len()].copy_from_slice(&frame);
                frame.len()
            }
            Some(frame) => {
                trace!("loopback: rx frame of {} bytes exceeds buffer, dropped", frame.len());
                0
            }
            None => 0,
        }
    }
}
