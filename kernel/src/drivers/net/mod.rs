//! MIT License
//!
//! Copyright (c) 2026 Moka Developers
//!
//! 网络设备驱动
//!
//! 所有驱动实现协议栈侧的 [`crate::net::device::NetDevice`] 接口。

pub mod loopback;

pub use loopback::Loopback;
