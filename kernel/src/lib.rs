//! MIT License
//!
//! Copyright (c) 2026 Moka Developers
//!
//! Moka 内核核心
//!
//! 单地址空间、协作式调度的内核核心，包含两个子系统：
//!
//! - `fs`: 基于内存的层次化文件系统（arena 分配器 + 固定容量节点表 + 路径解析）
//! - `net`: 网络协议栈（Ethernet → ARP/IPv4 → UDP，基于轮询的单执行流管线）
//!
//! 引导、控制台行解析、PCI 诊断等薄胶水层不在本 crate 中，
//! 它们通过 `fs`/`net` 的公开接口以及 [`net::device::NetDevice`] 边界与核心交互。
//!
//! 整个核心严格单线程、运行到完成（run-to-completion），
//! 全局单例只是对上下文对象的 `spin::Mutex` 包装，用于显式化初始化顺序。

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod config;
pub mod drivers;
pub mod fs;
pub mod net;
