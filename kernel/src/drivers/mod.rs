//! MIT License
//!
//! Copyright (c) 2026 Moka Developers
//!
//! 设备驱动模块

pub mod net;
