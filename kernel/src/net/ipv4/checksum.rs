//! MIT License
//!
//! Copyright (c) 2026 Moka Developers
//!
//! Internet 校验和
//!
//! RFC 1071 - Computing the Internet Checksum。
//! 本内核只用它校验/生成 20 字节的 IPv4 头部（IHL > 5 不支持）。

/// 计算 Internet 校验和
///
/// # 参数
/// - `data`: 参与求和的字节（奇数长度时最后一字节按高位补齐）
///
/// # 说明
/// 16 位反码求和：逐字累加，把进位折回低 16 位直到无进位，再取反。
pub fn ip_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;

    let mut i = 0;
    while i < data.len() {
        if i + 1 == data.len() {
            sum += (data[i] as u32) << 8;
        } else {
            sum += u16::from_be_bytes([data[i], data[i + 1]]) as u32;
        }
        i += 2;
    }

    // 折叠进位
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    !sum as u16
}

/// 验证校验和
///
/// 对包含校验和字段在内的完整头部求和，结果为 0 即有效
pub fn verify_ip_checksum(data: &[u8]) -> bool {
    ip_checksum(data) == 0
}
