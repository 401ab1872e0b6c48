//! Moka 内核配置
//!
//! 内核各子系统的容量与尺寸常量，集中在此处便于调整

// ============================================================
// 基本信息
// ============================================================

/// 内核名称
pub const KERNEL_NAME: &str = "Moka";

/// 内核版本
pub const KERNEL_VERSION: &str = "0.1.0";

// ============================================================
// 文件系统配置
// ============================================================

/// 文件内容存储池大小（字节）
pub const FS_ARENA_SIZE: usize = 64 * 1024;

/// 文件节点表容量（文件 + 目录总数上限）
pub const FS_MAX_NODES: usize = 100;

/// 文件名最大长度（字节）
pub const FS_MAX_NAME_LEN: usize = 255;

/// 单个文件内容最大长度（字节）
pub const FS_MAX_FILE_SIZE: usize = 4096;

// ============================================================
// 网络配置
// ============================================================

/// ARP 缓存条目数量
pub const ARP_CACHE_SIZE: usize = 16;

/// UDP 回调表槽位数量
pub const UDP_MAX_CALLBACKS: usize = 8;

/// 默认 IPv4 地址（QEMU 用户态网络的默认客户机地址）
pub const DEFAULT_IPV4_ADDR: [u8; 4] = [10, 0, 2, 15];
