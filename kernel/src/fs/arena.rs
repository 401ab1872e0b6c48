//! 文件内容存储池
//!
//! 一块固定大小的连续内存，通过单调递增的水位线切分分配。
//! 没有回收：`free` 是空操作，被替换的内容字节一直保留到内核重启。
//! 这是有意为之的取舍（重启即重置的运行模型），调用方不得依赖字节被复用。

use crate::config::FS_ARENA_SIZE;
use crate::fs::FsError;

/// 池内的一段已分配区间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    /// 池内偏移
    pub offset: usize,
    /// 长度（字节）
    pub len: usize,
}

/// 单调水位线分配器
///
/// 分配只前进不后退，`used` 到达容量后所有后续分配失败。
pub struct Arena {
    pool: [u8; FS_ARENA_SIZE],
    used: usize,
}

impl Arena {
    pub const fn new() -> Self {
        Self {
            pool: [0; FS_ARENA_SIZE],
            used: 0,
        }
    }

    /// 分配 `size` 字节
    ///
    /// # 返回
    /// 成功返回区间，池耗尽返回 [`FsError::OutOfMemory`]
    pub fn allocate(&mut self, size: usize) -> Result<Extent, FsError> {
        if self.used + size > FS_ARENA_SIZE {
            return Err(FsError::OutOfMemory);
        }

        let extent = Extent {
            offset: self.used,
            len: size,
        };
        self.used += size;
        Ok(extent)
    }

    /// 释放一段区间
    ///
    /// 空操作。水位线不回退，区间内的字节成为死存储。
    pub fn free(&mut self, _extent: Extent) {}

    /// 写入一段已分配区间
    ///
    /// 调用方保证 `extent` 来自 [`Arena::allocate`] 且 `bytes.len() == extent.len`
    pub fn write(&mut self, extent: Extent, bytes: &[u8]) {
        debug_assert_eq!(extent.len, bytes.len());
        self.pool[extent.offset..extent.offset + bytes.len()].copy_from_slice(bytes);
    }

    /// 读取一段已分配区间
    pub fn read(&self, extent: Extent) -> &[u8] {
        &self.pool[extent.offset..extent.offset + extent.len]
    }

    /// 已使用的字节数
    pub fn used(&self) -> usize {
        self.used
    }

    /// 池总容量
    pub fn capacity(&self) -> usize {
        FS_ARENA_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_monotonic_non_overlapping() {
        let mut arena = Arena::new();

        let a = arena.allocate(100).unwrap();
        let b = arena.allocate(200).unwrap();
        let c = arena.allocate(1).unwrap();

        assert_eq!(a.offset, 0);
        assert_eq!(b.offset, 100);
        assert_eq!(c.offset, 300);
        assert_eq!(arena.used(), 301);
    }

    #[test]
    fn test_alloc_exhaustion() {
        let mut arena = Arena::new();

        assert!(arena.allocate(FS_ARENA_SIZE).is_ok());
        assert_eq!(arena.allocate(1), Err(FsError::OutOfMemory));
    }

    #[test]
    fn test_alloc_exact_boundary() {
        let mut arena = Arena::new();

        assert!(arena.allocate(FS_ARENA_SIZE - 8).is_ok());
        assert!(arena.allocate(8).is_ok());
        assert_eq!(arena.used(), arena.capacity());
        assert_eq!(arena.allocate(1), Err(FsError::OutOfMemory));
    }

    #[test]
    fn test_free_is_noop() {
        let mut arena = Arena::new();

        let a = arena.allocate(64).unwrap();
        arena.free(a);
        assert_eq!(arena.used(), 64);

        // 释放后的分配依然从水位线继续
        let b = arena.allocate(16).unwrap();
        assert_eq!(b.offset, 64);
    }

    #[test]
    fn test_write_read_roundtrip() {
        let mut arena = Arena::new();

        let e = arena.allocate(5).unwrap();
        arena.write(e, b"hello");
        assert_eq!(arena.read(e), b"hello");
    }

    #[test]
    fn test_zero_sized_alloc() {
        let mut arena = Arena::new();

        let e = arena.allocate(0).unwrap();
        assert_eq!(e.len, 0);
        assert_eq!(arena.read(e), b"");
        assert_eq!(arena.used(), 0);
    }
}
