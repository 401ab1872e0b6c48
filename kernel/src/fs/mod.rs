//! 基于内存的层次化文件系统
//!
//! 特性：
//! - 基于 RAM 的文件存储，重启即重置，不支持块设备
//! - 固定容量节点表（[`node`]）+ 单调水位线内容池（[`arena`]）
//! - 绝对/相对路径解析，`.` 与 `..` 特殊组件（[`path`]）
//! - 进程级工作目录，由 `change_directory` 独占修改
//!
//! 所有操作同步完成，错误以 [`FsError`] 显式返回给调用方（控制台层），
//! 任何错误都不会使内核停机。

pub mod arena;
pub mod node;
pub mod path;

use alloc::string::String;
use alloc::string::ToString;
use alloc::vec::Vec;
use core::fmt;

use log::info;
use spin::Mutex;

use crate::config::{FS_MAX_FILE_SIZE, FS_MAX_NAME_LEN};
use arena::Arena;
use node::{FileNode, NodeId, NodeKind, NodeTable};
use path::Path;

/// 文件系统错误
///
/// 控制台层用 [`FsError::as_str`] 渲染为提示信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// 节点表已满
    Full,
    /// 内容池耗尽
    OutOfMemory,
    /// 路径无法解析
    NotFound,
    /// 对目录执行了文件操作
    NotAFile,
    /// 对文件执行了目录操作
    NotADirectory,
    /// 删除非空目录
    NotEmpty,
    /// 内容超过单文件上限
    TooLarge,
    /// 兄弟节点重名
    AlreadyExists,
    /// 名称为空、过长或含非法字符
    InvalidName,
    /// 节点正在使用（根目录或当前工作目录）
    Busy,
    /// 文件系统尚未初始化
    NotInitialized,
}

impl FsError {
    pub fn as_str(&self) -> &'static str {
        match self {
            FsError::Full => "node table full",
            FsError::OutOfMemory => "out of memory",
            FsError::NotFound => "no such file or directory",
            FsError::NotAFile => "not a file",
            FsError::NotADirectory => "not a directory",
            FsError::NotEmpty => "directory not empty",
            FsError::TooLarge => "file too large",
            FsError::AlreadyExists => "file exists",
            FsError::InvalidName => "invalid name",
            FsError::Busy => "resource busy",
            FsError::NotInitialized => "filesystem not initialized",
        }
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 文件系统上下文
///
/// 节点表、内容池和工作目录的聚合，单执行流独占访问。
/// 全局单例见 [`init`] / [`with_fs`]。
pub struct FileSystem {
    arena: Arena,
    nodes: NodeTable,
    root: NodeId,
    cwd: NodeId,
}

impl FileSystem {
    /// 创建空文件系统，根目录即工作目录
    pub fn new() -> Self {
        let mut nodes = NodeTable::new();
        // 空表上的首次分配不会失败
        let root = nodes
            .alloc(FileNode::new(String::from("/"), NodeKind::Directory, None))
            .unwrap_or(0);

        Self {
            arena: Arena::new(),
            nodes,
            root,
            cwd: root,
        }
    }

    /// 根目录节点
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// 当前工作目录节点
    pub fn current_directory(&self) -> NodeId {
        self.cwd
    }

    /// 节点类型（测试与控制台用）
    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.nodes.get(id).map(|n| n.kind)
    }

    /// 已占用的节点槽位数
    pub fn node_count(&self) -> usize {
        self.nodes.count()
    }

    /// 内容池已使用字节数
    pub fn arena_used(&self) -> usize {
        self.arena.used()
    }

    // ========================================================
    // 节点层操作
    // ========================================================

    /// 在 `parent` 下创建节点
    ///
    /// 子链表按插入顺序追加到尾部，目录列举因此保持创建顺序。
    ///
    /// # 返回
    /// - [`FsError::NotADirectory`]: `parent` 不是目录
    /// - [`FsError::InvalidName`]: 名称为空、超长、含 `/` 或为 `.`/`..`
    /// - [`FsError::AlreadyExists`]: 兄弟重名
    /// - [`FsError::Full`]: 节点表已满
    pub fn create_node(
        &mut self,
        parent: NodeId,
        name: &str,
        kind: NodeKind,
    ) -> Result<NodeId, FsError> {
        let pnode = self.nodes.get(parent).ok_or(FsError::NotFound)?;
        if !pnode.is_directory() {
            return Err(FsError::NotADirectory);
        }
        validate_name(name)?;
        if self.find_child(parent, name).is_some() {
            return Err(FsError::AlreadyExists);
        }

        let id = self
            .nodes
            .alloc(FileNode::new(name.to_string(), kind, Some(parent)))?;
        self.append_child(parent, id);
        Ok(id)
    }

    /// 写入文件内容，整体替换
    ///
    /// 旧内容区间被放弃（内容池不回收，见 [`arena`] 模块说明）。
    pub fn write_content(&mut self, id: NodeId, bytes: &[u8]) -> Result<(), FsError> {
        let node = self.nodes.get(id).ok_or(FsError::NotFound)?;
        if node.kind != NodeKind::File {
            return Err(FsError::NotAFile);
        }
        if bytes.len() > FS_MAX_FILE_SIZE {
            return Err(FsError::TooLarge);
        }

        let extent = self.arena.allocate(bytes.len())?;
        self.arena.write(extent, bytes);

        let old = match self.nodes.get_mut(id) {
            Some(n) => n.content.replace(extent),
            None => None,
        };
        if let Some(old) = old {
            self.arena.free(old);
        }
        Ok(())
    }

    /// 读取文件内容
    ///
    /// 从未写入过的文件内容为空
    pub fn read_content(&self, id: NodeId) -> Result<&[u8], FsError> {
        let node = self.nodes.get(id).ok_or(FsError::NotFound)?;
        if node.kind != NodeKind::File {
            return Err(FsError::NotAFile);
        }
        match node.content {
            Some(extent) => Ok(self.arena.read(extent)),
            None => Ok(&[]),
        }
    }

    // ========================================================
    // 路径层操作
    // ========================================================

    /// 解析路径为节点
    ///
    /// 前导 `/` 从根目录开始，否则从工作目录开始；
    /// 根目录的 `..` 仍是根目录；空路径解析为工作目录。
    pub fn resolve_path(&self, path: &str) -> Result<NodeId, FsError> {
        let p = Path::new(path);
        let mut cur = if p.is_absolute() { self.root } else { self.cwd };

        for comp in p.components() {
            if comp.is_current() {
                continue;
            }
            if comp.is_parent() {
                cur = self
                    .nodes
                    .get(cur)
                    .ok_or(FsError::NotFound)?
                    .parent
                    .unwrap_or(self.root);
                continue;
            }
            cur = self.find_child(cur, comp.name()).ok_or(FsError::NotFound)?;
        }
        Ok(cur)
    }

    /// 列举目录内容，按创建顺序
    ///
    /// 每次调用重新遍历子链表，不保留迭代状态。
    pub fn list_directory(&self, id: NodeId) -> Result<Vec<(String, NodeKind)>, FsError> {
        let node = self.nodes.get(id).ok_or(FsError::NotFound)?;
        if !node.is_directory() {
            return Err(FsError::NotADirectory);
        }

        let mut entries = Vec::new();
        let mut cur = node.first_child;
        while let Some(child_id) = cur {
            match self.nodes.get(child_id) {
                Some(child) => {
                    entries.push((child.name.clone(), child.kind));
                    cur = child.next_sibling;
                }
                None => break,
            }
        }
        Ok(entries)
    }

    /// 列举指定路径的目录
    pub fn list_directory_at_path(
        &self,
        path: &str,
    ) -> Result<Vec<(String, NodeKind)>, FsError> {
        let id = self.resolve_path(path)?;
        self.list_directory(id)
    }

    /// 切换工作目录
    pub fn change_directory(&mut self, path: &str) -> Result<(), FsError> {
        let id = self.resolve_path(path)?;
        let node = self.nodes.get(id).ok_or(FsError::NotFound)?;
        if !node.is_directory() {
            return Err(FsError::NotADirectory);
        }
        self.cwd = id;
        Ok(())
    }

    /// 工作目录的绝对路径字符串
    pub fn working_directory_path(&self) -> String {
        if self.cwd == self.root {
            return String::from("/");
        }

        let mut names: Vec<&str> = Vec::new();
        let mut cur = Some(self.cwd);
        while let Some(id) = cur {
            if id == self.root {
                break;
            }
            match self.nodes.get(id) {
                Some(n) => {
                    names.push(&n.name);
                    cur = n.parent;
                }
                None => break,
            }
        }

        let mut out = String::new();
        for name in names.iter().rev() {
            out.push('/');
            out.push_str(name);
        }
        out
    }

    /// 删除文件或空目录
    ///
    /// 根目录与当前工作目录不可删除；非空目录返回 [`FsError::NotEmpty`]。
    /// 节点槽位被清空复用，文件内容字节留在内容池中（无回收）。
    pub fn remove(&mut self, path: &str) -> Result<(), FsError> {
        let id = self.resolve_path(path)?;
        if id == self.root || id == self.cwd {
            return Err(FsError::Busy);
        }

        let (parent, kind, first_child, content) = {
            let n = self.nodes.get(id).ok_or(FsError::NotFound)?;
            (n.parent, n.kind, n.first_child, n.content)
        };
        if kind == NodeKind::Directory && first_child.is_some() {
            return Err(FsError::NotEmpty);
        }

        // 非根节点必有父目录
        let parent = parent.ok_or(FsError::Busy)?;
        self.unlink_child(parent, id);
        if let Some(extent) = content {
            self.arena.free(extent);
        }
        self.nodes.free(id);
        Ok(())
    }

    /// 在路径处创建目录
    ///
    /// 只创建最后一个组件；任何祖先缺失都直接失败，不做 `mkdir -p`。
    pub fn create_directory_at_path(&mut self, path: &str) -> Result<NodeId, FsError> {
        let (parent, name) = self.parent_and_name(path)?;
        self.create_node(parent, name, NodeKind::Directory)
    }

    /// 在路径处创建空文件
    pub fn create_file_at_path(&mut self, path: &str) -> Result<NodeId, FsError> {
        let (parent, name) = self.parent_and_name(path)?;
        self.create_node(parent, name, NodeKind::File)
    }

    /// 写文件（`echo ... > file` 语义）
    ///
    /// 文件不存在时先创建（父目录必须已存在），存在时整体覆盖内容。
    pub fn write_file_at_path(&mut self, path: &str, bytes: &[u8]) -> Result<(), FsError> {
        let id = match self.resolve_path(path) {
            Ok(id) => id,
            Err(FsError::NotFound) => self.create_file_at_path(path)?,
            Err(e) => return Err(e),
        };
        self.write_content(id, bytes)
    }

    /// 读文件（`cat` 语义）
    pub fn read_file_at_path(&self, path: &str) -> Result<&[u8], FsError> {
        let id = self.resolve_path(path)?;
        self.read_content(id)
    }

    // ========================================================
    // 内部辅助
    // ========================================================

    /// 在目录的子链表中按名查找（区分大小写）
    fn find_child(&self, dir: NodeId, name: &str) -> Option<NodeId> {
        let mut cur = self.nodes.get(dir)?.first_child;
        while let Some(id) = cur {
            let n = self.nodes.get(id)?;
            if n.name == name {
                return Some(id);
            }
            cur = n.next_sibling;
        }
        None
    }

    /// 追加到子链表尾部，保持插入顺序
    fn append_child(&mut self, parent: NodeId, child: NodeId) {
        let first = match self.nodes.get(parent) {
            Some(p) => p.first_child,
            None => return,
        };

        match first {
            None => {
                if let Some(p) = self.nodes.get_mut(parent) {
                    p.first_child = Some(child);
                }
            }
            Some(mut cur) => {
                while let Some(next) = self.nodes.get(cur).and_then(|n| n.next_sibling) {
                    cur = next;
                }
                if let Some(tail) = self.nodes.get_mut(cur) {
                    tail.next_sibling = Some(child);
                }
            }
        }
    }

    /// 从父目录的子链表中摘除节点
    fn unlink_child(&mut self, parent: NodeId, child: NodeId) {
        let first = match self.nodes.get(parent) {
            Some(p) => p.first_child,
            None => return,
        };
        let skip = self.nodes.get(child).and_then(|c| c.next_sibling);

        if first == Some(child) {
            if let Some(p) = self.nodes.get_mut(parent) {
                p.first_child = skip;
            }
            return;
        }

        let mut cur = first;
        while let Some(id) = cur {
            let next = self.nodes.get(id).and_then(|n| n.next_sibling);
            if next == Some(child) {
                if let Some(n) = self.nodes.get_mut(id) {
                    n.next_sibling = skip;
                }
                return;
            }
            cur = next;
        }
    }

    /// 把路径拆成（已存在的父目录节点, 末组件名）
    fn parent_and_name<'a>(&self, path: &'a str) -> Result<(NodeId, &'a str), FsError> {
        let (parent_str, name) = Path::new(path)
            .split_last()
            .ok_or(FsError::InvalidName)?;
        let parent = match parent_str {
            None => self.cwd,
            Some(pp) => self.resolve_path(pp)?,
        };
        Ok((parent, name))
    }
}

fn validate_name(name: &str) -> Result<(), FsError> {
    if name.is_empty() || name.len() > FS_MAX_NAME_LEN {
        return Err(FsError::InvalidName);
    }
    if name.contains('/') || name == "." || name == ".." {
        return Err(FsError::InvalidName);
    }
    Ok(())
}

// ============================================================
// 全局单例
// ============================================================

/// 全局文件系统
///
/// 单执行流访问，锁只用于显式化初始化顺序
static ROOT_FS: Mutex<Option<FileSystem>> = Mutex::new(None);

/// 初始化全局文件系统，重复调用为空操作
pub fn init() {
    let mut guard = ROOT_FS.lock();
    if guard.is_none() {
        *guard = Some(FileSystem::new());
        info!("fs: initialized, {} node slots", crate::config::FS_MAX_NODES);
    }
}

/// 在全局文件系统上执行操作
///
/// # 返回
/// [`init`] 之前调用返回 [`FsError::NotInitialized`]
pub fn with_fs<R>(f: impl FnOnce(&mut FileSystem) -> Result<R, FsError>) -> Result<R, FsError> {
    let mut guard = ROOT_FS.lock();
    match guard.as_mut() {
        Some(fs) => f(fs),
        None => Err(FsError::NotInitialized),
    }
}
