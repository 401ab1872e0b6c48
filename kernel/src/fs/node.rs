//! 文件节点表
//!
//! 固定容量的节点数组构成文件树。节点之间不持有指针，
//! 父/子/兄弟关系全部以 `Option<NodeId>`（表内下标）表达，
//! 与固定数组的存储方式天然匹配，也避免了所有权环。
//!
//! 目录通过 `first_child` + 各子节点的 `next_sibling` 形成单向链表，
//! 遍历只能沿链表走；子链表按插入顺序追加到尾部。

use alloc::string::String;

use crate::config::FS_MAX_NODES;
use crate::fs::arena::Extent;
use crate::fs::FsError;

/// 节点表下标
///
/// 下标在节点的生命周期内稳定，删除后槽位可被复用。
pub type NodeId = usize;

/// 节点类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// 目录
    Directory,
    /// 常规文件
    File,
}

/// 文件树节点
///
/// 文件的内容存放在 arena 中，节点只记录区间；目录没有内容。
#[derive(Debug, Clone)]
pub struct FileNode {
    /// 节点名称（兄弟间唯一，不含 `/`）
    pub name: String,
    /// 节点类型
    pub kind: NodeKind,
    /// 父目录（根目录为 None）
    pub parent: Option<NodeId>,
    /// 第一个子节点（目录专用）
    pub first_child: Option<NodeId>,
    /// 同一父目录下的下一个兄弟节点
    pub next_sibling: Option<NodeId>,
    /// 文件内容所在的 arena 区间（目录恒为 None）
    pub content: Option<Extent>,
}

impl FileNode {
    pub fn new(name: String, kind: NodeKind, parent: Option<NodeId>) -> Self {
        Self {
            name,
            kind,
            parent,
            first_child: None,
            next_sibling: None,
            content: None,
        }
    }

    /// 是否为目录
    pub fn is_directory(&self) -> bool {
        self.kind == NodeKind::Directory
    }
}

/// 固定容量节点表
///
/// 槽位采用首个空位扫描分配；删除清空槽位，之后可复用。
pub struct NodeTable {
    nodes: [Option<FileNode>; FS_MAX_NODES],
}

impl NodeTable {
    pub fn new() -> Self {
        const EMPTY: Option<FileNode> = None;
        Self {
            nodes: [EMPTY; FS_MAX_NODES],
        }
    }

    /// 分配一个槽位存放节点
    ///
    /// # 返回
    /// 成功返回节点下标，表满返回 [`FsError::Full`]
    pub fn alloc(&mut self, node: FileNode) -> Result<NodeId, FsError> {
        for (id, slot) in self.nodes.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(node);
                return Ok(id);
            }
        }
        Err(FsError::Full)
    }

    /// 清空槽位，槽位可被后续分配复用
    pub fn free(&mut self, id: NodeId) {
        if id < FS_MAX_NODES {
            self.nodes[id] = None;
        }
    }

    pub fn get(&self, id: NodeId) -> Option<&FileNode> {
        self.nodes.get(id).and_then(|slot| slot.as_ref())
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut FileNode> {
        self.nodes.get_mut(id).and_then(|slot| slot.as_mut())
    }

    /// 当前占用的槽位数
    pub fn count(&self) -> usize {
        self.nodes.iter().filter(|slot| slot.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    fn dir(name: &str) -> FileNode {
        FileNode::new(name.to_string(), NodeKind::Directory, None)
    }

    #[test]
    fn test_alloc_returns_first_free_slot() {
        let mut table = NodeTable::new();

        assert_eq!(table.alloc(dir("a")).unwrap(), 0);
        assert_eq!(table.alloc(dir("b")).unwrap(), 1);
        assert_eq!(table.count(), 2);
    }

    #[test]
    fn test_free_slot_is_reused() {
        let mut table = NodeTable::new();

        let a = table.alloc(dir("a")).unwrap();
        let b = table.alloc(dir("b")).unwrap();
        table.free(a);

        assert!(table.get(a).is_none());
        assert!(table.get(b).is_some());

        let c = table.alloc(dir("c")).unwrap();
        assert_eq!(c, a);
        assert_eq!(table.get(c).unwrap().name, "c");
    }

    #[test]
    fn test_table_capacity() {
        let mut table = NodeTable::new();

        for i in 0..FS_MAX_NODES {
            assert_eq!(table.alloc(dir("x")).unwrap(), i);
        }
        assert_eq!(table.alloc(dir("y")), Err(FsError::Full));

        table.free(42);
        assert_eq!(table.alloc(dir("y")).unwrap(), 42);
    }
}
