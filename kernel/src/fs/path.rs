//! 路径解析模块
//!
//! 路径语法：`/` 分隔组件，前导 `/` 表示绝对路径，
//! `.` 与 `..` 为特殊组件，连续与尾部的 `/` 被忽略。
//! 组件名区分大小写（控制台只对命令词做大写化，参数原样传入）。

/// 路径组件
///
/// 表示路径中的一个组件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathComponent<'a> {
    name: &'a str,
}

impl<'a> PathComponent<'a> {
    pub fn new(name: &'a str) -> Self {
        Self { name }
    }

    /// 获取名称
    pub fn name(&self) -> &'a str {
        self.name
    }

    /// 检查是否是当前目录 (.)
    pub fn is_current(&self) -> bool {
        self.name == "."
    }

    /// 检查是否是父目录 (..)
    pub fn is_parent(&self) -> bool {
        self.name == ".."
    }
}

/// 路径
///
/// 对路径字符串的零拷贝视图
#[derive(Debug, Clone, Copy)]
pub struct Path<'a> {
    path: &'a str,
}

impl<'a> Path<'a> {
    pub fn new(path: &'a str) -> Self {
        Self { path }
    }

    /// 检查是否是绝对路径
    pub fn is_absolute(&self) -> bool {
        self.path.starts_with('/')
    }

    /// 检查是否为空
    pub fn is_empty(&self) -> bool {
        self.path.is_empty()
    }

    /// 获取路径字符串
    pub fn as_str(&self) -> &'a str {
        self.path
    }

    /// 分割路径为组件
    pub fn components(&self) -> PathComponents<'a> {
        PathComponents {
            path: self.path,
            pos: 0,
        }
    }

    /// 拆分为（父路径, 末组件名）
    ///
    /// 尾部的 `/` 先被剥除；没有父路径部分时返回 `None`（相对当前目录）。
    ///
    /// # 返回
    /// 末组件为空（如 `/` 或空路径）时返回 `None`
    pub fn split_last(&self) -> Option<(Option<&'a str>, &'a str)> {
        let trimmed = self.path.trim_end_matches('/');
        if trimmed.is_empty() {
            return None;
        }

        match trimmed.rfind('/') {
            None => Some((None, trimmed)),
            Some(0) => Some((Some("/"), &trimmed[1..])),
            Some(idx) => Some((Some(&trimmed[..idx]), &trimmed[idx + 1..])),
        }
    }
}

/// 路径组件迭代器
///
/// 用于遍历路径的各个组件
pub struct PathComponents<'a> {
    path: &'a str,
    pos: usize,
}

impl<'a> Iterator for PathComponents<'a> {
    type Item = PathComponent<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        // 跳过分隔符
        while self.pos < self.path.len() && self.path.as_bytes()[self.pos] == b'/' {
            self.pos += 1;
        }

        if self.pos >= self.path.len() {
            return None;
        }

        let start = self.pos;
        while self.pos < self.path.len() && self.path.as_bytes()[self.pos] != b'/' {
            self.pos += 1;
        }

        Some(PathComponent::new(&self.path[start..self.pos]))
    }
}
