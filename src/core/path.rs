//! 分类路径
//!
//! 分类在树中的位置用类 Unix 路径表示：从根到节点依次拼接各级名称，以 `/` 分隔。
//! 名称中出现的 `/` 先替换为占位符 `\`，保证层级分隔符无歧义。

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 层级分隔符
pub const SEPARATOR: char = '/';
/// 名称内分隔符的占位符
pub const ESCAPE: char = '\\';

/// 将名称中的分隔符替换为占位符
pub fn escape(name: &str) -> String {
    name.replace(SEPARATOR, &ESCAPE.to_string())
}

/// 还原路径段中的占位符
pub fn unescape(segment: &str) -> String {
    segment.replace(ESCAPE, &SEPARATOR.to_string())
}

/// 经过校验的分类路径
///
/// 以 `/` 开头、不含空段；`/` 本身表示根（镜像根目录，即"无分类"）。
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CategoryPath(String);

impl CategoryPath {
    pub fn root() -> Self {
        Self(SEPARATOR.to_string())
    }

    pub fn parse(path: &str) -> Result<Self> {
        if path == "/" {
            return Ok(Self::root());
        }
        if !path.starts_with(SEPARATOR) {
            return Err(Error::InvalidPath {
                path: path.to_string(),
                reason: "must start with '/'",
            });
        }
        if path[1..].split(SEPARATOR).any(str::is_empty) {
            return Err(Error::InvalidPath {
                path: path.to_string(),
                reason: "contains an empty segment",
            });
        }
        Ok(Self(path.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.len() == 1
    }

    /// 转义后的路径段
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(SEPARATOR).skip(1).filter(|s| !s.is_empty())
    }

    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// 是否为顶层分类（仅一段）
    pub fn is_top_level(&self) -> bool {
        self.depth() == 1
    }

    pub fn parent(&self) -> Option<CategoryPath> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind(SEPARATOR) {
            Some(0) | None => Some(Self::root()),
            Some(pos) => Some(Self(self.0[..pos].to_string())),
        }
    }

    /// 最后一段的原始名称（已还原占位符）
    pub fn name(&self) -> Option<String> {
        self.segments().last().map(unescape)
    }

    /// 子路径，名称会被转义
    pub fn child(&self, name: &str) -> Result<CategoryPath> {
        if name.is_empty() {
            return Err(Error::InvalidPath {
                path: format!("{}/", self.0.trim_end_matches(SEPARATOR)),
                reason: "contains an empty segment",
            });
        }
        let escaped = escape(name);
        if self.is_root() {
            Ok(Self(format!("/{}", escaped)))
        } else {
            Ok(Self(format!("{}/{}", self.0, escaped)))
        }
    }

    /// 从第一层到自身的所有前缀（父在前，子在后）
    pub fn lineage(&self) -> Vec<CategoryPath> {
        let mut current = String::new();
        self.segments()
            .map(|segment| {
                current.push(SEPARATOR);
                current.push_str(segment);
                Self(current.clone())
            })
            .collect()
    }

    /// 顶层祖先
    pub fn top_level(&self) -> Option<CategoryPath> {
        self.segments().next().map(|s| Self(format!("/{}", s)))
    }

    /// 按路径段判断：`self` 等于 `other` 或是其祖先
    pub fn covers(&self, other: &CategoryPath) -> bool {
        if self.is_root() || self == other {
            return true;
        }
        other.0.len() > self.0.len()
            && other.0.starts_with(&self.0)
            && other.0[self.0.len()..].starts_with(SEPARATOR)
    }
}

impl fmt::Display for CategoryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CategoryPath {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CategoryPath {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<CategoryPath> for String {
    fn from(path: CategoryPath) -> Self {
        path.0
    }
}

impl AsRef<str> for CategoryPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
