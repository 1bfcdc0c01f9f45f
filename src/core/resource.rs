//! 分类所挂靠的资源类型

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 资源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// 会计科目，分类带编号且根分类不可变
    Account,
    Article,
    Asset,
    File,
    Person,
}

/// 资源类型对应的分类规则
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourcePolicy {
    /// 分类是否带可修改的编号
    pub allows_numbering: bool,
    /// 顶层分类是否禁止增删改
    pub roots_are_immutable: bool,
}

impl ResourceKind {
    /// API 路径前缀，如 `account/category/tree.json` 中的 `account`
    pub fn endpoint(&self) -> &'static str {
        match self {
            ResourceKind::Account => "account",
            ResourceKind::Article => "article",
            ResourceKind::Asset => "inventory/asset",
            ResourceKind::File => "file",
            ResourceKind::Person => "person",
        }
    }

    pub fn policy(&self) -> ResourcePolicy {
        match self {
            ResourceKind::Account => ResourcePolicy {
                allows_numbering: true,
                roots_are_immutable: true,
            },
            _ => ResourcePolicy {
                allows_numbering: false,
                roots_are_immutable: false,
            },
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::Account => write!(f, "account"),
            ResourceKind::Article => write!(f, "article"),
            ResourceKind::Asset => write!(f, "asset"),
            ResourceKind::File => write!(f, "file"),
            ResourceKind::Person => write!(f, "person"),
        }
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "account" => Ok(ResourceKind::Account),
            "article" => Ok(ResourceKind::Article),
            "asset" | "inventory/asset" => Ok(ResourceKind::Asset),
            "file" => Ok(ResourceKind::File),
            "person" => Ok(ResourceKind::Person),
            other => Err(format!("unknown resource type: {}", other)),
        }
    }
}
