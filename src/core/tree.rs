//! 分类树展开
//!
//! 服务端返回嵌套的分类树，这里把它展开成按路径排序的扁平表。

use crate::core::path::CategoryPath;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// 远程分类节点（子节点已剥离）
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawNode {
    id: i64,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    parent_id: Option<i64>,
    #[serde(default)]
    is_system: bool,
    #[serde(default)]
    number: Option<i64>,
}

/// 展开后的一行
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRow {
    pub path: CategoryPath,
    pub id: i64,
    /// 原始名称，可能包含 `/`
    pub name: String,
    pub parent_id: Option<i64>,
    pub is_system: bool,
    pub number: Option<i64>,
}

/// 按路径排序的分类表
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CategoryTable {
    rows: Vec<CategoryRow>,
}

impl CategoryTable {
    pub fn rows(&self) -> &[CategoryRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, path: &CategoryPath) -> Option<&CategoryRow> {
        self.rows.iter().find(|row| &row.path == path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &CategoryPath> {
        self.rows.iter().map(|row| &row.path)
    }

    /// path -> id
    pub fn id_map(&self) -> HashMap<CategoryPath, i64> {
        self.rows
            .iter()
            .map(|row| (row.path.clone(), row.id))
            .collect()
    }

    pub fn id_of(&self, path: &CategoryPath) -> Result<i64> {
        self.get(path)
            .map(|row| row.id)
            .ok_or_else(|| Error::UnknownCategory(format!("no id found for path '{}'", path)))
    }

    pub fn path_of(&self, id: i64) -> Result<&CategoryPath> {
        self.rows
            .iter()
            .find(|row| row.id == id)
            .map(|row| &row.path)
            .ok_or_else(|| Error::UnknownCategory(format!("no path found for id {}", id)))
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

/// 展开服务端分类树
///
/// `include_system` 为 false 时去掉系统节点，并从每条路径中去掉最顶层的系统根。
pub fn flatten_tree(tree: &Value, include_system: bool) -> Result<CategoryTable> {
    let mut rows = Vec::new();
    flatten_nodes(tree, &CategoryPath::root(), &mut rows)?;

    if !include_system {
        rows.retain(|row| !row.is_system);
        for row in rows.iter_mut() {
            row.path = strip_system_root(&row.path)?;
        }
    }

    rows.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(CategoryTable { rows })
}

fn flatten_nodes(nodes: &Value, parent: &CategoryPath, rows: &mut Vec<CategoryRow>) -> Result<()> {
    let nodes = nodes.as_array().ok_or_else(|| Error::MalformedTree {
        found: json_type(nodes).to_string(),
    })?;

    for node in nodes {
        let mut fields = node
            .as_object()
            .cloned()
            .ok_or_else(|| Error::MalformedTree {
                found: format!("{} inside node list", json_type(node)),
            })?;
        // CashCtrl 用 data 存放子节点
        let children = fields
            .remove("data")
            .or_else(|| fields.remove("children"))
            .filter(|c| !c.is_null());

        let raw: RawNode =
            serde_json::from_value(Value::Object(fields)).map_err(|e| Error::MalformedTree {
                found: e.to_string(),
            })?;
        let name = raw
            .text
            .or(raw.name)
            .ok_or_else(|| Error::MalformedTree {
                found: format!("node {} without a name", raw.id),
            })?;
        let path = parent.child(&name)?;

        if let Some(children) = children {
            flatten_nodes(&children, &path, rows)?;
        }

        rows.push(CategoryRow {
            path,
            id: raw.id,
            name,
            parent_id: raw.parent_id,
            is_system: raw.is_system,
            number: raw.number,
        });
    }

    Ok(())
}

/// 非系统节点只能出现在系统根之下；顶层的非系统节点没有可去掉的根
fn strip_system_root(path: &CategoryPath) -> Result<CategoryPath> {
    let rest: Vec<&str> = path.segments().skip(1).collect();
    if rest.is_empty() {
        return Err(Error::MalformedTree {
            found: format!("non-system top-level node '{}'", path),
        });
    }
    CategoryPath::parse(&format!("/{}", rest.join("/")))
}
