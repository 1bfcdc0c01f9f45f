//! 远程文件列表（带分类路径）

use crate::api::RemoteApi;
use crate::core::resource::ResourceKind;
use crate::core::tree::{flatten_tree, CategoryTable};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    pub id: i64,
    pub name: String,
    pub category_id: Option<i64>,
    /// 分类路径 + `/` + 文件名
    pub path: String,
    pub last_updated: DateTime<Utc>,
}

/// 远程文件路径；无分类或分类不在表中时放在根下
pub fn remote_file_path(categories: &CategoryTable, category_id: Option<i64>, name: &str) -> String {
    match category_id.and_then(|id| categories.path_of(id).ok()) {
        Some(category) => format!("{}/{}", category, name),
        None => format!("/{}", name),
    }
}

/// 读取远程文件并按路径排序（稳定排序，重复路径保持服务端顺序）
pub async fn list_remote_files(api: &dyn RemoteApi) -> Result<Vec<RemoteFile>> {
    let entries = api.list_files().await?;
    let categories = flatten_tree(&api.category_tree(ResourceKind::File).await?, false)?;

    let mut files: Vec<RemoteFile> = entries
        .into_iter()
        .map(|entry| RemoteFile {
            path: remote_file_path(&categories, entry.category_id, &entry.name),
            id: entry.id,
            name: entry.name,
            category_id: entry.category_id,
            last_updated: entry.last_updated,
        })
        .collect();
    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}
