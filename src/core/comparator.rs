//! 本地/远程文件比较
//!
//! 只做纯计算，不访问远程；按远程路径（`/` + 相对路径）对齐两边的文件。

use crate::core::files::RemoteFile;
use crate::core::path::CategoryPath;
use crate::core::scanner::LocalFile;
use crate::error::{Error, Result};
use std::collections::{HashMap, HashSet};

/// 镜像动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileAction {
    /// 远程没有，新建
    Upload {
        local: LocalFile,
        category: CategoryPath,
    },
    /// 本地较新，替换远程文件内容
    Replace {
        local: LocalFile,
        remote_id: i64,
        category: CategoryPath,
    },
    /// 本地不比远程新
    Unchanged { local: LocalFile, remote_id: i64 },
}

/// 动作统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionSummary {
    pub upload_count: usize,
    pub upload_bytes: u64,
    pub replace_count: usize,
    pub replace_bytes: u64,
    pub unchanged_count: usize,
}

impl ActionSummary {
    pub fn total_files(&self) -> usize {
        self.upload_count + self.replace_count + self.unchanged_count
    }

    pub fn total_transfer_bytes(&self) -> u64 {
        self.upload_bytes + self.replace_bytes
    }
}

/// 两个本地文件映射到同一远程路径时报错（大小写不敏感的文件系统等）
pub fn check_local_collisions(local: &[LocalFile]) -> Result<()> {
    let mut seen = HashSet::new();
    for file in local {
        let path = file.remote_path();
        if !seen.insert(path.clone()) {
            return Err(Error::LocalPathCollision { path });
        }
    }
    Ok(())
}

/// 出现多次的远程路径（按路径排序，不重复）
pub fn duplicate_paths(remote: &[RemoteFile]) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for file in remote {
        *counts.entry(file.path.as_str()).or_default() += 1;
    }
    let mut paths: Vec<String> = counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(p, _)| p.to_string())
        .collect();
    paths.sort();
    paths
}

/// 应删除的远程文件：重复路径中除第一个外的所有文件，以及本地不存在的文件
pub fn files_to_delete<'a>(local: &[LocalFile], remote: &'a [RemoteFile]) -> Vec<&'a RemoteFile> {
    let local_paths: HashSet<String> = local.iter().map(LocalFile::remote_path).collect();
    let mut seen = HashSet::new();
    remote
        .iter()
        .filter(|file| !seen.insert(file.path.as_str()) || !local_paths.contains(&file.path))
        .collect()
}

/// 本地文件所需的分类集合
pub fn target_categories(local: &[LocalFile]) -> Result<Vec<CategoryPath>> {
    let mut categories: Vec<CategoryPath> = local
        .iter()
        .map(LocalFile::remote_category)
        .collect::<Result<_>>()?;
    categories.sort();
    categories.dedup();
    Ok(categories)
}

/// 为每个本地文件决定动作
///
/// 远程路径必须已无重复；仅当本地修改时间严格晚于远程时替换。
pub fn compare_files(local: &[LocalFile], remote: &[RemoteFile]) -> Result<Vec<FileAction>> {
    let remote_by_path: HashMap<&str, &RemoteFile> =
        remote.iter().map(|f| (f.path.as_str(), f)).collect();

    local
        .iter()
        .map(|file| {
            let category = file.remote_category()?;
            let action = match remote_by_path.get(file.remote_path().as_str()) {
                None => FileAction::Upload {
                    local: file.clone(),
                    category,
                },
                Some(remote) if file.modified > remote.last_updated => FileAction::Replace {
                    local: file.clone(),
                    remote_id: remote.id,
                    category,
                },
                Some(remote) => FileAction::Unchanged {
                    local: file.clone(),
                    remote_id: remote.id,
                },
            };
            Ok(action)
        })
        .collect()
}

pub fn summarize_actions(actions: &[FileAction]) -> ActionSummary {
    let mut summary = ActionSummary::default();
    for action in actions {
        match action {
            FileAction::Upload { local, .. } => {
                summary.upload_count += 1;
                summary.upload_bytes += local.size;
            }
            FileAction::Replace { local, .. } => {
                summary.replace_count += 1;
                summary.replace_bytes += local.size;
            }
            FileAction::Unchanged { .. } => summary.unchanged_count += 1,
        }
    }
    summary
}
