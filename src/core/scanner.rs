//! 本地目录扫描

use crate::core::path::CategoryPath;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// 本地目录中的一项
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalFile {
    /// 相对扫描根目录的 POSIX 路径
    pub relative_path: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

impl LocalFile {
    /// `/` + 相对路径
    pub fn remote_path(&self) -> String {
        format!("/{}", self.relative_path)
    }

    pub fn file_name(&self) -> &str {
        self.relative_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.relative_path)
    }

    /// 所在目录对应的分类；根目录下的文件为 `/`
    pub fn remote_category(&self) -> Result<CategoryPath> {
        let mut dirs: Vec<&str> = self.relative_path.split('/').collect();
        dirs.pop();
        dirs.iter()
            .try_fold(CategoryPath::root(), |path, dir| path.child(dir))
    }

    pub fn absolute_path(&self, root: &Path) -> PathBuf {
        self.relative_path
            .split('/')
            .fold(root.to_path_buf(), |path, part| path.join(part))
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

/// 列出目录内容
///
/// 隐藏项（任一路径段以 `.` 开头）默认不列出；`exclude_dirs` 时只列文件。
/// 符号链接按其指向的目标处理；任何读取错误都会中止扫描。结果按相对路径排序。
pub fn list_directory(
    root: &Path,
    recursive: bool,
    exclude_dirs: bool,
    include_hidden: bool,
) -> Result<Vec<LocalFile>> {
    if !root.exists() {
        return Err(Error::not_found(format!(
            "Directory not found: {}",
            root.display()
        )));
    }
    if !root.is_dir() {
        return Err(Error::not_found(format!(
            "not a directory: {}",
            root.display()
        )));
    }

    let walker = WalkDir::new(root)
        .follow_links(true)
        .min_depth(1)
        .max_depth(if recursive { usize::MAX } else { 1 })
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| include_hidden || e.depth() == 0 || !is_hidden(e.file_name()));

    let mut files = Vec::new();
    for entry in walker {
        // 读不到的目录不能跳过，否则其中的远程文件会被当作多余文件删除
        let entry = entry.map_err(std::io::Error::from)?;
        let is_dir = entry.file_type().is_dir();
        if exclude_dirs && !entry.file_type().is_file() {
            continue;
        }

        let metadata = entry.metadata().map_err(std::io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let modified = DateTime::<Utc>::from(metadata.modified()?);

        files.push(LocalFile {
            relative_path: relative,
            is_dir,
            size: if is_dir { 0 } else { metadata.len() },
            modified,
        });
    }

    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    debug!("扫描 {}: {} 项", root.display(), files.len());
    Ok(files)
}
