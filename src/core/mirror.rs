//! 目录镜像：让远程文件和文件分类与本地目录一致（单向）

use crate::api::RemoteApi;
use crate::core::comparator::{
    check_local_collisions, compare_files, duplicate_paths, files_to_delete, summarize_actions,
    target_categories, FileAction,
};
use crate::core::files::list_remote_files;
use crate::core::path::CategoryPath;
use crate::core::reconcile::{CategoryTarget, CategoryTree, CategoryUpdateReport};
use crate::core::resource::ResourceKind;
use crate::core::scanner::list_directory;
use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// 镜像报告
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorReport {
    pub files_scanned: usize,
    pub files_deleted: usize,
    pub trash_emptied: bool,
    pub categories: CategoryUpdateReport,
    pub files_uploaded: usize,
    pub files_replaced: usize,
    pub files_unchanged: usize,
    pub bytes_transferred: u64,
}

impl MirrorReport {
    /// 本次是否修改了远程数据
    pub fn changed_anything(&self) -> bool {
        self.files_deleted > 0
            || self.trash_emptied
            || self.categories != CategoryUpdateReport::default()
            || self.files_uploaded > 0
            || self.files_replaced > 0
    }
}

pub struct DirectoryMirror {
    api: Arc<dyn RemoteApi>,
    categories: CategoryTree,
}

impl DirectoryMirror {
    pub fn new(api: Arc<dyn RemoteApi>) -> Self {
        Self {
            categories: CategoryTree::new(api.clone()),
            api,
        }
    }

    /// 镜像本地目录
    ///
    /// `delete_files` 删除本地不存在或路径重复的远程文件；`delete_categories`
    /// 删除本地没有对应目录的远程分类。
    pub async fn mirror_directory(
        &self,
        root: &Path,
        delete_files: bool,
        delete_categories: bool,
    ) -> Result<MirrorReport> {
        let start = Instant::now();
        info!("开始镜像: {} -> {}", root.display(), self.api.name());
        let mut report = MirrorReport::default();

        // 1. 本地快照
        let local = list_directory(root, true, true, false)?;
        check_local_collisions(&local)?;
        report.files_scanned = local.len();

        // 2. 远程文件
        let mut remote = list_remote_files(self.api.as_ref()).await?;
        debug!("本地 {} 个文件，远程 {} 个文件", local.len(), remote.len());

        // 3. 删除多余的远程文件
        if delete_files {
            let ids: Vec<i64> = files_to_delete(&local, &remote)
                .iter()
                .map(|f| f.id)
                .collect();
            if !ids.is_empty() {
                for file in remote.iter().filter(|f| ids.contains(&f.id)) {
                    info!("删除远程文件: {} (id={})", file.path, file.id);
                }
                self.api.delete_files(&ids, true).await?;
                remote.retain(|f| !ids.contains(&f.id));
                report.files_deleted = ids.len();
            }
        }

        // 4. 分类对账；回收站中的文件同样会阻止删除分类
        let target = CategoryTarget::paths(target_categories(&local)?);
        let plan = self
            .categories
            .plan_update(ResourceKind::File, &target, delete_categories, false)
            .await?;
        if delete_files && (report.files_deleted > 0 || plan.has_deletes()) {
            debug!("清空回收站");
            self.api.empty_trash().await?;
            report.trash_emptied = true;
        }
        if !plan.is_empty() {
            report.categories = self.categories.apply(&plan).await?;
        }

        // 5. 对账后的分类，`/` 表示无分类
        let mut category_ids: HashMap<CategoryPath, Option<i64>> = self
            .categories
            .list_categories(ResourceKind::File, false)
            .await?
            .id_map()
            .into_iter()
            .map(|(path, id)| (path, Some(id)))
            .collect();
        category_ids.insert(CategoryPath::root(), None);

        // 6. 此时远程不应再有重复路径
        let duplicates = duplicate_paths(&remote);
        if !duplicates.is_empty() {
            return Err(Error::DuplicatePath { paths: duplicates });
        }

        // 7. 上传新文件、替换较旧的文件
        let actions = compare_files(&local, &remote)?;
        let summary = summarize_actions(&actions);
        for action in &actions {
            let (file, category, replace_id) = match action {
                FileAction::Upload { local, category } => (local, category, None),
                FileAction::Replace {
                    local,
                    remote_id,
                    category,
                } => (local, category, Some(*remote_id)),
                FileAction::Unchanged { .. } => continue,
            };
            let category_id = *category_ids
                .get(category)
                .ok_or_else(|| Error::UnknownCategory(category.to_string()))?;
            let id = self
                .api
                .upload_file(
                    &file.absolute_path(root),
                    file.file_name(),
                    category_id,
                    replace_id,
                )
                .await?;
            match replace_id {
                Some(_) => info!("替换远程文件: {} (id={})", file.remote_path(), id),
                None => info!("上传新文件: {} (id={})", file.remote_path(), id),
            }
        }

        report.files_uploaded = summary.upload_count;
        report.files_replaced = summary.replace_count;
        report.files_unchanged = summary.unchanged_count;
        report.bytes_transferred = summary.total_transfer_bytes();

        info!(
            "镜像完成: 上传 {}, 替换 {}, 未变 {}, 删除 {}, 耗时 {:.1}s",
            report.files_uploaded,
            report.files_replaced,
            report.files_unchanged,
            report.files_deleted,
            start.elapsed().as_secs_f64()
        );
        Ok(report)
    }
}
