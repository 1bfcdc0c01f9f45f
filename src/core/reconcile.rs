//! 分类对账
//!
//! 把远程分类集合调整为目标路径集合：先删（叶子在前），再改编号，最后建（父在前）。
//! 所有校验都在生成计划时完成，计划生成后才开始修改远程数据。

use crate::api::RemoteApi;
use crate::core::path::CategoryPath;
use crate::core::resource::ResourceKind;
use crate::core::tree::{flatten_tree, CategoryTable};
use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info};

/// 目标分类集合
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryTarget {
    /// 普通资源：路径集合
    Paths(BTreeSet<CategoryPath>),
    /// 会计科目：路径 -> 编号
    Numbered(BTreeMap<CategoryPath, i64>),
}

impl CategoryTarget {
    pub fn paths<I: IntoIterator<Item = CategoryPath>>(paths: I) -> Self {
        CategoryTarget::Paths(paths.into_iter().collect())
    }

    pub fn numbered<I: IntoIterator<Item = (CategoryPath, i64)>>(entries: I) -> Self {
        CategoryTarget::Numbered(entries.into_iter().collect())
    }

    /// JSON 数组为路径集合，JSON 对象为路径→编号
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let invalid = || {
            Error::Config("category target must be a list of paths or a map of path to number".to_string())
        };
        match value {
            serde_json::Value::Array(items) => items
                .iter()
                .map(|item| CategoryPath::parse(item.as_str().ok_or_else(invalid)?))
                .collect::<Result<BTreeSet<_>>>()
                .map(CategoryTarget::Paths),
            serde_json::Value::Object(map) => map
                .iter()
                .map(|(path, number)| {
                    Ok((CategoryPath::parse(path)?, number.as_i64().ok_or_else(invalid)?))
                })
                .collect::<Result<BTreeMap<_, _>>>()
                .map(CategoryTarget::Numbered),
            _ => Err(invalid()),
        }
    }

    pub fn keys(&self) -> Box<dyn Iterator<Item = &CategoryPath> + '_> {
        match self {
            CategoryTarget::Paths(paths) => Box::new(paths.iter()),
            CategoryTarget::Numbered(map) => Box::new(map.keys()),
        }
    }

    pub fn number_of(&self, path: &CategoryPath) -> Option<i64> {
        match self {
            CategoryTarget::Paths(_) => None,
            CategoryTarget::Numbered(map) => map.get(path).copied(),
        }
    }

    /// 目标形状必须与资源类型一致
    pub fn validate(&self, resource: ResourceKind) -> Result<()> {
        let numbered = matches!(self, CategoryTarget::Numbered(_));
        if resource.policy().allows_numbering == numbered {
            return Ok(());
        }
        Err(Error::TypeMismatch {
            resource: resource.to_string(),
            expected: if resource.policy().allows_numbering {
                "a mapping of path to number"
            } else {
                "a set of paths"
            },
        })
    }
}

/// 编号修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Renumber {
    pub path: CategoryPath,
    pub id: i64,
    pub name: String,
    pub parent_id: Option<i64>,
    pub from: Option<i64>,
    pub to: i64,
}

/// 待新建的分类
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewCategory {
    pub path: CategoryPath,
    pub name: String,
    pub number: Option<i64>,
}

/// 对账计划
#[derive(Debug, Clone, Serialize)]
pub struct CategoryPlan {
    pub resource: ResourceKind,
    /// 每批同一深度，最深的批次在前
    pub delete_batches: Vec<Vec<(CategoryPath, i64)>>,
    pub renumber: Vec<Renumber>,
    /// 按路径排序，父在子前
    pub create: Vec<NewCategory>,
    #[serde(skip)]
    known_ids: HashMap<CategoryPath, i64>,
}

impl CategoryPlan {
    pub fn is_empty(&self) -> bool {
        self.delete_batches.is_empty() && self.renumber.is_empty() && self.create.is_empty()
    }

    pub fn has_deletes(&self) -> bool {
        !self.delete_batches.is_empty()
    }

    pub fn delete_count(&self) -> usize {
        self.delete_batches.iter().map(Vec::len).sum()
    }
}

/// 对账结果统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryUpdateReport {
    pub deleted: usize,
    pub renumbered: usize,
    pub created: usize,
}

/// 根据现有分类表和目标生成对账计划（不访问远程）
pub fn plan_update(
    existing: &CategoryTable,
    resource: ResourceKind,
    target: &CategoryTarget,
    delete: bool,
    ignore_root_nodes: bool,
) -> Result<CategoryPlan> {
    target.validate(resource)?;
    let policy = resource.policy();
    let targets: Vec<&CategoryPath> = target.keys().collect();

    // 1. 删除：没有任何目标路径经过的现有分类
    let mut doomed: BTreeMap<usize, Vec<(CategoryPath, i64)>> = BTreeMap::new();
    if delete {
        let mut skipped_roots: Vec<&CategoryPath> = Vec::new();
        for row in existing.rows() {
            if targets.iter().any(|t| row.path.covers(t)) {
                continue;
            }
            if skipped_roots.iter().any(|root| root.covers(&row.path)) {
                continue;
            }
            if row.path.is_top_level() {
                if ignore_root_nodes {
                    debug!("保留根分类及其子分类: {}", row.path);
                    skipped_roots.push(&row.path);
                    continue;
                }
                if policy.roots_are_immutable {
                    return Err(Error::RootImmutable {
                        resource: resource.to_string(),
                        path: row.path.to_string(),
                    });
                }
            }
            doomed
                .entry(row.path.depth())
                .or_default()
                .push((row.path.clone(), row.id));
        }
    }
    let delete_batches: Vec<Vec<(CategoryPath, i64)>> = doomed
        .into_values()
        .rev()
        .map(|mut batch| {
            batch.sort_by(|a, b| b.0.cmp(&a.0));
            batch
        })
        .collect();

    let mut known_ids = existing.id_map();
    for (path, _) in delete_batches.iter().flatten() {
        known_ids.remove(path);
    }

    // 2. 修改编号
    let mut renumber = Vec::new();
    if let CategoryTarget::Numbered(numbers) = target {
        for (path, &number) in numbers {
            let Some(row) = existing.get(path) else {
                continue;
            };
            if row.number == Some(number) {
                continue;
            }
            // 带 ignore_root_nodes 时根分类也可改编号
            if path.is_top_level() && !ignore_root_nodes && policy.roots_are_immutable {
                return Err(Error::RootImmutable {
                    resource: resource.to_string(),
                    path: path.to_string(),
                });
            }
            renumber.push(Renumber {
                path: path.clone(),
                id: row.id,
                name: row.name.clone(),
                parent_id: row.parent_id,
                from: row.number,
                to: number,
            });
        }
    }

    // 3. 新建：目标路径上所有缺失的前缀，BTreeSet 保证父在子前
    let missing: BTreeSet<CategoryPath> = targets
        .iter()
        .filter(|t| !t.is_root())
        .flat_map(|t| t.lineage())
        .filter(|prefix| !known_ids.contains_key(prefix))
        .collect();

    let mut create = Vec::with_capacity(missing.len());
    for path in missing {
        if path.is_top_level() && policy.roots_are_immutable {
            return Err(Error::RootCreation {
                resource: resource.to_string(),
                path: path.to_string(),
            });
        }
        let name = path.name().ok_or_else(|| Error::InvalidPath {
            path: path.to_string(),
            reason: "has no name",
        })?;
        create.push(NewCategory {
            number: target.number_of(&path),
            name,
            path,
        });
    }

    Ok(CategoryPlan {
        resource,
        delete_batches,
        renumber,
        create,
        known_ids,
    })
}

/// 分类树服务
pub struct CategoryTree {
    api: Arc<dyn RemoteApi>,
}

impl CategoryTree {
    pub fn new(api: Arc<dyn RemoteApi>) -> Self {
        Self { api }
    }

    /// 读取并展开远程分类树
    pub async fn list_categories(
        &self,
        resource: ResourceKind,
        include_system: bool,
    ) -> Result<CategoryTable> {
        let tree = self.api.category_tree(resource).await?;
        let table = flatten_tree(&tree, include_system)?;
        debug!("{} 分类: {} 个", resource, table.len());
        Ok(table)
    }

    /// 基于最新的远程分类生成计划
    pub async fn plan_update(
        &self,
        resource: ResourceKind,
        target: &CategoryTarget,
        delete: bool,
        ignore_root_nodes: bool,
    ) -> Result<CategoryPlan> {
        target.validate(resource)?;
        let existing = self.list_categories(resource, false).await?;
        plan_update(&existing, resource, target, delete, ignore_root_nodes)
    }

    /// 执行计划，中途失败时已完成的修改保留
    pub async fn apply(&self, plan: &CategoryPlan) -> Result<CategoryUpdateReport> {
        let resource = plan.resource;
        let mut report = CategoryUpdateReport::default();

        for batch in &plan.delete_batches {
            let ids: Vec<i64> = batch.iter().map(|(_, id)| *id).collect();
            for (path, _) in batch {
                info!("删除分类: {} {}", resource, path);
            }
            self.api.delete_categories(resource, &ids).await?;
            report.deleted += ids.len();
        }

        for change in &plan.renumber {
            info!(
                "修改分类编号: {} {:?} -> {}",
                change.path, change.from, change.to
            );
            self.api
                .update_category_number(change.id, &change.name, change.to, change.parent_id)
                .await?;
            report.renumbered += 1;
        }

        let mut ids = plan.known_ids.clone();
        for new in &plan.create {
            let parent_id = match new.path.parent() {
                Some(parent) if !parent.is_root() => Some(
                    *ids.get(&parent)
                        .ok_or_else(|| Error::UnknownCategory(parent.to_string()))?,
                ),
                _ => None,
            };
            let id = self
                .api
                .create_category(resource, &new.name, parent_id, new.number)
                .await?;
            info!("新建分类: {} {} (id={})", resource, new.path, id);
            ids.insert(new.path.clone(), id);
            report.created += 1;
        }

        Ok(report)
    }

    /// 把远程分类调整为 `target`
    ///
    /// `delete` 为 false 时只新建和改编号；`ignore_root_nodes` 时不删除顶层分类，但允许改其编号。
    pub async fn update_categories(
        &self,
        resource: ResourceKind,
        target: &CategoryTarget,
        delete: bool,
        ignore_root_nodes: bool,
    ) -> Result<CategoryUpdateReport> {
        let plan = self
            .plan_update(resource, target, delete, ignore_root_nodes)
            .await?;
        if plan.is_empty() {
            debug!("{} 分类无需修改", resource);
            return Ok(CategoryUpdateReport::default());
        }
        let report = self.apply(&plan).await?;
        info!(
            "{} 分类对账完成: 删除 {}, 改编号 {}, 新建 {}",
            resource, report.deleted, report.renumbered, report.created
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::memory::{Call, MemoryApi};

    fn p(s: &str) -> CategoryPath {
        CategoryPath::parse(s).unwrap()
    }

    fn paths(items: &[&str]) -> CategoryTarget {
        CategoryTarget::paths(items.iter().map(|s| p(s)))
    }

    fn numbered(items: &[(&str, i64)]) -> CategoryTarget {
        CategoryTarget::numbered(items.iter().map(|(s, n)| (p(s), *n)))
    }

    async fn table(api: &Arc<MemoryApi>, resource: ResourceKind) -> Vec<String> {
        CategoryTree::new(api.clone())
            .list_categories(resource, false)
            .await
            .unwrap()
            .paths()
            .map(|p| p.to_string())
            .collect()
    }

    #[test]
    fn test_target_shape_must_match_resource() {
        assert!(matches!(
            paths(&["/a"]).validate(ResourceKind::Account),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(matches!(
            numbered(&[("/a", 1)]).validate(ResourceKind::File),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(paths(&["/a"]).validate(ResourceKind::Person).is_ok());
    }

    #[test]
    fn test_target_from_json() {
        let target = CategoryTarget::from_json(&serde_json::json!(["/a/b", "/c"])).unwrap();
        assert_eq!(target, paths(&["/c", "/a/b"]));
        let target = CategoryTarget::from_json(&serde_json::json!({"/Balance/Cash": 1020})).unwrap();
        assert_eq!(target.number_of(&p("/Balance/Cash")), Some(1020));
        assert!(CategoryTarget::from_json(&serde_json::json!(["no-slash"])).is_err());
        assert!(CategoryTarget::from_json(&serde_json::json!({"/a": "x"})).is_err());
        assert!(CategoryTarget::from_json(&serde_json::json!(3)).is_err());
    }

    #[tokio::test]
    async fn test_create_and_idempotence() {
        let api = Arc::new(MemoryApi::new());
        let tree = CategoryTree::new(api.clone());
        let target = paths(&["/hello", "/world/how/are/you", "/Assets/bla\\blaaaa"]);

        let report = tree
            .update_categories(ResourceKind::Person, &target, true, false)
            .await
            .unwrap();
        assert_eq!(report.created, 7);
        assert_eq!(
            table(&api, ResourceKind::Person).await,
            vec![
                "/Assets",
                "/Assets/bla\\blaaaa",
                "/hello",
                "/world",
                "/world/how",
                "/world/how/are",
                "/world/how/are/you",
            ]
        );
        assert!(api.calls().iter().any(|c| matches!(
            c,
            Call::CreateCategory { name, .. } if name == "bla/blaaaa"
        )));

        api.clear_calls();
        let report = tree
            .update_categories(ResourceKind::Person, &target, true, false)
            .await
            .unwrap();
        assert_eq!(report, CategoryUpdateReport::default());
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_before_create_leaf_first() {
        let api = Arc::new(MemoryApi::new());
        api.add_category(ResourceKind::File, "/a/old/leaf", None);
        api.add_category(ResourceKind::File, "/keep", None);
        let tree = CategoryTree::new(api.clone());

        tree.update_categories(ResourceKind::File, &paths(&["/a/new/leaf", "/keep"]), true, false)
            .await
            .unwrap();
        assert_eq!(
            table(&api, ResourceKind::File).await,
            vec!["/a", "/a/new", "/a/new/leaf", "/keep"]
        );

        let calls = api.calls();
        let deletes: Vec<usize> = calls
            .iter()
            .enumerate()
            .filter(|(_, c)| matches!(c, Call::DeleteCategories { .. }))
            .map(|(i, _)| i)
            .collect();
        let creates: Vec<usize> = calls
            .iter()
            .enumerate()
            .filter(|(_, c)| matches!(c, Call::CreateCategory { .. }))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(deletes.len(), 2, "leaf and parent in separate batches");
        assert!(deletes.iter().max() < creates.iter().min());
        assert!(matches!(&calls[creates[0]], Call::CreateCategory { name, .. } if name == "new"));
        assert!(matches!(&calls[creates[1]], Call::CreateCategory { name, .. } if name == "leaf"));
    }

    #[tokio::test]
    async fn test_without_delete_keeps_extra_categories() {
        let api = Arc::new(MemoryApi::new());
        api.add_category(ResourceKind::File, "/extra", None);
        CategoryTree::new(api.clone())
            .update_categories(ResourceKind::File, &paths(&["/new"]), false, false)
            .await
            .unwrap();
        assert_eq!(table(&api, ResourceKind::File).await, vec!["/extra", "/new"]);
    }

    #[tokio::test]
    async fn test_root_protection() {
        let api = Arc::new(MemoryApi::new());
        api.add_category(ResourceKind::Account, "/Balance", Some(1));
        api.add_category(ResourceKind::Account, "/Balance/Assets", Some(10));
        api.add_category(ResourceKind::Account, "/Revenue", Some(3));
        api.add_category(ResourceKind::Account, "/Revenue/Sales", Some(30));
        let tree = CategoryTree::new(api.clone());
        let target = numbered(&[("/Revenue", 3), ("/Revenue/Sales", 31), ("/Revenue/Other", 32)]);

        let err = tree
            .update_categories(ResourceKind::Account, &target, true, false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RootImmutable { ref path, .. } if path == "/Balance"));
        assert!(api.calls().is_empty(), "validation happens before mutation");

        let report = tree
            .update_categories(ResourceKind::Account, &target, true, true)
            .await
            .unwrap();
        assert_eq!(
            report,
            CategoryUpdateReport {
                deleted: 0,
                renumbered: 1,
                created: 1
            }
        );
        let accounts = tree.list_categories(ResourceKind::Account, false).await.unwrap();
        assert!(accounts.get(&p("/Balance/Assets")).is_some());
        assert_eq!(accounts.get(&p("/Revenue/Sales")).unwrap().number, Some(31));
        assert_eq!(accounts.get(&p("/Revenue/Other")).unwrap().number, Some(32));
    }

    #[tokio::test]
    async fn test_root_renumber_and_creation_rejected() {
        let api = Arc::new(MemoryApi::new());
        api.add_category(ResourceKind::Account, "/Balance", Some(1));
        let tree = CategoryTree::new(api.clone());

        let err = tree
            .update_categories(ResourceKind::Account, &numbered(&[("/Balance", 2)]), false, false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RootImmutable { .. }));

        let err = tree
            .update_categories(
                ResourceKind::Account,
                &numbered(&[("/Balance", 1), ("/Expense/Rent", 40)]),
                false,
                false,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RootCreation { ref path, .. } if path == "/Expense"));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_root_renumber_allowed_with_ignore_root_nodes() {
        let api = Arc::new(MemoryApi::new());
        let balance = api.add_category(ResourceKind::Account, "/Balance", Some(1));
        let tree = CategoryTree::new(api.clone());

        let report = tree
            .update_categories(ResourceKind::Account, &numbered(&[("/Balance", 2)]), false, true)
            .await
            .unwrap();
        assert_eq!(report.renumbered, 1);
        assert_eq!(
            api.calls(),
            vec![Call::UpdateNumber {
                id: balance,
                number: 2
            }]
        );
        let accounts = tree.list_categories(ResourceKind::Account, false).await.unwrap();
        assert_eq!(accounts.get(&p("/Balance")).unwrap().number, Some(2));
    }

    #[tokio::test]
    async fn test_wrong_target_shape_rejected_before_any_call() {
        let api = Arc::new(MemoryApi::new());
        api.add_category(ResourceKind::Account, "/Balance", Some(1));
        let tree = CategoryTree::new(api.clone());

        let err = tree
            .update_categories(ResourceKind::Account, &paths(&["/Balance/Cash"]), true, false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { ref resource, .. } if resource == "account"));

        let err = tree
            .update_categories(ResourceKind::File, &numbered(&[("/docs", 1)]), true, false)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { .. }));
        assert!(api.calls().is_empty());
    }

    #[test]
    fn test_plan_batches_by_depth() {
        let tree = serde_json::json!([{
            "id": 1, "text": "All", "isSystem": true,
            "data": [
                {"id": 2, "text": "a", "parentId": 1, "data": [
                    {"id": 3, "text": "b", "parentId": 2, "data": [
                        {"id": 4, "text": "c", "parentId": 3}
                    ]},
                    {"id": 5, "text": "d", "parentId": 2}
                ]},
                {"id": 6, "text": "z", "parentId": 1}
            ]
        }]);
        let existing = flatten_tree(&tree, false).unwrap();
        let plan = plan_update(&existing, ResourceKind::File, &paths(&["/z"]), true, false).unwrap();

        let batches: Vec<Vec<i64>> = plan
            .delete_batches
            .iter()
            .map(|b| b.iter().map(|(_, id)| *id).collect())
            .collect();
        assert_eq!(batches, vec![vec![4], vec![5, 3], vec![2]]);
        assert_eq!(plan.delete_count(), 4);
        assert!(plan.create.is_empty());
    }
}
