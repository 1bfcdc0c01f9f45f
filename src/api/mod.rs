pub mod cashctrl;
#[cfg(test)]
pub mod memory;
pub mod proffix;

use crate::core::ResourceKind;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;

pub use cashctrl::CashCtrlClient;
pub use proffix::ProffixClient;

/// 远程文件列表中的一行
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFileEntry {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(deserialize_with = "cashctrl::deserialize_timestamp")]
    pub last_updated: DateTime<Utc>,
    #[serde(default)]
    pub size: Option<u64>,
}

/// 远程分类与文件接口
///
/// 分类对账和目录镜像只通过这个接口访问服务端。
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// 原始（未展开）的分类树
    async fn category_tree(&self, resource: ResourceKind) -> Result<Value>;

    /// 新建分类，返回新 id
    async fn create_category(
        &self,
        resource: ResourceKind,
        name: &str,
        parent_id: Option<i64>,
        number: Option<i64>,
    ) -> Result<i64>;

    /// 批量删除分类，按给定顺序提交
    async fn delete_categories(&self, resource: ResourceKind, ids: &[i64]) -> Result<()>;

    /// 修改会计科目分类的编号
    async fn update_category_number(
        &self,
        id: i64,
        name: &str,
        number: i64,
        parent_id: Option<i64>,
    ) -> Result<()>;

    async fn list_files(&self) -> Result<Vec<RemoteFileEntry>>;

    /// 上传文件；`replace_id` 不为空时替换已有文件，返回文件 id
    async fn upload_file(
        &self,
        local_path: &Path,
        name: &str,
        category_id: Option<i64>,
        replace_id: Option<i64>,
    ) -> Result<i64>;

    async fn download_file(&self, id: i64) -> Result<Vec<u8>>;

    async fn delete_files(&self, ids: &[i64], force: bool) -> Result<()>;

    /// 清空回收站
    async fn empty_trash(&self) -> Result<()>;

    /// 名称（用于日志）
    fn name(&self) -> &str;
}

/// 根据配置创建 CashCtrl 客户端
pub fn create_remote_api(config: &crate::config::AppConfig) -> Result<Arc<dyn RemoteApi>> {
    let client = CashCtrlClient::from_config(&config.cashctrl, config.retry.clone())?;
    tracing::info!("初始化远程接口: {}", client.name());
    Ok(Arc::new(client) as Arc<dyn RemoteApi>)
}
