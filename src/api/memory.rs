//! 内存中的远程接口，测试用
//!
//! 和服务端一样拒绝删除仍有子分类或文件（包括回收站中的文件）的分类，
//! 拒绝在不存在的父分类下新建分类，并记录每一次修改调用。

use super::{RemoteApi, RemoteFileEntry};
use crate::core::{CategoryPath, ResourceKind};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateCategory {
        resource: ResourceKind,
        name: String,
        parent_id: Option<i64>,
        number: Option<i64>,
    },
    DeleteCategories {
        resource: ResourceKind,
        ids: Vec<i64>,
    },
    UpdateNumber {
        id: i64,
        number: i64,
    },
    Upload {
        name: String,
        category_id: Option<i64>,
        replace_id: Option<i64>,
    },
    DeleteFiles {
        ids: Vec<i64>,
    },
    EmptyTrash,
}

#[derive(Debug, Clone)]
struct Node {
    id: i64,
    resource: ResourceKind,
    name: String,
    parent_id: i64,
    number: Option<i64>,
}

#[derive(Debug, Clone)]
struct StoredFile {
    entry: RemoteFileEntry,
    content: Vec<u8>,
    trashed: bool,
}

#[derive(Default)]
struct State {
    next_id: i64,
    roots: HashMap<ResourceKind, i64>,
    nodes: Vec<Node>,
    files: Vec<StoredFile>,
    calls: Vec<Call>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn root_id(&mut self, resource: ResourceKind) -> i64 {
        if let Some(id) = self.roots.get(&resource) {
            return *id;
        }
        let id = self.next_id();
        self.roots.insert(resource, id);
        id
    }

    fn node(&self, id: i64) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    fn subtree(&self, resource: ResourceKind, parent_id: i64) -> Value {
        let children: Vec<Value> = self
            .nodes
            .iter()
            .filter(|n| n.resource == resource && n.parent_id == parent_id)
            .map(|n| {
                json!({
                    "id": n.id,
                    "text": n.name,
                    "parentId": n.parent_id,
                    "isSystem": false,
                    "number": n.number,
                    "data": self.subtree(resource, n.id),
                })
            })
            .collect();
        Value::Array(children)
    }
}

pub struct MemoryApi {
    state: Mutex<State>,
}

impl Default for MemoryApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryApi {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    /// 预置分类（含缺失的上级），不记录调用
    pub fn add_category(&self, resource: ResourceKind, path: &str, number: Option<i64>) -> i64 {
        let path = CategoryPath::parse(path).unwrap();
        let mut state = self.state.lock().unwrap();
        let mut parent_id = state.root_id(resource);
        let lineage = path.lineage();
        for (i, prefix) in lineage.iter().enumerate() {
            let name = prefix.name().unwrap();
            let existing = state
                .nodes
                .iter()
                .find(|n| n.resource == resource && n.parent_id == parent_id && n.name == name)
                .map(|n| n.id);
            parent_id = match existing {
                Some(id) => id,
                None => {
                    let id = state.next_id();
                    let number = if i + 1 == lineage.len() { number } else { None };
                    state.nodes.push(Node {
                        id,
                        resource,
                        name,
                        parent_id,
                        number,
                    });
                    id
                }
            };
        }
        parent_id
    }

    /// 预置远程文件，不记录调用
    pub fn add_file(&self, name: &str, category_id: Option<i64>, last_updated: DateTime<Utc>) -> i64 {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id();
        state.files.push(StoredFile {
            entry: RemoteFileEntry {
                id,
                name: name.to_string(),
                category_id,
                last_updated,
                size: Some(0),
            },
            content: Vec::new(),
            trashed: false,
        });
        id
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn trashed_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .files
            .iter()
            .filter(|f| f.trashed)
            .count()
    }

    pub fn content(&self, id: i64) -> Option<Vec<u8>> {
        let state = self.state.lock().unwrap();
        state
            .files
            .iter()
            .find(|f| f.entry.id == id)
            .map(|f| f.content.clone())
    }
}

#[async_trait]
impl RemoteApi for MemoryApi {
    async fn category_tree(&self, resource: ResourceKind) -> Result<Value> {
        let mut state = self.state.lock().unwrap();
        let root_id = state.root_id(resource);
        Ok(json!([{
            "id": root_id,
            "text": "All",
            "parentId": null,
            "isSystem": true,
            "data": state.subtree(resource, root_id),
        }]))
    }

    async fn create_category(
        &self,
        resource: ResourceKind,
        name: &str,
        parent_id: Option<i64>,
        number: Option<i64>,
    ) -> Result<i64> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::CreateCategory {
            resource,
            name: name.to_string(),
            parent_id,
            number,
        });
        let root_id = state.root_id(resource);
        let parent_id = match parent_id {
            Some(id) if state.node(id).map(|n| n.resource) == Some(resource) => id,
            Some(id) => return Err(Error::Api(format!("parent category {} does not exist", id))),
            None => root_id,
        };
        let id = state.next_id();
        state.nodes.push(Node {
            id,
            resource,
            name: name.to_string(),
            parent_id,
            number,
        });
        Ok(id)
    }

    async fn delete_categories(&self, resource: ResourceKind, ids: &[i64]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::DeleteCategories {
            resource,
            ids: ids.to_vec(),
        });
        for id in ids {
            if state.node(*id).map(|n| n.resource) != Some(resource) {
                return Err(Error::Api(format!("category {} does not exist", id)));
            }
            if state.nodes.iter().any(|n| n.parent_id == *id) {
                return Err(Error::Api(format!("category {} still has children", id)));
            }
            if state.files.iter().any(|f| f.entry.category_id == Some(*id)) {
                return Err(Error::Api(format!("category {} still contains files", id)));
            }
            state.nodes.retain(|n| n.id != *id);
        }
        Ok(())
    }

    async fn update_category_number(
        &self,
        id: i64,
        _name: &str,
        number: i64,
        _parent_id: Option<i64>,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::UpdateNumber { id, number });
        let node = state
            .nodes
            .iter_mut()
            .find(|n| n.id == id && n.resource == ResourceKind::Account)
            .ok_or_else(|| Error::Api(format!("account category {} does not exist", id)))?;
        node.number = Some(number);
        Ok(())
    }

    async fn list_files(&self) -> Result<Vec<RemoteFileEntry>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .files
            .iter()
            .filter(|f| !f.trashed)
            .map(|f| f.entry.clone())
            .collect())
    }

    async fn upload_file(
        &self,
        local_path: &Path,
        name: &str,
        category_id: Option<i64>,
        replace_id: Option<i64>,
    ) -> Result<i64> {
        let content = std::fs::read(local_path)?;
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Upload {
            name: name.to_string(),
            category_id,
            replace_id,
        });
        if let Some(cid) = category_id {
            if state.node(cid).map(|n| n.resource) != Some(ResourceKind::File) {
                return Err(Error::Api(format!("file category {} does not exist", cid)));
            }
        }
        let entry = RemoteFileEntry {
            id: 0,
            name: name.to_string(),
            category_id,
            last_updated: Utc::now(),
            size: Some(content.len() as u64),
        };
        match replace_id {
            Some(id) => {
                let file = state
                    .files
                    .iter_mut()
                    .find(|f| f.entry.id == id && !f.trashed)
                    .ok_or_else(|| Error::Api(format!("file {} does not exist", id)))?;
                file.entry = RemoteFileEntry { id, ..entry };
                file.content = content;
                Ok(id)
            }
            None => {
                let id = state.next_id();
                state.files.push(StoredFile {
                    entry: RemoteFileEntry { id, ..entry },
                    content,
                    trashed: false,
                });
                Ok(id)
            }
        }
    }

    async fn download_file(&self, id: i64) -> Result<Vec<u8>> {
        self.content(id)
            .ok_or_else(|| Error::Http {
                status: 404,
                body: format!("file {} not found", id),
            })
    }

    async fn delete_files(&self, ids: &[i64], _force: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::DeleteFiles { ids: ids.to_vec() });
        for file in state.files.iter_mut().filter(|f| ids.contains(&f.entry.id)) {
            file.trashed = true;
        }
        Ok(())
    }

    async fn empty_trash(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::EmptyTrash);
        state.files.retain(|f| !f.trashed);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
