//! CashCtrl 会计服务 REST 客户端

use super::{RemoteApi, RemoteFileEntry};
use crate::config::{CashCtrlConfig, RetryConfig};
use crate::core::ResourceKind;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Europe::Berlin;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

pub struct CashCtrlClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    retry: RetryConfig,
    name: String,
}

impl CashCtrlClient {
    pub fn new(organisation: &str, api_key: &str, retry: RetryConfig) -> Self {
        Self::with_base_url(
            &format!("https://{}.cashctrl.com/api/v1", organisation),
            api_key,
            retry,
        )
    }

    pub fn with_base_url(base_url: &str, api_key: &str, retry: RetryConfig) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            name: format!("cashctrl:{}", base_url),
            base_url,
            api_key: api_key.to_string(),
            retry,
        }
    }

    pub fn from_config(config: &CashCtrlConfig, retry: RetryConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .ok_or_else(|| Error::Config("CashCtrl requires apiKey (or CC_API_KEY)".to_string()))?;

        match (&config.base_url, &config.organisation) {
            (Some(url), _) => Ok(Self::with_base_url(url, api_key, retry)),
            (None, Some(org)) => Ok(Self::new(org, api_key, retry)),
            (None, None) => Err(Error::Config(
                "CashCtrl requires organisation (or CC_API_ORGANISATION)".to_string(),
            )),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// 发送请求，HTTP 429 时按指数退避重试
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        data: &Value,
        params: &Value,
    ) -> Result<reqwest::Response> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let form = flatten_params(data);
        let query = flatten_params(params);
        let mut attempt = 0;

        loop {
            let mut builder = self
                .http
                .request(method.clone(), &url)
                .basic_auth(&self.api_key, Some(""))
                .query(&query);
            if !form.is_empty() {
                builder = builder.form(&form);
            }

            let response = builder.send().await?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS && attempt < self.retry.max_retries {
                let delay = retry_after(&response)
                    .unwrap_or_else(|| backoff_delay(self.retry.base_delay_ms, attempt));
                warn!(
                    "请求被限流，{}ms 后重试 ({}/{}): {} {}",
                    delay.as_millis(),
                    attempt + 1,
                    self.retry.max_retries,
                    method,
                    endpoint
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            if status != StatusCode::OK {
                let body = response.text().await.unwrap_or_default();
                return Err(Error::Http {
                    status: status.as_u16(),
                    body,
                });
            }
            return Ok(response);
        }
    }

    /// 发送请求并解析 JSON；`success` 为 false 时返回 `Error::Api`
    pub async fn json_request(
        &self,
        method: Method,
        endpoint: &str,
        data: &Value,
        params: &Value,
    ) -> Result<Value> {
        let result: Value = self
            .request(method, endpoint, data, params)
            .await?
            .json()
            .await?;
        if let Some(message) = api_failure_message(&result) {
            return Err(Error::Api(message));
        }
        Ok(result)
    }

    pub async fn get(&self, endpoint: &str, params: &Value) -> Result<Value> {
        self.json_request(Method::GET, endpoint, &Value::Null, params)
            .await
    }

    pub async fn post(&self, endpoint: &str, params: &Value) -> Result<Value> {
        self.json_request(Method::POST, endpoint, &Value::Null, params)
            .await
    }

    pub async fn put(&self, endpoint: &str, params: &Value) -> Result<Value> {
        self.json_request(Method::PUT, endpoint, &Value::Null, params)
            .await
    }

    pub async fn delete(&self, endpoint: &str, params: &Value) -> Result<Value> {
        self.json_request(Method::DELETE, endpoint, &Value::Null, params)
            .await
    }
}

#[async_trait]
impl RemoteApi for CashCtrlClient {
    async fn category_tree(&self, resource: ResourceKind) -> Result<Value> {
        let endpoint = format!("{}/category/tree.json", resource.endpoint());
        let mut response = self.get(&endpoint, &Value::Null).await?;
        Ok(response
            .get_mut("data")
            .map(Value::take)
            .unwrap_or(Value::Null))
    }

    async fn create_category(
        &self,
        resource: ResourceKind,
        name: &str,
        parent_id: Option<i64>,
        number: Option<i64>,
    ) -> Result<i64> {
        let endpoint = format!("{}/category/create.json", resource.endpoint());
        let params = json!({"name": name, "parentId": parent_id, "number": number});
        let response = self.post(&endpoint, &params).await?;
        response
            .get("insertId")
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::Api(format!("{} returned no insertId", endpoint)))
    }

    async fn delete_categories(&self, resource: ResourceKind, ids: &[i64]) -> Result<()> {
        let endpoint = format!("{}/category/delete.json", resource.endpoint());
        self.post(&endpoint, &json!({"ids": join_ids(ids)})).await?;
        Ok(())
    }

    async fn update_category_number(
        &self,
        id: i64,
        name: &str,
        number: i64,
        parent_id: Option<i64>,
    ) -> Result<()> {
        let params = json!({"id": id, "name": name, "number": number, "parentId": parent_id});
        self.post("account/category/update.json", &params).await?;
        Ok(())
    }

    async fn list_files(&self) -> Result<Vec<RemoteFileEntry>> {
        let mut response = self.get("file/list.json", &Value::Null).await?;
        let data = response
            .get_mut("data")
            .map(Value::take)
            .unwrap_or_else(|| json!([]));
        Ok(serde_json::from_value(data)?)
    }

    async fn upload_file(
        &self,
        local_path: &Path,
        name: &str,
        category_id: Option<i64>,
        replace_id: Option<i64>,
    ) -> Result<i64> {
        if !local_path.is_file() {
            return Err(Error::not_found(format!(
                "File not found: '{}'",
                local_path.display()
            )));
        }

        // 1/3: prepare
        let files = json!([{
            "mimeType": guess_mime_type(local_path),
            "name": name,
            "categoryId": category_id,
        }]);
        let prepared = self.post("file/prepare.json", &json!({"files": files})).await?;
        let (file_id, write_url) = match prepared.get("data").and_then(Value::as_array) {
            Some(data) if data.len() == 1 => (
                data[0].get("fileId").and_then(Value::as_i64),
                data[0].get("writeUrl").and_then(Value::as_str),
            ),
            _ => (None, None),
        };
        let (file_id, write_url) = file_id.zip(write_url).ok_or_else(|| {
            Error::Api("file/prepare.json: expected one entry with fileId and writeUrl".to_string())
        })?;

        // 2/3: upload
        let file = tokio::fs::File::open(local_path).await?;
        let size = file.metadata().await?.len();
        debug!("上传 {} ({} 字节) -> file {}", local_path.display(), size, file_id);
        let response = self
            .http
            .put(write_url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_LENGTH, size)
            .body(reqwest::Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(Error::Http {
                status,
                body: format!("File upload failed: {}", response.text().await.unwrap_or_default()),
            });
        }

        // 3/3: persist or replace
        match replace_id {
            None => {
                self.post("file/persist.json", &json!({"ids": file_id})).await?;
                Ok(file_id)
            }
            Some(id) => {
                let params = json!({
                    "id": id,
                    "name": name,
                    "replaceWith": file_id,
                    "categoryId": category_id,
                });
                self.post("file/update.json", &params).await?;
                Ok(id)
            }
        }
    }

    async fn download_file(&self, id: i64) -> Result<Vec<u8>> {
        let response = self
            .request(Method::GET, "file/get", &Value::Null, &json!({"id": id}))
            .await?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn delete_files(&self, ids: &[i64], force: bool) -> Result<()> {
        self.post("file/delete.json", &json!({"ids": join_ids(ids), "force": force}))
            .await?;
        Ok(())
    }

    async fn empty_trash(&self) -> Result<()> {
        self.post("file/empty_archive.json", &Value::Null).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// 表单和查询参数：列表、对象按 JSON 编码，null 丢弃
fn flatten_params(params: &Value) -> Vec<(String, String)> {
    let Some(map) = params.as_object() else {
        return Vec::new();
    };
    map.iter()
        .filter_map(|(key, value)| {
            let text = match value {
                Value::Null => return None,
                Value::String(s) => s.clone(),
                Value::Array(_) | Value::Object(_) => value.to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Number(n) => n.to_string(),
            };
            Some((key.clone(), text))
        })
        .collect()
}

fn join_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

/// 从失败响应中提取错误信息
fn api_failure_message(body: &Value) -> Option<String> {
    if body.get("success").and_then(Value::as_bool) != Some(false) {
        return None;
    }
    if let Some(message) = body.get("message").and_then(Value::as_str) {
        return Some(message.to_string());
    }
    let messages: Vec<String> = body
        .get("errors")
        .and_then(Value::as_array)
        .map(|errors| {
            errors
                .iter()
                .filter_map(|error| {
                    let message = error.get("message")?.as_str()?;
                    Some(match error.get("field").and_then(Value::as_str) {
                        Some(field) => format!("{}: {}", field, message),
                        None => message.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    Some(messages.join(" / "))
}

fn backoff_delay(base_delay_ms: u64, attempt: u32) -> Duration {
    Duration::from_millis(base_delay_ms.saturating_mul(1u64 << attempt.min(16)))
}

fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn guess_mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "json" => "application/json",
        "xml" => "application/xml",
        "zip" => "application/zip",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => "text/plain",
    }
}

/// 解析 CashCtrl 时间戳（服务器本地时间，Europe/Berlin）
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text.trim(), fmt).ok())?;
    Berlin
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

pub(crate) fn deserialize_timestamp<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    parse_timestamp(&text)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", text)))
}
