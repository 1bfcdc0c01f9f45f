//! PROFFIX ERP REST 客户端
//!
//! 登录后把 `PxSessionId` 放在每个请求头中；服务端每次响应都可能换发新的会话 id。
//! 会话过期（401）时重新登录并重试一次。

use crate::config::ProffixConfig;
use crate::error::{Error, Result};
use reqwest::header::{ACCEPT, CONTENT_TYPE, LOCATION};
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub const SESSION_HEADER: &str = "PxSessionId";
pub const DEFAULT_BASE_URL: &str = "https://remote.proffix.net:11011/pxapi/v4";

/// 请求体
#[derive(Debug, Clone)]
pub enum Body {
    Empty,
    Json(Value),
    Binary(Vec<u8>),
}

pub struct ProffixClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password_sha256: String,
    database: String,
    modules: Vec<String>,
    session: Mutex<Option<String>>,
}

impl ProffixClient {
    /// 创建客户端并登录
    pub async fn connect(config: &ProffixConfig) -> Result<Self> {
        let missing = |field: &str| Error::Config(format!("PROFFIX requires {}", field));
        let client = Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            username: config.username.clone().ok_or_else(|| missing("username"))?,
            password_sha256: sha256_hex(
                config.password.as_deref().ok_or_else(|| missing("password"))?,
            ),
            database: config.database.clone().ok_or_else(|| missing("database"))?,
            modules: config.modules.clone(),
            session: Mutex::new(None),
        };
        let session_id = client.login().await?;
        *client.session.lock().await = Some(session_id);
        Ok(client)
    }

    /// 登录，返回新的会话 id
    pub async fn login(&self) -> Result<String> {
        let data = json!({
            "Benutzer": self.username,
            "Passwort": self.password_sha256,
            "Datenbank": {"Name": self.database},
            "Module": self.modules,
        });
        let response = self
            .http
            .post(join_url(&self.base_url, "PRO/LOGIN"))
            .header(ACCEPT, "application/json")
            .json(&data)
            .send()
            .await?;
        let response = check(response).await?;
        let session_id = response_session_id(&response).ok_or_else(|| Error::Proffix {
            kind: "LOGIN".to_string(),
            message: format!("response carries no {} header", SESSION_HEADER),
        })?;
        info!("PROFFIX 登录成功: {}@{}", self.username, self.database);
        Ok(session_id)
    }

    pub async fn logout(&self) -> Result<()> {
        let session = self.session.lock().await.take();
        if let Some(session_id) = session {
            let response = self
                .http
                .delete(join_url(&self.base_url, "PRO/LOGIN"))
                .header(SESSION_HEADER, session_id)
                .send()
                .await?;
            check(response).await?;
            debug!("PROFFIX 已注销");
        }
        Ok(())
    }

    async fn send(
        &self,
        method: &Method,
        url: &str,
        session_id: &str,
        body: &Body,
        params: &[(String, String)],
    ) -> Result<reqwest::Response> {
        let builder = self
            .http
            .request(method.clone(), url)
            .header(SESSION_HEADER, session_id)
            .query(params);
        let builder = match body {
            Body::Empty => builder,
            Body::Json(value) => builder.json(value),
            Body::Binary(bytes) => builder
                .header(CONTENT_TYPE, "application/octet-stream")
                .body(bytes.clone()),
        };
        Ok(builder.send().await?)
    }

    /// 带会话的请求
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: Body,
        params: &[(String, String)],
    ) -> Result<reqwest::Response> {
        let url = join_url(&self.base_url, endpoint);
        let mut session = self.session.lock().await;
        let session_id = match session.as_ref() {
            Some(id) => id.clone(),
            None => self.login().await?,
        };

        let mut response = self.send(&method, &url, &session_id, &body, params).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            warn!("PROFFIX 会话失效，重新登录: {} {}", method, endpoint);
            let session_id = self.login().await?;
            response = self.send(&method, &url, &session_id, &body, params).await?;
            *session = Some(session_id);
        } else {
            *session = Some(session_id);
        }

        let response = check(response).await?;
        if let Some(new_id) = response_session_id(&response) {
            *session = Some(new_id);
        }
        Ok(response)
    }

    pub async fn get(&self, endpoint: &str, params: &[(String, String)]) -> Result<reqwest::Response> {
        self.request(Method::GET, endpoint, Body::Empty, params).await
    }

    pub async fn post(&self, endpoint: &str, json: Value) -> Result<reqwest::Response> {
        self.request(Method::POST, endpoint, Body::Json(json), &[]).await
    }

    pub async fn put(&self, endpoint: &str, json: Value) -> Result<reqwest::Response> {
        self.request(Method::PUT, endpoint, Body::Json(json), &[]).await
    }

    pub async fn patch(&self, endpoint: &str, json: Value) -> Result<reqwest::Response> {
        self.request(Method::PATCH, endpoint, Body::Json(json), &[]).await
    }

    pub async fn delete(&self, endpoint: &str) -> Result<reqwest::Response> {
        self.request(Method::DELETE, endpoint, Body::Empty, &[]).await
    }

    /// 上传文件到 `PRO/Datei`，返回服务端分配的文件 id
    pub async fn upload_file(&self, path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(path).await?;
        let response = self
            .request(Method::POST, "PRO/Datei", Body::Binary(bytes), &[])
            .await?;
        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Error::Proffix {
                kind: "Datei".to_string(),
                message: "upload response carries no Location header".to_string(),
            })?;
        Ok(id_from_location(location).to_string())
    }

    pub async fn download_file(&self, file_id: &str) -> Result<Vec<u8>> {
        let response = self.get(&format!("PRO/Datei/{}", file_id), &[]).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// 服务器信息（用 API key 认证，无需登录）
    pub async fn info(api_key: &str, base_url: &str) -> Result<Value> {
        key_request(api_key, "PRO/INFO", base_url).await
    }

    /// 可用数据库列表（用 API key 认证，无需登录）
    pub async fn databases(api_key: &str, base_url: &str) -> Result<Value> {
        key_request(api_key, "PRO/DATENBANK", base_url).await
    }
}

async fn key_request(api_key: &str, endpoint: &str, base_url: &str) -> Result<Value> {
    let response = reqwest::Client::new()
        .get(join_url(base_url, endpoint))
        .header(ACCEPT, "application/json")
        .query(&[("key", sha256_hex(api_key))])
        .send()
        .await?;
    Ok(check(response).await?.json().await?)
}

fn sha256_hex(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

fn join_url(base_url: &str, endpoint: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}

fn response_session_id(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn id_from_location(location: &str) -> &str {
    location.rsplit('/').next().unwrap_or(location)
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(decode_error(status, &body))
}

/// 错误响应形如 `{"Type": ..., "Message": ..., ...}`
fn decode_error(status: u16, body: &str) -> Error {
    let Ok(Value::Object(mut fields)) = serde_json::from_str::<Value>(body) else {
        return Error::Http {
            status,
            body: body.to_string(),
        };
    };
    let kind = match fields.remove("Type") {
        Some(Value::String(s)) => s,
        _ => format!("HTTP {}", status),
    };
    let mut message = match fields.remove("Message") {
        Some(Value::String(s)) => s,
        _ => String::new(),
    };
    if !fields.is_empty() {
        message = format!("{} {}", message, Value::Object(fields)).trim().to_string();
    }
    Error::Proffix { kind, message }
}
