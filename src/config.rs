//! 应用配置模块
//!
//! 所有配置保存在配置目录下的 `config.json` 中，按节（`cashctrl`、`proffix`、
//! `retry`、`log`）读取；缺失或无法解析的节使用默认值。

use crate::logging::LogConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "config.json";
pub const ENV_ORGANISATION: &str = "CC_API_ORGANISATION";
pub const ENV_API_KEY: &str = "CC_API_KEY";

/// CashCtrl 连接配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashCtrlConfig {
    /// 组织子域名，即 `{organisation}.cashctrl.com`
    #[serde(default)]
    pub organisation: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    /// 覆盖默认的 `https://{organisation}.cashctrl.com/api/v1`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// PROFFIX 连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProffixConfig {
    #[serde(default = "default_proffix_url")]
    pub base_url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default = "default_modules")]
    pub modules: Vec<String>,
}

fn default_proffix_url() -> String {
    "https://remote.proffix.net:11011/pxapi/v4".to_string()
}

fn default_modules() -> Vec<String> {
    vec!["VOL".to_string()]
}

impl Default for ProffixConfig {
    fn default() -> Self {
        Self {
            base_url: default_proffix_url(),
            username: None,
            password: None,
            database: None,
            modules: default_modules(),
        }
    }
}

/// 限流（HTTP 429）重试配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// 重试基础延迟（毫秒），按指数退避
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    1000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

/// 完整配置
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub cashctrl: CashCtrlConfig,
    pub proffix: ProffixConfig,
    pub retry: RetryConfig,
    pub log: LogConfig,
}

/// 默认配置目录
pub fn default_config_dir() -> PathBuf {
    crate::dirs::config_dir()
        .map(|p| p.join("ledgerlink"))
        .unwrap_or_else(|| PathBuf::from(".ledgerlink"))
}

fn read_config_json(config_dir: &Path) -> Option<serde_json::Value> {
    let content = fs::read_to_string(config_dir.join(CONFIG_FILE)).ok()?;
    serde_json::from_str(&content).ok()
}

fn section<T: for<'de> Deserialize<'de> + Default>(config: Option<&serde_json::Value>, key: &str) -> T {
    config
        .and_then(|c| c.get(key))
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default()
}

impl AppConfig {
    /// 从配置文件加载，再叠加环境变量
    pub fn load(config_dir: &Path) -> Self {
        Self::load_with_env(config_dir, |key| std::env::var(key).ok())
    }

    pub fn load_with_env(config_dir: &Path, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let json = read_config_json(config_dir);
        let mut config = Self {
            cashctrl: section(json.as_ref(), "cashctrl"),
            proffix: section(json.as_ref(), "proffix"),
            retry: section(json.as_ref(), "retry"),
            log: section(json.as_ref(), "log"),
        };
        config.apply_env(lookup);
        config
    }

    /// 环境变量优先于配置文件
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(org) = lookup(ENV_ORGANISATION).filter(|v| !v.is_empty()) {
            self.cashctrl.organisation = Some(org);
        }
        if let Some(key) = lookup(ENV_API_KEY).filter(|v| !v.is_empty()) {
            self.cashctrl.api_key = Some(key);
        }
    }

    /// 保存配置（保留文件中的其他字段）
    pub fn save(&self, config_dir: &Path) -> io::Result<()> {
        fs::create_dir_all(config_dir)?;
        let mut config = read_config_json(config_dir)
            .filter(|v| v.is_object())
            .unwrap_or_else(|| serde_json::json!({}));

        config["cashctrl"] = serde_json::to_value(&self.cashctrl)?;
        config["proffix"] = serde_json::to_value(&self.proffix)?;
        config["retry"] = serde_json::to_value(&self.retry)?;
        config["log"] = serde_json::to_value(&self.log)?;

        fs::write(
            config_dir.join(CONFIG_FILE),
            serde_json::to_string_pretty(&config)?,
        )
    }
}
