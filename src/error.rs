//! 错误类型

use thiserror::Error;

/// 库内统一错误
#[derive(Debug, Error)]
pub enum Error {
    /// 分类树在某一层不是列表结构
    #[error("malformed category tree: expected a list of nodes, got {found}")]
    MalformedTree { found: String },

    /// 目标形状与资源类型不符（路径集合 vs. 路径→编号映射）
    #[error("category target for '{resource}' must be {expected}")]
    TypeMismatch {
        resource: String,
        expected: &'static str,
    },

    /// 试图删除或重新编号受保护的根分类
    #[error("root category '{path}' is immutable for '{resource}'")]
    RootImmutable { resource: String, path: String },

    /// 试图新建受保护资源的根分类
    #[error("cannot create root category '{path}' for '{resource}'")]
    RootCreation { resource: String, path: String },

    /// 远程存在重复路径的文件
    #[error("remote files are duplicated: {paths:?}; mirror with delete_files or remove them manually")]
    DuplicatePath { paths: Vec<String> },

    /// 多个本地文件映射到同一个远程路径
    #[error("local files collide on remote path '{path}'")]
    LocalPathCollision { path: String },

    #[error("invalid category path '{path}': {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("unknown category: {0}")]
    UnknownCategory(String),

    /// 非 200 响应
    #[error("API request failed with status {status}: {body}")]
    Http { status: u16, body: String },

    /// 响应中 success=false
    #[error("API call failed. {0}")]
    Api(String),

    #[error("{kind}: {message}")]
    Proffix { kind: String, message: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn not_found(what: impl std::fmt::Display) -> Self {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            what.to_string(),
        ))
    }
}
