//! 日志错误类型

use std::path::PathBuf;

use thiserror::Error;

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 配置值无效, 例如未知的格式或级别
    Configuration,
    /// 文件系统资源不可用, 例如无法创建日志目录
    Resource,
    /// 全局日志器安装失败
    Initialization,
}

#[derive(Error, Debug)]
pub enum LogError {
    #[error("unknown log format: {0}")]
    UnknownFormat(String),

    #[error("unknown log level: {0}")]
    UnknownLevel(String),

    #[error("failed to create log directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("logger already initialized")]
    AlreadyInitialized,

    #[error("failed to install global logger: {0}")]
    Install(String),
}

impl LogError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LogError::UnknownFormat(_) | LogError::UnknownLevel(_) => ErrorKind::Configuration,
            LogError::CreateDir { .. } => ErrorKind::Resource,
            LogError::AlreadyInitialized | LogError::Install(_) => ErrorKind::Initialization,
        }
    }
}

pub type Result<T> = std::result::Result<T, LogError>;
