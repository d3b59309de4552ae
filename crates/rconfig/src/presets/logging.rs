//! 日志配置

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::Validate;
use crate::error::{ConfigError, Result};
use crate::units::{self, ByteSize};

/// 可识别的日志格式, 空字符串等同于 `text`
pub const LOG_FORMATS: [&str; 3] = ["text", "json", ""];

/// 日志配置, 对应配置源中的 `log` 段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// 输出格式: text / json
    #[serde(default = "default_format")]
    pub format: String,

    /// 最低日志级别
    #[serde(default = "default_level")]
    pub level: String,

    /// 输出目标: ""、"/dev/null" 丢弃; "stdout"、"stderr" 标准流; 其他值为滚动日志文件路径
    #[serde(default = "default_file_path")]
    pub file_path: String,

    /// 保留的历史文件数量
    #[serde(default = "default_file_count")]
    pub file_count: usize,

    /// 单个日志文件的最大尺寸
    #[serde(default = "default_file_size")]
    pub file_size: ByteSize,

    /// 历史文件的最长保留时间
    #[serde(default = "default_file_duration", with = "units::duration")]
    pub file_duration: Duration,

    /// 是否压缩历史文件
    #[serde(default = "default_file_compress")]
    pub file_compress: bool,
}

fn default_format() -> String {
    "text".to_string()
}

fn default_level() -> String {
    "info".to_string()
}

fn default_file_path() -> String {
    "stderr".to_string()
}

fn default_file_count() -> usize {
    10
}

fn default_file_size() -> ByteSize {
    ByteSize::mb(100)
}

fn default_file_duration() -> Duration {
    Duration::from_secs(30 * 24 * 60 * 60)
}

fn default_file_compress() -> bool {
    true
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
            level: default_level(),
            file_path: default_file_path(),
            file_count: default_file_count(),
            file_size: default_file_size(),
            file_duration: default_file_duration(),
            file_compress: default_file_compress(),
        }
    }
}

impl Validate for LogConfig {
    fn validate(&self) -> Result<()> {
        if !LOG_FORMATS.contains(&self.format.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "未知的日志格式: {}",
                self.format
            )));
        }

        if self.level.chars().any(char::is_whitespace) {
            return Err(ConfigError::ValidationError(format!(
                "日志级别不能包含空白字符: {:?}",
                self.level
            )));
        }

        Ok(())
    }
}
