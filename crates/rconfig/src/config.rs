//! 主配置结构和构建器

use std::path::Path;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::Result;
use crate::presets::{logging, Validate};

/// 支持自动探测的配置文件扩展名, 按顺序尝试
const CONFIG_EXTENSIONS: [&str; 4] = ["toml", "json", "yaml", "ini"];

/// 默认的环境变量前缀
pub const DEFAULT_ENV_PREFIX: &str = "APP";

/// 应用配置
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    /// 运行环境
    pub env: Option<String>,

    /// 日志配置
    #[serde(default)]
    pub log: logging::LogConfig,
}

impl AppConfig {
    /// 创建配置构建器
    pub fn new() -> AppConfigBuilder {
        AppConfigBuilder::new()
    }

    /// 获取日志配置
    pub fn log(&self) -> &logging::LogConfig {
        &self.log
    }

    /// 验证配置是否有效
    pub fn validate(&self) -> Result<()> {
        self.log.validate()
    }
}

/// 配置构建器
///
/// 后添加的配置源覆盖先添加的, 覆盖值 (`set_override`) 优先级最高。
pub struct AppConfigBuilder {
    config_builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl AppConfigBuilder {
    /// 创建新构建器
    pub fn new() -> Self {
        Self {
            config_builder: Config::builder(),
        }
    }

    /// 添加默认配置文件 (不含扩展名), 依次尝试 .toml, .json, .yaml, .ini
    pub fn add_default<P: AsRef<Path>>(mut self, path: P) -> Self {
        let path = path.as_ref();
        for ext in CONFIG_EXTENSIONS {
            let file_path = path.with_extension(ext);
            if file_path.exists() {
                tracing::debug!("加载默认配置文件: {}", file_path.display());
                self.config_builder = self
                    .config_builder
                    .add_source(File::from(file_path).required(false));
                break;
            }
        }
        self
    }

    /// 添加指定环境的配置文件, 例如 `config/default_prod.toml`
    pub fn add_environment_file<P: AsRef<Path>>(self, env: &str, path: P) -> Self {
        let path = path.as_ref();
        let name = match path.file_name() {
            Some(name) => format!("{}_{}", name.to_string_lossy(), env),
            None => return self,
        };
        self.add_default(path.with_file_name(name))
    }

    /// 从特定文件加载配置, 文件不存在时忽略
    pub fn add_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_builder = self
            .config_builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// 从特定文件加载配置, 文件不存在时 `build` 报错
    pub fn add_required_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_builder = self
            .config_builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// 添加环境变量支持，使用 APP_ 前缀, 双下划线分隔层级 (APP_LOG__LEVEL)
    pub fn add_environment(self) -> Self {
        self.add_environment_with_prefix(DEFAULT_ENV_PREFIX)
    }

    /// 添加环境变量支持，使用自定义前缀
    pub fn add_environment_with_prefix(mut self, prefix: &str) -> Self {
        self.config_builder = self.config_builder.add_source(
            Environment::with_prefix(prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );
        self
    }

    /// 从.env文件加载环境变量
    pub fn add_dotenv(self) -> Self {
        // 加载.env文件，忽略错误
        let _ = dotenvy::dotenv();
        self
    }

    /// 设置覆盖值, 通常来自命令行参数
    pub fn set_override<V>(mut self, key: &str, value: V) -> Result<Self>
    where
        V: Into<config::Value>,
    {
        self.config_builder = self.config_builder.set_override(key, value)?;
        Ok(self)
    }

    /// 值存在时设置覆盖值
    pub fn set_override_option<V>(self, key: &str, value: Option<V>) -> Result<Self>
    where
        V: Into<config::Value>,
    {
        match value {
            Some(value) => self.set_override(key, value),
            None => Ok(self),
        }
    }

    /// 构建最终配置
    pub fn build(self) -> Result<AppConfig> {
        let config = self.config_builder.build()?;
        let app_config: AppConfig = config.try_deserialize()?;

        // 验证配置
        app_config.validate()?;

        Ok(app_config)
    }
}

impl Default for AppConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
