//! 配置管理包，负责加载 `log` 命名空间下的日志配置
//!
//! # 示例
//! ```no_run
//! use rconfig::AppConfig;
//!
//! let config = AppConfig::new()
//!     .add_default("config/default")
//!     .add_environment()
//!     .build()
//!     .unwrap();
//!
//! let log = config.log();
//! println!("日志输出到: {}", log.file_path);
//! ```

pub mod config;
pub mod error;
pub mod presets;
pub mod units;

pub use config::{AppConfig, AppConfigBuilder};
pub use error::{ConfigError, Result};

// 重导出常用预设，方便使用
pub use presets::logging::LogConfig;
pub use presets::Validate;
pub use units::ByteSize;
