//! logkit - 基于 tracing 的命令行日志组件
//!
//! 根据 `log` 配置段构建日志处理器 (文本或 JSON, 可输出到标准流、丢弃或滚动文件),
//! 并在程序启动时安装为全局默认日志器。
//!
//! ```no_run
//! use rconfig::AppConfig;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::new()
//!         .add_default("config/default")
//!         .add_environment()
//!         .build()?;
//!
//!     logkit::init_from_config(&config)?;
//!     logkit::info!("应用启动");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod handler;
pub mod output;
pub mod rotate;

use once_cell::sync::OnceCell;
use tracing_log::LogTracer;

pub use error::{ErrorKind, LogError, Result};
pub use handler::{Handler, HandlerBuilder, LogFormat};
pub use output::{Output, OutputKind};
pub use rotate::{Cleanup, RollingFile, RotationPolicy};
pub use tracing::level_filters::LevelFilter;

// 使用 rconfig 预设的 LogConfig
pub use rconfig::presets::logging::LogConfig;

// 全局日志状态
struct LogState {
    config: LogConfig,
    output: Output,
}

static LOGGER: OnceCell<LogState> = OnceCell::new();

/// 解析日志级别, 空字符串视为 `info`
pub fn parse_level(level: &str) -> Result<LevelFilter> {
    if level.is_empty() {
        return Ok(LevelFilter::INFO);
    }
    level
        .parse::<LevelFilter>()
        .map_err(|_| LogError::UnknownLevel(level.to_string()))
}

/// 初始化日志系统
///
/// 构建日志处理器并安装为全局默认, 同时将 `log` crate 的记录转发到 tracing。
/// 整个进程只能成功调用一次, 应在任何并发日志开始之前完成。
pub fn init(config: LogConfig) -> Result<()> {
    // 防止重复初始化
    if LOGGER.get().is_some() {
        return Err(LogError::AlreadyInitialized);
    }

    let level = parse_level(&config.level)?;
    let handler = HandlerBuilder::new(config.clone()).level(level).build()?;
    let format = handler.format();
    let output = handler.output().clone();

    // 任何一步失败都不能留下半安装的全局日志器
    if tracing::dispatcher::has_been_set() {
        return Err(LogError::Install(
            "a global default trace dispatcher has already been set".to_string(),
        ));
    }

    // 将 log crate 的日志转发到 tracing
    LogTracer::init().map_err(|e| LogError::Install(e.to_string()))?;

    tracing::subscriber::set_global_default(handler.into_subscriber())
        .map_err(|e| LogError::Install(e.to_string()))?;

    LOGGER
        .set(LogState { config, output })
        .map_err(|_| LogError::AlreadyInitialized)?;

    tracing::debug!(%format, %level, "日志系统初始化完成");
    Ok(())
}

/// 从应用配置初始化
pub fn init_from_config(config: &rconfig::AppConfig) -> Result<()> {
    init(config.log().clone())
}

/// 是否已初始化
pub fn is_initialized() -> bool {
    LOGGER.get().is_some()
}

/// 获取当前日志配置
pub fn current_config() -> Option<LogConfig> {
    LOGGER.get().map(|state| state.config.clone())
}

/// 获取全局日志器的输出目标
pub fn current_output() -> Option<&'static Output> {
    LOGGER.get().map(|state| &state.output)
}

// 重新导出 tracing 宏，以便用户可以直接从 logkit 使用
pub use tracing::{
    trace, debug, info, warn, error,
    instrument,    // 用于跟踪函数调用
    span, event,   // 用于更细粒度的跟踪控制
    Level,         // 日志级别类型
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("").unwrap(), LevelFilter::INFO);
        assert_eq!(parse_level("info").unwrap(), LevelFilter::INFO);
        assert_eq!(parse_level("DEBUG").unwrap(), LevelFilter::DEBUG);
        assert_eq!(parse_level("warn").unwrap(), LevelFilter::WARN);
        assert_eq!(parse_level("off").unwrap(), LevelFilter::OFF);

        let err = parse_level("loud").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("loud"));
    }

    #[test]
    fn test_not_initialized_in_unit_tests() {
        assert!(!is_initialized());
        assert!(current_config().is_none());
        assert!(current_output().is_none());
    }
}
