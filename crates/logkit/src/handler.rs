//! 日志处理器构建器

use std::fmt;
use std::str::FromStr;

use tracing::level_filters::LevelFilter;
use tracing::Dispatch;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::layer::{Layer, Layered, SubscriberExt};
use tracing_subscriber::Registry;

use crate::error::{LogError, Result};
use crate::output::Output;
use crate::LogConfig;

/// 装箱后的日志层
pub type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// 由单个处理器组成的订阅器
pub type HandlerSubscriber = Layered<BoxedLayer, Registry>;

/// 日志格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// 文本格式
    #[default]
    Text,
    /// JSON 格式
    Json,
}

impl FromStr for LogFormat {
    type Err = LogError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "text" | "" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(LogError::UnknownFormat(s.to_string())),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogFormat::Text => f.write_str("text"),
            LogFormat::Json => f.write_str("json"),
        }
    }
}

/// 日志处理器构建器
///
/// 先解析输出目标, 再解析格式。级别阈值由调用方提供, 默认 `INFO`。
#[derive(Debug, Clone)]
pub struct HandlerBuilder {
    config: LogConfig,
    level: LevelFilter,
    show_target: bool,
    show_source_location: bool,
    show_thread_ids: bool,
}

impl HandlerBuilder {
    /// 从配置创建构建器
    pub fn new(config: LogConfig) -> Self {
        Self {
            config,
            level: LevelFilter::INFO,
            show_target: true,
            show_source_location: false,
            show_thread_ids: false,
        }
    }

    /// 设置最低日志级别
    pub fn level(mut self, level: LevelFilter) -> Self {
        self.level = level;
        self
    }

    /// 设置是否显示目标
    pub fn with_target(mut self, show: bool) -> Self {
        self.show_target = show;
        self
    }

    /// 设置是否显示源码位置 (文件和行号)
    pub fn with_source_location(mut self, show: bool) -> Self {
        self.show_source_location = show;
        self
    }

    /// 设置是否显示线程ID
    pub fn with_thread_ids(mut self, show: bool) -> Self {
        self.show_thread_ids = show;
        self
    }

    /// 构建日志处理器
    ///
    /// 文件目标的目录创建失败或格式未知时返回错误, 不会产生处理器。
    pub fn build(self) -> Result<Handler> {
        let output = Output::resolve(&self.config)?;
        let format = self.config.format.parse::<LogFormat>()?;
        let layer = self.create_layer(format, output.clone());

        Ok(Handler {
            format,
            level: self.level,
            output,
            layer,
        })
    }

    fn create_layer(&self, format: LogFormat, output: Output) -> BoxedLayer {
        // 只有输出到终端的文本日志使用颜色
        let ansi = format == LogFormat::Text && output.is_terminal();

        let layer = tracing_subscriber::fmt::layer()
            .with_timer(ChronoLocal::rfc_3339())
            .with_ansi(ansi)
            .with_target(self.show_target)
            .with_file(self.show_source_location)
            .with_line_number(self.show_source_location)
            .with_thread_ids(self.show_thread_ids)
            .with_writer(output);

        match format {
            LogFormat::Json => layer.json().with_filter(self.level).boxed(),
            LogFormat::Text => layer.with_filter(self.level).boxed(),
        }
    }
}

/// 日志处理器
///
/// 可以作为层组合进其他订阅器, 也可以直接转换为 `Dispatch` 注入或安装为全局默认。
pub struct Handler {
    format: LogFormat,
    level: LevelFilter,
    output: Output,
    layer: BoxedLayer,
}

impl Handler {
    pub fn format(&self) -> LogFormat {
        self.format
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }

    pub fn output(&self) -> &Output {
        &self.output
    }

    pub fn into_layer(self) -> BoxedLayer {
        self.layer
    }

    pub fn into_subscriber(self) -> HandlerSubscriber {
        Registry::default().with(self.layer)
    }

    pub fn into_dispatch(self) -> Dispatch {
        Dispatch::new(self.into_subscriber())
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("format", &self.format)
            .field("level", &self.level)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::output::OutputKind;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn config(format: &str, path: &Path) -> LogConfig {
        LogConfig {
            format: format.to_string(),
            file_path: path.to_string_lossy().into_owned(),
            ..Default::default()
        }
    }

    fn read_lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_parse_format() {
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert_eq!("".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);

        let err = "JSON".parse::<LogFormat>().unwrap_err();
        assert!(matches!(err, LogError::UnknownFormat(ref v) if v == "JSON"));
    }

    #[test]
    fn test_unknown_format_error() {
        let config = LogConfig {
            format: "yaml".to_string(),
            file_path: "stderr".to_string(),
            ..Default::default()
        };
        let err = HandlerBuilder::new(config).build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(err.to_string(), "unknown log format: yaml");
    }

    #[test]
    fn test_directory_failure_error() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"file").unwrap();

        let err = HandlerBuilder::new(config("json", &blocker.join("app.log")))
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Resource);
    }

    #[test]
    fn test_discard_handler() {
        let dir = tempdir().unwrap();
        for path in ["", "/dev/null"] {
            let config = LogConfig {
                file_path: path.to_string(),
                ..Default::default()
            };
            let handler = HandlerBuilder::new(config).build().unwrap();
            assert_eq!(handler.output().kind(), OutputKind::Discard);

            tracing::subscriber::with_default(handler.into_subscriber(), || {
                tracing::error!("nowhere");
            });
        }
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_stream_handlers() {
        let handler = HandlerBuilder::new(LogConfig {
            file_path: "stdout".to_string(),
            format: "json".to_string(),
            ..Default::default()
        })
        .build()
        .unwrap();
        assert_eq!(handler.output().kind(), OutputKind::Stdout);
        assert_eq!(handler.format(), LogFormat::Json);

        let handler = HandlerBuilder::new(LogConfig::default()).build().unwrap();
        assert_eq!(handler.output().kind(), OutputKind::Stderr);
        assert_eq!(handler.format(), LogFormat::Text);
        assert_eq!(handler.level(), LevelFilter::INFO);
    }

    #[test]
    fn test_json_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs/app.log");

        let handler = HandlerBuilder::new(config("json", &path)).build().unwrap();
        tracing::subscriber::with_default(handler.into_subscriber(), || {
            tracing::info!(user = "alice", "login");
            tracing::warn!(attempts = 3, "retrying");
        });

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(first["level"], "INFO");
        assert_eq!(first["fields"]["message"], "login");
        assert_eq!(first["fields"]["user"], "alice");
        assert!(first["timestamp"].is_string());

        let second: serde_json::Value = serde_json::from_str(&lines[1]).unwrap();
        assert_eq!(second["level"], "WARN");
        assert_eq!(second["fields"]["attempts"], 3);
    }

    #[test]
    fn test_text_records() {
        let dir = tempdir().unwrap();
        for format in ["text", ""] {
            let path = dir.path().join(format!("text{}.log", format.len()));

            let handler = HandlerBuilder::new(config(format, &path)).build().unwrap();
            tracing::subscriber::with_default(handler.into_subscriber(), || {
                tracing::info!(user = "bob", "hello");
            });

            let lines = read_lines(&path);
            assert_eq!(lines.len(), 1);
            assert!(!lines[0].starts_with('{'));
            assert!(lines[0].contains("INFO"));
            assert!(lines[0].contains("hello"));
            assert!(lines[0].contains("user=\"bob\""));
            // 文件输出不带颜色
            assert!(!lines[0].contains('\u{1b}'));
        }
    }

    #[test]
    fn test_level_threshold() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");

        let handler = HandlerBuilder::new(config("json", &path))
            .level(LevelFilter::WARN)
            .build()
            .unwrap();
        tracing::subscriber::with_default(handler.into_subscriber(), || {
            tracing::debug!("dropped");
            tracing::info!("dropped");
            tracing::warn!("kept");
            tracing::error!("kept");
        });

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.contains("kept")));
    }

    #[test]
    fn test_display_options() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");

        let handler = HandlerBuilder::new(config("json", &path))
            .with_target(false)
            .with_source_location(true)
            .with_thread_ids(true)
            .build()
            .unwrap();
        tracing::subscriber::with_default(handler.into_subscriber(), || {
            tracing::info!("located");
        });

        let record: serde_json::Value = serde_json::from_str(&read_lines(&path)[0]).unwrap();
        assert!(record.get("target").is_none());
        assert!(record["filename"].is_string());
        assert!(record["line_number"].is_number());
        assert!(record["threadId"].is_string());
    }

    #[test]
    fn test_independent_handlers_same_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shared.log");
        let config = config("json", &path);

        let first = HandlerBuilder::new(config.clone()).build().unwrap();
        let second = HandlerBuilder::new(config).build().unwrap();
        assert_eq!(first.format(), second.format());
        assert_eq!(first.output().policy(), second.output().policy());

        tracing::subscriber::with_default(first.into_subscriber(), || {
            tracing::info!("from first");
        });
        tracing::subscriber::with_default(second.into_subscriber(), || {
            tracing::info!("from second");
        });

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("from first"));
        assert!(lines[1].contains("from second"));
    }

    #[test]
    fn test_dispatch_injection() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");

        let dispatch = HandlerBuilder::new(config("text", &path))
            .build()
            .unwrap()
            .into_dispatch();
        tracing::dispatcher::with_default(&dispatch, || {
            tracing::info!("injected");
        });

        assert!(read_lines(&path)[0].contains("injected"));
    }
}
