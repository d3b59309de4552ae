use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use rconfig::AppConfig;

/// 默认配置文件 (不含扩展名)
const DEFAULT_CONFIG: &str = "config/default";

/// 日志相关的全局参数
#[derive(Args, Debug, Clone, Default)]
pub struct LogArgs {
    /// 配置文件路径
    #[arg(short, long, global = true, env = "LOGCTL_CONFIG")]
    pub config: Option<PathBuf>,

    /// 日志级别 (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// 日志格式 (text, json)
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// 日志输出 (stdout, stderr, /dev/null 或文件路径)
    #[arg(long, global = true)]
    pub log_file: Option<String>,
}

/// 配置加载优先级 (后者覆盖前者)：
/// 1. 默认配置文件 (config/default.*)
/// 2. 指定的配置文件 (如果提供, 必须存在)
/// 3. 环境变量 (APP_LOG__LEVEL 等)
/// 4. 命令行参数
pub fn load(args: &LogArgs) -> Result<AppConfig> {
    let mut builder = AppConfig::new().add_dotenv().add_default(DEFAULT_CONFIG);

    if let Some(path) = &args.config {
        builder = builder.add_required_file(path);
    }

    builder
        .add_environment()
        .set_override_option("log.level", args.log_level.clone())?
        .set_override_option("log.format", args.log_format.clone())?
        .set_override_option("log.file_path", args.log_file.clone())?
        .build()
        .context("无法加载配置文件")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_flags_override_file() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("logctl.toml");
        fs::write(&path, "[log]\nformat = \"json\"\nlevel = \"warn\"\nfile_count = 3\n")?;

        let args = LogArgs {
            config: Some(path),
            log_level: Some("debug".to_string()),
            log_file: Some("stdout".to_string()),
            ..Default::default()
        };
        let config = load(&args)?;

        assert_eq!(config.log().format, "json");
        assert_eq!(config.log().level, "debug");
        assert_eq!(config.log().file_path, "stdout");
        assert_eq!(config.log().file_count, 3);
        Ok(())
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        let dir = tempdir().unwrap();
        let args = LogArgs {
            config: Some(dir.path().join("missing.toml")),
            ..Default::default()
        };
        assert!(load(&args).is_err());
    }

    #[test]
    fn test_bad_format_flag_is_an_error() {
        let args = LogArgs {
            log_format: Some("xml".to_string()),
            ..Default::default()
        };
        let err = load(&args).unwrap_err();
        assert!(format!("{:#}", err).contains("xml"));
    }
}
