mod config;

use std::process::exit;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use logkit::{debug, error, info, trace, warn, OutputKind};

use crate::config::LogArgs;

#[derive(Parser, Debug)]
#[command(name = "logctl")]
#[command(about = "根据配置初始化结构化日志并输出示例记录", long_about = None)]
struct Cli {
    #[command(flatten)]
    log: LogArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 输出示例日志
    Emit {
        /// 输出轮数, 每轮覆盖所有级别
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,

        /// 日志内容
        #[arg(short, long, default_value = "hello")]
        message: String,
    },

    /// 打印生效的日志配置
    Config,

    /// 立即滚动日志文件
    Rotate,
}

/// **日志工具**
///
/// ***usage：***
/// ```shell
/// # 使用默认配置 (config/default.toml) 输出一轮日志
/// cargo run -p logctl -- emit
///
/// # 输出 JSON 到滚动文件
/// cargo run -p logctl -- --log-format json --log-file /tmp/app/app.log emit -n 100
///
/// # 使用环境变量
/// export APP_LOG__LEVEL=debug
/// cargo run -p logctl -- emit
///
/// # 查看生效配置
/// cargo run -p logctl -- --config ./logctl.toml config
/// ```
fn main() {
    let cli = Cli::parse();

    // 日志器不可用时直接退出
    if let Err(e) = run(cli) {
        eprintln!("操作失败: {:#}", e);
        exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let app_config = config::load(&cli.log)?;
    logkit::init_from_config(&app_config).context("初始化日志系统失败")?;

    match cli.command {
        Commands::Emit { count, message } => handle_emit(count, &message),
        Commands::Config => handle_config(&app_config),
        Commands::Rotate => handle_rotate(),
    }
}

/// 输出示例日志
fn handle_emit(count: usize, message: &str) -> Result<()> {
    for round in 0..count {
        trace!(round, "{}", message);
        debug!(round, "{}", message);
        info!(round, "{}", message);
        warn!(round, "{}", message);
        error!(round, "{}", message);
    }

    // 经由 log crate 桥接
    log::info!("{} (log)", message);
    Ok(())
}

/// 打印生效的日志配置
fn handle_config(app_config: &rconfig::AppConfig) -> Result<()> {
    let json = serde_json::to_string_pretty(app_config.log()).context("序列化配置失败")?;
    println!("{}", json);
    Ok(())
}

/// 立即滚动日志文件
fn handle_rotate() -> Result<()> {
    match logkit::current_output() {
        Some(output) if output.kind() == OutputKind::File => {
            output.rotate().context("滚动日志文件失败")?;
            info!("日志文件已滚动");
            Ok(())
        }
        Some(output) => {
            warn!(output = ?output.kind(), "输出目标不是文件, 无需滚动");
            Ok(())
        }
        None => anyhow::bail!("日志系统未初始化"),
    }
}
