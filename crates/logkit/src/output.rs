//! 日志输出目标

use std::fs::DirBuilder;
use std::io::{self, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing_subscriber::fmt::MakeWriter;

use crate::error::{LogError, Result};
use crate::rotate::{RollingFile, RotationPolicy, DEFAULT_MAX_SIZE_MB};
use crate::LogConfig;

/// 未指定保留时间时使用的默认值 (天)
pub const DEFAULT_MAX_AGE_DAYS: u64 = 1;

/// 日志目录的权限
pub const LOG_DIR_MODE: u32 = 0o755;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Discard,
    Stdout,
    Stderr,
    File,
}

/// 日志输出目标
///
/// 克隆得到的副本共享同一个滚动文件。
#[derive(Debug, Clone)]
pub enum Output {
    Discard,
    Stdout,
    Stderr,
    File(Arc<Mutex<RollingFile>>),
}

impl Output {
    /// 根据 `file_path` 解析输出目标, 文件目标会先创建所在目录
    pub fn resolve(config: &LogConfig) -> Result<Self> {
        match config.file_path.as_str() {
            "" | "/dev/null" => Ok(Output::Discard),
            "stdout" => Ok(Output::Stdout),
            "stderr" => Ok(Output::Stderr),
            path => {
                let path = Path::new(path);
                create_parent_dir(path)?;
                let file = RollingFile::new(path, rotation_policy(config));
                Ok(Output::File(Arc::new(Mutex::new(file))))
            }
        }
    }

    pub fn kind(&self) -> OutputKind {
        match self {
            Output::Discard => OutputKind::Discard,
            Output::Stdout => OutputKind::Stdout,
            Output::Stderr => OutputKind::Stderr,
            Output::File(_) => OutputKind::File,
        }
    }

    /// 文件目标的路径
    pub fn path(&self) -> Option<PathBuf> {
        match self {
            Output::File(file) => Some(lock(file).path().to_path_buf()),
            _ => None,
        }
    }

    /// 文件目标的滚动参数
    pub fn policy(&self) -> Option<RotationPolicy> {
        match self {
            Output::File(file) => Some(lock(file).policy().clone()),
            _ => None,
        }
    }

    /// 强制滚动文件目标, 其他目标无操作
    ///
    /// 历史文件的清理在释放写锁之后进行。
    pub fn rotate(&self) -> io::Result<()> {
        match self {
            Output::File(file) => {
                let cleanup = lock(file).roll()?;
                cleanup.run()
            }
            _ => Ok(()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            Output::Stdout => io::stdout().is_terminal(),
            Output::Stderr => io::stderr().is_terminal(),
            _ => false,
        }
    }
}

/// 由日志配置推导滚动参数, 换算时舍弃余数
pub fn rotation_policy(config: &LogConfig) -> RotationPolicy {
    let max_size_mb = if config.file_size.is_zero() {
        DEFAULT_MAX_SIZE_MB
    } else {
        config.file_size.megabytes()
    };

    let max_age_days = if config.file_duration.is_zero() {
        DEFAULT_MAX_AGE_DAYS
    } else {
        config.file_duration.as_secs() / SECONDS_PER_DAY
    };

    RotationPolicy {
        max_size_mb,
        max_age_days,
        max_backups: config.file_count,
        compress: config.file_compress,
        local_time: true,
    }
}

fn create_parent_dir(path: &Path) -> Result<()> {
    let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) else {
        return Ok(());
    };

    let mut builder = DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(LOG_DIR_MODE);
    }

    builder.create(dir).map_err(|source| LogError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })
}

fn lock(file: &Mutex<RollingFile>) -> MutexGuard<'_, RollingFile> {
    file.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 单条日志记录使用的写入器
pub enum OutputWriter<'a> {
    Discard(io::Sink),
    Stdout(io::Stdout),
    Stderr(io::Stderr),
    File(MutexGuard<'a, RollingFile>),
}

impl Write for OutputWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            OutputWriter::Discard(w) => w.write(buf),
            OutputWriter::Stdout(w) => w.write(buf),
            OutputWriter::Stderr(w) => w.write(buf),
            OutputWriter::File(w) => w.write(buf),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            OutputWriter::Discard(w) => w.write_all(buf),
            OutputWriter::Stdout(w) => w.write_all(buf),
            OutputWriter::Stderr(w) => w.write_all(buf),
            OutputWriter::File(w) => w.write_all(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            OutputWriter::Discard(w) => w.flush(),
            OutputWriter::Stdout(w) => w.flush(),
            OutputWriter::Stderr(w) => w.flush(),
            OutputWriter::File(w) => w.flush(),
        }
    }
}

impl<'a> MakeWriter<'a> for Output {
    type Writer = OutputWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        match self {
            Output::Discard => OutputWriter::Discard(io::sink()),
            Output::Stdout => OutputWriter::Stdout(io::stdout()),
            Output::Stderr => OutputWriter::Stderr(io::stderr()),
            Output::File(file) => OutputWriter::File(lock(file)),
        }
    }
}
