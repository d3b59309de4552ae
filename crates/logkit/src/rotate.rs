//! 按大小滚动的日志文件
//!
//! 活动文件超过大小上限时, 将其重命名为 `<名称>-<时间戳><扩展名>` 并新建活动文件,
//! 随后按数量和时间清理历史文件, 可选 gzip 压缩。
//!
//! 本模块在写锁内被调用, 因此内部不能通过 tracing 记录日志。
//! 清理和压缩在后台线程中进行, 不占用写锁。

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use chrono::{Local, NaiveDateTime, TimeDelta, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;

pub use rconfig::units::MEGABYTE;

/// 未指定大小上限时使用的默认值 (MB)
pub const DEFAULT_MAX_SIZE_MB: u64 = 100;

/// 历史文件名中的时间戳格式
pub const BACKUP_TIME_FORMAT: &str = "%Y-%m-%dT%H-%M-%S%.3f";

const COMPRESS_SUFFIX: &str = ".gz";

/// 滚动参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationPolicy {
    /// 活动文件的大小上限 (MB), 0 表示使用默认值
    pub max_size_mb: u64,
    /// 历史文件的最长保留天数, 0 表示不按时间清理
    pub max_age_days: u64,
    /// 保留的历史文件数量, 0 表示全部保留
    pub max_backups: usize,
    /// 是否压缩历史文件
    pub compress: bool,
    /// 历史文件名使用本地时间, 否则使用 UTC
    pub local_time: bool,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_size_mb: DEFAULT_MAX_SIZE_MB,
            max_age_days: 0,
            max_backups: 0,
            compress: false,
            local_time: false,
        }
    }
}

impl RotationPolicy {
    pub fn max_size_bytes(&self) -> u64 {
        let mb = if self.max_size_mb == 0 {
            DEFAULT_MAX_SIZE_MB
        } else {
            self.max_size_mb
        };
        mb.saturating_mul(MEGABYTE)
    }
}

/// 历史文件
#[derive(Debug, Clone)]
pub struct Backup {
    pub path: PathBuf,
    pub timestamp: NaiveDateTime,
    pub compressed: bool,
}

/// 历史文件清理任务
///
/// 只访问历史文件, 不持有活动文件, 因此可以在写锁之外执行。
/// 克隆得到的副本共享同一把执行锁, 同一时刻只有一个清理在运行。
#[derive(Debug, Clone)]
pub struct Cleanup {
    dir: PathBuf,
    prefix: String,
    ext: String,
    policy: RotationPolicy,
    running: Arc<Mutex<()>>,
}

impl Cleanup {
    fn new(path: &Path, policy: RotationPolicy) -> Self {
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let stem = name.strip_suffix(&ext).unwrap_or(&name);

        Self {
            dir,
            prefix: format!("{}-", stem),
            ext,
            policy,
            running: Arc::new(Mutex::new(())),
        }
    }

    /// 当前策略是否需要清理
    pub fn is_needed(&self) -> bool {
        self.policy.max_backups > 0 || self.policy.max_age_days > 0 || self.policy.compress
    }

    /// 按时间从新到旧列出历史文件
    ///
    /// 压缩中断时同一时间戳会同时存在原文件和 `.gz`, 两者算作一个未压缩的历史文件。
    pub fn backups(&self) -> io::Result<Vec<Backup>> {
        let compressed_ext = format!("{}{}", self.ext, COMPRESS_SUFFIX);

        let mut backups = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(rest) = name.strip_prefix(&self.prefix) else {
                continue;
            };
            let (stamp, compressed) = if let Some(stamp) = rest.strip_suffix(&compressed_ext) {
                (stamp, true)
            } else if let Some(stamp) = rest.strip_suffix(&self.ext) {
                (stamp, false)
            } else {
                continue;
            };
            let Ok(timestamp) = NaiveDateTime::parse_from_str(stamp, BACKUP_TIME_FORMAT) else {
                continue;
            };

            backups.push(Backup {
                path: entry.path(),
                timestamp,
                compressed,
            });
        }

        backups.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then(a.compressed.cmp(&b.compressed))
        });
        backups.dedup_by_key(|b| b.timestamp);
        Ok(backups)
    }

    /// 按数量和时间删除历史文件, 再压缩剩余的未压缩文件
    ///
    /// 遇到错误时继续处理其余文件并返回第一个错误。
    pub fn run(&self) -> io::Result<()> {
        if !self.is_needed() {
            return Ok(());
        }
        let _running = self.running.lock().unwrap_or_else(PoisonError::into_inner);

        let policy = &self.policy;
        let mut backups = self.backups()?;
        let mut expired = Vec::new();

        if policy.max_backups > 0 && backups.len() > policy.max_backups {
            expired.extend(backups.split_off(policy.max_backups));
        }

        if policy.max_age_days > 0 {
            let cutoff = i64::try_from(policy.max_age_days)
                .ok()
                .and_then(TimeDelta::try_days)
                .and_then(|age| now(policy).checked_sub_signed(age));
            if let Some(cutoff) = cutoff {
                let (old, kept): (Vec<_>, Vec<_>) =
                    backups.into_iter().partition(|b| b.timestamp < cutoff);
                expired.extend(old);
                backups = kept;
            }
        }

        let mut first_error = None;
        for backup in &expired {
            if let Err(e) = remove_backup(backup) {
                first_error.get_or_insert(e);
            }
        }

        if policy.compress {
            for backup in backups.iter().filter(|b| !b.compressed) {
                if let Err(e) = compress_file(&backup.path) {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// 滚动日志文件
///
/// 首次写入时才打开文件, 已存在的活动文件会被追加写入。
/// 写入触发的滚动只在调用方的锁内重命名并新建文件, 清理和压缩交给后台线程。
#[derive(Debug)]
pub struct RollingFile {
    path: PathBuf,
    policy: RotationPolicy,
    file: Option<File>,
    size: u64,
    cleanup: Cleanup,
    worker: Option<SyncSender<()>>,
}

impl RollingFile {
    pub fn new(path: impl Into<PathBuf>, policy: RotationPolicy) -> Self {
        let path = path.into();
        let cleanup = Cleanup::new(&path, policy.clone());
        Self {
            path,
            policy,
            file: None,
            size: 0,
            cleanup,
            worker: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn policy(&self) -> &RotationPolicy {
        &self.policy
    }

    /// 当前活动文件已写入的字节数
    pub fn size(&self) -> u64 {
        self.size
    }

    /// 立即滚动, 然后在当前线程清理历史文件
    pub fn rotate(&mut self) -> io::Result<()> {
        self.roll()?.run()
    }

    /// 只滚动活动文件, 返回的清理任务由调用方在锁外执行
    pub fn roll(&mut self) -> io::Result<Cleanup> {
        self.rotate_file()?;
        Ok(self.cleanup.clone())
    }

    /// 关闭活动文件, 下次写入时重新打开
    pub fn close(&mut self) {
        self.file = None;
        self.size = 0;
    }

    /// 按时间从新到旧列出历史文件
    pub fn backups(&self) -> io::Result<Vec<Backup>> {
        self.cleanup.backups()
    }

    fn backup_path(&self, mut at: NaiveDateTime) -> PathBuf {
        let cleanup = &self.cleanup;
        loop {
            let candidate = cleanup.dir.join(format!(
                "{}{}{}",
                cleanup.prefix,
                at.format(BACKUP_TIME_FORMAT),
                cleanup.ext
            ));
            if !candidate.exists() && !compressed_path(&candidate).exists() {
                return candidate;
            }
            // 同一毫秒内多次滚动
            at += TimeDelta::milliseconds(1);
        }
    }

    fn open_existing_or_new(&mut self, write_len: u64) -> io::Result<()> {
        let metadata = match fs::metadata(&self.path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return self.open_new(),
            Err(e) => return Err(e),
        };

        if metadata.len() + write_len >= self.policy.max_size_bytes() {
            self.rotate_file()?;
            self.schedule_cleanup();
            return Ok(());
        }

        match OpenOptions::new().append(true).open(&self.path) {
            Ok(file) => {
                self.file = Some(file);
                self.size = metadata.len();
                Ok(())
            }
            Err(_) => self.open_new(),
        }
    }

    fn open_new(&mut self) -> io::Result<()> {
        fs::create_dir_all(&self.cleanup.dir)?;

        if self.path.exists() {
            let backup = self.backup_path(now(&self.policy));
            fs::rename(&self.path, &backup)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        self.file = Some(file);
        self.size = 0;
        Ok(())
    }

    fn rotate_file(&mut self) -> io::Result<()> {
        self.close();
        self.open_new()
    }

    /// 通知后台线程清理, 已有待处理的请求时直接返回
    fn schedule_cleanup(&mut self) {
        if !self.cleanup.is_needed() {
            return;
        }
        if self.worker.is_none() {
            self.worker = spawn_cleanup_worker(self.cleanup.clone());
        }

        match &self.worker {
            Some(worker) => {
                if let Err(TrySendError::Disconnected(())) = worker.try_send(()) {
                    self.worker = None;
                }
            }
            // 无法创建线程时在当前线程清理, 失败不影响写入
            None => {
                let _ = self.cleanup.run();
            }
        }
    }
}

impl Write for RollingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let len = buf.len() as u64;
        let max = self.policy.max_size_bytes();
        if len > max {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("write length {} exceeds maximum file size {}", len, max),
            ));
        }

        if self.file.is_none() {
            self.open_existing_or_new(len)?;
        }

        if self.size + len > max {
            self.rotate_file()?;
            self.schedule_cleanup();
        }

        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::other("log file is not open"))?;
        let written = file.write(buf)?;
        self.size += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

/// 后台清理线程, 发送端全部释放后退出
fn spawn_cleanup_worker(cleanup: Cleanup) -> Option<SyncSender<()>> {
    let (tx, rx) = mpsc::sync_channel::<()>(1);
    thread::Builder::new()
        .name("logkit-cleanup".to_string())
        .spawn(move || {
            for () in rx {
                let _ = cleanup.run();
            }
        })
        .ok()?;
    Some(tx)
}

fn now(policy: &RotationPolicy) -> NaiveDateTime {
    if policy.local_time {
        Local::now().naive_local()
    } else {
        Utc::now().naive_utc()
    }
}

fn compressed_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(COMPRESS_SUFFIX);
    PathBuf::from(name)
}

/// 删除历史文件, 未压缩的文件连同可能残留的 `.gz` 一起删除
fn remove_backup(backup: &Backup) -> io::Result<()> {
    fs::remove_file(&backup.path)?;
    if !backup.compressed {
        match fs::remove_file(compressed_path(&backup.path)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => return Err(e),
            _ => {}
        }
    }
    Ok(())
}

/// 压缩历史文件, 残留的不完整 `.gz` 会被原文件重新覆盖
fn compress_file(src: &Path) -> io::Result<()> {
    let dst = compressed_path(src);
    let mut input = File::open(src)?;
    let mut encoder = GzEncoder::new(File::create(&dst)?, Compression::default());

    let copied = io::copy(&mut input, &mut encoder);
    let result = match copied {
        Ok(_) => encoder.finish().map(|_| ()),
        Err(e) => Err(e),
    };
    if let Err(e) = result {
        let _ = fs::remove_file(&dst);
        return Err(e);
    }

    fs::remove_file(src)
}
