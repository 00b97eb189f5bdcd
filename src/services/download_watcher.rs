//! 下载目录监听 - 业务能力层
//!
//! 图片任务点击下载按钮之前记录目录快照，之后等待出现新文件，
//! 再把它移动到任务指定的目录。

use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tokio::fs;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::error::FileError;
use crate::models::job::deadline_after;

/// 浏览器仍在写入的临时文件后缀
const PARTIAL_SUFFIXES: [&str; 3] = ["crdownload", "tmp", "part"];

/// 下载目录监听器
pub struct DownloadWatcher {
    dir: PathBuf,
    baseline: HashSet<PathBuf>,
    poll_interval: Duration,
}

impl DownloadWatcher {
    /// 记录目录当前已有的文件
    pub async fn snapshot(
        dir: impl Into<PathBuf>,
        poll_interval: Duration,
    ) -> Result<Self, FileError> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(FileError::DirectoryNotFound {
                path: dir.display().to_string(),
            });
        }

        let baseline = list_finished_files(&dir)
            .await?
            .into_iter()
            .map(|(path, _)| path)
            .collect::<HashSet<_>>();
        debug!("下载目录快照: {} ({} 个文件)", dir.display(), baseline.len());

        Ok(Self {
            dir,
            baseline,
            poll_interval,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 等待快照之后出现的新文件（多个时取最新的）
    ///
    /// 超时返回 `Ok(None)`
    pub async fn wait_for_new_file(&self, timeout: Duration) -> Result<Option<PathBuf>, FileError> {
        let deadline = deadline_after(Instant::now(), timeout);
        loop {
            let newest = list_finished_files(&self.dir)
                .await?
                .into_iter()
                .filter(|(path, _)| !self.baseline.contains(path))
                .max_by_key(|(_, modified)| *modified)
                .map(|(path, _)| path);

            if let Some(path) = newest {
                info!("检测到新下载文件: {}", path.display());
                return Ok(Some(path));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}

/// 列出目录里已下载完成的文件及其修改时间
async fn list_finished_files(dir: &Path) -> Result<Vec<(PathBuf, SystemTime)>, FileError> {
    let mut entries = fs::read_dir(dir)
        .await
        .map_err(|e| FileError::read_failed(dir.display().to_string(), e))?;

    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| FileError::read_failed(dir.display().to_string(), e))?
    {
        let path = entry.path();
        if is_partial(&path) {
            continue;
        }
        // 浏览器可能在两次调用之间重命名文件
        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => return Err(FileError::read_failed(path.display().to_string(), e)),
        };
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        files.push((path, modified));
    }
    Ok(files)
}

fn is_partial(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'));
    let partial = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| PARTIAL_SUFFIXES.contains(&e));
    hidden || partial
}

/// 把文件移动到目标目录，重名时追加序号
///
/// 跨文件系统时 rename 会失败，退回复制后删除。
pub async fn relocate(file: &Path, destination_dir: &Path) -> Result<PathBuf, FileError> {
    let move_failed = |source: std::io::Error, to: &Path| FileError::MoveFailed {
        from: file.display().to_string(),
        to: to.display().to_string(),
        source: Box::new(source),
    };

    fs::create_dir_all(destination_dir)
        .await
        .map_err(|e| move_failed(e, destination_dir))?;

    let target = unique_target(file, destination_dir).await;
    if fs::rename(file, &target).await.is_err() {
        fs::copy(file, &target).await.map_err(|e| move_failed(e, &target))?;
        fs::remove_file(file).await.map_err(|e| move_failed(e, &target))?;
    }

    info!("文件已移动: {} -> {}", file.display(), target.display());
    Ok(target)
}

async fn unique_target(file: &Path, destination_dir: &Path) -> PathBuf {
    let stem = file.file_stem().and_then(|s| s.to_str()).unwrap_or("download");
    let extension = file.extension().and_then(|e| e.to_str());
    let name_for = |n: usize| {
        let base = if n == 0 { stem.to_string() } else { format!("{}-{}", stem, n) };
        match extension {
            Some(ext) => format!("{}.{}", base, ext),
            None => base,
        }
    };

    let mut n = 0;
    loop {
        let candidate = destination_dir.join(name_for(n));
        if !fs::try_exists(&candidate).await.unwrap_or(false) {
            return candidate;
        }
        n += 1;
    }
}
