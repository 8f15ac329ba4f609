//! 文件存储管理
//!
//! 每个患者一个子目录：`{base_path}/{patient_id}/`。同名文件不覆盖，
//! 而是在扩展名前追加递增的数字后缀。

use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use telerad_core::{Result, TeleradError};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

/// 存储管理器
#[derive(Debug, Clone)]
pub struct StorageManager {
    base_path: PathBuf,
}

/// 清理结果
#[derive(Debug, Default, Clone, Serialize)]
pub struct CleanupReport {
    pub removed_files: usize,
    pub removed_folders: Vec<PathBuf>,
    pub failures: Vec<String>,
}

impl CleanupReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl StorageManager {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// 患者目录
    pub fn folder_for(&self, patient_id: i64) -> PathBuf {
        self.base_path.join(patient_id.to_string())
    }

    /// 存储文件，返回最终路径
    ///
    /// 目标已存在时依次尝试 `name_1.ext`、`name_2.ext`……直到找到空位。
    /// 使用 `create_new` 打开，检查与创建之间不会被其他写入抢占。
    pub async fn store_file(&self, patient_id: i64, file_name: &str, data: &[u8]) -> Result<PathBuf> {
        let folder = self.folder_for(patient_id);
        tokio::fs::create_dir_all(&folder).await?;

        let original = folder.join(file_name);
        let mut counter = 0u32;
        loop {
            let candidate = if counter == 0 {
                original.clone()
            } else {
                suffixed_path(&original, counter)
            };

            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
                .await
            {
                Ok(file) => {
                    write_or_discard(file, &candidate, data).await?;
                    debug!("Stored {} bytes at {}", data.len(), candidate.display());
                    return Ok(candidate);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    counter = counter.checked_add(1).ok_or_else(|| {
                        TeleradError::Io(format!("no free name for {}", original.display()))
                    })?;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// 尽力删除文件，随后删除变空的所在目录
    ///
    /// 失败只记录日志，不中断调用方。
    pub async fn remove_files(&self, paths: &[String]) -> CleanupReport {
        let mut report = CleanupReport::default();
        let mut folders: Vec<PathBuf> = Vec::new();

        for path in paths {
            let path = Path::new(path);
            match tokio::fs::remove_file(path).await {
                Ok(()) => report.removed_files += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("Failed to remove {}: {}", path.display(), e);
                    report.failures.push(format!("{}: {}", path.display(), e));
                }
            }
            if let Some(parent) = path.parent() {
                if !folders.iter().any(|f| f == parent) {
                    folders.push(parent.to_path_buf());
                }
            }
        }

        for folder in folders {
            match is_empty_dir(&folder).await {
                Ok(true) => match tokio::fs::remove_dir(&folder).await {
                    Ok(()) => report.removed_folders.push(folder),
                    Err(e) => {
                        warn!("Failed to remove folder {}: {}", folder.display(), e);
                        report.failures.push(format!("{}: {}", folder.display(), e));
                    }
                },
                Ok(false) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("Failed to inspect folder {}: {}", folder.display(), e);
                    report.failures.push(format!("{}: {}", folder.display(), e));
                }
            }
        }

        report
    }

    /// 文件是否仍然存在
    pub async fn exists(path: &str) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }
}

/// 写入新建的文件，写入失败时删除已创建的残缺文件
async fn write_or_discard<W>(mut writer: W, path: &Path, data: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let written = async {
        writer.write_all(data).await?;
        writer.flush().await
    }
    .await;

    if let Err(e) = written {
        drop(writer);
        if let Err(remove_err) = tokio::fs::remove_file(path).await {
            warn!("Failed to remove partial file {}: {}", path.display(), remove_err);
        }
        return Err(e.into());
    }
    Ok(())
}

/// `dir/name.ext` -> `dir/name_{n}.ext`
fn suffixed_path(original: &Path, n: u32) -> PathBuf {
    let stem = original
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let file_name = match original.extension() {
        Some(ext) => format!("{}_{}.{}", stem, n, ext.to_string_lossy()),
        None => format!("{}_{}", stem, n),
    };
    original.with_file_name(file_name)
}

async fn is_empty_dir(path: &Path) -> std::io::Result<bool> {
    let mut entries = tokio::fs::read_dir(path).await?;
    Ok(entries.next_entry().await?.is_none())
}
