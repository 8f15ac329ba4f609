//! 下载路径校验
//!
//! 客户端提交的是存储时记录的相对或绝对路径。先拒绝任何 `..`，
//! 再规范化并要求结果落在影像根目录或报告根目录之内。

use soft_canonicalize::soft_canonicalize;
use std::path::{Path, PathBuf};
use telerad_core::{Result, TeleradError};
use tracing::warn;

const DICOM_MIME: &str = "application/dicom";
const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// 下载路径解析器
#[derive(Debug, Clone)]
pub struct DownloadResolver {
    roots: Vec<PathBuf>,
}

impl DownloadResolver {
    /// 使用允许访问的根目录创建解析器
    pub fn new<I, P>(roots: I) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let roots = roots
            .into_iter()
            .map(|root| soft_canonicalize(root.as_ref()))
            .collect::<std::io::Result<Vec<_>>>()?;

        if roots.is_empty() {
            return Err(TeleradError::Config("no download roots configured".to_string()));
        }
        Ok(Self { roots })
    }

    /// 解析下载路径
    ///
    /// 含 `..` 或越出根目录 -> `AccessDenied`；文件不存在 -> `NotFound`。
    pub async fn resolve(&self, raw_path: &str) -> Result<PathBuf> {
        if raw_path.is_empty() || raw_path.contains("..") || raw_path.contains('\0') {
            warn!("Rejected download path: {:?}", raw_path);
            return Err(TeleradError::AccessDenied("access denied".to_string()));
        }

        let canonical = soft_canonicalize(Path::new(raw_path))?;
        if !self.roots.iter().any(|root| canonical.starts_with(root)) {
            warn!("Download path escapes storage roots: {:?}", raw_path);
            return Err(TeleradError::AccessDenied("access denied".to_string()));
        }

        match tokio::fs::metadata(&canonical).await {
            Ok(meta) if meta.is_file() => Ok(canonical),
            _ => Err(TeleradError::NotFound("file not found".to_string())),
        }
    }
}

/// 下载时的内容类型
pub fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("docx") => DOCX_MIME,
        _ => DICOM_MIME,
    }
}
