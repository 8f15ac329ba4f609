//! 文件下载
//!
//! 影像和报告通过存储路径下载，路径由 [`DownloadResolver`](telerad_storage::DownloadResolver)
//! 校验，只能访问影像根目录和报告根目录。

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
};
use telerad_core::TeleradError;
use telerad_storage::content_type_for;
use tracing::debug;

use crate::error::ApiResult;
use crate::server::AppState;

/// 下载处理器，路径参数已由路由解码
pub async fn download_file(
    State(state): State<AppState>,
    Path(raw_path): Path<String>,
) -> ApiResult<Response> {
    let path = state.downloads.resolve(&raw_path).await?;
    let content = tokio::fs::read(&path).await.map_err(TeleradError::from)?;

    let file_name = path
        .file_name()
        .map(|n| attachment_name(&n.to_string_lossy()))
        .unwrap_or_else(|| "download".to_string());
    debug!("Serving {} ({} bytes)", path.display(), content.len());

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type_for(&path))
        .header(header::CONTENT_LENGTH, content.len())
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", file_name),
        )
        .header("X-Content-Type-Options", "nosniff")
        .body(Body::from(content))
        .map_err(|e| TeleradError::Internal(format!("Failed to create response: {}", e)).into())
}

/// 头部只能放 ASCII，其余字符替换为 `_`
fn attachment_name(name: &str) -> String {
    name.chars()
        .map(|c| if (c.is_ascii_graphic() || c == ' ') && c != '"' { c } else { '_' })
        .collect()
}
