//! # Telerad Web模块
//!
//! 基于 axum 的 HTTP 接口：会话 Cookie、各角色的 JSON 页面、
//! multipart 影像上传和受限的文件下载。

pub mod auth;
pub mod error;
pub mod files;
pub mod handlers;
pub mod server;

// 重新导出主要类型
pub use auth::Session;
pub use error::{ApiError, ApiResult};
pub use server::{create_app, session_key, AppState, WebServer, WebSettings};
