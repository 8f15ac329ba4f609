//! # Telerad存储模块
//!
//! 负责影像文件和报告文件的落盘、清理以及下载路径校验。

pub mod download;
pub mod storage;

pub use download::{content_type_for, DownloadResolver};
pub use storage::{CleanupReport, StorageManager};
