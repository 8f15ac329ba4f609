//! # Telerad管理模块
//!
//! 配置加载与校验、日志初始化

pub mod config;
pub mod logging;

pub use config::{
    ConfigValidator, DatabaseConfig, LoggingConfig, SecurityConfig, ServerConfig, StorageConfig,
    TeleradConfig,
};
pub use logging::{build_filter, init_logging};
