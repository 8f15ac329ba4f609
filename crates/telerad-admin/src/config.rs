//! 配置管理
//!
//! 配置来源按优先级从低到高：内置默认值、配置文件（`telerad.toml` 或命令行指定）、
//! `TELERAD__SECTION__KEY` 形式的环境变量。

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tracing::{error, info};

/// 默认配置文件名（不含扩展名）
const DEFAULT_CONFIG_NAME: &str = "telerad";

/// 会话密钥最短长度
const MIN_COOKIE_SECRET_BYTES: usize = 64;

/// Telerad系统完整配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeleradConfig {
    /// 服务器配置
    pub server: ServerConfig,
    /// 数据库配置
    pub database: DatabaseConfig,
    /// 存储配置
    pub storage: StorageConfig,
    /// 安全配置
    pub security: SecurityConfig,
    /// 日志配置
    pub logging: LoggingConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听主机
    pub host: String,
    /// 监听端口
    pub port: u16,
    /// 对外地址，用于生成下载链接
    pub public_base_url: String,
    /// 单次上传请求体上限
    pub max_upload_bytes: usize,
}

/// 数据库配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// 连接字符串
    pub url: String,
    /// 最大连接数
    pub max_connections: u32,
}

/// 存储配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// 影像根目录
    pub uploads_root: String,
    /// 报告根目录
    pub reports_root: String,
}

/// 安全配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// 会话 Cookie 加密密钥，至少 64 字节
    pub cookie_secret: Option<String>,
    /// 仅通过 HTTPS 发送 Cookie
    pub secure_cookies: bool,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别或过滤指令，`RUST_LOG` 优先
    pub level: String,
    /// 彩色输出
    pub ansi: bool,
    /// 输出 target
    pub with_target: bool,
}

impl TeleradConfig {
    /// 加载配置
    ///
    /// 指定路径时文件必须存在；未指定时 `telerad.toml` 可有可无。
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let file = match config_path {
            Some(path) => File::with_name(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };

        let settings = Config::builder()
            .add_source(Config::try_from(&TeleradConfig::default()).context("Failed to build default configuration")?)
            .add_source(file)
            .add_source(
                Environment::with_prefix("TELERAD")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read configuration sources")?;

        let config: TeleradConfig = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        ConfigValidator::new().validate(&config)?;

        info!(
            "Configuration loaded from {}",
            config_path.unwrap_or("defaults/telerad.toml/environment")
        );
        Ok(config)
    }

    /// 监听地址
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.server.host, self.server.port))
    }
}

/// 配置验证器
#[derive(Debug)]
pub struct ConfigValidator {
    /// 验证规则
    validation_rules: Vec<ValidationRule>,
}

/// 验证规则
#[derive(Debug)]
struct ValidationRule {
    /// 字段路径
    field_path: &'static str,
    /// 验证函数
    validator: fn(&TeleradConfig) -> Result<()>,
}

impl ConfigValidator {
    /// 创建新的配置验证器
    pub fn new() -> Self {
        let validation_rules = vec![
            ValidationRule {
                field_path: "server.port",
                validator: |config| {
                    if config.server.port == 0 {
                        Err(anyhow::anyhow!("Server port cannot be 0"))
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "server.public_base_url",
                validator: |config| {
                    let url = &config.server.public_base_url;
                    if url.starts_with("http://") || url.starts_with("https://") {
                        Ok(())
                    } else {
                        Err(anyhow::anyhow!("Public base URL must start with http:// or https://"))
                    }
                },
            },
            ValidationRule {
                field_path: "server.max_upload_bytes",
                validator: |config| {
                    if config.server.max_upload_bytes == 0 {
                        Err(anyhow::anyhow!("Upload limit cannot be 0"))
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "database.max_connections",
                validator: |config| {
                    if config.database.max_connections == 0 {
                        Err(anyhow::anyhow!("Database max connections cannot be 0"))
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "storage",
                validator: |config| {
                    let uploads = config.storage.uploads_root.trim();
                    let reports = config.storage.reports_root.trim();
                    if uploads.is_empty() || reports.is_empty() {
                        Err(anyhow::anyhow!("Storage roots cannot be empty"))
                    } else if uploads == reports {
                        Err(anyhow::anyhow!("Uploads and reports must use different roots"))
                    } else {
                        Ok(())
                    }
                },
            },
            ValidationRule {
                field_path: "security.cookie_secret",
                validator: |config| match &config.security.cookie_secret {
                    Some(secret) if secret.len() < MIN_COOKIE_SECRET_BYTES => Err(anyhow::anyhow!(
                        "Cookie secret must be at least {} bytes",
                        MIN_COOKIE_SECRET_BYTES
                    )),
                    _ => Ok(()),
                },
            },
            ValidationRule {
                field_path: "logging.level",
                validator: |config| {
                    if config.logging.level.trim().is_empty() {
                        Err(anyhow::anyhow!("Log level cannot be empty"))
                    } else {
                        Ok(())
                    }
                },
            },
        ];

        Self { validation_rules }
    }

    /// 验证配置
    pub fn validate(&self, config: &TeleradConfig) -> Result<()> {
        for rule in &self.validation_rules {
            if let Err(e) = (rule.validator)(config) {
                error!("Configuration validation failed for {}: {}", rule.field_path, e);
                return Err(anyhow::anyhow!("Invalid {}: {}", rule.field_path, e));
            }
        }

        Ok(())
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl Default for TeleradConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            storage: StorageConfig::default(),
            security: SecurityConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            public_base_url: "http://localhost:8080".to_string(),
            max_upload_bytes: 512 * 1024 * 1024, // 512MB
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./data/telerad.db".to_string(),
            max_connections: 5,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            uploads_root: "./data/uploads".to_string(),
            reports_root: "./data/reports".to_string(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            cookie_secret: None,
            secure_cookies: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            ansi: true,
            with_target: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = TeleradConfig::default();
        assert!(ConfigValidator::new().validate(&config).is_ok());
        assert_eq!(config.bind_addr().unwrap().port(), 8080);
    }

    #[test]
    fn test_validator_rejects_bad_values() {
        let validator = ConfigValidator::new();

        let mut config = TeleradConfig::default();
        config.server.port = 0;
        assert!(validator.validate(&config).is_err());

        let mut config = TeleradConfig::default();
        config.storage.reports_root = config.storage.uploads_root.clone();
        assert!(validator.validate(&config).is_err());

        let mut config = TeleradConfig::default();
        config.storage.uploads_root = "  ".to_string();
        assert!(validator.validate(&config).is_err());

        let mut config = TeleradConfig::default();
        config.security.cookie_secret = Some("too-short".to_string());
        assert!(validator.validate(&config).is_err());

        let mut config = TeleradConfig::default();
        config.server.public_base_url = "telerad.example.org".to_string();
        assert!(validator.validate(&config).is_err());

        let mut config = TeleradConfig::default();
        config.server.max_upload_bytes = 0;
        assert!(validator.validate(&config).is_err());
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clinic.toml");
        std::fs::write(
            &path,
            r#"
[server]
port = 9443
public_base_url = "https://telerad.clinique-gagnoa.ci"

[storage]
uploads_root = "/srv/telerad/uploads"
reports_root = "/srv/telerad/rapports"
"#,
        )
        .unwrap();

        let config = TeleradConfig::load(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.server.port, 9443);
        assert_eq!(config.server.public_base_url, "https://telerad.clinique-gagnoa.ci");
        assert_eq!(config.storage.reports_root, "/srv/telerad/rapports");
        // 未出现在文件中的字段保持默认
        assert_eq!(config.server.host, "0.0.0.0");
        assert!(config.security.cookie_secret.is_none());
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        assert!(TeleradConfig::load(Some("/nonexistent/telerad-config.toml")).is_err());
    }
}
