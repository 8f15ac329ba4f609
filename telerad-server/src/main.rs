//! Telerad服务器主程序

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use telerad_admin::{init_logging, ConfigValidator, TeleradConfig};
use telerad_database::{DatabasePool, DatabaseQueries};
use telerad_web::{session_key, AppState, WebServer, WebSettings};
use telerad_workflow::AccountService;
use tracing::{error, info};

/// Telerad服务器命令行参数
#[derive(Parser, Debug)]
#[command(name = "telerad-server")]
#[command(about = "放射科检查流转服务：影像上传、阅片、报告与打印")]
struct Args {
    /// 配置文件路径
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 启动HTTP服务
    Serve {
        /// 监听端口，覆盖配置
        #[arg(short, long)]
        port: Option<u16>,

        /// 日志级别，覆盖配置
        #[arg(short, long)]
        log_level: Option<String>,
    },
    /// 创建管理员账户
    CreateAdmin {
        #[arg(long)]
        email: String,

        #[arg(long)]
        password: String,

        #[arg(long)]
        full_name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = TeleradConfig::load(args.config.as_deref())?;

    match args.command {
        Command::Serve { port, log_level } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(level) = log_level {
                config.logging.level = level;
            }
            ConfigValidator::new().validate(&config)?;
            init_logging(&config.logging)?;

            if let Err(e) = serve(config).await {
                error!("服务器启动失败: {:#}", e);
                return Err(e);
            }
        }
        Command::CreateAdmin {
            email,
            password,
            full_name,
        } => {
            init_logging(&config.logging)?;
            let db = open_database(&config).await?;
            let admin = AccountService::new(db)
                .create_administrator(&email, &password, &full_name)
                .await
                .context("Failed to create administrator")?;
            info!("Administrator {} created with id {}", admin.email, admin.id);
        }
    }

    Ok(())
}

async fn serve(config: TeleradConfig) -> Result<()> {
    info!("启动Telerad服务器...");
    info!("  监听地址: {}:{}", config.server.host, config.server.port);
    info!("  影像目录: {}", config.storage.uploads_root);
    info!("  报告目录: {}", config.storage.reports_root);

    for root in [&config.storage.uploads_root, &config.storage.reports_root] {
        tokio::fs::create_dir_all(root)
            .await
            .with_context(|| format!("Failed to create storage root {}", root))?;
    }

    let db = open_database(&config).await?;
    let key = session_key(config.security.cookie_secret.as_deref())?;
    let settings = WebSettings {
        public_base_url: config.server.public_base_url.clone(),
        secure_cookies: config.security.secure_cookies,
        max_upload_bytes: config.server.max_upload_bytes,
        uploads_root: PathBuf::from(&config.storage.uploads_root),
        reports_root: PathBuf::from(&config.storage.reports_root),
    };

    let state = AppState::new(db, settings, key)?;
    WebServer::new(config.bind_addr()?, state).run().await
}

/// 连接数据库并建表
async fn open_database(config: &TeleradConfig) -> Result<DatabasePool> {
    if let Some(dir) = sqlite_parent_dir(&config.database.url) {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create database directory {}", dir.display()))?;
    }

    let db = DatabasePool::connect(&config.database.url, config.database.max_connections)
        .await
        .with_context(|| format!("Failed to open database {}", config.database.url))?;
    DatabaseQueries::new(&db).create_tables().await?;
    Ok(db)
}

/// SQLite 文件所在目录，内存库返回 None
fn sqlite_parent_dir(url: &str) -> Option<&Path> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() || path.starts_with(":memory:") {
        return None;
    }
    Path::new(path).parent().filter(|p| !p.as_os_str().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_parent_dir() {
        assert_eq!(sqlite_parent_dir("sqlite://./data/telerad.db"), Some(Path::new("./data")));
        assert_eq!(sqlite_parent_dir("sqlite:/var/lib/telerad/db.sqlite?mode=rwc"), Some(Path::new("/var/lib/telerad")));
        assert_eq!(sqlite_parent_dir("sqlite::memory:"), None);
        assert_eq!(sqlite_parent_dir("sqlite://telerad.db"), None);
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let args = Args::try_parse_from(["telerad-server", "serve", "--port", "9000"]).unwrap();
        assert!(matches!(args.command, Command::Serve { port: Some(9000), .. }));

        let args = Args::try_parse_from([
            "telerad-server",
            "--config",
            "clinic.toml",
            "create-admin",
            "--email",
            "admin@clinic.ci",
            "--password",
            "Clinique123!",
            "--full-name",
            "Administrateur",
        ])
        .unwrap();
        assert_eq!(args.config.as_deref(), Some("clinic.toml"));
        assert!(matches!(args.command, Command::CreateAdmin { .. }));
    }
}
