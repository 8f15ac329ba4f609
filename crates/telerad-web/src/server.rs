//! Web服务器

use axum::{
    extract::{DefaultBodyLimit, FromRef},
    routing::{delete, get, post},
    Router,
};
use axum_extra::extract::cookie::Key;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use telerad_core::{Result, TeleradError};
use telerad_database::DatabasePool;
use telerad_storage::{DownloadResolver, StorageManager};
use telerad_workflow::{AccountService, ExamWorkflow, WorkListManager};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::auth::{current_session, home, login_handler, logout_handler, register_handler};
use crate::files::download_file;
use crate::handlers::{
    assign_physician, clinic_overview, create_exam, create_user, delete_exam, delete_user, health,
    list_physicians, mark_printed, physician_worklist, print_queue, report_defaults, submit_report,
    view_exam,
};

/// Web层设置
#[derive(Debug, Clone)]
pub struct WebSettings {
    /// 生成下载地址用的外部地址
    pub public_base_url: String,
    pub secure_cookies: bool,
    pub max_upload_bytes: usize,
    pub uploads_root: PathBuf,
    pub reports_root: PathBuf,
}

/// 应用状态
#[derive(Clone)]
pub struct AppState {
    pub workflow: Arc<ExamWorkflow>,
    pub accounts: AccountService,
    pub worklists: WorkListManager,
    pub downloads: Arc<DownloadResolver>,
    pub settings: Arc<WebSettings>,
    pub key: Key,
}

impl FromRef<AppState> for Key {
    fn from_ref(state: &AppState) -> Self {
        state.key.clone()
    }
}

impl AppState {
    pub fn new(db: DatabasePool, settings: WebSettings, key: Key) -> Result<Self> {
        let downloads = DownloadResolver::new([&settings.uploads_root, &settings.reports_root])?;
        let workflow = ExamWorkflow::new(
            db.clone(),
            StorageManager::new(settings.uploads_root.clone()),
            StorageManager::new(settings.reports_root.clone()),
        );

        Ok(Self {
            workflow: Arc::new(workflow),
            accounts: AccountService::new(db.clone()),
            worklists: WorkListManager::new(db),
            downloads: Arc::new(downloads),
            settings: Arc::new(settings),
            key,
        })
    }
}

/// 会话 Cookie 密钥
///
/// 未配置密钥时随机生成，重启后已有会话失效。
pub fn session_key(secret: Option<&str>) -> Result<Key> {
    match secret {
        Some(secret) => Key::try_from(secret.as_bytes())
            .map_err(|e| TeleradError::Config(format!("Invalid cookie secret: {}", e))),
        None => {
            warn!("No cookie secret configured, sessions will not survive a restart");
            Ok(Key::generate())
        }
    }
}

pub struct WebServer {
    addr: SocketAddr,
    app: Router,
}

impl WebServer {
    pub fn new(addr: SocketAddr, state: AppState) -> Self {
        let app = create_app(state);
        Self { addr, app }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        info!("Starting web server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.app)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to start web server: {}", e))?;

        Ok(())
    }
}

/// 组装路由
pub fn create_app(state: AppState) -> Router {
    let max_upload = state.settings.max_upload_bytes;

    Router::new()
        // 根路径
        .route("/", get(home))
        // 健康检查
        .route("/health", get(health))
        // 认证路由
        .merge(auth_routes())
        // 各角色页面
        .merge(technician_routes())
        .merge(physician_routes())
        .merge(print_agent_routes())
        .merge(clinic_routes())
        // 文件下载
        .route("/download/*path", get(download_file))
        .layer(DefaultBodyLimit::max(max_upload))
        // 全局中间件
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .with_state(state)
}

fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login_handler))
        .route("/auth/register", post(register_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/auth/me", get(current_session))
}

fn technician_routes() -> Router<AppState> {
    Router::new()
        .route("/technician/physicians", get(list_physicians))
        .route("/technician/exams", post(create_exam))
}

fn physician_routes() -> Router<AppState> {
    Router::new()
        .route("/physician/exams", get(physician_worklist))
        .route("/physician/exams/:id", get(view_exam))
        .route("/physician/exams/:id/report-defaults", get(report_defaults))
        .route("/physician/exams/:id/report", post(submit_report))
}

fn print_agent_routes() -> Router<AppState> {
    Router::new()
        .route("/print-agent/reports", get(print_queue))
        .route("/print-agent/reports/:id/printed", post(mark_printed))
}

fn clinic_routes() -> Router<AppState> {
    Router::new()
        .route("/clinic", get(clinic_overview))
        .route("/clinic/users", post(create_user))
        .route("/clinic/users/:id", delete(delete_user))
        .route("/clinic/exams/:id/assign", post(assign_physician))
        .route("/clinic/exams/:id", delete(delete_exam))
}
