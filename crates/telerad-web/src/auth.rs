//! 会话认证
//!
//! 登录成功后把请求上下文写入加密的私有 Cookie；之后的请求从 Cookie
//! 还原 [`Session`]，各操作再按角色做检查。

use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Json},
};
use axum_extra::extract::cookie::{Cookie, PrivateCookieJar, SameSite};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use telerad_core::{RequestContext, TeleradError, User};
use telerad_workflow::NewAccount;
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::server::AppState;

pub const SESSION_COOKIE: &str = "session";

/// 会话有效期
const SESSION_TTL_HOURS: i64 = 12;

/// Cookie 中保存的会话内容
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredSession {
    context: RequestContext,
    expires_at: DateTime<Utc>,
}

impl StoredSession {
    fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// 已登录用户
#[derive(Debug, Clone)]
pub struct Session(pub RequestContext);

#[async_trait]
impl FromRequestParts<AppState> for Session {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let jar = PrivateCookieJar::from_headers(&parts.headers, state.key.clone());
        jar.get(SESSION_COOKIE)
            .and_then(|cookie| serde_json::from_str::<StoredSession>(cookie.value()).ok())
            .filter(|session| !session.is_expired())
            .map(|session| Session(session.context))
            .ok_or_else(|| ApiError(TeleradError::AccessDenied("access denied".to_string())))
    }
}

/// 登录请求
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

fn session_cookie(value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, value))
        .path("/")
        .secure(secure)
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// 登录处理器
pub async fn login_handler(
    State(state): State<AppState>,
    jar: PrivateCookieJar,
    Json(request): Json<LoginRequest>,
) -> ApiResult<(PrivateCookieJar, Json<serde_json::Value>)> {
    let context = state.accounts.authenticate(&request.email, &request.password).await?;

    let stored = StoredSession {
        context: context.clone(),
        expires_at: Utc::now() + Duration::hours(SESSION_TTL_HOURS),
    };
    let value = serde_json::to_string(&stored).map_err(TeleradError::from)?;
    let jar = jar.add(session_cookie(value, state.settings.secure_cookies));

    Ok((
        jar,
        Json(json!({
            "user": context,
            "redirect": context.role.home_path(),
        })),
    ))
}

/// 公开注册
pub async fn register_handler(
    State(state): State<AppState>,
    Json(account): Json<NewAccount>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let user = state.accounts.register(account).await?;
    info!("Registered user {} as {}", user.id, user.role);
    Ok((StatusCode::CREATED, Json(user)))
}

/// 注销
pub async fn logout_handler(jar: PrivateCookieJar) -> impl IntoResponse {
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, Json(json!({ "logged_out": true })))
}

/// 当前会话
pub async fn current_session(Session(context): Session) -> Json<RequestContext> {
    Json(context)
}

/// 首页：按角色跳转，未登录则去登录
pub async fn home(session: Option<Session>) -> Json<serde_json::Value> {
    match session {
        Some(Session(context)) => Json(json!({
            "authenticated": true,
            "redirect": context.role.home_path(),
        })),
        None => Json(json!({
            "authenticated": false,
            "redirect": "/auth/login",
        })),
    }
}
