//! 账户管理
//!
//! 密码以 Argon2 PHC 字符串保存。账户只有创建和删除两种操作，不做原地修改；
//! 管理员账户不能通过常规流程删除。

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use serde::Deserialize;
use std::sync::Arc;
use telerad_core::utils::{Clock, SystemClock};
use telerad_core::{RequestContext, Result, TeleradError, User, UserRole};
use telerad_database::{DatabasePool, DatabaseQueries, NewUser};
use tracing::{info, warn};

use crate::access::authorize;

/// 新账户
#[derive(Debug, Clone, Deserialize)]
pub struct NewAccount {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub role: UserRole,
}

impl NewAccount {
    fn validate(&self) -> Result<()> {
        let email = self.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(TeleradError::Validation("a valid email is required".to_string()));
        }
        if self.password.is_empty() {
            return Err(TeleradError::Validation("password is required".to_string()));
        }
        if self.full_name.trim().is_empty() {
            return Err(TeleradError::Validation("full_name is required".to_string()));
        }
        Ok(())
    }
}

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| TeleradError::Internal(format!("Failed to hash password: {}", e)))
}

pub fn verify_password(password: &str, password_hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(password_hash)
        .map_err(|e| TeleradError::Internal(format!("Invalid password hash: {}", e)))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(TeleradError::Internal(format!("Password verification error: {}", e))),
    }
}

/// 账户服务
#[derive(Clone)]
pub struct AccountService {
    db: DatabasePool,
    clock: Arc<dyn Clock>,
}

impl AccountService {
    pub fn new(db: DatabasePool) -> Self {
        Self::with_clock(db, Arc::new(SystemClock))
    }

    pub fn with_clock(db: DatabasePool, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// 邮箱加密码登录
    ///
    /// 邮箱不存在和密码错误返回同一个提示。
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<RequestContext> {
        let queries = DatabaseQueries::new(&self.db);
        let invalid = || TeleradError::AccessDenied("invalid email or password".to_string());

        let Some(db_user) = queries.get_credentials_by_email(email.trim()).await? else {
            warn!("Login attempt for unknown email");
            return Err(invalid());
        };

        if !verify_password(password, &db_user.password_hash)? {
            warn!("Wrong password for user {}", db_user.id);
            return Err(invalid());
        }

        let user = User::try_from(db_user)?;
        info!("User {} logged in as {}", user.id, user.role);
        Ok(RequestContext::from(&user))
    }

    /// 公开注册，不允许注册管理员
    pub async fn register(&self, account: NewAccount) -> Result<User> {
        if account.role == UserRole::Administrator {
            return Err(TeleradError::Validation(
                "administrator accounts cannot be self-registered".to_string(),
            ));
        }
        self.insert(account).await
    }

    /// 管理员创建账户
    pub async fn create_user(&self, ctx: &RequestContext, account: NewAccount) -> Result<User> {
        let admin = authorize(UserRole::Administrator, Some(ctx))?;
        let user = self.insert(account).await?;
        info!("Administrator {} created user {} ({})", admin.user_id, user.id, user.role);
        Ok(user)
    }

    /// 命令行初始化管理员
    pub async fn create_administrator(&self, email: &str, password: &str, full_name: &str) -> Result<User> {
        self.insert(NewAccount {
            email: email.to_string(),
            password: password.to_string(),
            full_name: full_name.to_string(),
            role: UserRole::Administrator,
        })
        .await
    }

    /// 管理员删除账户
    pub async fn delete_user(&self, ctx: &RequestContext, user_id: i64) -> Result<()> {
        authorize(UserRole::Administrator, Some(ctx))?;
        let queries = DatabaseQueries::new(&self.db);

        let user = queries
            .get_user_by_id(user_id)
            .await?
            .ok_or_else(|| TeleradError::NotFound(format!("user #{} not found", user_id)))?;

        if user.role == UserRole::Administrator {
            return Err(TeleradError::AccessDenied(
                "administrator accounts cannot be deleted".to_string(),
            ));
        }

        queries.delete_user(user_id).await?;
        info!("Administrator {} deleted user {}", ctx.user_id, user_id);
        Ok(())
    }

    pub async fn list_users(&self, ctx: &RequestContext) -> Result<Vec<User>> {
        authorize(UserRole::Administrator, Some(ctx))?;
        DatabaseQueries::new(&self.db).list_users().await
    }

    /// 技师上传表单中的医生列表
    pub async fn list_physicians(&self, ctx: &RequestContext) -> Result<Vec<User>> {
        authorize(UserRole::Technician, Some(ctx))?;
        DatabaseQueries::new(&self.db).list_users_by_role(UserRole::Physician).await
    }

    async fn insert(&self, account: NewAccount) -> Result<User> {
        account.validate()?;

        let new_user = NewUser {
            email: account.email.trim().to_string(),
            password_hash: hash_password(&account.password)?,
            full_name: account.full_name.trim().to_string(),
            role: account.role,
        };

        let queries = DatabaseQueries::new(&self.db);
        let id = queries.create_user(&new_user, self.clock.now()).await?;
        queries
            .get_user_by_id(id)
            .await?
            .ok_or_else(|| TeleradError::Internal(format!("user #{} vanished after insert", id)))
    }
}
