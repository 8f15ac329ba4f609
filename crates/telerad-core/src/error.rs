//! 错误定义模块

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// 唯一约束
///
/// 区分是哪一个唯一键发生冲突，调用方据此给出不同提示。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UniqueConstraint {
    /// 用户邮箱
    UserEmail,
    /// 患者公开编号
    PatientCode,
}

impl UniqueConstraint {
    /// 从 SQLite 的约束错误信息中识别冲突字段
    ///
    /// SQLite 报告格式为 `UNIQUE constraint failed: users.email`
    pub fn from_message(message: &str) -> Option<Self> {
        if message.contains("users.email") {
            Some(UniqueConstraint::UserEmail)
        } else if message.contains("patients.patient_code") {
            Some(UniqueConstraint::PatientCode)
        } else {
            None
        }
    }
}

impl fmt::Display for UniqueConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniqueConstraint::UserEmail => write!(f, "an account with this email already exists"),
            UniqueConstraint::PatientCode => write!(f, "patient code already in use"),
        }
    }
}

/// 系统统一错误类型
#[derive(Error, Debug)]
pub enum TeleradError {
    #[error("验证错误: {0}")]
    Validation(String),

    #[error("访问被拒绝: {0}")]
    AccessDenied(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("唯一约束冲突: {0}")]
    Conflict(UniqueConstraint),

    #[error("IO错误: {0}")]
    Io(String),

    #[error("数据库错误: {0}")]
    Database(String),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("无效状态转换: 从 {from} 经 {event}")]
    InvalidStateTransition { from: String, event: String },

    #[error("系统内部错误: {0}")]
    Internal(String),
}

impl TeleradError {
    /// 面向用户的简短提示，不泄露内部细节
    pub fn notice(&self) -> String {
        match self {
            TeleradError::Validation(msg)
            | TeleradError::AccessDenied(msg)
            | TeleradError::NotFound(msg) => msg.clone(),
            TeleradError::Conflict(constraint) => constraint.to_string(),
            TeleradError::InvalidStateTransition { from, event } => {
                format!("operation {} not allowed while exam is {}", event, from)
            }
            TeleradError::Io(_) => "operation failed while writing files".to_string(),
            TeleradError::Database(_) | TeleradError::Config(_) | TeleradError::Internal(_) => {
                "operation failed".to_string()
            }
        }
    }
}

impl From<std::io::Error> for TeleradError {
    fn from(err: std::io::Error) -> Self {
        TeleradError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for TeleradError {
    fn from(err: serde_json::Error) -> Self {
        TeleradError::Internal(format!("serialization: {}", err))
    }
}

#[cfg(feature = "database")]
impl From<sqlx::Error> for TeleradError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => TeleradError::NotFound("record not found".to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                match UniqueConstraint::from_message(db_err.message()) {
                    Some(constraint) => TeleradError::Conflict(constraint),
                    None => TeleradError::Database(err.to_string()),
                }
            }
            _ => TeleradError::Database(err.to_string()),
        }
    }
}

/// 系统统一结果类型
pub type Result<T> = std::result::Result<T, TeleradError>;
