//! 核心数据模型定义

use crate::error::{Result, TeleradError};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 用户角色
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    /// 管理员 - 账户与记录管理
    Administrator,
    /// 技师 - 上传影像
    Technician,
    /// 医生 - 阅片并撰写报告
    Physician,
    /// 打印员 - 处理已完成报告
    PrintAgent,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Administrator => "admin",
            UserRole::Technician => "technician",
            UserRole::Physician => "physician",
            UserRole::PrintAgent => "print_agent",
        }
    }

    /// 登录后的角色首页
    pub fn home_path(&self) -> &'static str {
        match self {
            UserRole::Administrator => "/clinic",
            UserRole::Technician => "/technician",
            UserRole::Physician => "/physician",
            UserRole::PrintAgent => "/print-agent",
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserRole {
    type Err = TeleradError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "admin" | "administrator" => Ok(UserRole::Administrator),
            "technician" => Ok(UserRole::Technician),
            "physician" => Ok(UserRole::Physician),
            "print_agent" => Ok(UserRole::PrintAgent),
            other => Err(TeleradError::Validation(format!("unknown role: {}", other))),
        }
    }
}

/// 用户信息（不包含密码哈希）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub full_name: String,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

/// 请求上下文
///
/// 已认证用户的身份与角色，由Web层从会话中解析后显式传给各操作。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestContext {
    pub user_id: i64,
    pub role: UserRole,
    pub full_name: String,
    pub email: String,
}

impl From<&User> for RequestContext {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            role: user.role,
            full_name: user.full_name.clone(),
            email: user.email.clone(),
        }
    }
}

/// 患者信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: i64,
    pub surname: String,
    pub given_name: String,
    pub age: i32,
    pub diagnosis: String,
    pub requested_exam: String,
    pub patient_code: String,           // 对外公开的患者编号
    pub birth_date: Option<NaiveDate>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 新患者（技师提交）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPatient {
    pub surname: String,
    pub given_name: String,
    pub age: i32,
    pub diagnosis: String,
    pub requested_exam: String,
    pub birth_date: Option<NaiveDate>,
    pub phone: Option<String>,
}

impl NewPatient {
    /// 校验必填字段
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("surname", &self.surname),
            ("given_name", &self.given_name),
            ("diagnosis", &self.diagnosis),
            ("requested_exam", &self.requested_exam),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(TeleradError::Validation(format!("{} is required", field)));
            }
        }
        if !(0..=150).contains(&self.age) {
            return Err(TeleradError::Validation(format!("invalid age: {}", self.age)));
        }
        Ok(())
    }
}

/// 检查状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExamStatus {
    Uploaded,  // 已上传，未指定医生
    Assigned,  // 已指定医生
    Completed, // 报告已生成
}

impl ExamStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExamStatus::Uploaded => "UPLOADED",
            ExamStatus::Assigned => "ASSIGNED",
            ExamStatus::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for ExamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExamStatus {
    type Err = TeleradError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "UPLOADED" => Ok(ExamStatus::Uploaded),
            "ASSIGNED" => Ok(ExamStatus::Assigned),
            "COMPLETED" => Ok(ExamStatus::Completed),
            other => Err(TeleradError::Internal(format!("unknown exam status: {}", other))),
        }
    }
}

/// 影像检查
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exam {
    pub id: i64,
    pub patient_id: i64,
    pub technician_id: Option<i64>,
    pub physician_id: Option<i64>,
    pub print_agent_id: Option<i64>,
    pub status: ExamStatus,
    pub image_paths: Vec<String>,       // 按上传顺序
    pub report_path: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    pub visualized_at: Option<DateTime<Utc>>,
    pub report_submitted_at: Option<DateTime<Utc>>,
    pub printed_at: Option<DateTime<Utc>>,
}

impl Exam {
    pub fn is_printed(&self) -> bool {
        self.printed_at.is_some()
    }

    pub fn is_assigned_to(&self, user_id: i64) -> bool {
        self.physician_id == Some(user_id)
    }
}

/// 上传的影像文件
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub data: Vec<u8>,
}

/// 报告文本字段
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReportFields {
    pub exam_date: String,
    pub age: String,
    pub requested_exam: String,
    pub technique: String,
    pub findings: String,
    pub conclusion: String,
}

impl ReportFields {
    /// 六个字段均为必填
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("exam_date", &self.exam_date),
            ("age", &self.age),
            ("requested_exam", &self.requested_exam),
            ("technique", &self.technique),
            ("findings", &self.findings),
            ("conclusion", &self.conclusion),
        ];
        match fields.iter().find(|(_, value)| value.trim().is_empty()) {
            Some((field, _)) => Err(TeleradError::Validation(format!("{} is required", field))),
            None => Ok(()),
        }
    }
}
