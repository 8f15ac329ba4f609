//! 数据库模型

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::FromRow;
use telerad_core::models::*;
use telerad_core::{Result, TeleradError};

// 数据库表模型 - 使用FromRow trait用于SQL查询

/// 数据库用户表
#[derive(Debug, Clone, FromRow)]
pub struct DbUser {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub role: String, // 存储为字符串，转换为UserRole枚举
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbUser> for User {
    type Error = TeleradError;

    fn try_from(db_user: DbUser) -> Result<Self> {
        Ok(User {
            id: db_user.id,
            email: db_user.email,
            full_name: db_user.full_name,
            role: db_user.role.parse()?,
            created_at: db_user.created_at,
        })
    }
}

/// 数据库患者表
#[derive(Debug, FromRow)]
pub struct DbPatient {
    pub id: i64,
    pub surname: String,
    pub given_name: String,
    pub age: i32,
    pub diagnosis: String,
    pub requested_exam: String,
    pub patient_code: String,
    pub birth_date: Option<NaiveDate>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<DbPatient> for Patient {
    fn from(db_patient: DbPatient) -> Self {
        Patient {
            id: db_patient.id,
            surname: db_patient.surname,
            given_name: db_patient.given_name,
            age: db_patient.age,
            diagnosis: db_patient.diagnosis,
            requested_exam: db_patient.requested_exam,
            patient_code: db_patient.patient_code,
            birth_date: db_patient.birth_date,
            phone: db_patient.phone,
            created_at: db_patient.created_at,
        }
    }
}

/// 数据库检查表（影像路径另存于 exam_images）
#[derive(Debug, FromRow)]
pub struct DbExam {
    pub id: i64,
    pub patient_id: i64,
    pub technician_id: Option<i64>,
    pub physician_id: Option<i64>,
    pub print_agent_id: Option<i64>,
    pub status: String, // 存储为字符串，转换为ExamStatus枚举
    pub report_path: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    pub visualized_at: Option<DateTime<Utc>>,
    pub report_submitted_at: Option<DateTime<Utc>>,
    pub printed_at: Option<DateTime<Utc>>,
}

impl DbExam {
    pub fn into_exam(self, image_paths: Vec<String>) -> Result<Exam> {
        Ok(Exam {
            id: self.id,
            patient_id: self.patient_id,
            technician_id: self.technician_id,
            physician_id: self.physician_id,
            print_agent_id: self.print_agent_id,
            status: self.status.parse()?,
            image_paths,
            report_path: self.report_path,
            uploaded_at: self.uploaded_at,
            visualized_at: self.visualized_at,
            report_submitted_at: self.report_submitted_at,
            printed_at: self.printed_at,
        })
    }
}

// 插入模型 - 用于创建新记录

/// 新用户插入模型
#[derive(Debug)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub role: UserRole,
}

/// 新检查插入模型
#[derive(Debug)]
pub struct NewExam {
    pub patient_id: i64,
    pub technician_id: i64,
    pub physician_id: Option<i64>,
    pub status: ExamStatus,
    pub uploaded_at: DateTime<Utc>,
}

// 列表视图模型

/// 医生工作列表行
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PhysicianExamRow {
    pub id: i64,
    pub status: String,
    pub uploaded_at: DateTime<Utc>,
    pub visualized_at: Option<DateTime<Utc>>,
    pub report_submitted_at: Option<DateTime<Utc>>,
    pub report_path: Option<String>,
    pub patient_surname: String,
    pub patient_given_name: String,
    pub patient_code: String,
    pub image_count: i64,
}

/// 待打印报告行
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PrintQueueRow {
    pub id: i64,
    pub report_path: Option<String>,
    pub report_submitted_at: Option<DateTime<Utc>>,
    pub patient_surname: String,
    pub patient_given_name: String,
    pub patient_code: String,
    pub physician_name: String,
}

/// 管理员总览行
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ClinicExamRow {
    pub id: i64,
    pub status: String,
    pub uploaded_at: DateTime<Utc>,
    pub visualized_at: Option<DateTime<Utc>>,
    pub report_submitted_at: Option<DateTime<Utc>>,
    pub printed_at: Option<DateTime<Utc>>,
    pub report_path: Option<String>,
    pub patient_surname: String,
    pub patient_given_name: String,
    pub patient_code: String,
    pub technician_name: Option<String>,
    pub physician_name: Option<String>,
    pub print_agent_name: Option<String>,
}
