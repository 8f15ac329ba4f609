//! 通用工具函数

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

/// 生成对外公开的患者编号，格式 `P{YYYYMMDD}-{8位大写十六进制}`
pub fn generate_patient_code(date: NaiveDate) -> String {
    let suffix: String = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
    format!("P{}-{}", date.format("%Y%m%d"), suffix)
}

/// 验证患者编号格式
pub fn is_valid_patient_code(code: &str) -> bool {
    let Some(rest) = code.strip_prefix('P') else {
        return false;
    };
    let Some((date, suffix)) = rest.split_once('-') else {
        return false;
    };
    NaiveDate::parse_from_str(date, "%Y%m%d").is_ok()
        && suffix.len() == 8
        && suffix.chars().all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
}

/// 清理上传文件名：空格、路径分隔符和 `..` 替换为下划线
///
/// 清理后为空或只剩点号时返回 `None`。结果不含 `..`，可以经下载接口取回。
pub fn sanitize_file_name(name: &str) -> Option<String> {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            ' ' | '/' | '\\' => '_',
            other => other,
        })
        .collect();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        None
    } else {
        Some(cleaned.replace("..", "_"))
    }
}

/// 时钟
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// 系统时钟
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
