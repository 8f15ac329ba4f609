//! # Telerad工作流模块
//!
//! 提供影像检查从上传到报告的完整工作流管理，包括：
//! - 检查状态机：上传 -> 指定医生 -> 报告完成
//! - 访问控制：按角色放行各页面与操作
//! - 账户管理：注册、登录、管理员增删账户
//! - 报告生成：把医生填写的文本生成 Word 文档并归档
//! - 工作列表：医生、打印员和管理员各自的列表

pub mod access;
pub mod accounts;
pub mod engine;
pub mod report;
pub mod state_machine;
pub mod worklist;

// 重新导出主要类型
pub use access::{authorize, ensure_assigned};
pub use accounts::{hash_password, verify_password, AccountService, NewAccount};
pub use engine::{download_url, CreateExamRequest, CreatedExam, ExamView, ExamWorkflow, ManifestEntry};
pub use report::ReportGenerator;
pub use state_machine::{ExamEvent, ExamStateMachine};
pub use worklist::{ClinicOverview, ClinicStats, WorkListManager};
