//! # Telerad数据库模块
//!
//! 负责用户、患者和检查记录的存储，提供SQLite连接池和完整的CRUD操作。

pub mod connection;
pub mod models;
pub mod queries;

// 重新导出主要类型
pub use connection::DatabasePool;
pub use models::*;
pub use queries::DatabaseQueries;
