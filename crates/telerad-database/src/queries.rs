//! 数据库查询操作

use crate::connection::DatabasePool;
use crate::models::*;
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use telerad_core::{Exam, ExamStatus, NewPatient, Patient, Result, User, UserRole};

/// 数据库查询操作接口
pub struct DatabaseQueries<'a> {
    pool: &'a DatabasePool,
}

impl<'a> DatabaseQueries<'a> {
    pub fn new(pool: &'a DatabasePool) -> Self {
        Self { pool }
    }

    /// 创建数据库表
    pub async fn create_tables(&self) -> Result<()> {
        let pool = self.pool.pool();

        // 创建用户表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                full_name TEXT NOT NULL,
                role TEXT NOT NULL CHECK(role IN ('admin', 'technician', 'physician', 'print_agent')),
                created_at TEXT NOT NULL
            )
        "#).execute(pool).await?;

        // 创建患者表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS patients (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                surname TEXT NOT NULL,
                given_name TEXT NOT NULL,
                age INTEGER NOT NULL,
                diagnosis TEXT NOT NULL,
                requested_exam TEXT NOT NULL,
                patient_code TEXT UNIQUE NOT NULL,
                birth_date TEXT,
                phone TEXT,
                created_at TEXT NOT NULL
            )
        "#).execute(pool).await?;

        // 创建检查表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS exams (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                patient_id INTEGER NOT NULL REFERENCES patients(id),
                technician_id INTEGER REFERENCES users(id) ON DELETE SET NULL,
                physician_id INTEGER REFERENCES users(id) ON DELETE SET NULL,
                print_agent_id INTEGER REFERENCES users(id) ON DELETE SET NULL,
                status TEXT NOT NULL DEFAULT 'UPLOADED'
                    CHECK(status IN ('UPLOADED', 'ASSIGNED', 'COMPLETED')),
                report_path TEXT,
                uploaded_at TEXT NOT NULL,
                visualized_at TEXT,
                report_submitted_at TEXT,
                printed_at TEXT,
                CHECK((report_path IS NULL) = (report_submitted_at IS NULL))
            )
        "#).execute(pool).await?;

        // 创建检查影像表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS exam_images (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                exam_id INTEGER NOT NULL REFERENCES exams(id) ON DELETE CASCADE,
                position INTEGER NOT NULL,
                file_path TEXT NOT NULL,
                UNIQUE(exam_id, position)
            )
        "#).execute(pool).await?;

        self.create_indexes().await?;

        tracing::info!("Database tables created successfully");
        Ok(())
    }

    /// 创建数据库索引
    async fn create_indexes(&self) -> Result<()> {
        let pool = self.pool.pool();

        let indexes = vec![
            "CREATE INDEX IF NOT EXISTS idx_users_role ON users(role)",
            "CREATE INDEX IF NOT EXISTS idx_exams_patient_id ON exams(patient_id)",
            "CREATE INDEX IF NOT EXISTS idx_exams_physician_id ON exams(physician_id)",
            "CREATE INDEX IF NOT EXISTS idx_exams_status ON exams(status)",
            "CREATE INDEX IF NOT EXISTS idx_exam_images_exam_id ON exam_images(exam_id)",
        ];

        for index_sql in indexes {
            sqlx::query(index_sql).execute(pool).await?;
        }

        tracing::debug!("Database indexes created successfully");
        Ok(())
    }

    // ========== 用户相关操作 ==========

    /// 创建新用户，邮箱重复时返回 `Conflict(UserEmail)`
    pub async fn create_user(&self, user: &NewUser, created_at: DateTime<Utc>) -> Result<i64> {
        let result = sqlx::query(
            "INSERT INTO users (email, password_hash, full_name, role, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.full_name)
        .bind(user.role.as_str())
        .bind(created_at)
        .execute(self.pool.pool())
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// 根据ID查找用户
    pub async fn get_user_by_id(&self, id: i64) -> Result<Option<User>> {
        let result = sqlx::query_as::<_, DbUser>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await?;

        result.map(User::try_from).transpose()
    }

    /// 根据邮箱查找用户（含密码哈希，仅用于认证）
    pub async fn get_credentials_by_email(&self, email: &str) -> Result<Option<DbUser>> {
        Ok(sqlx::query_as::<_, DbUser>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(self.pool.pool())
            .await?)
    }

    /// 全部用户，按角色和姓名排序
    pub async fn list_users(&self) -> Result<Vec<User>> {
        let results = sqlx::query_as::<_, DbUser>("SELECT * FROM users ORDER BY role, full_name")
            .fetch_all(self.pool.pool())
            .await?;

        results.into_iter().map(User::try_from).collect()
    }

    /// 某一角色的用户
    pub async fn list_users_by_role(&self, role: UserRole) -> Result<Vec<User>> {
        let results = sqlx::query_as::<_, DbUser>(
            "SELECT * FROM users WHERE role = ? ORDER BY full_name",
        )
        .bind(role.as_str())
        .fetch_all(self.pool.pool())
        .await?;

        results.into_iter().map(User::try_from).collect()
    }

    /// 删除用户，返回受影响行数
    pub async fn delete_user(&self, id: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(self.pool.pool())
            .await?;
        Ok(result.rows_affected())
    }

    // ========== 患者相关操作 ==========

    /// 插入患者（在事务连接上执行）
    pub async fn insert_patient(
        conn: &mut SqliteConnection,
        patient: &NewPatient,
        patient_code: &str,
        created_at: DateTime<Utc>,
    ) -> Result<i64> {
        let result = sqlx::query(r#"
            INSERT INTO patients (surname, given_name, age, diagnosis, requested_exam, patient_code, birth_date, phone, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#)
        .bind(&patient.surname)
        .bind(&patient.given_name)
        .bind(patient.age)
        .bind(&patient.diagnosis)
        .bind(&patient.requested_exam)
        .bind(patient_code)
        .bind(patient.birth_date)
        .bind(&patient.phone)
        .bind(created_at)
        .execute(&mut *conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// 根据ID查找患者
    pub async fn get_patient_by_id(&self, id: i64) -> Result<Option<Patient>> {
        let result = sqlx::query_as::<_, DbPatient>("SELECT * FROM patients WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool.pool())
            .await?;

        Ok(result.map(Patient::from))
    }

    /// 根据公开编号查找患者
    pub async fn get_patient_by_code(&self, patient_code: &str) -> Result<Option<Patient>> {
        let result = sqlx::query_as::<_, DbPatient>("SELECT * FROM patients WHERE patient_code = ?")
            .bind(patient_code)
            .fetch_optional(self.pool.pool())
            .await?;

        Ok(result.map(Patient::from))
    }

    pub async fn count_patients(&self) -> Result<i64> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM patients")
            .fetch_one(self.pool.pool())
            .await?)
    }

    // ========== 检查相关操作 ==========

    /// 插入检查及其影像路径（在事务连接上执行）
    pub async fn insert_exam(
        conn: &mut SqliteConnection,
        exam: &NewExam,
        image_paths: &[String],
    ) -> Result<i64> {
        let result = sqlx::query(r#"
            INSERT INTO exams (patient_id, technician_id, physician_id, status, uploaded_at)
            VALUES (?, ?, ?, ?, ?)
        "#)
        .bind(exam.patient_id)
        .bind(exam.technician_id)
        .bind(exam.physician_id)
        .bind(exam.status.as_str())
        .bind(exam.uploaded_at)
        .execute(&mut *conn)
        .await?;

        let exam_id = result.last_insert_rowid();

        for (position, path) in image_paths.iter().enumerate() {
            sqlx::query("INSERT INTO exam_images (exam_id, position, file_path) VALUES (?, ?, ?)")
                .bind(exam_id)
                .bind(position as i64)
                .bind(path)
                .execute(&mut *conn)
                .await?;
        }

        Ok(exam_id)
    }

    /// 根据ID查找检查
    pub async fn get_exam(&self, id: i64) -> Result<Option<Exam>> {
        let pool = self.pool.pool();

        let Some(db_exam) = sqlx::query_as::<_, DbExam>("SELECT * FROM exams WHERE id = ?")
            .bind(id)
            .fetch_optional(pool)
            .await?
        else {
            return Ok(None);
        };

        let image_paths: Vec<String> = sqlx::query_scalar(
            "SELECT file_path FROM exam_images WHERE exam_id = ? ORDER BY position",
        )
        .bind(id)
        .fetch_all(pool)
        .await?;

        db_exam.into_exam(image_paths).map(Some)
    }

    /// 首次阅片时间，已有值时不覆盖
    pub async fn mark_visualized(&self, id: i64, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE exams SET visualized_at = ? WHERE id = ? AND visualized_at IS NULL",
        )
        .bind(at)
        .bind(id)
        .execute(self.pool.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// 指定医生
    pub async fn assign_physician(&self, id: i64, physician_id: i64, status: ExamStatus) -> Result<()> {
        sqlx::query("UPDATE exams SET physician_id = ?, status = ? WHERE id = ?")
            .bind(physician_id)
            .bind(status.as_str())
            .bind(id)
            .execute(self.pool.pool())
            .await?;
        Ok(())
    }

    /// 报告提交：路径、提交时间与状态一起写入，并清除打印记录使新报告重新进入打印队列
    pub async fn record_report(
        &self,
        id: i64,
        report_path: &str,
        submitted_at: DateTime<Utc>,
        status: ExamStatus,
    ) -> Result<()> {
        sqlx::query(r#"
            UPDATE exams
            SET report_path = ?, report_submitted_at = ?, status = ?,
                printed_at = NULL, print_agent_id = NULL
            WHERE id = ?
        "#)
        .bind(report_path)
        .bind(submitted_at)
        .bind(status.as_str())
        .bind(id)
        .execute(self.pool.pool())
        .await?;
        Ok(())
    }

    /// 标记已打印，只对已完成且未打印的检查生效
    pub async fn mark_printed(&self, id: i64, print_agent_id: i64, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(r#"
            UPDATE exams SET printed_at = ?, print_agent_id = ?
            WHERE id = ? AND status = 'COMPLETED' AND printed_at IS NULL
        "#)
        .bind(at)
        .bind(print_agent_id)
        .bind(id)
        .execute(self.pool.pool())
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// 删除检查及其影像记录，返回删除的检查行数
    pub async fn delete_exam(&self, id: i64) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM exam_images WHERE exam_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM exams WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }

    // ========== 工作列表 ==========

    /// 医生的检查，最新上传在前
    pub async fn physician_worklist(&self, physician_id: i64) -> Result<Vec<PhysicianExamRow>> {
        Ok(sqlx::query_as::<_, PhysicianExamRow>(r#"
            SELECT e.id, e.status, e.uploaded_at, e.visualized_at, e.report_submitted_at, e.report_path,
                   p.surname AS patient_surname, p.given_name AS patient_given_name, p.patient_code,
                   (SELECT COUNT(*) FROM exam_images i WHERE i.exam_id = e.id) AS image_count
            FROM exams e
            JOIN patients p ON e.patient_id = p.id
            WHERE e.physician_id = ?
            ORDER BY e.uploaded_at DESC, e.id DESC
        "#)
        .bind(physician_id)
        .fetch_all(self.pool.pool())
        .await?)
    }

    /// 已完成且未打印的报告，最新提交在前
    pub async fn print_queue(&self) -> Result<Vec<PrintQueueRow>> {
        Ok(sqlx::query_as::<_, PrintQueueRow>(r#"
            SELECT e.id, e.report_path, e.report_submitted_at,
                   p.surname AS patient_surname, p.given_name AS patient_given_name, p.patient_code,
                   u.full_name AS physician_name
            FROM exams e
            JOIN patients p ON e.patient_id = p.id
            JOIN users u ON e.physician_id = u.id
            WHERE e.status = 'COMPLETED' AND e.printed_at IS NULL
            ORDER BY e.report_submitted_at DESC, e.id DESC
        "#)
        .fetch_all(self.pool.pool())
        .await?)
    }

    /// 全部检查及相关人员姓名
    pub async fn clinic_exams(&self) -> Result<Vec<ClinicExamRow>> {
        Ok(sqlx::query_as::<_, ClinicExamRow>(r#"
            SELECT e.id, e.status, e.uploaded_at, e.visualized_at, e.report_submitted_at, e.printed_at,
                   e.report_path,
                   p.surname AS patient_surname, p.given_name AS patient_given_name, p.patient_code,
                   t.full_name AS technician_name,
                   ph.full_name AS physician_name,
                   pa.full_name AS print_agent_name
            FROM exams e
            JOIN patients p ON e.patient_id = p.id
            LEFT JOIN users t ON e.technician_id = t.id
            LEFT JOIN users ph ON e.physician_id = ph.id AND ph.role = 'physician'
            LEFT JOIN users pa ON e.print_agent_id = pa.id AND pa.role = 'print_agent'
            ORDER BY e.uploaded_at DESC, e.id DESC
        "#)
        .fetch_all(self.pool.pool())
        .await?)
    }
}
