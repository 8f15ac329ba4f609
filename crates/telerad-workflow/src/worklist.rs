//! 工作列表管理
//!
//! 为不同角色用户提供各自的任务列表

use serde::Serialize;
use telerad_core::{ExamStatus, RequestContext, Result, User, UserRole};
use telerad_database::{ClinicExamRow, DatabasePool, DatabaseQueries, PhysicianExamRow, PrintQueueRow};
use tracing::debug;

use crate::access::authorize;

/// 管理员总览统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClinicStats {
    pub total_exams: usize,
    pub uploaded: usize,
    pub assigned: usize,
    pub completed: usize,
    /// 已完成但未打印
    pub awaiting_print: usize,
    /// 已指定医生但医生尚未打开
    pub unviewed: usize,
}

impl ClinicStats {
    pub fn from_rows(rows: &[ClinicExamRow]) -> Self {
        let mut stats = ClinicStats {
            total_exams: rows.len(),
            ..Default::default()
        };

        for row in rows {
            match row.status.parse::<ExamStatus>() {
                Ok(ExamStatus::Uploaded) => stats.uploaded += 1,
                Ok(ExamStatus::Assigned) => {
                    stats.assigned += 1;
                    if row.visualized_at.is_none() {
                        stats.unviewed += 1;
                    }
                }
                Ok(ExamStatus::Completed) => {
                    stats.completed += 1;
                    if row.printed_at.is_none() {
                        stats.awaiting_print += 1;
                    }
                }
                Err(_) => {}
            }
        }

        stats
    }
}

/// 管理员总览
#[derive(Debug, Clone, Serialize)]
pub struct ClinicOverview {
    pub exams: Vec<ClinicExamRow>,
    pub users: Vec<User>,
    pub stats: ClinicStats,
}

/// 工作列表管理器
#[derive(Debug, Clone)]
pub struct WorkListManager {
    db: DatabasePool,
}

impl WorkListManager {
    pub fn new(db: DatabasePool) -> Self {
        Self { db }
    }

    /// 医生的检查列表，最新上传在前
    pub async fn physician_worklist(&self, ctx: &RequestContext) -> Result<Vec<PhysicianExamRow>> {
        let physician = authorize(UserRole::Physician, Some(ctx))?;
        let rows = DatabaseQueries::new(&self.db)
            .physician_worklist(physician.user_id)
            .await?;
        debug!("Physician {} worklist has {} exams", physician.user_id, rows.len());
        Ok(rows)
    }

    /// 待打印报告
    pub async fn print_queue(&self, ctx: &RequestContext) -> Result<Vec<PrintQueueRow>> {
        authorize(UserRole::PrintAgent, Some(ctx))?;
        DatabaseQueries::new(&self.db).print_queue().await
    }

    /// 管理员总览：全部检查、全部账户和统计
    pub async fn clinic_overview(&self, ctx: &RequestContext) -> Result<ClinicOverview> {
        authorize(UserRole::Administrator, Some(ctx))?;
        let queries = DatabaseQueries::new(&self.db);

        let exams = queries.clinic_exams().await?;
        let users = queries.list_users().await?;
        let stats = ClinicStats::from_rows(&exams);

        Ok(ClinicOverview { exams, users, stats })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use telerad_core::{NewPatient, TeleradError};
    use telerad_database::{NewExam, NewUser};

    struct Fixture {
        db: DatabasePool,
        manager: WorkListManager,
        admin: RequestContext,
        physician: RequestContext,
        print_agent: RequestContext,
    }

    async fn add_user(db: &DatabasePool, email: &str, role: UserRole) -> RequestContext {
        let queries = DatabaseQueries::new(db);
        let id = queries
            .create_user(
                &NewUser {
                    email: email.to_string(),
                    password_hash: "$argon2id$placeholder".to_string(),
                    full_name: format!("User {}", email),
                    role,
                },
                Utc::now(),
            )
            .await
            .unwrap();
        RequestContext::from(&queries.get_user_by_id(id).await.unwrap().unwrap())
    }

    async fn fixture() -> Fixture {
        let db = DatabasePool::in_memory().await.unwrap();
        DatabaseQueries::new(&db).create_tables().await.unwrap();

        let admin = add_user(&db, "admin@clinic.ci", UserRole::Administrator).await;
        let physician = add_user(&db, "dr@clinic.ci", UserRole::Physician).await;
        let print_agent = add_user(&db, "agent@clinic.ci", UserRole::PrintAgent).await;

        Fixture {
            manager: WorkListManager::new(db.clone()),
            db,
            admin,
            physician,
            print_agent,
        }
    }

    async fn add_exam(f: &Fixture, code: &str, physician_id: Option<i64>, hour: u32) -> i64 {
        let patient = NewPatient {
            surname: "Kouassi".to_string(),
            given_name: "Awa".to_string(),
            age: 40,
            diagnosis: "Toux".to_string(),
            requested_exam: "Radio thorax".to_string(),
            birth_date: None,
            phone: None,
        };
        let at = Utc.with_ymd_and_hms(2025, 3, 12, hour, 0, 0).unwrap();

        let mut tx = f.db.begin().await.unwrap();
        let patient_id = DatabaseQueries::insert_patient(&mut *tx, &patient, code, at).await.unwrap();
        let exam = NewExam {
            patient_id,
            technician_id: f.admin.user_id,
            physician_id,
            status: if physician_id.is_some() { ExamStatus::Assigned } else { ExamStatus::Uploaded },
            uploaded_at: at,
        };
        let exam_id = DatabaseQueries::insert_exam(&mut *tx, &exam, &["a.dcm".to_string()]).await.unwrap();
        tx.commit().await.unwrap();
        exam_id
    }

    #[tokio::test]
    async fn test_physician_worklist_newest_first() {
        let f = fixture().await;
        let older = add_exam(&f, "P20250312-00000001", Some(f.physician.user_id), 8).await;
        let newer = add_exam(&f, "P20250312-00000002", Some(f.physician.user_id), 9).await;
        add_exam(&f, "P20250312-00000003", None, 10).await;

        let rows = f.manager.physician_worklist(&f.physician).await.unwrap();
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![newer, older]);
        assert_eq!(rows[0].image_count, 1);

        assert!(matches!(
            f.manager.physician_worklist(&f.admin).await,
            Err(TeleradError::AccessDenied(_))
        ));
    }

    #[tokio::test]
    async fn test_print_queue_and_overview_stats() {
        let f = fixture().await;
        let reported = add_exam(&f, "P20250312-00000001", Some(f.physician.user_id), 8).await;
        add_exam(&f, "P20250312-00000002", Some(f.physician.user_id), 9).await;
        add_exam(&f, "P20250312-00000003", None, 10).await;

        let at = Utc.with_ymd_and_hms(2025, 3, 12, 11, 0, 0).unwrap();
        DatabaseQueries::new(&f.db)
            .record_report(reported, "reports/1/rapport.docx", at, ExamStatus::Completed)
            .await
            .unwrap();

        let queue = f.manager.print_queue(&f.print_agent).await.unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].id, reported);

        let overview = f.manager.clinic_overview(&f.admin).await.unwrap();
        assert_eq!(overview.users.len(), 3);
        assert_eq!(
            overview.stats,
            ClinicStats {
                total_exams: 3,
                uploaded: 1,
                assigned: 1,
                completed: 1,
                awaiting_print: 1,
                unviewed: 1,
            }
        );

        assert!(matches!(
            f.manager.clinic_overview(&f.print_agent).await,
            Err(TeleradError::AccessDenied(_))
        ));
    }
}
