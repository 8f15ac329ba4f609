//! 工作流引擎
//!
//! 协调状态机、文件存储、报告生成和数据库，提供检查生命周期的全部操作

use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use telerad_core::utils::{generate_patient_code, sanitize_file_name, Clock, SystemClock};
use telerad_core::{
    Exam, ExamStatus, ImageUpload, NewPatient, Patient, ReportFields, RequestContext, Result,
    TeleradError, UserRole,
};
use telerad_database::{DatabasePool, DatabaseQueries, NewExam};
use telerad_storage::{CleanupReport, StorageManager};
use tracing::{info, warn};

use crate::access::{authorize, ensure_assigned};
use crate::report::ReportGenerator;
use crate::state_machine::{ExamEvent, ExamStateMachine};

/// 技师提交的新检查
#[derive(Debug, Clone)]
pub struct CreateExamRequest {
    pub patient: NewPatient,
    pub physician_id: Option<i64>,
    pub images: Vec<ImageUpload>,
}

/// 新检查创建结果
#[derive(Debug, Clone, Serialize)]
pub struct CreatedExam {
    pub exam_id: i64,
    pub patient_id: i64,
    pub patient_code: String,
    pub status: ExamStatus,
    pub stored_paths: Vec<String>,
}

/// 医生阅片视图
#[derive(Debug, Clone, Serialize)]
pub struct ExamView {
    pub exam: Exam,
    pub patient: Patient,
    /// 磁盘上仍然存在的影像
    pub available_images: Vec<String>,
    pub first_view: bool,
}

/// 下载清单条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub file_name: String,
    pub url: String,
}

impl ExamView {
    /// 影像下载清单
    pub fn manifest(&self, base_url: &str) -> Vec<ManifestEntry> {
        self.available_images
            .iter()
            .map(|path| {
                let normalized = path.replace('\\', "/");
                ManifestEntry {
                    file_name: Path::new(&normalized)
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_else(|| normalized.clone()),
                    url: download_url(base_url, path),
                }
            })
            .collect()
    }
}

/// 存储路径对应的下载地址，路径整体做 URL 编码（包括 `/`）
pub fn download_url(base_url: &str, stored_path: &str) -> String {
    let normalized = stored_path.replace('\\', "/");
    format!(
        "{}/download/{}",
        base_url.trim_end_matches('/'),
        urlencoding::encode(&normalized)
    )
}

/// 工作流引擎
pub struct ExamWorkflow {
    db: DatabasePool,
    images: StorageManager,
    reports: ReportGenerator,
    state_machine: ExamStateMachine,
    clock: Arc<dyn Clock>,
}

impl ExamWorkflow {
    /// 创建新的工作流引擎
    pub fn new(db: DatabasePool, images: StorageManager, reports: StorageManager) -> Self {
        Self::with_clock(db, images, reports, Arc::new(SystemClock))
    }

    pub fn with_clock(
        db: DatabasePool,
        images: StorageManager,
        reports: StorageManager,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db,
            images,
            reports: ReportGenerator::new(reports),
            state_machine: ExamStateMachine::new(),
            clock,
        }
    }

    /// 技师上传：创建患者与检查
    ///
    /// 所有校验在写入之前完成。患者、检查和影像记录在同一事务中插入，
    /// 任一步失败则回滚，并删除已写入的文件。
    pub async fn create_exam(&self, ctx: &RequestContext, request: CreateExamRequest) -> Result<CreatedExam> {
        let technician = authorize(UserRole::Technician, Some(ctx))?;
        request.patient.validate()?;

        let uploads: Vec<(String, &[u8])> = request
            .images
            .iter()
            .filter_map(|upload| {
                sanitize_file_name(&upload.file_name).map(|name| (name, upload.data.as_slice()))
            })
            .collect();
        if uploads.is_empty() {
            return Err(TeleradError::Validation("no image files provided".to_string()));
        }

        if let Some(physician_id) = request.physician_id {
            self.require_physician(physician_id).await?;
        }

        let now = self.clock.now();
        let patient_code = generate_patient_code(now.date_naive());
        let status = ExamStateMachine::initial_status(request.physician_id.is_some());
        let mut stored: Vec<String> = Vec::new();

        let outcome: Result<(i64, i64)> = async {
            let mut tx = self.db.begin().await?;
            let patient_id =
                DatabaseQueries::insert_patient(&mut *tx, &request.patient, &patient_code, now).await?;

            for (name, data) in &uploads {
                let path = self.images.store_file(patient_id, name, data).await?;
                stored.push(path.to_string_lossy().into_owned());
            }

            let new_exam = NewExam {
                patient_id,
                technician_id: technician.user_id,
                physician_id: request.physician_id,
                status,
                uploaded_at: now,
            };
            let exam_id = DatabaseQueries::insert_exam(&mut *tx, &new_exam, &stored).await?;
            tx.commit().await?;
            Ok::<_, TeleradError>((patient_id, exam_id))
        }
        .await;

        let (patient_id, exam_id) = match outcome {
            Ok(ids) => ids,
            Err(e) => {
                if !stored.is_empty() {
                    let cleanup = self.images.remove_files(&stored).await;
                    warn!("Exam creation failed, removed {} stored files", cleanup.removed_files);
                }
                return Err(e);
            }
        };

        info!(
            "Technician {} created patient {} and exam {} with {} images ({})",
            technician.user_id,
            patient_code,
            exam_id,
            stored.len(),
            status
        );

        Ok(CreatedExam {
            exam_id,
            patient_id,
            patient_code,
            status,
            stored_paths: stored,
        })
    }

    /// 管理员指定或更换医生
    pub async fn assign_physician(&self, ctx: &RequestContext, exam_id: i64, physician_id: i64) -> Result<Exam> {
        authorize(UserRole::Administrator, Some(ctx))?;
        let exam = self.get_exam(exam_id).await?;
        self.require_physician(physician_id).await?;

        let next = self.state_machine.transition(exam.status, ExamEvent::PhysicianAssigned)?;
        DatabaseQueries::new(&self.db)
            .assign_physician(exam_id, physician_id, next)
            .await?;

        info!("Exam {} assigned to physician {} ({} -> {})", exam_id, physician_id, exam.status, next);
        self.get_exam(exam_id).await
    }

    /// 医生阅片，首次查看时记录时间
    pub async fn view_exam(&self, ctx: &RequestContext, exam_id: i64) -> Result<ExamView> {
        let physician = authorize(UserRole::Physician, Some(ctx))?;
        let mut exam = self.get_exam(exam_id).await?;
        ensure_assigned(&exam, physician)?;

        let now = self.clock.now();
        let first_view = DatabaseQueries::new(&self.db).mark_visualized(exam_id, now).await?;
        if first_view {
            exam.visualized_at = Some(now);
            info!("Physician {} opened exam {} for the first time", physician.user_id, exam_id);
        }

        let patient = self.get_patient(exam.patient_id).await?;

        let mut available_images = Vec::with_capacity(exam.image_paths.len());
        for path in &exam.image_paths {
            if StorageManager::exists(path).await {
                available_images.push(path.clone());
            } else {
                warn!("Image {} of exam {} is missing on disk", path, exam_id);
            }
        }

        Ok(ExamView {
            exam,
            patient,
            available_images,
            first_view,
        })
    }

    /// 报告表单的默认值
    pub async fn report_form(&self, ctx: &RequestContext, exam_id: i64) -> Result<ReportFields> {
        let physician = authorize(UserRole::Physician, Some(ctx))?;
        let exam = self.get_exam(exam_id).await?;
        ensure_assigned(&exam, physician)?;

        let patient = self.get_patient(exam.patient_id).await?;
        Ok(ReportGenerator::defaults(&patient, self.clock.now().date_naive()))
    }

    /// 医生提交报告
    ///
    /// 文件写入成功后才更新数据库；数据库更新失败时删除刚写入的文件。
    pub async fn submit_report(&self, ctx: &RequestContext, exam_id: i64, fields: ReportFields) -> Result<Exam> {
        let physician = authorize(UserRole::Physician, Some(ctx))?;
        fields.validate()?;

        let exam = self.get_exam(exam_id).await?;
        ensure_assigned(&exam, physician)?;
        let next = self.state_machine.transition(exam.status, ExamEvent::ReportSubmitted)?;

        let patient = self.get_patient(exam.patient_id).await?;
        let submitted_at = self.clock.now();
        let path = self
            .reports
            .generate(exam_id, &patient, &fields, &physician.full_name, submitted_at)
            .await?;
        let path = path.to_string_lossy().into_owned();

        if let Err(e) = DatabaseQueries::new(&self.db)
            .record_report(exam_id, &path, submitted_at, next)
            .await
        {
            if let Err(remove_err) = tokio::fs::remove_file(&path).await {
                warn!("Failed to remove orphan report {}: {}", path, remove_err);
            }
            return Err(e);
        }

        info!("Physician {} submitted report for exam {} ({} -> {})", physician.user_id, exam_id, exam.status, next);
        self.get_exam(exam_id).await
    }

    /// 打印员标记报告已打印
    pub async fn mark_printed(&self, ctx: &RequestContext, exam_id: i64) -> Result<Exam> {
        let agent = authorize(UserRole::PrintAgent, Some(ctx))?;
        let exam = self.get_exam(exam_id).await?;
        self.state_machine.ensure_printable(&exam)?;

        let updated = DatabaseQueries::new(&self.db)
            .mark_printed(exam_id, agent.user_id, self.clock.now())
            .await?;
        if !updated {
            return Err(TeleradError::InvalidStateTransition {
                from: format!("{} (already printed)", exam.status),
                event: ExamEvent::Printed.to_string(),
            });
        }

        info!("Print agent {} printed report of exam {}", agent.user_id, exam_id);
        self.get_exam(exam_id).await
    }

    /// 管理员删除检查
    ///
    /// 先尽力删除影像文件和变空的目录，再删除数据库记录；文件清理失败不回滚删除。
    /// 已生成的报告文件保留。
    pub async fn delete_exam(&self, ctx: &RequestContext, exam_id: i64) -> Result<CleanupReport> {
        authorize(UserRole::Administrator, Some(ctx))?;
        let exam = self.get_exam(exam_id).await?;

        let cleanup = self.images.remove_files(&exam.image_paths).await;
        if !cleanup.is_clean() {
            warn!("Exam {} deleted with {} file cleanup failures", exam_id, cleanup.failures.len());
        }

        DatabaseQueries::new(&self.db).delete_exam(exam_id).await?;
        info!("Administrator {} deleted exam {}", ctx.user_id, exam_id);
        Ok(cleanup)
    }

    /// 根据ID获取检查
    pub async fn get_exam(&self, exam_id: i64) -> Result<Exam> {
        DatabaseQueries::new(&self.db)
            .get_exam(exam_id)
            .await?
            .ok_or_else(|| TeleradError::NotFound(format!("exam #{} not found", exam_id)))
    }

    async fn get_patient(&self, patient_id: i64) -> Result<Patient> {
        DatabaseQueries::new(&self.db)
            .get_patient_by_id(patient_id)
            .await?
            .ok_or_else(|| TeleradError::NotFound(format!("patient #{} not found", patient_id)))
    }

    async fn require_physician(&self, physician_id: i64) -> Result<()> {
        match DatabaseQueries::new(&self.db).get_user_by_id(physician_id).await? {
            Some(user) if user.role == UserRole::Physician => Ok(()),
            _ => Err(TeleradError::Validation(format!("user #{} is not a physician", physician_id))),
        }
    }
}
