//! HTTP处理器
//!
//! 每个角色一组处理器。处理器只负责解析请求和组装响应，
//! 业务规则都在工作流层完成；上传接口在读取请求体前先验角色。

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use telerad_core::{Exam, ImageUpload, NewPatient, Patient, ReportFields, TeleradError, User, UserRole};
use telerad_database::PrintQueueRow;
use telerad_storage::CleanupReport;
use telerad_workflow::{
    authorize, download_url, ClinicOverview, CreateExamRequest, CreatedExam, ManifestEntry, NewAccount,
};
use tracing::debug;

use crate::auth::Session;
use crate::error::ApiResult;
use crate::server::AppState;

/// 上传表单中影像文件字段名
const IMAGES_FIELD: &str = "images";

/// 健康检查处理器
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

// ========== 技师 ==========

/// 上传表单的医生下拉列表
pub async fn list_physicians(
    State(state): State<AppState>,
    Session(ctx): Session,
) -> ApiResult<Json<Vec<User>>> {
    Ok(Json(state.accounts.list_physicians(&ctx).await?))
}

/// 新建患者与检查（multipart）
pub async fn create_exam(
    State(state): State<AppState>,
    Session(ctx): Session,
    multipart: Multipart,
) -> ApiResult<(StatusCode, Json<CreatedExam>)> {
    // 先验角色再读取请求体
    authorize(UserRole::Technician, Some(&ctx))?;
    let request = read_exam_form(multipart).await?;
    let created = state.workflow.create_exam(&ctx, request).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// 读取上传表单
///
/// 文本字段按名称收集，`images` 字段可出现多次；未选文件的空字段跳过。
async fn read_exam_form(mut multipart: Multipart) -> Result<CreateExamRequest, TeleradError> {
    let mut form = ExamForm::default();
    let mut images = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| TeleradError::Validation(format!("Failed to read multipart field: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();

        if name == IMAGES_FIELD {
            let file_name = field.file_name().unwrap_or("").to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| TeleradError::Validation(format!("Failed to read file data: {}", e)))?;
            if file_name.is_empty() && data.is_empty() {
                continue;
            }
            images.push(ImageUpload {
                file_name,
                data: data.to_vec(),
            });
        } else {
            let value = field
                .text()
                .await
                .map_err(|e| TeleradError::Validation(format!("Failed to read field {}: {}", name, e)))?;
            form.set(&name, value);
        }
    }

    debug!("Exam form received with {} image parts", images.len());
    form.into_request(images)
}

/// 上传表单的文本字段
#[derive(Debug, Default)]
struct ExamForm {
    surname: String,
    given_name: String,
    age: String,
    diagnosis: String,
    requested_exam: String,
    birth_date: String,
    phone: String,
    physician_id: String,
}

impl ExamForm {
    fn set(&mut self, name: &str, value: String) {
        let slot = match name {
            "surname" => &mut self.surname,
            "given_name" => &mut self.given_name,
            "age" => &mut self.age,
            "diagnosis" => &mut self.diagnosis,
            "requested_exam" => &mut self.requested_exam,
            "birth_date" => &mut self.birth_date,
            "phone" => &mut self.phone,
            "physician_id" => &mut self.physician_id,
            _ => return,
        };
        *slot = value;
    }

    fn into_request(self, images: Vec<ImageUpload>) -> Result<CreateExamRequest, TeleradError> {
        let age = self
            .age
            .trim()
            .parse::<i32>()
            .map_err(|_| TeleradError::Validation("age must be a whole number".to_string()))?;

        let birth_date = match self.birth_date.trim() {
            "" => None,
            value => Some(
                NaiveDate::parse_from_str(value, "%Y-%m-%d")
                    .map_err(|_| TeleradError::Validation("birth_date must be YYYY-MM-DD".to_string()))?,
            ),
        };

        let physician_id = match self.physician_id.trim() {
            "" => None,
            value => Some(
                value
                    .parse::<i64>()
                    .map_err(|_| TeleradError::Validation("physician_id must be a number".to_string()))?,
            ),
        };

        let phone = Some(self.phone.trim().to_string()).filter(|p| !p.is_empty());

        Ok(CreateExamRequest {
            patient: NewPatient {
                surname: self.surname,
                given_name: self.given_name,
                age,
                diagnosis: self.diagnosis,
                requested_exam: self.requested_exam,
                birth_date,
                phone,
            },
            physician_id,
            images,
        })
    }
}

// ========== 医生 ==========

pub async fn physician_worklist(
    State(state): State<AppState>,
    Session(ctx): Session,
) -> ApiResult<impl IntoResponse> {
    let exams = state.worklists.physician_worklist(&ctx).await?;
    Ok(Json(json!({
        "exams": exams,
        "total": exams.len()
    })))
}

/// 阅片响应
#[derive(Debug, Serialize)]
pub struct ExamViewResponse {
    pub exam: Exam,
    pub patient: Patient,
    pub first_view: bool,
    pub images: Vec<ManifestEntry>,
}

/// 阅片，返回影像下载清单
pub async fn view_exam(
    State(state): State<AppState>,
    Session(ctx): Session,
    Path(exam_id): Path<i64>,
) -> ApiResult<Json<ExamViewResponse>> {
    let view = state.workflow.view_exam(&ctx, exam_id).await?;
    let images = view.manifest(&state.settings.public_base_url);

    Ok(Json(ExamViewResponse {
        exam: view.exam,
        patient: view.patient,
        first_view: view.first_view,
        images,
    }))
}

/// 报告表单默认值
pub async fn report_defaults(
    State(state): State<AppState>,
    Session(ctx): Session,
    Path(exam_id): Path<i64>,
) -> ApiResult<Json<ReportFields>> {
    Ok(Json(state.workflow.report_form(&ctx, exam_id).await?))
}

pub async fn submit_report(
    State(state): State<AppState>,
    Session(ctx): Session,
    Path(exam_id): Path<i64>,
    Json(fields): Json<ReportFields>,
) -> ApiResult<Json<Exam>> {
    Ok(Json(state.workflow.submit_report(&ctx, exam_id, fields).await?))
}

// ========== 打印员 ==========

/// 待打印报告及下载地址
#[derive(Debug, Serialize)]
pub struct PrintJob {
    #[serde(flatten)]
    pub row: PrintQueueRow,
    pub report_url: Option<String>,
}

pub async fn print_queue(
    State(state): State<AppState>,
    Session(ctx): Session,
) -> ApiResult<Json<Vec<PrintJob>>> {
    let base_url = &state.settings.public_base_url;
    let jobs = state
        .worklists
        .print_queue(&ctx)
        .await?
        .into_iter()
        .map(|row| PrintJob {
            report_url: row.report_path.as_deref().map(|path| download_url(base_url, path)),
            row,
        })
        .collect();
    Ok(Json(jobs))
}

pub async fn mark_printed(
    State(state): State<AppState>,
    Session(ctx): Session,
    Path(exam_id): Path<i64>,
) -> ApiResult<Json<Exam>> {
    Ok(Json(state.workflow.mark_printed(&ctx, exam_id).await?))
}

// ========== 管理员 ==========

pub async fn clinic_overview(
    State(state): State<AppState>,
    Session(ctx): Session,
) -> ApiResult<Json<ClinicOverview>> {
    Ok(Json(state.worklists.clinic_overview(&ctx).await?))
}

pub async fn create_user(
    State(state): State<AppState>,
    Session(ctx): Session,
    Json(account): Json<NewAccount>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let user = state.accounts.create_user(&ctx, account).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Session(ctx): Session,
    Path(user_id): Path<i64>,
) -> ApiResult<StatusCode> {
    state.accounts.delete_user(&ctx, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub physician_id: i64,
}

pub async fn assign_physician(
    State(state): State<AppState>,
    Session(ctx): Session,
    Path(exam_id): Path<i64>,
    Json(request): Json<AssignRequest>,
) -> ApiResult<Json<Exam>> {
    Ok(Json(
        state
            .workflow
            .assign_physician(&ctx, exam_id, request.physician_id)
            .await?,
    ))
}

pub async fn delete_exam(
    State(state): State<AppState>,
    Session(ctx): Session,
    Path(exam_id): Path<i64>,
) -> ApiResult<Json<CleanupReport>> {
    Ok(Json(state.workflow.delete_exam(&ctx, exam_id).await?))
}
