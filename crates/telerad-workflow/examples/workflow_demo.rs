//! 工作流演示程序
//!
//! 在临时目录和内存数据库中走完一次检查：上传、阅片、报告、打印、删除

use telerad_core::{ImageUpload, NewPatient, RequestContext, UserRole};
use telerad_database::{DatabasePool, DatabaseQueries};
use telerad_storage::StorageManager;
use telerad_workflow::{AccountService, CreateExamRequest, ExamWorkflow, NewAccount, WorkListManager};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志
    tracing_subscriber::fmt::init();

    let workspace = tempfile::tempdir()?;
    let db = DatabasePool::in_memory().await?;
    DatabaseQueries::new(&db).create_tables().await?;

    let accounts = AccountService::new(db.clone());
    let worklists = WorkListManager::new(db.clone());
    let workflow = ExamWorkflow::new(
        db.clone(),
        StorageManager::new(workspace.path().join("uploads")),
        StorageManager::new(workspace.path().join("reports")),
    );

    println!("🚀 Telerad 工作流演示\n");

    // 1. 账户
    let admin = RequestContext::from(
        &accounts
            .create_administrator("admin@clinic.ci", "Clinique123!", "Administrateur")
            .await?,
    );
    let mut contexts = Vec::new();
    for (email, name, role) in [
        ("tech@clinic.ci", "Kone Ibrahim", UserRole::Technician),
        ("drcamara@clinic.ci", "Camara Mariam", UserRole::Physician),
        ("agent@clinic.ci", "Yao Serge", UserRole::PrintAgent),
    ] {
        let user = accounts
            .create_user(
                &admin,
                NewAccount {
                    email: email.to_string(),
                    password: "secret".to_string(),
                    full_name: name.to_string(),
                    role,
                },
            )
            .await?;
        contexts.push(RequestContext::from(&user));
    }
    let (technician, physician, print_agent) = (&contexts[0], &contexts[1], &contexts[2]);
    println!("✅ 创建了 {} 个账户", contexts.len() + 1);

    // 2. 技师上传
    let created = workflow
        .create_exam(
            technician,
            CreateExamRequest {
                patient: NewPatient {
                    surname: "Kouassi".to_string(),
                    given_name: "Awa".to_string(),
                    age: 54,
                    diagnosis: "Douleur de hanche".to_string(),
                    requested_exam: "Scanner du bassin".to_string(),
                    birth_date: None,
                    phone: None,
                },
                physician_id: Some(physician.user_id),
                images: vec![
                    ImageUpload {
                        file_name: "coupe 1.dcm".to_string(),
                        data: b"DICM".to_vec(),
                    },
                    ImageUpload {
                        file_name: "coupe 1.dcm".to_string(),
                        data: b"DICM".to_vec(),
                    },
                ],
            },
        )
        .await?;
    println!("📋 患者 {} / 检查 #{} ({})", created.patient_code, created.exam_id, created.status);
    for path in &created.stored_paths {
        println!("   {}", path);
    }

    // 3. 医生阅片
    let view = workflow.view_exam(physician, created.exam_id).await?;
    println!("\n🩻 下载清单:");
    for entry in view.manifest("http://localhost:8080") {
        println!("   {} -> {}", entry.file_name, entry.url);
    }

    // 4. 报告
    let mut fields = workflow.report_form(physician, created.exam_id).await?;
    fields.technique = "Acquisition hélicoïdale sans injection".to_string();
    fields.findings = "Pincement articulaire coxo-fémoral gauche".to_string();
    fields.conclusion = "Coxarthrose gauche débutante".to_string();
    let exam = workflow.submit_report(physician, created.exam_id, fields).await?;
    println!("\n📝 报告: {}", exam.report_path.as_deref().unwrap_or("-"));

    // 5. 打印
    let queue = worklists.print_queue(print_agent).await?;
    println!("🖨️  待打印: {}", queue.len());
    workflow.mark_printed(print_agent, created.exam_id).await?;

    // 6. 总览与删除
    let overview = worklists.clinic_overview(&admin).await?;
    println!("\n📊 总览: {:?}", overview.stats);

    let cleanup = workflow.delete_exam(&admin, created.exam_id).await?;
    println!("🗑️  删除了 {} 个影像文件", cleanup.removed_files);

    Ok(())
}
