//! 报告生成
//!
//! 把医生填写的六个文本字段和患者信息生成固定版式的 Word 文档，
//! 存放在 `{reports_root}/{patient_id}/rapport_{exam_id}_{YYYYMMDD_HHMMSS}.docx`。

use chrono::{DateTime, NaiveDate, Utc};
use docx_rs::{AlignmentType, BreakType, Docx, Footer, Header, Paragraph, Run};
use std::io::Cursor;
use std::path::PathBuf;
use telerad_core::{Patient, ReportFields, Result, TeleradError};
use telerad_storage::StorageManager;
use tracing::info;

/// US Letter，单位 twip（1 英寸 = 1440）
const PAGE_WIDTH_TWIPS: u32 = 12240;
const PAGE_HEIGHT_TWIPS: u32 = 15840;

const CLINIC_CITY: &str = "Gagnoa";
const FOOTER_NOTICE: &str = "Ce document est la propriété de la clinique de Gagnoa - Reproduction interdite";
const SIGNATURE_TITLE: &str = "Radiologue";

/// 报告生成器
#[derive(Debug, Clone)]
pub struct ReportGenerator {
    storage: StorageManager,
}

impl ReportGenerator {
    pub fn new(storage: StorageManager) -> Self {
        Self { storage }
    }

    /// 报告文件名，时间戳保证重复提交不会覆盖
    pub fn file_name(exam_id: i64, submitted_at: DateTime<Utc>) -> String {
        format!("rapport_{}_{}.docx", exam_id, submitted_at.format("%Y%m%d_%H%M%S"))
    }

    /// 生成并存储报告，返回文件路径
    pub async fn generate(
        &self,
        exam_id: i64,
        patient: &Patient,
        fields: &ReportFields,
        physician_name: &str,
        submitted_at: DateTime<Utc>,
    ) -> Result<PathBuf> {
        let bytes = Self::render(patient, fields, physician_name)?;
        let name = Self::file_name(exam_id, submitted_at);
        let path = self.storage.store_file(patient.id, &name, &bytes).await?;

        info!("Report for exam {} written to {}", exam_id, path.display());
        Ok(path)
    }

    /// 渲染文档
    pub fn render(patient: &Patient, fields: &ReportFields, physician_name: &str) -> Result<Vec<u8>> {
        let header = Header::new().add_paragraph(
            Paragraph::new()
                .add_run(Run::new().add_text(format!("{} le {}", CLINIC_CITY, fields.exam_date.trim())))
                .align(AlignmentType::Right),
        );
        let footer = Footer::new().add_paragraph(
            Paragraph::new()
                .add_run(Run::new().add_text(FOOTER_NOTICE))
                .align(AlignmentType::Center),
        );

        let mut docx = Docx::new()
            .page_size(PAGE_WIDTH_TWIPS, PAGE_HEIGHT_TWIPS)
            .header(header)
            .footer(footer);
        for line in Self::identity_lines(patient) {
            docx = docx.add_paragraph(plain(line));
        }

        let docx = docx
            .add_paragraph(Paragraph::new())
            .add_paragraph(
                Paragraph::new()
                    .add_run(Run::new().add_text("TECHNIQUE : ").bold())
                    .add_run(multiline_run(&fields.technique)),
            )
            .add_paragraph(Paragraph::new())
            .add_paragraph(labelled_block("·  RESULTAT", &fields.findings))
            .add_paragraph(Paragraph::new())
            .add_paragraph(labelled_block("·  CONCLUSION", &fields.conclusion))
            .add_paragraph(Paragraph::new())
            .add_paragraph(
                Paragraph::new()
                    .add_run(Run::new().add_text(format!("DR {}", physician_name)).bold())
                    .add_run(Run::new().add_break(BreakType::TextWrapping))
                    .add_run(Run::new().add_text(SIGNATURE_TITLE).italic()),
            );

        let mut buffer = Cursor::new(Vec::new());
        docx.build()
            .pack(&mut buffer)
            .map_err(|e| TeleradError::Io(format!("Failed to build report document: {}", e)))?;
        Ok(buffer.into_inner())
    }

    /// 患者信息四行，全部取自患者记录
    pub fn identity_lines(patient: &Patient) -> [String; 4] {
        [
            format!(
                "Nom : {}      Prénoms : {}",
                patient.surname.to_uppercase(),
                patient.given_name.to_uppercase()
            ),
            format!("Age : {} ANS", patient.age),
            format!("Diagnostic : {}", patient.diagnosis),
            format!("Examen demandé : {}", patient.requested_exam),
        ]
    }

    /// 报告表单默认值：日期取当天，年龄与检查项目取患者记录
    pub fn defaults(patient: &Patient, today: NaiveDate) -> ReportFields {
        ReportFields {
            exam_date: today.format("%d %B %Y").to_string().to_uppercase(),
            age: patient.age.to_string(),
            requested_exam: patient.requested_exam.clone(),
            ..ReportFields::default()
        }
    }
}

fn plain(text: String) -> Paragraph {
    Paragraph::new().add_run(Run::new().add_text(text))
}

/// 粗体标题换行后接正文
fn labelled_block(label: &str, body: &str) -> Paragraph {
    Paragraph::new()
        .add_run(Run::new().add_text(label).bold())
        .add_run(Run::new().add_break(BreakType::TextWrapping))
        .add_run(multiline_run(body))
}

/// 正文中的换行转为文档换行
fn multiline_run(text: &str) -> Run {
    let mut run = Run::new();
    for (i, line) in text.lines().enumerate() {
        if i > 0 {
            run = run.add_break(BreakType::TextWrapping);
        }
        run = run.add_text(line);
    }
    run
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn patient() -> Patient {
        Patient {
            id: 5,
            surname: "Kouassi".to_string(),
            given_name: "Awa Marie".to_string(),
            age: 54,
            diagnosis: "Douleur de hanche".to_string(),
            requested_exam: "SCANNER DES MEMBRES INFERIEURS".to_string(),
            patient_code: "P20250312-0A1B2C3D".to_string(),
            birth_date: None,
            phone: None,
            created_at: Utc::now(),
        }
    }

    fn fields() -> ReportFields {
        ReportFields {
            exam_date: "12 MARCH 2025".to_string(),
            age: "54".to_string(),
            requested_exam: "SCANNER DES MEMBRES INFERIEURS".to_string(),
            technique: "Acquisition volumique sans et avec injection.".to_string(),
            findings: "Ostéonécrose de la tête fémorale gauche.\nPerméabilité des structures vasculaires".to_string(),
            conclusion: "Ostéo-arthrite de la hanche gauche.".to_string(),
        }
    }

    #[test]
    fn test_file_name_uses_submission_timestamp() {
        let at = Utc.with_ymd_and_hms(2025, 3, 12, 10, 0, 5).unwrap();
        assert_eq!(ReportGenerator::file_name(7, at), "rapport_7_20250312_100005.docx");
    }

    #[test]
    fn test_render_produces_docx_archive() {
        let bytes = ReportGenerator::render(&patient(), &fields(), "Dr Camara").unwrap();
        assert!(bytes.len() > 4);
        assert_eq!(&bytes[..4], b"PK\x03\x04");
    }

    #[test]
    fn test_identity_lines_come_from_patient_record() {
        let edited = ReportFields {
            age: "99".to_string(),
            requested_exam: "IRM CEREBRALE".to_string(),
            ..fields()
        };
        assert!(ReportGenerator::render(&patient(), &edited, "Dr Camara").is_ok());

        let lines = ReportGenerator::identity_lines(&patient());
        assert_eq!(lines[0], "Nom : KOUASSI      Prénoms : AWA MARIE");
        assert_eq!(lines[1], "Age : 54 ANS");
        assert_eq!(lines[2], "Diagnostic : Douleur de hanche");
        assert_eq!(lines[3], "Examen demandé : SCANNER DES MEMBRES INFERIEURS");
        assert!(lines.iter().all(|l| !l.contains("99") && !l.contains("IRM")));
    }

    #[tokio::test]
    async fn test_generate_stores_under_patient_folder() {
        let dir = tempfile::tempdir().unwrap();
        let generator = ReportGenerator::new(StorageManager::new(dir.path()));
        let at = Utc.with_ymd_and_hms(2025, 3, 12, 10, 0, 0).unwrap();

        let first = generator.generate(7, &patient(), &fields(), "Dr Camara", at).await.unwrap();
        let second = generator.generate(7, &patient(), &fields(), "Dr Camara", at).await.unwrap();

        assert_eq!(first, dir.path().join("5").join("rapport_7_20250312_100000.docx"));
        assert_eq!(second, dir.path().join("5").join("rapport_7_20250312_100000_1.docx"));
    }

    #[test]
    fn test_defaults_prefill_from_patient() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 12).unwrap();
        let defaults = ReportGenerator::defaults(&patient(), today);
        assert_eq!(defaults.exam_date, "12 MARCH 2025");
        assert_eq!(defaults.age, "54");
        assert_eq!(defaults.requested_exam, "SCANNER DES MEMBRES INFERIEURS");
        assert!(defaults.technique.is_empty());
    }
}
