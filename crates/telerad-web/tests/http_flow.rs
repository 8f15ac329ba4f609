use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use axum_extra::extract::cookie::Key;
use serde_json::{json, Value};
use telerad_database::{DatabasePool, DatabaseQueries};
use telerad_web::{create_app, AppState, WebSettings};
use telerad_workflow::download_url;
use tower::ServiceExt;

const BASE_URL: &str = "http://localhost:8080";
const BOUNDARY: &str = "telerad-test-boundary";

struct TestApp {
    dir: tempfile::TempDir,
    app: Router,
}

async fn test_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let db = DatabasePool::in_memory().await.unwrap();
    DatabaseQueries::new(&db).create_tables().await.unwrap();

    let settings = WebSettings {
        public_base_url: BASE_URL.to_string(),
        secure_cookies: false,
        max_upload_bytes: 10 * 1024 * 1024,
        uploads_root: dir.path().join("uploads"),
        reports_root: dir.path().join("reports"),
    };
    let state = AppState::new(db, settings, Key::generate()).unwrap();
    state
        .accounts
        .create_administrator("admin@clinic.ci", "Clinique123!", "Administrateur")
        .await
        .unwrap();

    TestApp {
        dir,
        app: create_app(state),
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, HeaderMap, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), 16 * 1024 * 1024).await.unwrap();
    (status, headers, body.to_vec())
}

async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, _, body) = send(app, request).await;
    let value = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, value)
}

fn request(method: Method, uri: &str, cookie: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn register(app: &Router, email: &str, role: &str) -> i64 {
    let (status, user) = send_json(
        app,
        request(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({
                "email": email,
                "password": "secret",
                "full_name": format!("User {}", email),
                "role": role
            })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    user["id"].as_i64().unwrap()
}

async fn login(app: &Router, email: &str, password: &str) -> String {
    let (status, headers, _) = send(
        app,
        request(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({ "email": email, "password": password })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let set_cookie = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

fn exam_upload(cookie: &str, physician_id: i64, files: &[&str]) -> Request<Body> {
    let mut body = String::new();
    let fields = [
        ("surname", "Kouassi".to_string()),
        ("given_name", "Awa".to_string()),
        ("age", "54".to_string()),
        ("diagnosis", "Douleur de hanche".to_string()),
        ("requested_exam", "Scanner".to_string()),
        ("physician_id", physician_id.to_string()),
    ];
    for (name, value) in fields {
        body.push_str(&format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
            BOUNDARY, name, value
        ));
    }
    for file in files {
        body.push_str(&format!(
            "--{}\r\nContent-Disposition: form-data; name=\"images\"; filename=\"{}\"\r\nContent-Type: application/dicom\r\n\r\nDICM\r\n",
            BOUNDARY, file
        ));
    }
    body.push_str(&format!("--{}--\r\n", BOUNDARY));

    Request::builder()
        .method(Method::POST)
        .uri("/technician/exams")
        .header(header::COOKIE, cookie)
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", BOUNDARY))
        .body(Body::from(body))
        .unwrap()
}

fn report_body() -> Value {
    json!({
        "exam_date": "12 MARCH 2025",
        "age": "54",
        "requested_exam": "Scanner",
        "technique": "Acquisition volumique",
        "findings": "Pas de lésion",
        "conclusion": "Examen normal"
    })
}

#[tokio::test]
async fn test_exam_lifecycle_over_http() {
    let TestApp { dir: _dir, app } = test_app().await;

    register(&app, "tech@clinic.ci", "technician").await;
    let physician_id = register(&app, "dr@clinic.ci", "physician").await;
    register(&app, "agent@clinic.ci", "print_agent").await;

    let tech = login(&app, "tech@clinic.ci", "secret").await;
    let doctor = login(&app, "dr@clinic.ci", "secret").await;
    let agent = login(&app, "agent@clinic.ci", "secret").await;
    let admin = login(&app, "admin@clinic.ci", "Clinique123!").await;

    // 技师上传
    let (status, physicians) =
        send_json(&app, request(Method::GET, "/technician/physicians", Some(&tech), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(physicians.as_array().unwrap().len(), 1);

    let (status, created) = send_json(&app, exam_upload(&tech, physician_id, &["scan1.dcm", "scan1.dcm"])).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "ASSIGNED");
    let exam_id = created["exam_id"].as_i64().unwrap();
    let stored = created["stored_paths"].as_array().unwrap();
    assert!(stored[1].as_str().unwrap().ends_with("scan1_1.dcm"));

    // 医生阅片并下载影像
    let (status, worklist) = send_json(&app, request(Method::GET, "/physician/exams", Some(&doctor), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(worklist["total"], 1);

    let view_uri = format!("/physician/exams/{}", exam_id);
    let (status, _) = send_json(&app, request(Method::GET, &view_uri, Some(&tech), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, view) = send_json(&app, request(Method::GET, &view_uri, Some(&doctor), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["first_view"], true);
    let images = view["images"].as_array().unwrap();
    assert_eq!(images.len(), 2);

    let image_url = images[0]["url"].as_str().unwrap();
    let (status, headers, body) = send(
        &app,
        request(Method::GET, image_url.strip_prefix(BASE_URL).unwrap(), None, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/dicom");
    assert_eq!(body, b"DICM");

    // 报告
    let (status, defaults) = send_json(
        &app,
        request(Method::GET, &format!("{}/report-defaults", view_uri), Some(&doctor), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(defaults["age"], "54");

    let mut incomplete = report_body();
    incomplete["conclusion"] = json!("");
    let report_uri = format!("{}/report", view_uri);
    let (status, error) = send_json(
        &app,
        request(Method::POST, &report_uri, Some(&doctor), Some(incomplete)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["error"], true);

    let (status, exam) = send_json(
        &app,
        request(Method::POST, &report_uri, Some(&doctor), Some(report_body())),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(exam["status"], "COMPLETED");

    // 打印
    let (status, queue) = send_json(&app, request(Method::GET, "/print-agent/reports", Some(&agent), None)).await;
    assert_eq!(status, StatusCode::OK);
    let jobs = queue.as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    let report_url = jobs[0]["report_url"].as_str().unwrap();
    let (status, headers, _) = send(
        &app,
        request(Method::GET, report_url.strip_prefix(BASE_URL).unwrap(), None, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CONTENT_TYPE].to_str().unwrap().contains("wordprocessingml"));

    let printed_uri = format!("/print-agent/reports/{}/printed", exam_id);
    let (status, _) = send_json(&app, request(Method::POST, &printed_uri, Some(&agent), None)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send_json(&app, request(Method::POST, &printed_uri, Some(&agent), None)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    // 管理员
    let (status, overview) = send_json(&app, request(Method::GET, "/clinic", Some(&admin), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(overview["stats"]["completed"], 1);
    assert_eq!(overview["users"].as_array().unwrap().len(), 4);

    let (status, cleanup) = send_json(
        &app,
        request(Method::DELETE, &format!("/clinic/exams/{}", exam_id), Some(&admin), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cleanup["removed_files"], 2);

    let (status, _) = send_json(&app, request(Method::GET, &view_uri, Some(&doctor), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_sessions_and_registration_rules() {
    let TestApp { dir: _dir, app } = test_app().await;

    let (status, home) = send_json(&app, request(Method::GET, "/", None, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(home["redirect"], "/auth/login");

    let (status, body) = send_json(&app, request(Method::GET, "/clinic", None, None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["status"], 403);

    let (status, _) = send_json(
        &app,
        request(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({"email": "root@clinic.ci", "password": "x", "full_name": "Root", "role": "administrator"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    register(&app, "tech@clinic.ci", "technician").await;
    let (status, _) = send_json(
        &app,
        request(
            Method::POST,
            "/auth/register",
            None,
            Some(json!({"email": "tech@clinic.ci", "password": "x", "full_name": "Again", "role": "physician"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send_json(
        &app,
        request(
            Method::POST,
            "/auth/login",
            None,
            Some(json!({"email": "tech@clinic.ci", "password": "wrong"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let tech = login(&app, "tech@clinic.ci", "secret").await;
    let (_, home) = send_json(&app, request(Method::GET, "/", Some(&tech), None)).await;
    assert_eq!(home["redirect"], "/technician");

    let (status, me) = send_json(&app, request(Method::GET, "/auth/me", Some(&tech), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["role"], "technician");

    let (status, _) = send_json(&app, request(Method::GET, "/clinic", Some(&tech), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send_json(&app, request(Method::GET, "/auth/me", Some("session=forged"), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_download_is_confined_to_storage_roots() {
    let TestApp { dir, app } = test_app().await;
    std::fs::write(dir.path().join("secret.txt"), b"secret").unwrap();

    let traversal = download_url("", "uploads/../secret.txt");
    let (status, _, _) = send(&app, request(Method::GET, &traversal, None, None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let outside = download_url("", &dir.path().join("secret.txt").to_string_lossy());
    let (status, _, _) = send(&app, request(Method::GET, &outside, None, None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let missing = download_url("", &dir.path().join("uploads").join("9").join("gone.dcm").to_string_lossy());
    let (status, _, _) = send(&app, request(Method::GET, &missing, None, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_logout_clears_session_cookie() {
    let TestApp { dir: _dir, app } = test_app().await;
    register(&app, "tech@clinic.ci", "technician").await;
    let tech = login(&app, "tech@clinic.ci", "secret").await;

    let (status, headers, _) = send(&app, request(Method::POST, "/auth/logout", Some(&tech), None)).await;
    assert_eq!(status, StatusCode::OK);

    let removal = headers.get(header::SET_COOKIE).unwrap().to_str().unwrap();
    assert!(removal.starts_with("session=;"), "unexpected Set-Cookie: {}", removal);
    assert!(removal.contains("Max-Age=0"), "unexpected Set-Cookie: {}", removal);

    let cleared = removal.split(';').next().unwrap();
    let (status, body) = send_json(&app, request(Method::GET, "/auth/me", Some(cleared), None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["status"], 403);

    let (_, home) = send_json(&app, request(Method::GET, "/", Some(cleared), None)).await;
    assert_eq!(home["redirect"], "/auth/login");
}

#[tokio::test]
async fn test_upload_by_other_role_is_denied_before_reading_body() {
    let TestApp { dir, app } = test_app().await;
    let physician_id = register(&app, "dr@clinic.ci", "physician").await;
    let doctor = login(&app, "dr@clinic.ci", "secret").await;

    let malformed = Request::builder()
        .method(Method::POST)
        .uri("/technician/exams")
        .header(header::COOKIE, &doctor)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from("not a multipart body"))
        .unwrap();
    let (status, body) = send_json(&app, malformed).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["status"], 403);

    let (status, _) = send_json(&app, exam_upload(&doctor, physician_id, &["scan1.dcm"])).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(!dir.path().join("uploads").join("1").exists());
}
