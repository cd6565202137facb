use actix_files::Files;
use actix_multipart::{Field, Multipart};
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{web, HttpResponse};
use futures::TryStreamExt;
use serde::Deserialize;
use shared::{ErrorResponse, ExampleImages, HealthResponse, PredictionResponse, SkinType};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

use crate::auth::middleware::AuthenticatedUser;
use crate::diagnosis::pipeline::DiagnosisError;
use crate::diagnosis::recorder::RecorderError;
use crate::diagnosis::service::{DiagnosisService, Submission};

const EXAMPLE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];
const MAX_TEXT_FIELD_BYTES: usize = 1024;

/// Per-deployment knobs the handlers need.
#[derive(Debug, Clone)]
pub struct RouteSettings {
    pub examples_dir: PathBuf,
    pub max_image_bytes: usize,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig, settings: RouteSettings) {
    let examples_dir = settings.examples_dir.clone();
    cfg.app_data(web::Data::new(settings))
        .service(web::resource("/api/predict").route(web::post().to(predict)))
        .service(web::resource("/api/history").route(web::get().to(history)))
        .service(
            web::resource("/api/history/{id}")
                .route(web::get().to(history_detail))
                .route(web::delete().to(delete_history)),
        )
        .service(web::resource("/api/history/{id}/image").route(web::get().to(history_image)))
        .service(web::resource("/api/examples").route(web::get().to(examples)))
        .service(web::resource("/api/health").route(web::get().to(health)))
        .service(Files::new("/example-images", examples_dir));
}

#[derive(Debug, Default)]
struct PredictionForm {
    image: Option<Vec<u8>>,
    is_example: bool,
    skin_type: Option<SkinType>,
}

fn malformed(e: impl std::fmt::Display) -> DiagnosisError {
    DiagnosisError::MalformedUpload(e.to_string())
}

async fn read_field(field: &mut Field, limit: usize) -> Result<Vec<u8>, DiagnosisError> {
    let mut data = Vec::new();
    while let Some(chunk) = field.try_next().await.map_err(malformed)? {
        if data.len() + chunk.len() > limit {
            return Err(DiagnosisError::ImageTooLarge { limit });
        }
        data.extend_from_slice(&chunk);
    }
    Ok(data)
}

async fn read_text(field: &mut Field) -> Result<String, DiagnosisError> {
    let data = read_field(field, MAX_TEXT_FIELD_BYTES)
        .await
        .map_err(|_| malformed("form field too long"))?;
    String::from_utf8(data).map_err(malformed)
}

async fn read_prediction_form(
    payload: &mut Multipart,
    max_image_bytes: usize,
) -> Result<PredictionForm, DiagnosisError> {
    let mut form = PredictionForm::default();

    while let Some(mut field) = payload.try_next().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "image" => form.image = Some(read_field(&mut field, max_image_bytes).await?),
            "is_example" => {
                form.is_example = read_text(&mut field).await?.trim().eq_ignore_ascii_case("true");
            }
            "skin_type" => {
                let value = read_text(&mut field).await?;
                form.skin_type = SkinType::from_str(value.trim()).ok();
            }
            other => {
                log::debug!("Ignoring unexpected form field '{}'", other);
                while field.try_next().await.map_err(malformed)?.is_some() {}
            }
        }
    }

    Ok(form)
}

async fn predict(
    service: web::Data<DiagnosisService>,
    settings: web::Data<RouteSettings>,
    user: AuthenticatedUser,
    mut payload: Multipart,
) -> Result<HttpResponse, DiagnosisError> {
    if !service.is_available() {
        return Err(DiagnosisError::ModelUnavailable);
    }

    let form = read_prediction_form(&mut payload, settings.max_image_bytes).await?;
    let image = form
        .image
        .filter(|image| !image.is_empty())
        .ok_or(DiagnosisError::NoImageProvided)?;

    let submission = Submission {
        owner: user.0.id,
        image,
        skin_type: form.skin_type.or(user.0.skin_type),
        is_example: form.is_example,
    };

    let advisory = service.submit(submission).await?;
    Ok(HttpResponse::Ok().json(PredictionResponse::from(advisory)))
}

fn storage_failure(e: RecorderError) -> HttpResponse {
    log::error!("Diagnosis storage error: {}", e);
    HttpResponse::InternalServerError().json(ErrorResponse {
        error: "Failed to access diagnosis history".to_string(),
    })
}

fn not_found(id: Uuid) -> HttpResponse {
    HttpResponse::NotFound().json(ErrorResponse {
        error: format!("Diagnosis {} not found", id),
    })
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    page: Option<usize>,
    page_size: Option<usize>,
}

async fn history(
    service: web::Data<DiagnosisService>,
    user: AuthenticatedUser,
    query: web::Query<HistoryQuery>,
) -> HttpResponse {
    match service.history(user.0.id, query.page, query.page_size).await {
        Ok(page) => HttpResponse::Ok().json(page),
        Err(e) => storage_failure(e),
    }
}

async fn history_detail(
    service: web::Data<DiagnosisService>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> HttpResponse {
    let id = path.into_inner();
    match service.find(user.0.id, id).await {
        Ok(Some(record)) => HttpResponse::Ok().json(record.to_entry()),
        Ok(None) => not_found(id),
        Err(e) => storage_failure(e),
    }
}

async fn history_image(
    service: web::Data<DiagnosisService>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> HttpResponse {
    let id = path.into_inner();
    let record = match service.find(user.0.id, id).await {
        Ok(Some(record)) => record,
        Ok(None) => return not_found(id),
        Err(e) => return storage_failure(e),
    };

    match service.image(&record).await {
        Ok(bytes) => HttpResponse::Ok()
            .content_type(record.mime_type.as_str())
            .insert_header(ContentDisposition {
                disposition: DispositionType::Inline,
                parameters: vec![DispositionParam::Filename(format!(
                    "{}.{}",
                    record.id,
                    record.file_extension()
                ))],
            })
            .body(bytes),
        Err(e) => storage_failure(e),
    }
}

async fn delete_history(
    service: web::Data<DiagnosisService>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> HttpResponse {
    let id = path.into_inner();
    match service.delete(user.0.id, id).await {
        Ok(true) => HttpResponse::NoContent().finish(),
        Ok(false) => not_found(id),
        Err(e) => storage_failure(e),
    }
}

/// Sorted names of the sample images shipped with the deployment.
fn list_example_images(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_image = Path::new(&name)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                EXAMPLE_EXTENSIONS
                    .iter()
                    .any(|allowed| ext.eq_ignore_ascii_case(allowed))
            });
        if is_image {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

async fn examples(settings: web::Data<RouteSettings>) -> HttpResponse {
    match list_example_images(&settings.examples_dir) {
        Ok(example_images) => HttpResponse::Ok().json(ExampleImages { example_images }),
        Err(e) => {
            log::error!(
                "Failed to list example images in {}: {}",
                settings.examples_dir.display(),
                e
            );
            HttpResponse::InternalServerError().json(ErrorResponse {
                error: "Example images are unavailable".to_string(),
            })
        }
    }
}

async fn health(service: web::Data<DiagnosisService>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        model_available: service.is_available(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisory::catalog::Condition;
    use crate::auth::jwt::tests::{token_for, SECRET};
    use crate::auth::jwt::JwtService;
    use crate::auth::middleware::AuthMiddleware;
    use crate::diagnosis::pipeline::tests::{pipeline_with, shipped_catalog};
    use crate::diagnosis::pipeline::DiagnosisPipeline;
    use crate::diagnosis::recorder::{DiagnosisRecorder, MemoryRecorder};
    use crate::inference::model::ClassifierService;
    use crate::inference::normalizer::tests::png_bytes;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use shared::{AdvisoryPayload, DiagnosisEntry, HistoryPage, INCONCLUSIVE_MESSAGE};
    use std::sync::Arc;

    const BOUNDARY: &str = "----skincare-test-boundary";
    const ACNE: [f32; 6] = [0.85, 0.05, 0.03, 0.03, 0.02, 0.02];

    enum Part<'a> {
        File(&'a str, Vec<u8>),
        Text(&'a str, &'a str),
    }

    fn multipart(parts: Vec<Part<'_>>) -> (String, Vec<u8>) {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            match part {
                Part::File(name, bytes) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"; filename=\"upload.png\"\r\n\
                             Content-Type: image/png\r\n\r\n",
                            name
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(&bytes);
                }
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n{}", name, value)
                            .as_bytes(),
                    );
                }
            }
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        (format!("multipart/form-data; boundary={}", BOUNDARY), body)
    }

    fn predict_request(user: Uuid, claim: Option<&str>, parts: Vec<Part<'_>>) -> test::TestRequest {
        let (content_type, body) = multipart(parts);
        test::TestRequest::post()
            .uri("/api/predict")
            .insert_header(("Authorization", format!("Bearer {}", token_for(user, claim))))
            .insert_header(("Content-Type", content_type))
            .set_payload(body)
    }

    fn authed_get(uri: &str, user: Uuid) -> test::TestRequest {
        test::TestRequest::get()
            .uri(uri)
            .insert_header(("Authorization", format!("Bearer {}", token_for(user, None))))
    }

    fn settings(dir: &Path, max_image_bytes: usize) -> RouteSettings {
        RouteSettings {
            examples_dir: dir.to_path_buf(),
            max_image_bytes,
        }
    }

    macro_rules! app {
        ($service:expr, $settings:expr) => {{
            let settings = $settings;
            test::init_service(
                App::new()
                    .wrap(AuthMiddleware::new(JwtService::new(SECRET)))
                    .app_data(web::Data::new($service))
                    .configure(move |cfg| configure_routes(cfg, settings)),
            )
            .await
        }};
    }

    fn service_with(scores: &[f32]) -> (DiagnosisService, Arc<MemoryRecorder>) {
        let (pipeline, _) = pipeline_with(scores.to_vec());
        let recorder = Arc::new(MemoryRecorder::new());
        (DiagnosisService::new(pipeline, recorder.clone()), recorder)
    }

    #[actix_web::test]
    async fn predict_returns_advisory_and_records_it() {
        let dir = tempfile::tempdir().unwrap();
        let (service, recorder) = service_with(&ACNE);
        let app = app!(service, settings(dir.path(), 1 << 20));
        let user = Uuid::new_v4();

        let req = predict_request(user, None, vec![Part::File("image", png_bytes(64, 48))]).to_request();
        let body: AdvisoryPayload = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body.predictions.len(), 1);
        assert_eq!(body.predictions[0].label, "여드름 피부");
        assert_eq!(
            body.tips,
            shipped_catalog().lookup(&Condition::Acne, None).to_vec()
        );
        assert_eq!(recorder.list(user).await.unwrap().len(), 1);
    }

    #[actix_web::test]
    async fn example_upload_is_answered_but_not_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let (service, recorder) = service_with(&ACNE);
        let app = app!(service, settings(dir.path(), 1 << 20));

        let req = predict_request(
            Uuid::new_v4(),
            None,
            vec![
                Part::File("image", png_bytes(32, 32)),
                Part::Text("is_example", "TRUE"),
            ],
        )
        .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(recorder.len().await, 0);
    }

    #[actix_web::test]
    async fn form_skin_type_overrides_token_claim() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = service_with(&ACNE);
        let app = app!(service, settings(dir.path(), 1 << 20));

        let req = predict_request(
            Uuid::new_v4(),
            Some("dry"),
            vec![
                Part::Text("skin_type", "oily"),
                Part::File("image", png_bytes(32, 32)),
            ],
        )
        .to_request();
        let body: AdvisoryPayload = test::call_and_read_body_json(&app, req).await;
        assert_eq!(
            body.tips,
            shipped_catalog()
                .lookup(&Condition::Acne, Some(SkinType::Oily))
                .to_vec()
        );
    }

    #[actix_web::test]
    async fn token_skin_type_applies_without_form_value() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = service_with(&ACNE);
        let app = app!(service, settings(dir.path(), 1 << 20));

        let req = predict_request(
            Uuid::new_v4(),
            Some("sensitive"),
            vec![Part::File("image", png_bytes(32, 32))],
        )
        .to_request();
        let body: AdvisoryPayload = test::call_and_read_body_json(&app, req).await;
        assert_eq!(
            body.tips,
            shipped_catalog()
                .lookup(&Condition::Acne, Some(SkinType::Sensitive))
                .to_vec()
        );
    }

    #[actix_web::test]
    async fn inconclusive_prediction_has_message_shape() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = service_with(&[0.0; 6]);
        let app = app!(service, settings(dir.path(), 1 << 20));

        let req = predict_request(Uuid::new_v4(), None, vec![Part::File("image", png_bytes(8, 8))])
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body, serde_json::json!({ "prediction": INCONCLUSIVE_MESSAGE }));
    }

    #[actix_web::test]
    async fn missing_image_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let (service, recorder) = service_with(&ACNE);
        let app = app!(service, settings(dir.path(), 1 << 20));

        let req = predict_request(Uuid::new_v4(), None, vec![Part::Text("is_example", "false")])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: ErrorResponse = test::read_body_json(resp).await;
        assert_eq!(body.error, "No image provided.");
        assert_eq!(recorder.len().await, 0);
    }

    #[actix_web::test]
    async fn unavailable_model_wins_over_missing_image() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = DiagnosisPipeline::new(
            ClassifierService::Unavailable {
                reason: "weights missing".into(),
            },
            shipped_catalog(),
        );
        let service = DiagnosisService::new(pipeline, Arc::new(MemoryRecorder::new()));
        let app = app!(service, settings(dir.path(), 1 << 20));

        let req = predict_request(Uuid::new_v4(), None, vec![Part::Text("skin_type", "oily")])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: ErrorResponse = test::read_body_json(resp).await;
        assert_eq!(body.error, "Model or labels not loaded properly.");
    }

    #[actix_web::test]
    async fn undecodable_image_is_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let (service, recorder) = service_with(&ACNE);
        let app = app!(service, settings(dir.path(), 1 << 20));

        let req = predict_request(
            Uuid::new_v4(),
            None,
            vec![Part::File("image", b"definitely not pixels".to_vec())],
        )
        .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(recorder.len().await, 0);
    }

    #[actix_web::test]
    async fn oversized_upload_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (service, recorder) = service_with(&ACNE);
        let app = app!(service, settings(dir.path(), 16));

        let req = predict_request(Uuid::new_v4(), None, vec![Part::File("image", png_bytes(64, 64))])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(recorder.len().await, 0);
    }

    #[actix_web::test]
    async fn predict_requires_token() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = service_with(&ACNE);
        let app = app!(service, settings(dir.path(), 1 << 20));

        let (content_type, body) = multipart(vec![Part::File("image", png_bytes(8, 8))]);
        let req = test::TestRequest::post()
            .uri("/api/predict")
            .insert_header(("Content-Type", content_type))
            .set_payload(body)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn history_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = service_with(&ACNE);
        let app = app!(service, settings(dir.path(), 1 << 20));
        let user = Uuid::new_v4();
        let image = png_bytes(16, 16);

        let req = predict_request(user, None, vec![Part::File("image", image.clone())]).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let page: HistoryPage =
            test::call_and_read_body_json(&app, authed_get("/api/history", user).to_request()).await;
        assert_eq!(page.count, 1);
        assert_eq!(page.page_size, 6);
        let entry = &page.results[0];

        let detail: DiagnosisEntry = test::call_and_read_body_json(
            &app,
            authed_get(&format!("/api/history/{}", entry.id), user).to_request(),
        )
        .await;
        assert_eq!(&detail, entry);

        let resp = test::call_service(&app, authed_get(&entry.image_url, user).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get("Content-Type").unwrap(), "image/png");
        assert_eq!(test::read_body(resp).await, image);

        // Someone else cannot see it.
        let stranger = Uuid::new_v4();
        let resp = test::call_service(
            &app,
            authed_get(&format!("/api/history/{}", entry.id), stranger).to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let delete = test::TestRequest::delete()
            .uri(&format!("/api/history/{}", entry.id))
            .insert_header(("Authorization", format!("Bearer {}", token_for(user, None))))
            .to_request();
        assert_eq!(test::call_service(&app, delete).await.status(), StatusCode::NO_CONTENT);

        let page: HistoryPage =
            test::call_and_read_body_json(&app, authed_get("/api/history", user).to_request()).await;
        assert_eq!(page.count, 0);
    }

    #[actix_web::test]
    async fn examples_are_listed_without_token() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.jpg", "a.PNG", "c.gif", "notes.txt", "d.jpeg"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.png")).unwrap();
        let (service, _) = service_with(&ACNE);
        let app = app!(service, settings(dir.path(), 1 << 20));

        let req = test::TestRequest::get().uri("/api/examples").to_request();
        let body: ExampleImages = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.example_images, vec!["a.PNG", "b.jpg", "c.gif", "d.jpeg"]);

        let req = test::TestRequest::get().uri("/example-images/b.jpg").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn health_reports_model_state() {
        let dir = tempfile::tempdir().unwrap();
        let (service, _) = service_with(&ACNE);
        let app = app!(service, settings(dir.path(), 1 << 20));

        let req = test::TestRequest::get().uri("/api/health").to_request();
        let body: HealthResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.status, "ok");
        assert!(body.model_available);
    }
}
