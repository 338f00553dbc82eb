use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use sqlx::sqlite::SqlitePoolOptions;
use std::{
    path::Path,
    sync::Arc,
    time::Duration,
};
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;
use video_ingest::{
    AppState, LocalDownloads,
    models::{media::AspectCategory, video::Video},
    routes::routes::routes,
    services::{
        auth::JwtAuthenticator,
        local_store::LocalObjectStore,
        pipeline::UploadPipeline,
        probe::{AspectClassifier, ProbeError},
        process::ToolError,
        remux::{Normalizer, RemuxError, faststart_path},
        signer::{DEFAULT_LINK_TTL, LocalLinkSigner},
        staging::StagedFile,
        video_store::{SqliteVideoStore, VideoStore, run_migrations},
    },
};

const BUCKET: &str = "videos";
const BOUNDARY: &str = "----video-ingest-test-boundary";

struct CopyNormalizer;

#[async_trait]
impl Normalizer for CopyNormalizer {
    async fn normalize(&self, input: &Path) -> Result<StagedFile, RemuxError> {
        let output = StagedFile::adopt(faststart_path(input));
        tokio::fs::copy(input, output.path())
            .await
            .map_err(|source| ToolError::Spawn {
                program: "copy".into(),
                source,
            })?;
        Ok(output)
    }
}

struct Widescreen;

#[async_trait]
impl AspectClassifier for Widescreen {
    async fn classify(&self, _path: &Path) -> Result<AspectCategory, ProbeError> {
        Ok(AspectCategory::Landscape)
    }
}

struct TestApp {
    router: Router,
    auth: JwtAuthenticator,
    videos: Arc<dyn VideoStore>,
    scratch: TempDir,
}

impl TestApp {
    async fn new() -> Self {
        let _ = tracing_subscriber::fmt::try_init();
        let scratch = tempfile::tempdir().unwrap();
        let temp_dir = scratch.path().join("tmp");
        std::fs::create_dir(&temp_dir).unwrap();

        let db = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run_migrations(&db).await.unwrap();
        let db = Arc::new(db);

        let store = LocalObjectStore::new(scratch.path().join("objects"));
        let links = LocalLinkSigner::new("http://localhost:8091", "link-secret");
        let videos: Arc<dyn VideoStore> = Arc::new(SqliteVideoStore::new(db.clone()));
        let pipeline = UploadPipeline::new(
            Arc::new(CopyNormalizer),
            Arc::new(Widescreen),
            Arc::new(store.clone()),
            videos.clone(),
            BUCKET,
            temp_dir.clone(),
        );
        let auth = JwtAuthenticator::new(b"jwt-secret");

        let state = AppState {
            db,
            videos: videos.clone(),
            pipeline,
            signer: Arc::new(links.clone()),
            auth: auth.clone(),
            local_objects: Some(LocalDownloads { store, links }),
            temp_dir,
            signed_url_ttl: DEFAULT_LINK_TTL,
        };

        Self {
            router: routes(64 * 1024).with_state(state),
            auth,
            videos,
            scratch,
        }
    }

    fn token(&self, user: Uuid) -> String {
        self.auth.issue(user, Duration::from_secs(600)).unwrap()
    }

    async fn draft_for(&self, user: Uuid) -> Video {
        let video = Video::draft(user, "clip", None);
        self.videos.create(&video).await.unwrap();
        video
    }

    fn temp_files(&self) -> usize {
        std::fs::read_dir(self.scratch.path().join("tmp"))
            .unwrap()
            .count()
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }
}

fn multipart_upload(uri: &str, token: &str, content_type: &str, payload: &str) -> Request<Body> {
    let body = format!(
        "--{BOUNDARY}\r\n\
        Content-Disposition: form-data; name=\"title\"\r\n\r\n\
        ignored\r\n\
        --{BOUNDARY}\r\n\
        Content-Disposition: form-data; name=\"video\"; filename=\"beach.mp4\"\r\n\
        Content-Type: {content_type}\r\n\r\n\
        {payload}\r\n\
        --{BOUNDARY}--\r\n"
    );
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn json_of(body: &[u8]) -> serde_json::Value {
    serde_json::from_slice(body)
        .unwrap_or_else(|_| panic!("not JSON: {}", String::from_utf8_lossy(body)))
}

#[tokio::test]
async fn health_and_readiness() {
    let app = TestApp::new().await;

    let (status, _) = app
        .send(Request::get("/healthz").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .send(Request::get("/readyz").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    let json = json_of(&body);
    assert_eq!(json["checks"]["sqlite"]["ok"], true);
    assert_eq!(json["checks"]["temp_dir"]["ok"], true);
    assert_eq!(app.temp_files(), 0);
}

#[tokio::test]
async fn create_video_requires_a_token() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();

    let (status, _) = app
        .send(
            Request::post("/api/videos")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"title":"holiday"}"#))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app
        .send(
            Request::post("/api/videos")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::AUTHORIZATION, format!("Bearer {}", app.token(user)))
                .body(Body::from(r#"{"title":"holiday","description":"sand"}"#))
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let json = json_of(&body);
    assert_eq!(json["title"], "holiday");
    assert_eq!(json["user_id"], user.to_string());
    assert!(json["video_url"].is_null());
}

#[tokio::test]
async fn upload_publishes_and_returns_a_working_signed_link() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let video = app.draft_for(user).await;

    let (status, body) = app
        .send(multipart_upload(
            &format!("/api/video_upload/{}", video.id),
            &app.token(user),
            "video/mp4",
            "not-really-an-mp4",
        ))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", String::from_utf8_lossy(&body));

    let url = json_of(&body)["video_url"].as_str().unwrap().to_string();
    let path = url.strip_prefix("http://localhost:8091").unwrap();
    assert!(path.starts_with("/objects/videos/landscape/"), "{url}");
    assert!(path.contains(".mp4?expires="), "{url}");
    assert_eq!(app.temp_files(), 0);

    // The record keeps the reference, not the URL.
    let stored = app.videos.get(video.id).await.unwrap();
    let reference = stored.video_url.unwrap();
    assert!(reference.starts_with("videos,landscape/"), "{reference}");

    let (status, bytes) = app
        .send(Request::get(path).body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(bytes, b"not-really-an-mp4");

    let tampered = path.replace("signature=", "signature=00");
    let (status, _) = app
        .send(Request::get(tampered).body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .send(
            Request::get(format!("/api/videos/{}", video.id))
                .header(header::AUTHORIZATION, format!("Bearer {}", app.token(user)))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let signed = json_of(&body)["video_url"].as_str().unwrap().to_string();
    assert!(signed.starts_with("http://localhost:8091/objects/videos/landscape/"));
}

#[tokio::test]
async fn octet_stream_upload_is_rejected_without_staging() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let video = app.draft_for(user).await;

    let (status, body) = app
        .send(multipart_upload(
            &format!("/api/video_upload/{}", video.id),
            &app.token(user),
            "application/octet-stream",
            "bytes",
        ))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json_of(&body)["status"], 400);
    assert_eq!(app.temp_files(), 0);
    assert_eq!(app.videos.get(video.id).await.unwrap().video_url, None);
}

#[tokio::test]
async fn uploads_to_someone_elses_video_are_unauthorized() {
    let app = TestApp::new().await;
    let owner = Uuid::new_v4();
    let video = app.draft_for(owner).await;

    let (status, _) = app
        .send(multipart_upload(
            &format!("/api/video_upload/{}", video.id),
            &app.token(Uuid::new_v4()),
            "video/mp4",
            "bytes",
        ))
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.temp_files(), 0);
}

#[tokio::test]
async fn bad_ids_and_unknown_videos() {
    let app = TestApp::new().await;
    let token = app.token(Uuid::new_v4());

    let (status, _) = app
        .send(multipart_upload(
            "/api/video_upload/not-a-uuid",
            &token,
            "video/mp4",
            "bytes",
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(
            Request::get(format!("/api/videos/{}", Uuid::new_v4()))
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn upload_without_video_field_is_a_bad_request() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let video = app.draft_for(user).await;

    let body = format!(
        "--{BOUNDARY}\r\n\
        Content-Disposition: form-data; name=\"thumbnail\"; filename=\"a.png\"\r\n\
        Content-Type: image/png\r\n\r\n\
        png\r\n\
        --{BOUNDARY}--\r\n"
    );
    let request = Request::post(format!("/api/video_upload/{}", video.id))
        .header(header::AUTHORIZATION, format!("Bearer {}", app.token(user)))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();

    let (status, _) = app.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
