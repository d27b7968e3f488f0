//! # Directory API Integration Tests
//!
//! Exercises the router with `tower::ServiceExt::oneshot` over an in-memory
//! store and the recording mailer: registration, contact verification,
//! admin review, lookup, search, status, and a full issuance run through
//! the certificate manager.

use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use vdir_api::state::AppState;
use vdir_ca_client::{BatchStatus, MockCertAuthority, ProcessingInfo};
use vdir_certman::{ArchiveStore, CertManager, Pipeline};
use vdir_core::{CertificateRequestState, Vasp, VaspId, VerificationState};
use vdir_crypto::testing::self_signed_pkcs12;
use vdir_crypto::SecretBox;
use vdir_email::{EmailConfig, MockMailer, Notifier};
use vdir_store::keys::{display_key, CERTREQ_PREFIX, VASP_PREFIX};
use vdir_store::{BatchOp, KvBackend, MemoryBackend, RecordStore, StoreError};

const ADMIN_TOKEN: &str = "directory-admin-token";
const ADMIN_EMAIL: &str = "admins@example.com";

struct Harness {
    state: AppState,
    mailer: Arc<MockMailer>,
    app: Router,
}

impl Harness {
    fn new() -> Self {
        Self::with_admin_token(Some(ADMIN_TOKEN))
    }

    fn with_admin_token(token: Option<&str>) -> Self {
        Self::with_backend(token, MemoryBackend::new())
    }

    fn with_backend(token: Option<&str>, backend: impl KvBackend + 'static) -> Self {
        let store = Arc::new(RecordStore::open(backend).unwrap());
        let secrets = Arc::new(SecretBox::new("api test secret").unwrap());
        let mailer = Arc::new(MockMailer::new());
        let notifier = Notifier::new(mailer.clone(), &EmailConfig::local_mock(9200, None).unwrap());
        let state = AppState::new(store, secrets, notifier, "testnet.directory")
            .unwrap()
            .with_admin_token(token.map(str::to_string));
        let app = vdir_api::app(state.clone());
        Self { state, mailer, app }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn send_text(&self, request: Request<Body>) -> (StatusCode, String) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    fn vasp(&self, id: u64) -> Vasp {
        self.state.store.retrieve_vasp(VaspId(id)).unwrap()
    }

    async fn register(&self, body: Value) -> (StatusCode, Value) {
        self.send(post_json("/v1/register", body)).await
    }

    /// Register Alice and return her id.
    async fn register_alice(&self) -> u64 {
        let (status, body) = self.register(alice()).await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_u64().unwrap()
    }

    fn technical_token(&self, id: u64) -> String {
        self.vasp(id)
            .contacts
            .technical
            .and_then(|c| c.token)
            .expect("technical contact token")
    }

    fn legal_token(&self, id: u64) -> String {
        self.vasp(id)
            .contacts
            .legal
            .and_then(|c| c.token)
            .expect("legal contact token")
    }

    async fn verify(&self, id: u64, token: &str) -> (StatusCode, Value) {
        self.send(post_json("/v1/verify-email", json!({"id": id, "token": token})))
            .await
    }

    async fn review(&self, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/v1/admin/review")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, format!("Bearer {ADMIN_TOKEN}"))
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Register and verify Alice; returns her id and the PKCS12 password.
    async fn pending_review(&self) -> (u64, String) {
        let id = self.register_alice().await;
        let token = self.technical_token(id);
        let (status, body) = self.verify(id, &token).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        let password = body["pkcs12_password"].as_str().unwrap().to_string();
        (id, password)
    }

    fn admin_verification_token(&self, id: u64) -> String {
        self.vasp(id).admin_verification_token.expect("admin token")
    }
}

/// Memory backend that logs every VASP and certificate request write.
#[derive(Default)]
struct WriteLog {
    inner: MemoryBackend,
    records: Mutex<Vec<String>>,
}

impl WriteLog {
    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.records.lock().unwrap())
    }
}

impl KvBackend for WriteLog {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.get(key)
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        self.inner.scan_prefix(prefix)
    }

    fn write_batch(&self, ops: Vec<BatchOp>) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap();
        for op in &ops {
            if let BatchOp::Put(key, _) = op {
                if key.starts_with(VASP_PREFIX) || key.starts_with(CERTREQ_PREFIX) {
                    records.push(display_key(key));
                }
            }
        }
        self.inner.write_batch(ops)
    }
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn alice() -> Value {
    json!({
        "name": "Alice VASP",
        "entity": {"legal_person_name": "Alice VASP LLC", "country_of_registration": "US"},
        "contacts": {
            "technical": {"name": "Tech Ops", "email": "tech@alice.io"},
            "legal": {"name": "Counsel", "email": "legal@alice.io"}
        },
        "endpoint": "trisa.alice.io:443",
        "website": "https://alice.io",
        "business_category": "PRIVATE_ORGANIZATION",
        "vasp_categories": ["Exchange"],
        "country": "US",
        "established_on": "2018-05-10"
    })
}

fn bob() -> Value {
    json!({
        "name": "Bob VASP",
        "contacts": {"administrative": {"name": "Admin", "email": "admin@bob.de"}},
        "common_name": "trisa.bob.de",
        "country": "DE"
    })
}

fn zip_of(name: &str, contents: &[u8]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file(name, zip::write::FileOptions::default())
        .unwrap();
    writer.write_all(contents).unwrap();
    writer.finish().unwrap().into_inner()
}

// -- Health & Metrics ---------------------------------------------------------

#[tokio::test]
async fn health_endpoints_answer() {
    let h = Harness::new();
    let response = h.app.clone().oneshot(get("/health/liveness")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let response = h.app.clone().oneshot(get("/health/readiness")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn metrics_count_requests_and_errors() {
    let h = Harness::new();
    h.send(get("/v1/lookup?id=404")).await;
    h.send(get("/v1/lookup")).await;
    h.register_alice().await;

    let (status, text) = h.send_text(get("/metrics")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(text.contains("# TYPE vdir_http_requests_total counter"), "{text}");
    assert!(text.contains(r#"path="/v1/lookup""#), "{text}");
    assert!(text.contains(r#"status="404""#), "{text}");
    assert!(text.contains("vdir_http_request_duration_seconds_bucket"), "{text}");
    assert!(text.contains(r#"vdir_vasps_total{status="SUBMITTED"} 1"#), "{text}");
    assert_eq!(h.state.metrics.requests(), 3);
    assert_eq!(h.state.metrics.errors(), 2);
}

#[tokio::test]
async fn openapi_document_is_served() {
    let h = Harness::new();
    let (status, body) = h.send(get("/openapi.json")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/v1/register"].is_object());
}

// -- Register -----------------------------------------------------------------

#[tokio::test]
async fn register_creates_submitted_record_and_emails_contacts() {
    let h = Harness::new();
    let (status, body) = h.register(alice()).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["common_name"], "trisa.alice.io");
    assert_eq!(body["registered_directory"], "testnet.directory");
    assert_eq!(body["status"], "SUBMITTED");

    let id = body["id"].as_u64().unwrap();
    let vasp = h.vasp(id);
    assert_eq!(vasp.verification_status, VerificationState::Submitted);
    assert_eq!(vasp.categories, vec!["Exchange".to_string()]);
    assert!(vasp.first_listed.is_some());

    let token = h.technical_token(id);
    assert_eq!(token.len(), 48);
    assert_ne!(token, h.legal_token(id));

    let sent = h.mailer.sent_to("tech@alice.io");
    assert_eq!(sent.len(), 1);
    assert!(sent[0].text.contains(&format!("Token: {token}")));
    assert_eq!(h.mailer.sent_to("legal@alice.io").len(), 1);
}

#[tokio::test]
async fn register_ignores_client_supplied_verification_state() {
    let h = Harness::new();
    let mut body = alice();
    body["contacts"]["technical"]["verified"] = json!(true);
    body["contacts"]["technical"]["token"] = json!("chosen-by-client");
    let (status, body) = h.register(body).await;
    assert_eq!(status, StatusCode::CREATED);

    let id = body["id"].as_u64().unwrap();
    let technical = h.vasp(id).contacts.technical.unwrap();
    assert!(!technical.verified);
    assert_ne!(technical.token.as_deref(), Some("chosen-by-client"));
}

#[tokio::test]
async fn register_duplicate_name_conflicts() {
    let h = Harness::new();
    h.register_alice().await;

    let mut dup = alice();
    dup["name"] = json!("  alice vasp ");
    dup["endpoint"] = json!("other.alice.io:443");
    let (status, body) = h.register(dup).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn register_incomplete_record_is_unprocessable() {
    let h = Harness::new();
    let mut body = alice();
    body["country"] = json!("");
    let (status, body) = h.register(body).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

    let mut body = bob();
    body["common_name"] = json!("");
    let (status, _) = h.register(body).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(h.mailer.sent().is_empty());
}

#[tokio::test]
async fn register_rejects_endpoint_without_port() {
    let h = Harness::new();
    let mut body = alice();
    body["endpoint"] = json!("trisa.alice.io");
    let (status, body) = h.register(body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("missing port"));
}

#[tokio::test]
async fn register_reports_mail_outage() {
    let h = Harness::new();
    h.mailer.set_failure(Some("smtp relay down"));
    let (status, body) = h.register(alice()).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "UPSTREAM_ERROR");
    assert!(!body["error"]["message"].as_str().unwrap().contains("smtp"));
}

// -- Lookup / Search / Status -------------------------------------------------

#[tokio::test]
async fn lookup_by_id_and_common_name() {
    let h = Harness::new();
    let id = h.register_alice().await;

    let (status, body) = h.send(get(&format!("/v1/lookup?id={id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "Alice VASP");
    assert_eq!(body["endpoint"], "trisa.alice.io:443");
    assert_eq!(body["country"], "US");
    assert!(body.get("certificate").is_none());

    let (status, body) = h
        .send(get("/v1/lookup?common_name=TRISA.Alice.io"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"].as_u64(), Some(id));
}

#[tokio::test]
async fn lookup_errors() {
    let h = Harness::new();
    let (status, body) = h.send(get("/v1/lookup")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["message"], "bad request: no lookup query provided");

    let (status, body) = h.send(get("/v1/lookup?id=77")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, _) = h.send(get("/v1/lookup?common_name=nobody.example")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = h.send(get("/v1/lookup?id=abc")).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn search_by_name_and_country() {
    let h = Harness::new();
    let alice_id = h.register_alice().await;
    let (_, body) = h.register(bob()).await;
    let bob_id = body["id"].as_u64().unwrap();

    let (status, body) = h.send(post_json("/v1/search", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    let (status, body) = h
        .send(post_json("/v1/search", json!({"country": ["de"]})))
        .await;
    assert_eq!(status, StatusCode::OK);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["id"].as_u64(), Some(bob_id));
    assert_eq!(results[0]["common_name"], "trisa.bob.de");

    let (status, body) = h
        .send(post_json("/v1/search", json!({"name": ["*"]})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    let (_, body) = h
        .send(post_json(
            "/v1/search",
            json!({"name": ["alice*", "bob vasp"], "country": ["US"]}),
        ))
        .await;
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["id"].as_u64(), Some(alice_id));
}

#[tokio::test]
async fn status_reports_lifecycle_fields() {
    let h = Harness::new();
    let id = h.register_alice().await;

    let (status, body) = h
        .send(get("/v1/status?common_name=trisa.alice.io"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verification_status"], "SUBMITTED");
    assert_eq!(body["service_status"], "UNKNOWN");
    assert!(body["first_listed"].is_string());
    assert!(body["verified_on"].is_null());

    let (status, _) = h.send(get(&format!("/v1/status?id={}", id + 100))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// -- VerifyEmail --------------------------------------------------------------

#[tokio::test]
async fn first_verification_starts_review() {
    let h = Harness::new();
    let id = h.register_alice().await;
    let token = h.technical_token(id);

    let (status, body) = h.verify(id, &token).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "PENDING_REVIEW");
    let password = body["pkcs12_password"].as_str().unwrap();
    assert_eq!(password.len(), 16);

    let vasp = h.vasp(id);
    assert_eq!(vasp.verification_status, VerificationState::PendingReview);
    let technical = vasp.contacts.technical.as_ref().unwrap();
    assert!(technical.verified);
    assert!(technical.token.is_none());

    let admin_token = vasp.admin_verification_token.clone().unwrap();
    let review = h.mailer.sent_to(ADMIN_EMAIL);
    assert_eq!(review.len(), 1);
    assert!(review[0].text.contains(&format!("Token: {admin_token}")));
    assert!(review[0].text.contains("trisa.alice.io"));

    let requests = h.state.store.cert_reqs_for_vasp(VaspId(id)).unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].status, CertificateRequestState::Initialized);
    assert_eq!(requests[0].common_name, "trisa.alice.io");
    let stored = h
        .state
        .secrets
        .decrypt(&requests[0].pkcs12_password, &requests[0].pkcs12_signature)
        .unwrap();
    assert_eq!(stored, password);
}

#[tokio::test]
async fn later_verifications_only_record_the_contact() {
    let h = Harness::new();
    let (id, _) = h.pending_review().await;
    let token = h.legal_token(id);

    let (status, body) = h.verify(id, &token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "PENDING_REVIEW");
    assert!(body.get("pkcs12_password").is_none());
    assert!(body["message"].as_str().unwrap().contains("already sent"));

    assert!(h.vasp(id).contacts.legal.unwrap().verified);
    assert_eq!(h.mailer.sent_to(ADMIN_EMAIL).len(), 1);
    assert_eq!(h.state.store.cert_reqs_for_vasp(VaspId(id)).unwrap().len(), 1);
}

#[tokio::test]
async fn verification_tokens_are_single_use() {
    let h = Harness::new();
    let id = h.register_alice().await;
    let token = h.technical_token(id);
    h.verify(id, &token).await;

    let (status, body) = h.verify(id, &token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, _) = h.verify(id, "not-a-token").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = h.verify(id + 100, &token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = h.verify(id, " ").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn failed_review_email_leaves_token_usable() {
    let h = Harness::new();
    let id = h.register_alice().await;
    let token = h.technical_token(id);

    h.mailer.set_failure(Some("relay down"));
    let (status, _) = h.verify(id, &token).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(h.vasp(id).verification_status, VerificationState::Submitted);
    assert!(h.state.store.cert_reqs_for_vasp(VaspId(id)).unwrap().is_empty());

    h.mailer.set_failure(None);
    let (status, body) = h.verify(id, &token).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["pkcs12_password"].is_string());
}

// -- Review -------------------------------------------------------------------

#[tokio::test]
async fn review_requires_admin_bearer_token() {
    let h = Harness::new();
    let (id, _) = h.pending_review().await;
    let body = json!({
        "id": id,
        "admin_verification_token": h.admin_verification_token(id),
        "accept": true
    });

    let (status, reply) = h.send(post_json("/v1/admin/review", body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(reply["error"]["code"], "UNAUTHORIZED");
    assert_eq!(h.vasp(id).verification_status, VerificationState::PendingReview);
}

#[tokio::test]
async fn review_requires_matching_record_token() {
    let h = Harness::new();
    let (id, _) = h.pending_review().await;
    let (status, body) = h
        .review(json!({"id": id, "admin_verification_token": "wrong", "accept": true}))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");
}

#[tokio::test]
async fn accepted_review_releases_certificate_request() {
    let h = Harness::new();
    let (id, _) = h.pending_review().await;
    let token = h.admin_verification_token(id);

    let (status, body) = h
        .review(json!({"id": id, "admin_verification_token": token, "accept": true}))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "REVIEWED");

    let vasp = h.vasp(id);
    assert_eq!(vasp.verification_status, VerificationState::Reviewed);
    assert!(vasp.admin_verification_token.is_none());
    let requests = h.state.store.cert_reqs_for_vasp(VaspId(id)).unwrap();
    assert_eq!(requests[0].status, CertificateRequestState::ReadyToSubmit);

    let (status, body) = h
        .review(json!({"id": id, "admin_verification_token": token, "accept": true}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn rejected_review_closes_certificate_request() {
    let h = Harness::new();
    let (id, _) = h.pending_review().await;
    let token = h.admin_verification_token(id);

    let (status, _) = h
        .review(json!({"id": id, "admin_verification_token": token, "accept": false}))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = h
        .review(json!({
            "id": id,
            "admin_verification_token": token,
            "accept": false,
            "reject_reason": "legal entity could not be verified"
        }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "REJECTED");

    let requests = h.state.store.cert_reqs_for_vasp(VaspId(id)).unwrap();
    assert_eq!(requests[0].status, CertificateRequestState::Rejected);
    assert_eq!(requests[0].reject_reason, "legal entity could not be verified");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn accepted_review_is_not_overwritten_by_the_cert_manager() {
    let log = Arc::new(WriteLog::default());
    let h = Harness::with_backend(Some(ADMIN_TOKEN), log.clone());
    let (id, _) = h.pending_review().await;
    let token = h.admin_verification_token(id);
    let request_id = h.state.store.cert_reqs_for_vasp(VaspId(id)).unwrap()[0].id;

    log.take();
    let (status, _) = h
        .review(json!({"id": id, "admin_verification_token": token, "accept": true}))
        .await;
    assert_eq!(status, StatusCode::OK);
    // A cert manager pass between the two writes sees the request still
    // INITIALIZED and leaves both records alone.
    assert_eq!(
        log.take(),
        vec![format!("vasp:{id}"), format!("certreq:{}", request_id.get())]
    );

    let ca = Arc::new(MockCertAuthority::new().with_authority(5, "TestNet", 10));
    let storage = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(
        h.state.store.clone(),
        ca,
        h.state.secrets.clone(),
        h.state.notifier.clone(),
        ArchiveStore::new(storage.path()),
        "testnet.directory",
    );
    CertManager::new(pipeline, Duration::from_secs(60)).tick().await;

    assert_eq!(h.vasp(id).verification_status, VerificationState::IssuingCertificate);
    let request = h.state.store.retrieve_cert_req(request_id).unwrap();
    assert_eq!(request.status, CertificateRequestState::Processing);
}

#[tokio::test]
async fn review_before_verification_conflicts() {
    let h = Harness::new();
    let id = h.register_alice().await;
    let (status, _) = h
        .review(json!({"id": id, "admin_verification_token": "anything", "accept": true}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn admin_routes_open_without_configured_token() {
    let h = Harness::with_admin_token(None);
    let (id, _) = h.pending_review().await;
    let body = json!({
        "id": id,
        "admin_verification_token": h.admin_verification_token(id),
        "accept": true
    });
    let (status, _) = h.send(post_json("/v1/admin/review", body)).await;
    assert_eq!(status, StatusCode::OK);
}

// -- Issuance -----------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reviewed_registration_is_issued_a_certificate() {
    let h = Harness::new();
    let (id, password) = h.pending_review().await;
    let token = h.admin_verification_token(id);
    h.review(json!({"id": id, "admin_verification_token": token, "accept": true}))
        .await;

    let ca = Arc::new(MockCertAuthority::new().with_authority(5, "TestNet", 10));
    let storage = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(
        h.state.store.clone(),
        ca.clone(),
        h.state.secrets.clone(),
        h.state.notifier.clone(),
        ArchiveStore::new(storage.path()),
        "testnet.directory",
    );
    let manager = CertManager::new(pipeline, Duration::from_secs(60));

    manager.tick().await;
    let (_, body) = h.send(get(&format!("/v1/status?id={id}"))).await;
    assert_eq!(body["verification_status"], "ISSUING_CERTIFICATE");
    assert_eq!(ca.submitted()[0].pkcs12_password, password);

    let bundle = self_signed_pkcs12("trisa.alice.io", &password).unwrap();
    ca.set_batch(
        1001,
        BatchStatus::ReadyForDownload,
        "",
        ProcessingInfo {
            active: 0,
            success: 1,
            failed: 0,
        },
    );
    ca.set_archive(1001, zip_of("trisa.alice.io.p12", &bundle));
    manager.tick().await;
    manager.wait_for_downloads().await;

    let (status, body) = h
        .send(get("/v1/lookup?common_name=trisa.alice.io"))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["certificate"]["subject"]["common_name"], "trisa.alice.io");
    assert!(body["verified_on"].is_string());

    let (_, body) = h.send(get(&format!("/v1/status?id={id}"))).await;
    assert_eq!(body["verification_status"], "VERIFIED");

    let delivered = h.mailer.sent_to("tech@alice.io");
    assert_eq!(delivered.len(), 2);
    assert_eq!(delivered[1].attachments[0].filename, "1001.zip");
}
