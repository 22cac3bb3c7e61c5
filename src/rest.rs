//! REST API layer for the course platform using Axum (served on port 8000)
//!
//! HTTP/JSON endpoints for courses, lessons, payments and subscriptions:
//! - Bearer-JWT middleware resolves the principal before any handler runs.
//! - Permission predicates gate each route (staff/owner composition varies).
//! - Shared state carries the storage handle, gateway client and task queue.

use axum::{
    extract::{Path, Query, State},
    http::{header, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::error;

use crate::auth::{create_jwt, hash_password, validate_jwt, verify_password};
use crate::models::{Course, CourseSubscription, Lesson, Payment, PaymentMethod, User};
use crate::pagination::{paginate, PageParams, COURSE_PAGES, LESSON_PAGES};
use crate::payments::PaymentGateway;
use crate::permissions::{is_staff, is_staff_and_owner, is_staff_or_owner};
use crate::storage::{PaymentFilter, Storage};
use crate::tasks::{Task, TaskQueue};

/// Shared app state for REST handlers (Arc-wrapped for concurrency)
#[derive(Clone)]
pub struct AppState {
    storage: Arc<Storage>,
    gateway: Arc<dyn PaymentGateway>,
    tasks: TaskQueue,
}

/// Client-visible error taxonomy. Everything a handler can fail with maps to
/// one of these; the response body is JSON in all cases.
#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    Forbidden,
    NotFound,
    Validation(HashMap<String, Vec<String>>),
    Gateway(String),
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(json!({"detail": "Authentication credentials were not provided or are invalid."})),
            )
                .into_response(),
            ApiError::Forbidden => (
                StatusCode::FORBIDDEN,
                Json(json!({"detail": "You do not have permission to perform this action."})),
            )
                .into_response(),
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                Json(json!({"detail": "Not found."})),
            )
                .into_response(),
            ApiError::Validation(errors) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "errors": errors }))).into_response()
            }
            ApiError::Gateway(message) => (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "detail": message })),
            )
                .into_response(),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"detail": "Internal server error."})),
            )
                .into_response(),
        }
    }
}

impl From<crate::payments::GatewayError> for ApiError {
    fn from(e: crate::payments::GatewayError) -> Self {
        ApiError::Gateway(e.to_string())
    }
}

fn internal<E: std::fmt::Display>(e: E) -> ApiError {
    error!("storage error: {}", e);
    ApiError::Internal
}

fn field_error(field: &str, message: &str) -> ApiError {
    let mut errors = HashMap::new();
    errors.insert(field.to_string(), vec![message.to_string()]);
    ApiError::Validation(errors)
}

fn require_not_blank(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(field_error(field, "This field may not be blank."));
    }
    Ok(())
}

// --- Auth (register/login issue the platform's own JWTs) ---

#[derive(Deserialize)]
pub struct UserRegister {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct UserLogin {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
}

/// Validates the bearer token, resolves the principal from storage and hands
/// it to the handler as a request extension.
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut req: Request<axum::body::Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;

    if !auth_header.starts_with("Bearer ") {
        return Err(ApiError::Unauthorized);
    }

    let token = &auth_header[7..];
    let claims = validate_jwt(token).map_err(|_| ApiError::Unauthorized)?;

    // Token may outlive the account; treat a missing user as unauthenticated.
    let user = state
        .storage
        .get_user(&claims.sub)
        .map_err(internal)?
        .ok_or(ApiError::Unauthorized)?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

/// Create the Axum router with the full platform surface.
pub fn create_router(
    storage: Storage,
    gateway: Arc<dyn PaymentGateway>,
    tasks: TaskQueue,
) -> Router {
    let state = Arc::new(AppState {
        storage: Arc::new(storage),
        gateway,
        tasks,
    });

    let auth_routes = Router::new()
        .route("/course/", get(list_courses_handler).post(create_course_handler))
        .route(
            "/course/:id/",
            get(retrieve_course_handler)
                .put(update_course_handler)
                .patch(update_course_handler)
                .delete(delete_course_handler),
        )
        .route("/lesson/create/", post(create_lesson_handler))
        .route("/lesson/", get(list_lessons_handler))
        .route("/lesson/:id/", get(retrieve_lesson_handler))
        .route("/lesson/update/:id/", patch(update_lesson_handler).put(update_lesson_handler))
        .route("/lesson/delete/:id/", delete(delete_lesson_handler))
        .route("/payments", get(list_payments_handler))
        .route("/payments/create/", post(create_payment_handler))
        .route("/subscription/create/", post(create_subscription_handler))
        .route("/subscription/delete/:id/", delete(delete_subscription_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/register", post(register_handler))
        .route("/login", post(login_handler))
        .route("/health", get(health_handler))
        .merge(auth_routes)
        .with_state(state)
}

async fn register_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UserRegister>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    require_not_blank("username", &payload.username)?;
    require_not_blank("password", &payload.password)?;

    let hash = hash_password(&payload.password).map_err(internal)?;
    let user = User {
        username: payload.username.clone(),
        password_hash: hash,
        is_staff: false,
    };
    state
        .storage
        .create_user(user)
        .map_err(|_| field_error("username", "A user with that username already exists."))?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "username": payload.username })),
    ))
}

async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UserLogin>,
) -> Result<Json<LoginResponse>, ApiError> {
    let user = state
        .storage
        .get_user(&payload.username)
        .map_err(internal)?
        .ok_or(ApiError::Unauthorized)?;

    if !verify_password(&payload.password, &user.password_hash).unwrap_or(false) {
        return Err(ApiError::Unauthorized);
    }

    let token = create_jwt(&user.username).map_err(internal)?;
    Ok(Json(LoginResponse { token }))
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

// --- Courses (authenticated AND (staff OR owner)) ---

#[derive(Deserialize)]
pub struct CourseCreate {
    pub title: String,
    pub description: String,
}

#[derive(Deserialize)]
pub struct CourseUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
}

async fn list_courses_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Query(params): Query<PageParams>,
) -> Result<Json<crate::pagination::Page<Course>>, ApiError> {
    let courses: Vec<Course> = state
        .storage
        .list_courses()
        .map_err(internal)?
        .into_iter()
        .filter(|c| is_staff_or_owner(&user, &c.owner))
        .collect();
    Ok(Json(paginate(courses, &params, COURSE_PAGES)))
}

async fn create_course_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(payload): Json<CourseCreate>,
) -> Result<(StatusCode, Json<Course>), ApiError> {
    require_not_blank("title", &payload.title)?;

    let course = Course {
        id: state.storage.next_id().map_err(internal)?,
        title: payload.title,
        description: payload.description,
        // Owner always comes from the principal, never the body.
        owner: user.username,
    };
    state.storage.insert_course(&course).map_err(internal)?;
    Ok((StatusCode::CREATED, Json(course)))
}

async fn retrieve_course_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<u64>,
) -> Result<Json<Course>, ApiError> {
    let course = state
        .storage
        .get_course(id)
        .map_err(internal)?
        .ok_or(ApiError::NotFound)?;
    if !is_staff_or_owner(&user, &course.owner) {
        return Err(ApiError::Forbidden);
    }
    Ok(Json(course))
}

async fn update_course_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<u64>,
    Json(payload): Json<CourseUpdate>,
) -> Result<Json<Course>, ApiError> {
    let mut course = state
        .storage
        .get_course(id)
        .map_err(internal)?
        .ok_or(ApiError::NotFound)?;
    if !is_staff_or_owner(&user, &course.owner) {
        return Err(ApiError::Forbidden);
    }

    if let Some(title) = payload.title {
        require_not_blank("title", &title)?;
        course.title = title;
    }
    if let Some(description) = payload.description {
        course.description = description;
    }
    state.storage.update_course(&course).map_err(internal)?;

    // Fire-and-forget: subscribers get notified, the client never waits on it.
    state.tasks.submit(Task::CourseUpdated(course.id));

    Ok(Json(course))
}

async fn delete_course_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<u64>,
) -> Result<StatusCode, ApiError> {
    let course = state
        .storage
        .get_course(id)
        .map_err(internal)?
        .ok_or(ApiError::NotFound)?;
    if !is_staff_or_owner(&user, &course.owner) {
        return Err(ApiError::Forbidden);
    }
    state.storage.delete_course(id).map_err(internal)?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Lessons ---

#[derive(Deserialize)]
pub struct LessonCreate {
    pub title: String,
    pub description: String,
    pub preview: Option<String>,
    pub video_link: Option<String>,
    pub course: Option<u64>,
    // Accepted for wire compatibility, always overwritten server-side.
    #[allow(dead_code)]
    pub owner: Option<String>,
}

#[derive(Deserialize)]
pub struct LessonUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub preview: Option<String>,
    pub video_link: Option<String>,
    pub course: Option<u64>,
}

fn require_course_exists(state: &AppState, course_id: u64) -> Result<(), ApiError> {
    if state.storage.get_course(course_id).map_err(internal)?.is_none() {
        return Err(field_error("course", "Referenced course does not exist."));
    }
    Ok(())
}

/// Staff only; owner is the creating principal regardless of the body.
async fn create_lesson_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(payload): Json<LessonCreate>,
) -> Result<(StatusCode, Json<Lesson>), ApiError> {
    if !is_staff(&user) {
        return Err(ApiError::Forbidden);
    }
    require_not_blank("title", &payload.title)?;
    if let Some(course_id) = payload.course {
        require_course_exists(&state, course_id)?;
    }

    let lesson = Lesson {
        id: state.storage.next_id().map_err(internal)?,
        title: payload.title,
        description: payload.description,
        preview: payload.preview,
        video_link: payload.video_link,
        course: payload.course,
        owner: user.username,
    };
    state.storage.insert_lesson(&lesson).map_err(internal)?;
    Ok((StatusCode::CREATED, Json(lesson)))
}

async fn list_lessons_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Query(params): Query<PageParams>,
) -> Result<Json<crate::pagination::Page<Lesson>>, ApiError> {
    let lessons: Vec<Lesson> = state
        .storage
        .list_lessons()
        .map_err(internal)?
        .into_iter()
        .filter(|l| is_staff_or_owner(&user, &l.owner))
        .collect();
    Ok(Json(paginate(lessons, &params, LESSON_PAGES)))
}

async fn retrieve_lesson_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<u64>,
) -> Result<Json<Lesson>, ApiError> {
    let lesson = state
        .storage
        .get_lesson(id)
        .map_err(internal)?
        .ok_or(ApiError::NotFound)?;
    if !is_staff_or_owner(&user, &lesson.owner) {
        return Err(ApiError::Forbidden);
    }
    Ok(Json(lesson))
}

async fn update_lesson_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<u64>,
    Json(payload): Json<LessonUpdate>,
) -> Result<Json<Lesson>, ApiError> {
    let mut lesson = state
        .storage
        .get_lesson(id)
        .map_err(internal)?
        .ok_or(ApiError::NotFound)?;
    if !is_staff_or_owner(&user, &lesson.owner) {
        return Err(ApiError::Forbidden);
    }

    if let Some(title) = payload.title {
        require_not_blank("title", &title)?;
        lesson.title = title;
    }
    if let Some(description) = payload.description {
        lesson.description = description;
    }
    if let Some(preview) = payload.preview {
        lesson.preview = Some(preview);
    }
    if let Some(video_link) = payload.video_link {
        lesson.video_link = Some(video_link);
    }
    if let Some(course_id) = payload.course {
        require_course_exists(&state, course_id)?;
        lesson.course = Some(course_id);
    }
    state.storage.update_lesson(&lesson).map_err(internal)?;
    Ok(Json(lesson))
}

/// Conjunctive gate: the caller must be the owner AND staff. Stricter than
/// update, kept exactly as the product defines it.
async fn delete_lesson_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Path(id): Path<u64>,
) -> Result<StatusCode, ApiError> {
    let lesson = state
        .storage
        .get_lesson(id)
        .map_err(internal)?
        .ok_or(ApiError::NotFound)?;
    if !is_staff_and_owner(&user, &lesson.owner) {
        return Err(ApiError::Forbidden);
    }
    state.storage.delete_lesson(id).map_err(internal)?;
    Ok(StatusCode::NO_CONTENT)
}

// --- Payments ---

#[derive(Deserialize)]
pub struct PaymentListQuery {
    pub paid_course: Option<u64>,
    pub paid_lesson: Option<u64>,
    pub payment_method: Option<String>,
    pub ordering: Option<String>,
}

#[derive(Deserialize)]
pub struct PaymentCreate {
    pub card_number: String,
    pub card_exp_month: String,
    pub card_exp_year: String,
    pub card_cvc: String,
}

#[derive(Serialize)]
pub struct PaymentStatusResponse {
    pub status: String,
}

async fn list_payments_handler(
    State(state): State<Arc<AppState>>,
    Extension(_user): Extension<User>,
    Query(params): Query<PaymentListQuery>,
) -> Result<Json<Vec<Payment>>, ApiError> {
    let payment_method = match params.payment_method.as_deref() {
        Some(raw) => Some(
            PaymentMethod::parse(raw)
                .ok_or_else(|| field_error("payment_method", "Select a valid choice."))?,
        ),
        None => None,
    };

    let filter = PaymentFilter {
        paid_course: params.paid_course,
        paid_lesson: params.paid_lesson,
        payment_method,
    };
    let mut payments = state.storage.list_payments(&filter).map_err(internal)?;

    // Unknown ordering values are ignored, like a standard ordering backend.
    match params.ordering.as_deref() {
        Some("date") => payments.sort_by_key(|p| p.date),
        Some("-date") => {
            payments.sort_by_key(|p| p.date);
            payments.reverse();
        }
        _ => {}
    }

    Ok(Json(payments))
}

/// Two calls to the external gateway: open a charge for the (stub) fixed
/// amount, then execute it with the card details. The card fields pass
/// straight through; nothing about them is stored or echoed back.
async fn create_payment_handler(
    State(state): State<Arc<AppState>>,
    Extension(_user): Extension<User>,
    Json(payload): Json<PaymentCreate>,
) -> Result<Json<PaymentStatusResponse>, ApiError> {
    let bill_id = state.gateway.create_payment(1000, "usd").await?;
    let status = state
        .gateway
        .make_payment(
            &bill_id,
            &payload.card_number,
            &payload.card_exp_month,
            &payload.card_exp_year,
            &payload.card_cvc,
        )
        .await?;
    Ok(Json(PaymentStatusResponse { status }))
}

// --- Course subscriptions (create/destroy, never updated) ---

#[derive(Deserialize)]
pub struct SubscriptionCreate {
    pub course: u64,
}

async fn create_subscription_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
    Json(payload): Json<SubscriptionCreate>,
) -> Result<(StatusCode, Json<CourseSubscription>), ApiError> {
    require_course_exists(&state, payload.course)?;

    let sub = CourseSubscription {
        id: state.storage.next_id().map_err(internal)?,
        user: user.username,
        course: payload.course,
    };
    state.storage.insert_subscription(&sub).map_err(internal)?;
    Ok((StatusCode::CREATED, Json(sub)))
}

/// No ownership check: any authenticated principal may remove a subscription
/// by id. Flagged with product, preserved here.
async fn delete_subscription_handler(
    State(state): State<Arc<AppState>>,
    Extension(_user): Extension<User>,
    Path(id): Path<u64>,
) -> Result<StatusCode, ApiError> {
    if !state.storage.delete_subscription(id).map_err(internal)? {
        return Err(ApiError::NotFound);
    }
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::GatewayError;
    use crate::tasks::TaskQueue;
    use async_trait::async_trait;
    use axum::body::Body;
    use chrono::Utc;
    use axum::http::Request;
    use std::fs;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tower::ServiceExt; // For .oneshot() testing
    use uuid::Uuid;

    struct StubGateway {
        fail: bool,
    }

    #[async_trait]
    impl PaymentGateway for StubGateway {
        async fn create_payment(
            &self,
            _amount: u64,
            _currency: &str,
        ) -> Result<String, GatewayError> {
            if self.fail {
                return Err(GatewayError {
                    message: "connection refused".to_string(),
                });
            }
            Ok(Uuid::new_v4().to_string())
        }

        async fn make_payment(
            &self,
            _bill_id: &str,
            _card_number: &str,
            _card_exp_month: &str,
            _card_exp_year: &str,
            _card_cvc: &str,
        ) -> Result<String, GatewayError> {
            if self.fail {
                return Err(GatewayError {
                    message: "connection refused".to_string(),
                });
            }
            Ok("succeeded".to_string())
        }
    }

    struct TestApp {
        app: Router,
        storage: Storage,
        task_rx: UnboundedReceiver<Task>,
        temp_dir: std::path::PathBuf,
    }

    /// Fresh storage with a staff user ("admin") and a regular user
    /// ("student"), router wired with a stub gateway.
    fn setup(name: &str, gateway_fails: bool) -> TestApp {
        let temp_dir = std::env::temp_dir().join(name);
        let _ = fs::remove_dir_all(&temp_dir);
        let storage = Storage::open(temp_dir.to_str().unwrap()).expect("Storage for REST test");

        storage
            .create_user(User {
                username: "admin".to_string(),
                password_hash: hash_password("adminpass").unwrap(),
                is_staff: true,
            })
            .unwrap();
        storage
            .create_user(User {
                username: "student".to_string(),
                password_hash: hash_password("studentpass").unwrap(),
                is_staff: false,
            })
            .unwrap();

        let (tasks, task_rx) = TaskQueue::new();
        let app = create_router(
            storage.clone(),
            Arc::new(StubGateway {
                fail: gateway_fails,
            }),
            tasks,
        );

        TestApp {
            app,
            storage,
            task_rx,
            temp_dir,
        }
    }

    fn token_for(username: &str) -> String {
        create_jwt(username).unwrap()
    }

    fn request(method: &str, uri: &str, token: Option<&str>, body: Option<serde_json::Value>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri).method(method);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }
        match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    }

    #[tokio::test]
    async fn test_health_is_open() {
        let t = setup("lms_test_rest_health", false);
        let response = t
            .app
            .oneshot(request("GET", "/health", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let _ = fs::remove_dir_all(t.temp_dir);
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let t = setup("lms_test_rest_register", false);

        let response = t
            .app
            .clone()
            .oneshot(request(
                "POST",
                "/register",
                None,
                Some(json!({"username": "newbie", "password": "pw123"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = t
            .app
            .oneshot(request(
                "POST",
                "/login",
                None,
                Some(json!({"username": "newbie", "password": "pw123"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert!(body["token"].as_str().is_some());

        let _ = fs::remove_dir_all(t.temp_dir);
    }

    #[tokio::test]
    async fn test_missing_token_is_401() {
        let t = setup("lms_test_rest_401", false);
        let response = t
            .app
            .oneshot(request("GET", "/lesson/", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let _ = fs::remove_dir_all(t.temp_dir);
    }

    #[tokio::test]
    async fn test_staff_creates_lesson_owner_forced_to_caller() {
        let t = setup("lms_test_rest_lesson_create", false);
        let token = token_for("admin");

        // Body tries to hand ownership to someone else; server must ignore it.
        let response = t
            .app
            .clone()
            .oneshot(request(
                "POST",
                "/lesson/create/",
                Some(&token),
                Some(json!({
                    "title": "Intro",
                    "description": "First lesson",
                    "owner": "student"
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["owner"], "admin");

        let id = body["id"].as_u64().unwrap();
        let response = t
            .app
            .oneshot(request(
                "GET",
                &format!("/lesson/{}/", id),
                Some(&token),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let _ = fs::remove_dir_all(t.temp_dir);
    }

    #[tokio::test]
    async fn test_non_staff_lesson_create_is_403_and_not_persisted() {
        let t = setup("lms_test_rest_lesson_forbidden", false);
        let token = token_for("student");

        let response = t
            .app
            .oneshot(request(
                "POST",
                "/lesson/create/",
                Some(&token),
                Some(json!({"title": "Nope", "description": ""})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(t.storage.list_lessons().unwrap().is_empty());

        let _ = fs::remove_dir_all(t.temp_dir);
    }

    #[tokio::test]
    async fn test_lesson_update_owner_or_staff() {
        let t = setup("lms_test_rest_lesson_update", false);

        let lesson = Lesson {
            id: t.storage.next_id().unwrap(),
            title: "Old title".to_string(),
            description: String::new(),
            preview: None,
            video_link: None,
            course: None,
            owner: "student".to_string(),
        };
        t.storage.insert_lesson(&lesson).unwrap();

        // Owner updates their own lesson.
        let response = t
            .app
            .clone()
            .oneshot(request(
                "PATCH",
                &format!("/lesson/update/{}/", lesson.id),
                Some(&token_for("student")),
                Some(json!({"title": "New title"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            t.storage.get_lesson(lesson.id).unwrap().unwrap().title,
            "New title"
        );

        // A third user who is neither owner nor staff is denied.
        t.storage
            .create_user(User {
                username: "other".to_string(),
                password_hash: hash_password("pw").unwrap(),
                is_staff: false,
            })
            .unwrap();
        let response = t
            .app
            .oneshot(request(
                "PATCH",
                &format!("/lesson/update/{}/", lesson.id),
                Some(&token_for("other")),
                Some(json!({"title": "Hijacked"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let _ = fs::remove_dir_all(t.temp_dir);
    }

    #[tokio::test]
    async fn test_lesson_delete_requires_owner_and_staff() {
        let t = setup("lms_test_rest_lesson_delete", false);

        // Owned by the non-staff student: the owner alone must be denied.
        let student_lesson = Lesson {
            id: t.storage.next_id().unwrap(),
            title: "Student's".to_string(),
            description: String::new(),
            preview: None,
            video_link: None,
            course: None,
            owner: "student".to_string(),
        };
        t.storage.insert_lesson(&student_lesson).unwrap();

        let response = t
            .app
            .clone()
            .oneshot(request(
                "DELETE",
                &format!("/lesson/delete/{}/", student_lesson.id),
                Some(&token_for("student")),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(t.storage.get_lesson(student_lesson.id).unwrap().is_some());

        // Staff but not owner: also denied.
        let response = t
            .app
            .clone()
            .oneshot(request(
                "DELETE",
                &format!("/lesson/delete/{}/", student_lesson.id),
                Some(&token_for("admin")),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        // A staff owner succeeds, and the row is gone afterwards.
        let admin_lesson = Lesson {
            id: t.storage.next_id().unwrap(),
            title: "Admin's".to_string(),
            description: String::new(),
            preview: None,
            video_link: None,
            course: None,
            owner: "admin".to_string(),
        };
        t.storage.insert_lesson(&admin_lesson).unwrap();

        let token = token_for("admin");
        let response = t
            .app
            .clone()
            .oneshot(request(
                "DELETE",
                &format!("/lesson/delete/{}/", admin_lesson.id),
                Some(&token),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = t
            .app
            .oneshot(request(
                "GET",
                &format!("/lesson/{}/", admin_lesson.id),
                Some(&token),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let _ = fs::remove_dir_all(t.temp_dir);
    }

    #[tokio::test]
    async fn test_lesson_course_reference_must_exist() {
        let t = setup("lms_test_rest_lesson_bad_course", false);
        let token = token_for("admin");

        // Create pointing at a course id that was never persisted.
        let response = t
            .app
            .clone()
            .oneshot(request(
                "POST",
                "/lesson/create/",
                Some(&token),
                Some(json!({"title": "Orphan", "description": "", "course": 424242})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["errors"]["course"].is_array());
        assert!(t.storage.list_lessons().unwrap().is_empty());

        // Update re-pointing an existing lesson at a missing course.
        let lesson = Lesson {
            id: t.storage.next_id().unwrap(),
            title: "Valid".to_string(),
            description: String::new(),
            preview: None,
            video_link: None,
            course: None,
            owner: "admin".to_string(),
        };
        t.storage.insert_lesson(&lesson).unwrap();

        let response = t
            .app
            .oneshot(request(
                "PATCH",
                &format!("/lesson/update/{}/", lesson.id),
                Some(&token),
                Some(json!({"course": 424242})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["errors"]["course"].is_array());
        // The lesson is untouched.
        assert_eq!(t.storage.get_lesson(lesson.id).unwrap().unwrap().course, None);

        let _ = fs::remove_dir_all(t.temp_dir);
    }

    #[tokio::test]
    async fn test_lesson_list_visibility_and_pagination() {
        let t = setup("lms_test_rest_lesson_list", false);

        for i in 0..7 {
            let owner = if i < 6 { "student" } else { "admin" };
            let lesson = Lesson {
                id: t.storage.next_id().unwrap(),
                title: format!("lesson {}", i),
                description: String::new(),
                preview: None,
                video_link: None,
                course: None,
                owner: owner.to_string(),
            };
            t.storage.insert_lesson(&lesson).unwrap();
        }

        // The student sees only their own six, in creation order.
        let response = t
            .app
            .clone()
            .oneshot(request("GET", "/lesson/", Some(&token_for("student")), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["count"], 6);
        assert_eq!(body["results"].as_array().unwrap().len(), 5); // lesson page default
        assert_eq!(body["results"][0]["title"], "lesson 0");
        assert_eq!(body["next"], 2);
        assert_eq!(body["previous"], serde_json::Value::Null);

        // Staff see all seven.
        let response = t
            .app
            .oneshot(request(
                "GET",
                "/lesson/?page=2&page_size=5",
                Some(&token_for("admin")),
                None,
            ))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["count"], 7);
        assert_eq!(body["results"].as_array().unwrap().len(), 2);
        assert_eq!(body["previous"], 1);

        let _ = fs::remove_dir_all(t.temp_dir);
    }

    #[tokio::test]
    async fn test_course_update_dispatches_notification() {
        let mut t = setup("lms_test_rest_course_update", false);
        let token = token_for("student");

        let response = t
            .app
            .clone()
            .oneshot(request(
                "POST",
                "/course/",
                Some(&token),
                Some(json!({"title": "Rust", "description": "intro"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["owner"], "student");
        let id = body["id"].as_u64().unwrap();

        let response = t
            .app
            .oneshot(request(
                "PATCH",
                &format!("/course/{}/", id),
                Some(&token),
                Some(json!({"description": "updated"})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // The update handler submitted before responding, so the task is
        // already in the channel.
        assert_eq!(t.task_rx.try_recv().unwrap(), Task::CourseUpdated(id));

        let _ = fs::remove_dir_all(t.temp_dir);
    }

    #[tokio::test]
    async fn test_course_retrieve_permissions() {
        let t = setup("lms_test_rest_course_perm", false);

        let course = Course {
            id: t.storage.next_id().unwrap(),
            title: "Private".to_string(),
            description: String::new(),
            owner: "student".to_string(),
        };
        t.storage.insert_course(&course).unwrap();

        t.storage
            .create_user(User {
                username: "other".to_string(),
                password_hash: hash_password("pw").unwrap(),
                is_staff: false,
            })
            .unwrap();

        let response = t
            .app
            .clone()
            .oneshot(request(
                "GET",
                &format!("/course/{}/", course.id),
                Some(&token_for("other")),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        // Staff pass the staff-or-owner gate.
        let response = t
            .app
            .clone()
            .oneshot(request(
                "GET",
                &format!("/course/{}/", course.id),
                Some(&token_for("admin")),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = t
            .app
            .oneshot(request("GET", "/course/999999/", Some(&token_for("admin")), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let _ = fs::remove_dir_all(t.temp_dir);
    }

    #[tokio::test]
    async fn test_payment_create_mirrors_gateway_status() {
        let t = setup("lms_test_rest_payment_create", false);

        let response = t
            .app
            .oneshot(request(
                "POST",
                "/payments/create/",
                Some(&token_for("student")),
                Some(json!({
                    "card_number": "4242424242424242",
                    "card_exp_month": "12",
                    "card_exp_year": "2030",
                    "card_cvc": "123"
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "succeeded");
        // Card data must never be echoed back.
        assert!(!body.to_string().contains("4242"));

        // Nothing was persisted, card data or otherwise.
        assert!(t
            .storage
            .list_payments(&PaymentFilter::default())
            .unwrap()
            .is_empty());

        let _ = fs::remove_dir_all(t.temp_dir);
    }

    #[tokio::test]
    async fn test_payment_gateway_failure_maps_to_502() {
        let t = setup("lms_test_rest_payment_fail", true);

        let response = t
            .app
            .oneshot(request(
                "POST",
                "/payments/create/",
                Some(&token_for("student")),
                Some(json!({
                    "card_number": "4242424242424242",
                    "card_exp_month": "12",
                    "card_exp_year": "2030",
                    "card_cvc": "123"
                })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let _ = fs::remove_dir_all(t.temp_dir);
    }

    #[tokio::test]
    async fn test_payment_list_filter_and_ordering() {
        let t = setup("lms_test_rest_payment_list", false);

        let course_id = t.storage.next_id().unwrap();
        let earlier = Utc::now() - chrono::Duration::days(1);
        let later = Utc::now();
        for (date, method) in [(later, PaymentMethod::Card), (earlier, PaymentMethod::Cash)] {
            let payment = Payment {
                id: t.storage.next_id().unwrap(),
                date,
                paid_course: Some(course_id),
                paid_lesson: None,
                payment_method: method,
            };
            t.storage.insert_payment(&payment).unwrap();
        }

        let token = token_for("student");
        let response = t
            .app
            .clone()
            .oneshot(request(
                "GET",
                &format!("/payments?paid_course={}&ordering=date", course_id),
                Some(&token),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        let results = body.as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["payment_method"], "cash"); // earlier first

        let response = t
            .app
            .clone()
            .oneshot(request(
                "GET",
                "/payments?ordering=-date",
                Some(&token),
                None,
            ))
            .await
            .unwrap();
        let body = body_json(response).await;
        let results = body.as_array().unwrap();
        assert_eq!(results[0]["payment_method"], "card"); // later first

        let response = t
            .app
            .clone()
            .oneshot(request(
                "GET",
                "/payments?payment_method=card",
                Some(&token),
                None,
            ))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body.as_array().unwrap().len(), 1);

        let response = t
            .app
            .oneshot(request(
                "GET",
                "/payments?payment_method=barter",
                Some(&token),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let _ = fs::remove_dir_all(t.temp_dir);
    }

    #[tokio::test]
    async fn test_subscription_lifecycle_without_ownership_check() {
        let t = setup("lms_test_rest_subscription", false);

        let course = Course {
            id: t.storage.next_id().unwrap(),
            title: "Subscribable".to_string(),
            description: String::new(),
            owner: "admin".to_string(),
        };
        t.storage.insert_course(&course).unwrap();

        let response = t
            .app
            .clone()
            .oneshot(request(
                "POST",
                "/subscription/create/",
                Some(&token_for("student")),
                Some(json!({"course": course.id})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["user"], "student");
        let sub_id = body["id"].as_u64().unwrap();

        // Deletion by a different principal goes through: no ownership check.
        let response = t
            .app
            .clone()
            .oneshot(request(
                "DELETE",
                &format!("/subscription/delete/{}/", sub_id),
                Some(&token_for("admin")),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(t.storage.get_subscription(sub_id).unwrap().is_none());

        // Deleting again is a 404.
        let response = t
            .app
            .oneshot(request(
                "DELETE",
                &format!("/subscription/delete/{}/", sub_id),
                Some(&token_for("admin")),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let _ = fs::remove_dir_all(t.temp_dir);
    }

    #[tokio::test]
    async fn test_subscription_requires_existing_course() {
        let t = setup("lms_test_rest_subscription_missing", false);

        let response = t
            .app
            .oneshot(request(
                "POST",
                "/subscription/create/",
                Some(&token_for("student")),
                Some(json!({"course": 424242})),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["errors"]["course"].is_array());

        let _ = fs::remove_dir_all(t.temp_dir);
    }
}
