use axum::{Router, extract::FromRef, http::HeaderName};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod error;
pub mod guard;
pub mod handlers;
pub mod models;
pub mod repository;
pub mod session;

// Routing segregation (Public, Admin).
pub mod routes;
use routes::{admin, public};

// --- Public Re-exports ---

pub use auth::{IdentityState, SupabaseAuthClient};
pub use config::AppConfig;
pub use guard::{GuardState, with_access_guard};
pub use repository::{DirectoryState, PostgresRepository, RepositoryState};

/// ApiDoc
///
/// OpenAPI document for the JSON endpoints, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::add_comment, handlers::get_comments, handlers::subscribe,
        handlers::dashboard, handlers::list_comments, handlers::delete_comment,
        handlers::list_posts, handlers::delete_post, handlers::list_authors,
        handlers::delete_author, handlers::list_subscriptions, handlers::delete_subscription,
        handlers::list_admin_users, handlers::add_admin_user, handlers::update_admin_role,
        handlers::remove_admin_user
    ),
    components(
        schemas(
            models::Role, models::Principal, models::AdminUser, models::Comment,
            models::Subscription, models::CreateCommentRequest, models::SubscribeRequest,
            models::UpdateRoleRequest, models::NewAdminUserRequest, models::PostSummary,
            models::Author, models::MessageResponse, models::CommentCreatedResponse,
            models::DashboardStats, models::NavItem, models::DashboardResponse,
        )
    ),
    tags(
        (name = "confessions-of-grace", description = "Confessions of Grace blog API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single, immutable container of every service a handler may need. Each collaborator
/// is a trait object so tests can swap in fakes; nothing lives in a process-wide global.
#[derive(Clone)]
pub struct AppState {
    /// CRUD over comments, subscriptions and admin users.
    pub repo: RepositoryState,
    /// Identity -> role lookups (the Principal Directory).
    pub directory: DirectoryState,
    /// Session validation, refresh, sign-in and sign-out.
    pub identity: IdentityState,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

impl FromRef<AppState> for GuardState {
    fn from_ref(app_state: &AppState) -> GuardState {
        GuardState {
            identity: app_state.identity.clone(),
            directory: app_state.directory.clone(),
            timeout: app_state.config.auth_timeout,
            secure_cookies: app_state.config.secure_cookies,
        }
    }
}

/// create_router
///
/// Assembles every route behind the access guard and adds the observability layers.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");
    let guard_state = GuardState::from_ref(&state);

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        // Everything under /admin, including the login page, is classified by the guard.
        .merge(admin::admin_routes())
        // Must be registered before the guard layer so unknown admin paths are guarded too.
        .fallback(handlers::not_found)
        .with_state(state);

    with_access_guard(base_router, guard_state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for `TraceLayer` carrying the request id next to method and URI, so every log line
/// of one request, guard decisions included, can be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
