use crate::{
    AppState,
    error::ApiError,
    guard::{self, ADMIN_LOGIN_PATH, ADMIN_ROOT, CurrentPrincipal},
    models::{
        self, AdminUser, Author, Comment, CommentCreatedResponse, CreateCommentRequest,
        DashboardResponse, LoginForm, MessageResponse, NewAdminUserRequest, PostSummary, Role,
        SubscribeRequest, Subscription, UpdateRoleRequest,
    },
    session,
};
use axum::{
    Form, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use askama::Template;
use askama_web::WebTemplate;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use tokio::time::timeout;
use tower_cookies::Cookies;
use uuid::Uuid;

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\S+@\S+\.\S+").expect("email pattern compiles"));

// --- Filter Structs ---

/// CommentFilter
///
/// Query parameters for GET /api/comments.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct CommentFilter {
    /// The post whose comments are requested.
    #[serde(rename = "postId")]
    pub post_id: Option<String>,
}

// --- Public Intake ---

/// add_comment
///
/// [Public Route] Stores a reader comment. All four fields are mandatory.
#[utoipa::path(
    post,
    path = "/api/comments",
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Comment stored", body = CommentCreatedResponse),
        (status = 400, description = "Missing field", body = MessageResponse),
        (status = 500, description = "Store error", body = MessageResponse)
    )
)]
pub async fn add_comment(
    State(state): State<AppState>,
    Json(payload): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<CommentCreatedResponse>), ApiError> {
    let any_missing = [
        &payload.name,
        &payload.email,
        &payload.comment,
        &payload.post_id,
    ]
    .iter()
    .any(|field| field.trim().is_empty());

    if any_missing {
        return Err(ApiError::bad_request("All fields are required"));
    }

    let comment = state
        .repo
        .add_comment(payload)
        .await
        .map_err(ApiError::store("Error submitting comment"))?;

    Ok((
        StatusCode::CREATED,
        Json(CommentCreatedResponse {
            message: "Comment submitted successfully".to_string(),
            data: comment,
        }),
    ))
}

/// get_comments
///
/// [Public Route] Comments of one post, newest first.
#[utoipa::path(
    get,
    path = "/api/comments",
    params(CommentFilter),
    responses(
        (status = 200, description = "Comments", body = [Comment]),
        (status = 400, description = "Missing postId", body = MessageResponse)
    )
)]
pub async fn get_comments(
    State(state): State<AppState>,
    Query(filter): Query<CommentFilter>,
) -> Result<Json<Vec<Comment>>, ApiError> {
    let post_id = filter
        .post_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Post ID is required"))?;

    let comments = state
        .repo
        .get_comments_for_post(&post_id)
        .await
        .map_err(ApiError::store("Error fetching comments"))?;

    Ok(Json(comments))
}

/// subscribe
///
/// [Public Route] Newsletter sign-up. One row per address.
#[utoipa::path(
    post,
    path = "/api/subscribe",
    request_body = SubscribeRequest,
    responses(
        (status = 200, description = "Subscribed", body = MessageResponse),
        (status = 400, description = "Missing, invalid or duplicate email", body = MessageResponse),
        (status = 500, description = "Store error", body = MessageResponse)
    )
)]
pub async fn subscribe(
    State(state): State<AppState>,
    Json(payload): Json<SubscribeRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let email = payload.email.trim();

    if email.is_empty() {
        return Err(ApiError::bad_request("Email is required."));
    }
    if !EMAIL_PATTERN.is_match(email) {
        return Err(ApiError::bad_request("Invalid email address."));
    }

    let exists = state
        .repo
        .subscription_exists(email)
        .await
        .map_err(ApiError::store(
            "An unexpected error occurred while checking email.",
        ))?;
    if exists {
        return Err(ApiError::bad_request("Email is already subscribed."));
    }

    state
        .repo
        .add_subscription(email)
        .await
        // A concurrent sign-up can land between the check and the insert.
        .map_err(ApiError::store_unique(
            "An unexpected error occurred while saving subscription.",
            "Email is already subscribed.",
        ))?;

    Ok(Json(MessageResponse::new("Successfully subscribed!")))
}

// --- Admin Entry ---

/// login_page
///
/// [Entry Route] Renders the sign-in form. The guard has already forwarded callers who are
/// administrators to the dashboard.
pub async fn login_page() -> LoginPageTemplate {
    LoginPageTemplate::default()
}

/// login
///
/// [Entry Route] Signs in with the identity provider, then admits the caller only if a
/// principal record exists. A non-admin is signed straight back out.
pub async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    Form(form): Form<LoginForm>,
) -> Response {
    let email = form.email.trim();
    if email.is_empty() || form.password.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            LoginPageTemplate::failed(email, "Email and password are required."),
        )
            .into_response();
    }

    let signed_in = match state
        .identity
        .sign_in_with_password(email, &form.password)
        .await
    {
        Ok(signed_in) => signed_in,
        Err(e) => {
            tracing::info!(error = %e, "admin sign-in failed");
            return (
                StatusCode::UNAUTHORIZED,
                LoginPageTemplate::failed(email, e.user_message()),
            )
                .into_response();
        }
    };

    let lookup = timeout(
        state.config.auth_timeout,
        state.directory.lookup_role(signed_in.identity.id),
    )
    .await;

    match lookup {
        Ok(Ok(Some(role))) => {
            tracing::info!(identity = %signed_in.identity.id, role = %role, "admin signed in");
            session::store(&cookies, &signed_in.session, state.config.secure_cookies);
            guard::found(ADMIN_ROOT)
        }
        outcome => {
            if let Ok(Err(e)) = &outcome {
                tracing::warn!(identity = %signed_in.identity.id, error = %e, "principal lookup failed at sign-in");
            }
            if let Err(e) = state
                .identity
                .sign_out(&signed_in.session.access_token)
                .await
            {
                tracing::warn!(error = %e, "sign-out of non-admin failed");
            }
            session::clear(&cookies);
            (
                StatusCode::FORBIDDEN,
                LoginPageTemplate::failed(email, "You do not have admin access."),
            )
                .into_response()
        }
    }
}

/// logout
///
/// [Admin Route] Ends the session with the provider (best effort) and drops the cookies.
pub async fn logout(State(state): State<AppState>, cookies: Cookies) -> Response {
    if let Some(access_token) = session::read_tokens(&cookies).access_token {
        if let Err(e) = state.identity.sign_out(&access_token).await {
            tracing::warn!(error = %e, "provider sign-out failed");
        }
    }
    session::clear(&cookies);
    guard::found(ADMIN_LOGIN_PATH)
}

// --- Admin Pages ---

/// dashboard
///
/// [Admin Route] Table sizes and the navigation visible to the caller's role.
#[utoipa::path(
    get,
    path = "/admin",
    responses((status = 200, description = "Dashboard", body = DashboardResponse))
)]
pub async fn dashboard(
    principal: CurrentPrincipal,
    State(state): State<AppState>,
) -> Result<Json<DashboardResponse>, ApiError> {
    let principal = principal.require(Role::Editor)?.clone();

    let stats = state
        .repo
        .get_stats()
        .await
        .map_err(ApiError::store("Error loading dashboard"))?;

    Ok(Json(DashboardResponse {
        nav: models::navigation_for(principal.role),
        principal,
        stats,
    }))
}

/// list_comments
///
/// [Admin Route, editor] Every comment across all posts, newest first.
#[utoipa::path(
    get,
    path = "/admin/comments",
    responses((status = 200, description = "All comments", body = [Comment]))
)]
pub async fn list_comments(
    principal: CurrentPrincipal,
    State(state): State<AppState>,
) -> Result<Json<Vec<Comment>>, ApiError> {
    principal.require(Role::Editor)?;
    let comments = state
        .repo
        .list_comments()
        .await
        .map_err(ApiError::store("Error fetching comments"))?;
    Ok(Json(comments))
}

/// delete_comment
///
/// [Admin Route, editor] Moderation delete.
#[utoipa::path(
    delete,
    path = "/admin/comments/{id}",
    params(("id" = i64, Path, description = "Comment ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not Found", body = MessageResponse)
    )
)]
pub async fn delete_comment(
    principal: CurrentPrincipal,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    principal.require(Role::Editor)?;
    let deleted = state
        .repo
        .delete_comment(id)
        .await
        .map_err(ApiError::store("Failed to delete comment"))?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Comment not found".to_string()))
    }
}

/// list_posts
///
/// [Admin Route, editor] Every post, drafts included, newest first.
#[utoipa::path(
    get,
    path = "/admin/posts",
    responses((status = 200, description = "Posts", body = [PostSummary]))
)]
pub async fn list_posts(
    principal: CurrentPrincipal,
    State(state): State<AppState>,
) -> Result<Json<Vec<PostSummary>>, ApiError> {
    principal.require(Role::Editor)?;
    let posts = state
        .repo
        .list_posts()
        .await
        .map_err(ApiError::store("Error fetching posts"))?;
    Ok(Json(posts))
}

/// delete_post
///
/// [Admin Route, editor]
#[utoipa::path(
    delete,
    path = "/admin/posts/{id}",
    params(("id" = String, Path, description = "Post slug")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not Found", body = MessageResponse)
    )
)]
pub async fn delete_post(
    principal: CurrentPrincipal,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    principal.require(Role::Editor)?;
    let deleted = state
        .repo
        .delete_post(&id)
        .await
        .map_err(ApiError::store("Failed to delete post"))?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Post not found".to_string()))
    }
}

/// list_authors
///
/// [Admin Route, admin] Authors in name order.
#[utoipa::path(
    get,
    path = "/admin/authors",
    responses((status = 200, description = "Authors", body = [Author]))
)]
pub async fn list_authors(
    principal: CurrentPrincipal,
    State(state): State<AppState>,
) -> Result<Json<Vec<Author>>, ApiError> {
    principal.require(Role::Admin)?;
    let authors = state
        .repo
        .list_authors()
        .await
        .map_err(ApiError::store("Error fetching authors"))?;
    Ok(Json(authors))
}

/// delete_author
///
/// [Admin Route, admin]
#[utoipa::path(
    delete,
    path = "/admin/authors/{name}",
    params(("name" = String, Path, description = "Author name")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not Found", body = MessageResponse)
    )
)]
pub async fn delete_author(
    principal: CurrentPrincipal,
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    principal.require(Role::Admin)?;
    let deleted = state
        .repo
        .delete_author(&name)
        .await
        .map_err(ApiError::store("Failed to delete author"))?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Author not found".to_string()))
    }
}

/// list_subscriptions
///
/// [Admin Route, admin] Newsletter subscribers, newest first.
#[utoipa::path(
    get,
    path = "/admin/subscriptions",
    responses((status = 200, description = "Subscriptions", body = [Subscription]))
)]
pub async fn list_subscriptions(
    principal: CurrentPrincipal,
    State(state): State<AppState>,
) -> Result<Json<Vec<Subscription>>, ApiError> {
    principal.require(Role::Admin)?;
    let subscriptions = state
        .repo
        .list_subscriptions()
        .await
        .map_err(ApiError::store("Error fetching subscriptions"))?;
    Ok(Json(subscriptions))
}

/// delete_subscription
///
/// [Admin Route, admin]
#[utoipa::path(
    delete,
    path = "/admin/subscriptions/{id}",
    params(("id" = i64, Path, description = "Subscription ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not Found", body = MessageResponse)
    )
)]
pub async fn delete_subscription(
    principal: CurrentPrincipal,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    principal.require(Role::Admin)?;
    let deleted = state
        .repo
        .delete_subscription(id)
        .await
        .map_err(ApiError::store("Failed to delete subscription"))?;

    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Subscription not found".to_string()))
    }
}

/// list_admin_users
///
/// [Admin Route, super_admin] The Principal Directory, oldest first.
#[utoipa::path(
    get,
    path = "/admin/users",
    responses((status = 200, description = "Admin users", body = [AdminUser]))
)]
pub async fn list_admin_users(
    principal: CurrentPrincipal,
    State(state): State<AppState>,
) -> Result<Json<Vec<AdminUser>>, ApiError> {
    principal.require(Role::SuperAdmin)?;
    let users = state
        .repo
        .list_admin_users()
        .await
        .map_err(ApiError::store("Error fetching admin users"))?;
    Ok(Json(users))
}

/// add_admin_user
///
/// [Admin Route, super_admin] Grants admin access to an existing Supabase identity. One
/// record per email and per identity.
#[utoipa::path(
    post,
    path = "/admin/users",
    request_body = NewAdminUserRequest,
    responses(
        (status = 201, description = "Added", body = AdminUser),
        (status = 400, description = "Missing email or already an admin", body = MessageResponse)
    )
)]
pub async fn add_admin_user(
    principal: CurrentPrincipal,
    State(state): State<AppState>,
    Json(mut payload): Json<NewAdminUserRequest>,
) -> Result<(StatusCode, Json<AdminUser>), ApiError> {
    principal.require(Role::SuperAdmin)?;

    payload.email = payload.email.trim().to_string();
    if payload.email.is_empty() {
        return Err(ApiError::bad_request("Email is required."));
    }

    let user = state
        .repo
        .add_admin_user(payload)
        .await
        .map_err(ApiError::store_unique(
            "Failed to invite admin",
            "This email is already an admin.",
        ))?;

    tracing::info!(
        granted_by = %principal.0.identity_id,
        identity = %user.user_id,
        role = %user.role,
        "admin access granted"
    );
    Ok((StatusCode::CREATED, Json(user)))
}

/// update_admin_role
///
/// [Admin Route, super_admin]
#[utoipa::path(
    put,
    path = "/admin/users/{id}/role",
    params(("id" = Uuid, Path, description = "Admin user ID")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Updated", body = AdminUser),
        (status = 404, description = "Not Found", body = MessageResponse)
    )
)]
pub async fn update_admin_role(
    principal: CurrentPrincipal,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRoleRequest>,
) -> Result<Json<AdminUser>, ApiError> {
    principal.require(Role::SuperAdmin)?;
    state
        .repo
        .update_admin_role(id, payload.role)
        .await
        .map_err(ApiError::store("Failed to update role"))?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Admin user not found".to_string()))
}

/// remove_admin_user
///
/// [Admin Route, super_admin]
#[utoipa::path(
    delete,
    path = "/admin/users/{id}",
    params(("id" = Uuid, Path, description = "Admin user ID")),
    responses(
        (status = 204, description = "Removed"),
        (status = 404, description = "Not Found", body = MessageResponse)
    )
)]
pub async fn remove_admin_user(
    principal: CurrentPrincipal,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    principal.require(Role::SuperAdmin)?;
    let removed = state
        .repo
        .remove_admin_user(id)
        .await
        .map_err(ApiError::store("Failed to remove admin"))?;

    if removed {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Admin user not found".to_string()))
    }
}

/// not_found
///
/// Fallback for unknown paths. Installed before the guard layer so unknown admin paths are
/// guarded like any other.
pub async fn not_found() -> (StatusCode, Json<MessageResponse>) {
    (StatusCode::NOT_FOUND, Json(MessageResponse::new("Not found")))
}

// --- Templates ---

/// LoginPageTemplate
///
/// The admin sign-in form, optionally with the reason the last attempt failed. The email
/// field is refilled so the user only retypes the password.
#[derive(Template, WebTemplate, Default)]
#[template(path = "admin/login.html")]
pub struct LoginPageTemplate {
    pub error: Option<String>,
    pub email: String,
}

impl LoginPageTemplate {
    pub fn failed(email: &str, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            email: email.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_page_escapes_provider_messages() {
        let page = LoginPageTemplate::failed(
            "\"><script>alert(1)</script>",
            "<script>alert('x')</script>",
        )
        .render()
        .unwrap();

        assert!(page.contains("&lt;script&gt;"));
        assert!(!page.contains("<script>"));
        assert!(!page.contains("\"><"));
    }

    #[test]
    fn blank_login_page_has_no_error_block() {
        let page = LoginPageTemplate::default().render().unwrap();

        assert!(page.contains("<h1>Admin Login</h1>"));
        assert!(!page.contains("role=\"alert\""));
    }

    #[test]
    fn email_pattern_requires_at_sign_and_dot() {
        assert!(EMAIL_PATTERN.is_match("reader@example.com"));
        assert!(!EMAIL_PATTERN.is_match("reader@example"));
        assert!(!EMAIL_PATTERN.is_match("not an email"));
    }
}
