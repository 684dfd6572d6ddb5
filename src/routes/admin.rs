use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get, post, put},
};

/// Admin Router Module
///
/// Every path here starts with `/admin`, so the access guard only lets a request through
/// when the caller is an authenticated principal, with the login page as the one exception.
///
/// Role granularity is enforced inside each handler through `CurrentPrincipal::require`:
/// editors moderate comments, admins also manage subscriptions, super admins also manage
/// the admin users themselves. Every entry of the dashboard navigation has a route here.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /admin
        // Dashboard: table sizes plus the navigation visible to the caller's role.
        .route("/admin", get(handlers::dashboard))
        // GET/POST /admin/login
        // The entry path. Admins who are already signed in are forwarded by the guard.
        .route(
            "/admin/login",
            get(handlers::login_page).post(handlers::login),
        )
        // POST /admin/logout
        .route("/admin/logout", post(handlers::logout))
        // --- Content (editor; authors need admin) ---
        .route("/admin/posts", get(handlers::list_posts))
        .route("/admin/posts/{id}", delete(handlers::delete_post))
        .route("/admin/authors", get(handlers::list_authors))
        .route("/admin/authors/{name}", delete(handlers::delete_author))
        // --- Moderation (editor) ---
        .route("/admin/comments", get(handlers::list_comments))
        .route("/admin/comments/{id}", delete(handlers::delete_comment))
        // --- Subscribers (admin) ---
        .route("/admin/subscriptions", get(handlers::list_subscriptions))
        .route(
            "/admin/subscriptions/{id}",
            delete(handlers::delete_subscription),
        )
        // --- Admin Users (super_admin) ---
        .route(
            "/admin/users",
            get(handlers::list_admin_users).post(handlers::add_admin_user),
        )
        .route("/admin/users/{id}", delete(handlers::remove_admin_user))
        .route("/admin/users/{id}/role", put(handlers::update_admin_role))
}
