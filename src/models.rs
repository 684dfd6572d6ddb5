use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::{fmt, str::FromStr};
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

// --- Roles & Principals ---

/// Role
///
/// Administrative role held by a principal. Variants are declared in ascending order of
/// privilege, so the derived `Ord` gives the hierarchy `Editor < Admin < SuperAdmin`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS, ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Role {
    Editor,
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Editor => "editor",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
        }
    }

    /// True when this role grants at least the privileges of `required`.
    pub fn satisfies(self, required: Role) -> bool {
        self >= required
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "editor" => Ok(Role::Editor),
            "admin" => Ok(Role::Admin),
            "super_admin" => Ok(Role::SuperAdmin),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = UnknownRole;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Principal
///
/// An authenticated identity that has a record in `admin_users`. The access guard attaches
/// it to the request extensions when it lets a protected request through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Principal {
    pub identity_id: Uuid,
    pub email: Option<String>,
    pub role: Role,
}

/// AdminUser
///
/// A row of the `admin_users` table, the Principal Directory.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct AdminUser {
    pub id: Uuid,
    // FK to auth.users.id; the identity the session resolves to.
    pub user_id: Uuid,
    pub email: String,
    #[sqlx(try_from = "String")]
    pub role: Role,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

// --- Blog Intake ---

/// Comment
///
/// A reader comment from the `comments` table.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Comment {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub comment: String,
    pub post_id: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// Subscription
///
/// A newsletter subscription from the `subscriptions` table.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Subscription {
    pub id: i64,
    pub email: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

// --- Blog Content ---

/// PostSummary
///
/// The columns of a `posts` row shown in the admin listing. Posts are keyed by their slug.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct PostSummary {
    pub id: String,
    pub title: String,
    #[ts(type = "string")]
    pub date: DateTime<Utc>,
    pub author: String,
    pub published: bool,
    pub tags: Vec<String>,
}

/// Author
///
/// A row of the `authors` table, keyed by name.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Author {
    pub name: String,
    pub bio: String,
    pub x_link: Option<String>,
    pub fb_link: Option<String>,
    pub insta_link: Option<String>,
    pub pfp_link: Option<String>,
}

// --- Request Payloads ---

/// CreateCommentRequest
///
/// Input payload for POST /api/comments. Missing fields deserialize to empty strings so the
/// handler can answer with the 400 message instead of an extractor rejection.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateCommentRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default, rename = "postId")]
    pub post_id: String,
}

/// SubscribeRequest
///
/// Input payload for POST /api/subscribe.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct SubscribeRequest {
    #[serde(default)]
    pub email: String,
}

/// UpdateRoleRequest
///
/// Input payload for PUT /admin/users/{id}/role.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateRoleRequest {
    pub role: Role,
}

/// NewAdminUserRequest
///
/// Input payload for POST /admin/users. The identity must already exist in Supabase Auth;
/// `user_id` is its `auth.users.id`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct NewAdminUserRequest {
    #[serde(default)]
    pub email: String,
    pub user_id: Uuid,
    pub role: Role,
}

/// LoginForm
///
/// Form fields posted by the admin login page. Missing fields arrive empty so the form can
/// be shown again instead of an extractor rejection.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

// --- Responses ---

/// MessageResponse
///
/// The `{ "message": ... }` body shared by every intake response and error.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// CommentCreatedResponse
///
/// Output of a successful POST /api/comments.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CommentCreatedResponse {
    pub message: String,
    pub data: Comment,
}

/// DashboardStats
///
/// Row counts shown on the admin dashboard.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq, Eq)]
#[ts(export)]
pub struct DashboardStats {
    pub posts: i64,
    pub comments: i64,
    pub subscriptions: i64,
    pub authors: i64,
}

/// NavItem
///
/// An admin navigation entry and the least role allowed to see it.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq, Eq)]
#[ts(export)]
pub struct NavItem {
    pub label: String,
    pub href: String,
    pub min_role: Role,
}

const ADMIN_NAVIGATION: [(&str, &str, Role); 6] = [
    ("Dashboard", "/admin", Role::Editor),
    ("Posts", "/admin/posts", Role::Editor),
    ("Comments", "/admin/comments", Role::Editor),
    ("Subscriptions", "/admin/subscriptions", Role::Admin),
    ("Authors", "/admin/authors", Role::Admin),
    ("Admin Users", "/admin/users", Role::SuperAdmin),
];

/// The navigation entries visible to `role`.
pub fn navigation_for(role: Role) -> Vec<NavItem> {
    ADMIN_NAVIGATION
        .iter()
        .filter(|(_, _, min_role)| role.satisfies(*min_role))
        .map(|(label, href, min_role)| NavItem {
            label: label.to_string(),
            href: href.to_string(),
            min_role: *min_role,
        })
        .collect()
}

/// DashboardResponse
///
/// Output of GET /admin.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct DashboardResponse {
    pub principal: Principal,
    pub stats: DashboardStats,
    pub nav: Vec<NavItem>,
}
