use crate::models::{
    AdminUser, Author, Comment, CreateCommentRequest, DashboardStats, NewAdminUserRequest,
    PostSummary, Role, Subscription, UnknownRole,
};
use async_trait::async_trait;
use sqlx::PgPool;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// RepositoryError
///
/// Failure of a single data-store round trip. Handlers log it and answer with a generic 500;
/// the access guard treats it as "no principal record".
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// An insert hit a unique constraint.
    #[error("record already exists")]
    Duplicate,

    #[error("corrupt admin_users row: {0}")]
    InvalidRole(#[from] UnknownRole),
}

/// Repository Trait
///
/// Abstract contract for the blog's single-table CRUD operations. Handlers only see this
/// trait, so tests can substitute an in-memory implementation.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Comments ---
    async fn add_comment(&self, req: CreateCommentRequest) -> Result<Comment, RepositoryError>;
    // Public listing for one post, newest first.
    async fn get_comments_for_post(&self, post_id: &str) -> Result<Vec<Comment>, RepositoryError>;
    // Moderation listing across every post, newest first.
    async fn list_comments(&self) -> Result<Vec<Comment>, RepositoryError>;
    async fn delete_comment(&self, id: i64) -> Result<bool, RepositoryError>;

    // --- Subscriptions ---
    async fn subscription_exists(&self, email: &str) -> Result<bool, RepositoryError>;
    async fn add_subscription(&self, email: &str) -> Result<Subscription, RepositoryError>;
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>, RepositoryError>;
    async fn delete_subscription(&self, id: i64) -> Result<bool, RepositoryError>;

    // --- Posts & Authors ---
    async fn list_posts(&self) -> Result<Vec<PostSummary>, RepositoryError>;
    async fn delete_post(&self, id: &str) -> Result<bool, RepositoryError>;
    async fn list_authors(&self) -> Result<Vec<Author>, RepositoryError>;
    async fn delete_author(&self, name: &str) -> Result<bool, RepositoryError>;

    // --- Admin Users ---
    async fn list_admin_users(&self) -> Result<Vec<AdminUser>, RepositoryError>;
    async fn add_admin_user(&self, req: NewAdminUserRequest) -> Result<AdminUser, RepositoryError>;
    async fn update_admin_role(
        &self,
        id: Uuid,
        role: Role,
    ) -> Result<Option<AdminUser>, RepositoryError>;
    async fn remove_admin_user(&self, id: Uuid) -> Result<bool, RepositoryError>;

    // --- Dashboard ---
    async fn get_stats(&self) -> Result<DashboardStats, RepositoryError>;
}

/// PrincipalDirectory Trait
///
/// Maps an authenticated identity to its administrative role. `Ok(None)` means the identity
/// has no `admin_users` row and is therefore not an administrator.
#[async_trait]
pub trait PrincipalDirectory: Send + Sync {
    async fn lookup_role(&self, identity_id: Uuid) -> Result<Option<Role>, RepositoryError>;
}

pub type RepositoryState = Arc<dyn Repository>;
pub type DirectoryState = Arc<dyn PrincipalDirectory>;

/// PostgresRepository
///
/// Concrete implementation of both traits, backed by the Supabase Postgres database.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Unique violations become `Duplicate`; everything else stays a database error.
fn unique_violation(e: sqlx::Error) -> RepositoryError {
    let duplicate = e
        .as_database_error()
        .is_some_and(|db| db.is_unique_violation());
    if duplicate {
        RepositoryError::Duplicate
    } else {
        RepositoryError::Database(e)
    }
}

const COMMENT_COLUMNS: &str = "id, name, email, comment, post_id, created_at";
const ADMIN_USER_COLUMNS: &str = "id, user_id, email, role, created_at";

#[async_trait]
impl Repository for PostgresRepository {
    async fn add_comment(&self, req: CreateCommentRequest) -> Result<Comment, RepositoryError> {
        let query = format!(
            "INSERT INTO comments (name, email, comment, post_id) VALUES ($1, $2, $3, $4) RETURNING {COMMENT_COLUMNS}"
        );
        let comment = sqlx::query_as::<_, Comment>(&query)
            .bind(req.name)
            .bind(req.email)
            .bind(req.comment)
            .bind(req.post_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(comment)
    }

    async fn get_comments_for_post(&self, post_id: &str) -> Result<Vec<Comment>, RepositoryError> {
        let query = format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE post_id = $1 ORDER BY created_at DESC"
        );
        let comments = sqlx::query_as::<_, Comment>(&query)
            .bind(post_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(comments)
    }

    async fn list_comments(&self) -> Result<Vec<Comment>, RepositoryError> {
        let query = format!("SELECT {COMMENT_COLUMNS} FROM comments ORDER BY created_at DESC");
        let comments = sqlx::query_as::<_, Comment>(&query)
            .fetch_all(&self.pool)
            .await?;
        Ok(comments)
    }

    async fn delete_comment(&self, id: i64) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM comments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn subscription_exists(&self, email: &str) -> Result<bool, RepositoryError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM subscriptions WHERE email = $1)",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn add_subscription(&self, email: &str) -> Result<Subscription, RepositoryError> {
        let subscription = sqlx::query_as::<_, Subscription>(
            "INSERT INTO subscriptions (email) VALUES ($1) RETURNING id, email, created_at",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(unique_violation)?;
        Ok(subscription)
    }

    async fn list_subscriptions(&self) -> Result<Vec<Subscription>, RepositoryError> {
        let subscriptions = sqlx::query_as::<_, Subscription>(
            "SELECT id, email, created_at FROM subscriptions ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(subscriptions)
    }

    async fn delete_subscription(&self, id: i64) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_posts(&self) -> Result<Vec<PostSummary>, RepositoryError> {
        let posts = sqlx::query_as::<_, PostSummary>(
            "SELECT id, title, date, author, published, tags FROM posts ORDER BY date DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }

    async fn delete_post(&self, id: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_authors(&self) -> Result<Vec<Author>, RepositoryError> {
        let authors = sqlx::query_as::<_, Author>(
            "SELECT name, bio, x_link, fb_link, insta_link, pfp_link FROM authors ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(authors)
    }

    async fn delete_author(&self, name: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM authors WHERE name = $1")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_admin_users(&self) -> Result<Vec<AdminUser>, RepositoryError> {
        let query = format!("SELECT {ADMIN_USER_COLUMNS} FROM admin_users ORDER BY created_at");
        let users = sqlx::query_as::<_, AdminUser>(&query)
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    async fn add_admin_user(&self, req: NewAdminUserRequest) -> Result<AdminUser, RepositoryError> {
        let query = format!(
            "INSERT INTO admin_users (user_id, email, role) VALUES ($1, $2, $3) RETURNING {ADMIN_USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, AdminUser>(&query)
            .bind(req.user_id)
            .bind(req.email)
            .bind(req.role.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(unique_violation)?;
        Ok(user)
    }

    async fn update_admin_role(
        &self,
        id: Uuid,
        role: Role,
    ) -> Result<Option<AdminUser>, RepositoryError> {
        let query = format!(
            "UPDATE admin_users SET role = $1 WHERE id = $2 RETURNING {ADMIN_USER_COLUMNS}"
        );
        let user = sqlx::query_as::<_, AdminUser>(&query)
            .bind(role.as_str())
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn remove_admin_user(&self, id: Uuid) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM admin_users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// get_stats
    ///
    /// One count per table. `posts` and `authors` are owned by the content editor but the
    /// dashboard still reports their size.
    async fn get_stats(&self) -> Result<DashboardStats, RepositoryError> {
        let count = |table: &'static str| {
            let pool = self.pool.clone();
            async move {
                let sql = format!("SELECT COUNT(*) FROM {table}");
                sqlx::query_scalar::<_, i64>(&sql).fetch_one(&pool).await
            }
        };

        Ok(DashboardStats {
            posts: count("posts").await?,
            comments: count("comments").await?,
            subscriptions: count("subscriptions").await?,
            authors: count("authors").await?,
        })
    }
}

#[async_trait]
impl PrincipalDirectory for PostgresRepository {
    async fn lookup_role(&self, identity_id: Uuid) -> Result<Option<Role>, RepositoryError> {
        let role = sqlx::query_scalar::<_, String>(
            "SELECT role FROM admin_users WHERE user_id = $1 LIMIT 1",
        )
        .bind(identity_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(role.map(|raw| raw.parse::<Role>()).transpose()?)
    }
}
