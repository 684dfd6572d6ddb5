#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, Response, header},
};
use chrono::Utc;
use grace_blog::{
    AppConfig, AppState,
    auth::{
        AuthError, CookieUpdate, Identity, IdentityProvider, IssuedSession, SessionOutcome,
        SessionTokens, SignedIn,
    },
    models::{
        AdminUser, Author, Comment, CreateCommentRequest, DashboardStats, NewAdminUserRequest,
        PostSummary, Role, Subscription,
    },
    repository::{PrincipalDirectory, Repository, RepositoryError},
};
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use uuid::Uuid;

// --- Well-known identities ---

pub const EDITOR_ID: Uuid = Uuid::from_u128(0xE0);
pub const ADMIN_ID: Uuid = Uuid::from_u128(0xA0);
pub const SUPER_ADMIN_ID: Uuid = Uuid::from_u128(0x5A);
pub const READER_ID: Uuid = Uuid::from_u128(0x10);

pub fn identity(id: Uuid) -> Identity {
    Identity {
        id,
        email: Some(format!("{}@grace.blog", id.simple())),
    }
}

pub fn issued(tag: &str) -> IssuedSession {
    IssuedSession {
        access_token: format!("access-{tag}"),
        refresh_token: format!("refresh-{tag}"),
        expires_in: 3600,
    }
}

// --- Mock Identity Provider ---

/// In-memory identity provider. Access tokens listed in `sessions` are valid; refresh tokens
/// listed in `refreshable` are exchanged for a new pair; any other refresh token is rejected
/// and the session cleared.
#[derive(Default)]
pub struct MockIdentity {
    pub sessions: HashMap<String, Identity>,
    pub refreshable: HashMap<String, SignedIn>,
    // email -> (password, result)
    pub accounts: HashMap<String, (String, SignedIn)>,
    pub unreachable: bool,
    pub delay: Option<Duration>,
    pub validate_calls: AtomicUsize,
    pub sign_out_calls: AtomicUsize,
}

impl MockIdentity {
    pub fn with_session(mut self, access_token: &str, id: Uuid) -> Self {
        self.sessions.insert(access_token.to_string(), identity(id));
        self
    }

    pub fn with_refresh(mut self, refresh_token: &str, id: Uuid, tag: &str) -> Self {
        self.refreshable.insert(
            refresh_token.to_string(),
            SignedIn {
                identity: identity(id),
                session: issued(tag),
            },
        );
        self
    }

    pub fn with_account(mut self, email: &str, password: &str, id: Uuid) -> Self {
        self.accounts.insert(
            email.to_string(),
            (
                password.to_string(),
                SignedIn {
                    identity: identity(id),
                    session: issued("login"),
                },
            ),
        );
        self
    }

    pub fn validate_calls(&self) -> usize {
        self.validate_calls.load(Ordering::SeqCst)
    }

    pub fn sign_out_calls(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }
}

fn provider_down() -> AuthError {
    AuthError::Rejected {
        status: 503,
        message: "upstream unavailable".to_string(),
    }
}

#[async_trait]
impl IdentityProvider for MockIdentity {
    async fn validate_and_refresh(
        &self,
        tokens: &SessionTokens,
    ) -> Result<SessionOutcome, AuthError> {
        self.validate_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.unreachable {
            return Err(provider_down());
        }

        if let Some(identity) = tokens
            .access_token
            .as_ref()
            .and_then(|token| self.sessions.get(token))
        {
            return Ok(SessionOutcome::authenticated(identity.clone()));
        }

        match tokens.refresh_token.as_ref() {
            Some(refresh) => match self.refreshable.get(refresh) {
                Some(signed_in) => Ok(SessionOutcome {
                    identity: Some(signed_in.identity.clone()),
                    cookies: CookieUpdate::Replace(signed_in.session.clone()),
                }),
                None => Ok(SessionOutcome {
                    identity: None,
                    cookies: CookieUpdate::Clear,
                }),
            },
            None => Ok(SessionOutcome::anonymous()),
        }
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<SignedIn, AuthError> {
        match self.accounts.get(email) {
            Some((expected, signed_in)) if expected == password => Ok(signed_in.clone()),
            _ => Err(AuthError::Rejected {
                status: 400,
                message: "Invalid login credentials".to_string(),
            }),
        }
    }

    async fn sign_out(&self, _access_token: &str) -> Result<(), AuthError> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// --- Mock Principal Directory ---

#[derive(Default)]
pub struct MockDirectory {
    pub roles: HashMap<Uuid, Role>,
    pub failing: bool,
    pub delay: Option<Duration>,
    pub lookups: AtomicUsize,
}

impl MockDirectory {
    pub fn with(mut self, id: Uuid, role: Role) -> Self {
        self.roles.insert(id, role);
        self
    }

    /// Editor, admin and super admin principals.
    pub fn staff() -> Self {
        Self::default()
            .with(EDITOR_ID, Role::Editor)
            .with(ADMIN_ID, Role::Admin)
            .with(SUPER_ADMIN_ID, Role::SuperAdmin)
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PrincipalDirectory for MockDirectory {
    async fn lookup_role(&self, identity_id: Uuid) -> Result<Option<Role>, RepositoryError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(self.roles.get(&identity_id).copied())
    }
}

// --- Mock Repository ---

#[derive(Default)]
pub struct MockRepo {
    pub comments: Mutex<Vec<Comment>>,
    pub subscriptions: Mutex<Vec<Subscription>>,
    pub admin_users: Mutex<Vec<AdminUser>>,
    pub posts: Mutex<Vec<PostSummary>>,
    pub authors: Mutex<Vec<Author>>,
    pub stats: DashboardStats,
    pub failing: bool,
    // `subscription_exists` answers false regardless of stored rows, as when a concurrent
    // sign-up commits between the check and the insert.
    pub stale_exists_check: bool,
}

impl MockRepo {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    fn check(&self) -> Result<(), RepositoryError> {
        if self.failing {
            Err(RepositoryError::Database(sqlx::Error::PoolTimedOut))
        } else {
            Ok(())
        }
    }
}

pub fn comment(id: i64, post_id: &str) -> Comment {
    Comment {
        id,
        name: format!("Reader {id}"),
        email: format!("reader{id}@example.com"),
        comment: "Lovely post".to_string(),
        post_id: post_id.to_string(),
        created_at: Utc::now(),
    }
}

pub fn subscription(id: i64, email: &str) -> Subscription {
    Subscription {
        id,
        email: email.to_string(),
        created_at: Utc::now(),
    }
}

pub fn post(id: &str) -> PostSummary {
    PostSummary {
        id: id.to_string(),
        title: format!("Post {id}"),
        date: Utc::now(),
        author: "Grace".to_string(),
        published: true,
        tags: vec!["faith".to_string()],
    }
}

pub fn author(name: &str) -> Author {
    Author {
        name: name.to_string(),
        bio: "Writes about grace.".to_string(),
        ..Author::default()
    }
}

pub fn admin_user(id: u128, user_id: Uuid, role: Role) -> AdminUser {
    AdminUser {
        id: Uuid::from_u128(id),
        user_id,
        email: format!("{}@grace.blog", user_id.simple()),
        role,
        created_at: Utc::now(),
    }
}

#[async_trait]
impl Repository for MockRepo {
    async fn add_comment(&self, req: CreateCommentRequest) -> Result<Comment, RepositoryError> {
        self.check()?;
        let mut comments = self.comments.lock().unwrap();
        let comment = Comment {
            id: comments.len() as i64 + 1,
            name: req.name,
            email: req.email,
            comment: req.comment,
            post_id: req.post_id,
            created_at: Utc::now(),
        };
        comments.push(comment.clone());
        Ok(comment)
    }

    async fn get_comments_for_post(&self, post_id: &str) -> Result<Vec<Comment>, RepositoryError> {
        self.check()?;
        Ok(self
            .comments
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.post_id == post_id)
            .cloned()
            .collect())
    }

    async fn list_comments(&self) -> Result<Vec<Comment>, RepositoryError> {
        self.check()?;
        Ok(self.comments.lock().unwrap().clone())
    }

    async fn delete_comment(&self, id: i64) -> Result<bool, RepositoryError> {
        self.check()?;
        let mut comments = self.comments.lock().unwrap();
        let before = comments.len();
        comments.retain(|c| c.id != id);
        Ok(comments.len() < before)
    }

    async fn subscription_exists(&self, email: &str) -> Result<bool, RepositoryError> {
        self.check()?;
        if self.stale_exists_check {
            return Ok(false);
        }
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .any(|s| s.email == email))
    }

    async fn add_subscription(&self, email: &str) -> Result<Subscription, RepositoryError> {
        self.check()?;
        let mut subscriptions = self.subscriptions.lock().unwrap();
        if subscriptions.iter().any(|s| s.email == email) {
            return Err(RepositoryError::Duplicate);
        }
        let created = subscription(subscriptions.len() as i64 + 1, email);
        subscriptions.push(created.clone());
        Ok(created)
    }

    async fn list_subscriptions(&self) -> Result<Vec<Subscription>, RepositoryError> {
        self.check()?;
        Ok(self.subscriptions.lock().unwrap().clone())
    }

    async fn delete_subscription(&self, id: i64) -> Result<bool, RepositoryError> {
        self.check()?;
        let mut subscriptions = self.subscriptions.lock().unwrap();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        Ok(subscriptions.len() < before)
    }

    async fn list_posts(&self) -> Result<Vec<PostSummary>, RepositoryError> {
        self.check()?;
        Ok(self.posts.lock().unwrap().clone())
    }

    async fn delete_post(&self, id: &str) -> Result<bool, RepositoryError> {
        self.check()?;
        let mut posts = self.posts.lock().unwrap();
        let before = posts.len();
        posts.retain(|p| p.id != id);
        Ok(posts.len() < before)
    }

    async fn list_authors(&self) -> Result<Vec<Author>, RepositoryError> {
        self.check()?;
        Ok(self.authors.lock().unwrap().clone())
    }

    async fn delete_author(&self, name: &str) -> Result<bool, RepositoryError> {
        self.check()?;
        let mut authors = self.authors.lock().unwrap();
        let before = authors.len();
        authors.retain(|a| a.name != name);
        Ok(authors.len() < before)
    }

    async fn list_admin_users(&self) -> Result<Vec<AdminUser>, RepositoryError> {
        self.check()?;
        Ok(self.admin_users.lock().unwrap().clone())
    }

    async fn add_admin_user(&self, req: NewAdminUserRequest) -> Result<AdminUser, RepositoryError> {
        self.check()?;
        let mut users = self.admin_users.lock().unwrap();
        if users
            .iter()
            .any(|u| u.email == req.email || u.user_id == req.user_id)
        {
            return Err(RepositoryError::Duplicate);
        }
        let user = AdminUser {
            id: Uuid::new_v4(),
            user_id: req.user_id,
            email: req.email,
            role: req.role,
            created_at: Utc::now(),
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn update_admin_role(
        &self,
        id: Uuid,
        role: Role,
    ) -> Result<Option<AdminUser>, RepositoryError> {
        self.check()?;
        let mut users = self.admin_users.lock().unwrap();
        Ok(users.iter_mut().find(|u| u.id == id).map(|user| {
            user.role = role;
            user.clone()
        }))
    }

    async fn remove_admin_user(&self, id: Uuid) -> Result<bool, RepositoryError> {
        self.check()?;
        let mut users = self.admin_users.lock().unwrap();
        let before = users.len();
        users.retain(|u| u.id != id);
        Ok(users.len() < before)
    }

    async fn get_stats(&self) -> Result<DashboardStats, RepositoryError> {
        self.check()?;
        Ok(self.stats.clone())
    }
}

// --- App & Request Helpers ---

pub struct TestApp {
    pub router: Router,
    pub repo: Arc<MockRepo>,
    pub identity: Arc<MockIdentity>,
    pub directory: Arc<MockDirectory>,
}

pub fn create_test_app(repo: MockRepo, identity: MockIdentity, directory: MockDirectory) -> TestApp {
    let repo = Arc::new(repo);
    let identity = Arc::new(identity);
    let directory = Arc::new(directory);

    let state = AppState {
        repo: repo.clone(),
        directory: directory.clone(),
        identity: identity.clone(),
        config: AppConfig::default(),
    };

    TestApp {
        router: grace_blog::create_router(state),
        repo,
        identity,
        directory,
    }
}

/// Access tokens accepted by `staff_identity`, one per principal plus a plain reader.
pub const EDITOR_TOKEN: &str = "tok-editor";
pub const ADMIN_TOKEN: &str = "tok-admin";
pub const SUPER_ADMIN_TOKEN: &str = "tok-super";
pub const READER_TOKEN: &str = "tok-reader";

pub fn staff_identity() -> MockIdentity {
    MockIdentity::default()
        .with_session(EDITOR_TOKEN, EDITOR_ID)
        .with_session(ADMIN_TOKEN, ADMIN_ID)
        .with_session(SUPER_ADMIN_TOKEN, SUPER_ADMIN_ID)
        .with_session(READER_TOKEN, READER_ID)
}

pub fn get(uri: &str, access_token: Option<&str>) -> Request<Body> {
    request("GET", uri, access_token, Body::empty(), None)
}

pub fn request(
    method: &str,
    uri: &str,
    access_token: Option<&str>,
    body: Body,
    content_type: Option<&str>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = access_token {
        builder = builder.header(header::COOKIE, format!("sb-access-token={token}"));
    }
    if let Some(content_type) = content_type {
        builder = builder.header(header::CONTENT_TYPE, content_type);
    }
    builder.body(body).unwrap()
}

pub fn json_request(method: &str, uri: &str, access_token: Option<&str>, body: serde_json::Value) -> Request<Body> {
    request(
        method,
        uri,
        access_token,
        Body::from(body.to_string()),
        Some("application/json"),
    )
}

pub fn location(response: &Response<Body>) -> Option<&str> {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
}

pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok().map(str::to_string))
        .collect()
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_str(&body_string(response).await).unwrap()
}
