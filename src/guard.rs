//! Access guard.
//!
//! The single authorization checkpoint in front of every route. For each request it:
//!
//! 1. validates and, when needed, refreshes the caller's session (always, even for public
//!    paths, so sessions slide while readers browse),
//! 2. classifies the path as protected admin area, admin entry (login) or public,
//! 3. resolves the caller to unauthenticated / authenticated non-admin / authenticated admin
//!    and either lets the request through or answers with a `302 Found`.
//!
//! Every failure of the identity provider or the principal directory, including a timeout,
//! degrades to the least privileged caller state. The guard never produces a 5xx itself and
//! never says why access was denied.

use std::time::Duration;

use axum::{
    Router,
    extract::{FromRequestParts, Request, State},
    http::{StatusCode, header, request::Parts},
    middleware::{self, Next},
    response::{IntoResponse, Response},
};
use tokio::time::timeout;
use tower_cookies::{CookieManagerLayer, Cookies};

use crate::{
    auth::{Identity, IdentityState},
    error::ApiError,
    models::{Principal, Role},
    repository::DirectoryState,
    session,
};

pub const ADMIN_ROOT: &str = "/admin";
pub const ADMIN_LOGIN_PATH: &str = "/admin/login";

/// RouteClass
///
/// Exactly one class per path. Prefix matching on the raw path, so `/admin`, `/admin/` and
/// `/administrator` are all protected; only the literal login path is the entry path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    ProtectedAdmin,
    AdminEntry,
    Public,
}

impl RouteClass {
    pub fn classify(path: &str) -> Self {
        if path == ADMIN_LOGIN_PATH {
            RouteClass::AdminEntry
        } else if path.starts_with(ADMIN_ROOT) {
            RouteClass::ProtectedAdmin
        } else {
            RouteClass::Public
        }
    }
}

/// CallerState
///
/// Computed fresh for every request; nothing about it is remembered between requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallerState {
    Unauthenticated,
    AuthenticatedNonAdmin,
    AuthenticatedAdmin(Principal),
}

impl CallerState {
    fn label(&self) -> &'static str {
        match self {
            CallerState::Unauthenticated => "unauthenticated",
            CallerState::AuthenticatedNonAdmin => "authenticated_non_admin",
            CallerState::AuthenticatedAdmin(_) => "authenticated_admin",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Redirect(&'static str),
}

/// decide
///
/// The routing decision table. Role granularity is not considered here; pages that need
/// more than "is an administrator" check the attached principal themselves.
pub fn decide(class: RouteClass, caller: &CallerState) -> Decision {
    match (class, caller) {
        (RouteClass::Public, _) => Decision::Allow,
        (RouteClass::ProtectedAdmin, CallerState::AuthenticatedAdmin(_)) => Decision::Allow,
        (RouteClass::ProtectedAdmin, _) => Decision::Redirect(ADMIN_LOGIN_PATH),
        (RouteClass::AdminEntry, CallerState::AuthenticatedAdmin(_)) => {
            Decision::Redirect(ADMIN_ROOT)
        }
        (RouteClass::AdminEntry, _) => Decision::Allow,
    }
}

/// GuardState
///
/// The guard's collaborators. Injected per router so tests can substitute fakes.
#[derive(Clone)]
pub struct GuardState {
    pub identity: IdentityState,
    pub directory: DirectoryState,
    /// Bound on each of the two external calls.
    pub timeout: Duration,
    pub secure_cookies: bool,
}

impl GuardState {
    /// Step 1: one validate-and-refresh exchange, with its cookie changes written to the
    /// outbound response.
    async fn refresh_session(&self, cookies: &Cookies) -> Option<Identity> {
        let tokens = session::read_tokens(cookies);

        match timeout(self.timeout, self.identity.validate_and_refresh(&tokens)).await {
            Ok(Ok(outcome)) => {
                session::apply(cookies, &outcome.cookies, self.secure_cookies);
                outcome.identity
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "session validation failed, treating caller as unauthenticated");
                None
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "session validation timed out, treating caller as unauthenticated"
                );
                None
            }
        }
    }

    /// Step 3a: principal lookup for an authenticated identity.
    async fn resolve_caller(&self, identity: Option<Identity>) -> CallerState {
        let Some(identity) = identity else {
            return CallerState::Unauthenticated;
        };

        match timeout(self.timeout, self.directory.lookup_role(identity.id)).await {
            Ok(Ok(Some(role))) => CallerState::AuthenticatedAdmin(Principal {
                identity_id: identity.id,
                email: identity.email,
                role,
            }),
            Ok(Ok(None)) => CallerState::AuthenticatedNonAdmin,
            Ok(Err(e)) => {
                tracing::warn!(identity = %identity.id, error = %e, "principal lookup failed, treating caller as non-admin");
                CallerState::AuthenticatedNonAdmin
            }
            Err(_) => {
                tracing::warn!(identity = %identity.id, "principal lookup timed out, treating caller as non-admin");
                CallerState::AuthenticatedNonAdmin
            }
        }
    }
}

/// access_guard
///
/// Middleware function installed by [`with_access_guard`]. On "allow" for a protected path
/// the resolved [`Principal`] is inserted into the request extensions.
pub async fn access_guard(
    State(guard): State<GuardState>,
    cookies: Cookies,
    mut request: Request,
    next: Next,
) -> Response {
    let identity = guard.refresh_session(&cookies).await;

    let class = RouteClass::classify(request.uri().path());
    if class == RouteClass::Public {
        return next.run(request).await;
    }

    let caller = guard.resolve_caller(identity).await;
    let decision = decide(class, &caller);

    tracing::debug!(
        path = %request.uri().path(),
        class = ?class,
        caller = caller.label(),
        decision = ?decision,
        "access guard decision"
    );

    match decision {
        Decision::Allow => {
            if let CallerState::AuthenticatedAdmin(principal) = caller {
                request.extensions_mut().insert(principal);
            }
            next.run(request).await
        }
        Decision::Redirect(location) => found(location),
    }
}

/// with_access_guard
///
/// Wraps every route of `router` (fallback included) in the guard. The cookie manager sits
/// outermost so refreshed cookies reach the browser on redirects as well.
pub fn with_access_guard(router: Router, guard: GuardState) -> Router {
    router
        .layer(middleware::from_fn_with_state(guard, access_guard))
        .layer(CookieManagerLayer::new())
}

/// `302 Found` to `location`.
pub fn found(location: &'static str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

/// CurrentPrincipal
///
/// Extractor for handlers behind the guard. A request without an attached principal never
/// passed the guard as an administrator, so it is sent to the login page.
#[derive(Debug, Clone)]
pub struct CurrentPrincipal(pub Principal);

impl CurrentPrincipal {
    /// Page-level role check.
    pub fn require(&self, required: Role) -> Result<&Principal, ApiError> {
        if self.0.role.satisfies(required) {
            Ok(&self.0)
        } else {
            tracing::debug!(
                identity = %self.0.identity_id,
                role = %self.0.role,
                required = %required,
                "insufficient role"
            );
            Err(ApiError::InsufficientRole)
        }
    }
}

impl<S> FromRequestParts<S> for CurrentPrincipal
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .map(CurrentPrincipal)
            .ok_or_else(|| found(ADMIN_LOGIN_PATH))
    }
}
