use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use uuid::Uuid;

/// Audience Supabase stamps on access tokens of signed-in users.
pub const AUTHENTICATED_AUDIENCE: &str = "authenticated";

/// An access token expiring within this window is refreshed ahead of time.
pub const REFRESH_MARGIN_SECS: i64 = 60;

/// Claims
///
/// The subset of a Supabase access token's payload this service reads. The token is signed
/// with the project's JWT secret and verified locally on every request.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the `auth.users.id` of the signed-in user.
    pub sub: Uuid,
    pub exp: usize,
    pub iat: usize,
    pub aud: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Identity
///
/// Who the current caller is, as far as the identity provider is concerned. Says nothing
/// about administrative rights.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
    pub email: Option<String>,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.sub,
            email: claims.email,
        }
    }
}

/// SessionTokens
///
/// The token pair as read from the request cookies. Either half may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionTokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

/// IssuedSession
///
/// A fresh token pair handed out by the provider on sign-in or refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedSession {
    pub access_token: String,
    pub refresh_token: String,
    /// Lifetime of the access token in seconds.
    pub expires_in: u64,
}

/// CookieUpdate
///
/// What the outbound response must do with the session cookies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieUpdate {
    Keep,
    Replace(IssuedSession),
    Clear,
}

/// SessionOutcome
///
/// Result of one validate-and-refresh exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub identity: Option<Identity>,
    pub cookies: CookieUpdate,
}

impl SessionOutcome {
    pub fn anonymous() -> Self {
        Self {
            identity: None,
            cookies: CookieUpdate::Keep,
        }
    }

    pub fn authenticated(identity: Identity) -> Self {
        Self {
            identity: Some(identity),
            cookies: CookieUpdate::Keep,
        }
    }
}

/// SignedIn
///
/// Identity plus the token pair issued for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedIn {
    pub identity: Identity,
    pub session: IssuedSession,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("auth provider unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("auth provider rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("invalid access token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
}

impl AuthError {
    /// True when the provider answered and refused, as opposed to being unreachable or failing.
    pub fn is_rejection(&self) -> bool {
        matches!(self, AuthError::Rejected { status, .. } if *status < 500)
    }

    /// Message safe to show on the login page.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::Rejected { message, .. } => message.clone(),
            _ => "Authentication failed.".to_string(),
        }
    }
}

/// IdentityProvider Trait
///
/// Session issuance and validation. The access guard calls `validate_and_refresh` exactly
/// once per request; the login and logout handlers use the other two operations.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn validate_and_refresh(
        &self,
        tokens: &SessionTokens,
    ) -> Result<SessionOutcome, AuthError>;

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<SignedIn, AuthError>;

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError>;
}

pub type IdentityState = Arc<dyn IdentityProvider>;

// --- Supabase Auth (GoTrue) ---

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
    expires_in: u64,
    user: GoTrueUser,
}

#[derive(Deserialize)]
struct GoTrueUser {
    id: Uuid,
    email: Option<String>,
}

/// GoTrue has used several error shapes across versions; any of these may carry the message.
#[derive(Deserialize, Default)]
struct GoTrueError {
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
}

impl GoTrueError {
    fn into_message(self) -> Option<String> {
        self.error_description.or(self.msg).or(self.message)
    }
}

impl From<TokenResponse> for SignedIn {
    fn from(token: TokenResponse) -> Self {
        Self {
            identity: Identity {
                id: token.user.id,
                email: token.user.email,
            },
            session: IssuedSession {
                access_token: token.access_token,
                refresh_token: token.refresh_token,
                expires_in: token.expires_in,
            },
        }
    }
}

enum AccessToken {
    Fresh(Claims),
    ExpiringSoon(Claims),
    Expired,
}

/// SupabaseAuthClient
///
/// Identity provider backed by Supabase Auth. Access tokens are verified locally with the
/// project JWT secret; only refresh, sign-in and sign-out go over the network.
pub struct SupabaseAuthClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: String,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl SupabaseAuthClient {
    pub fn new(
        base_url: &str,
        anon_key: &str,
        jwt_secret: &str,
        timeout: Duration,
    ) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[AUTHENTICATED_AUDIENCE]);
        validation.validate_exp = true;
        validation.leeway = 0;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            validation,
        })
    }

    fn inspect(&self, token: &str) -> Result<AccessToken, AuthError> {
        match decode::<Claims>(token, &self.decoding_key, &self.validation) {
            Ok(data) => {
                let remaining = data.claims.exp as i64 - Utc::now().timestamp();
                if remaining > REFRESH_MARGIN_SECS {
                    Ok(AccessToken::Fresh(data.claims))
                } else {
                    Ok(AccessToken::ExpiringSoon(data.claims))
                }
            }
            Err(e) if matches!(e.kind(), ErrorKind::ExpiredSignature) => Ok(AccessToken::Expired),
            // Bad signature, wrong audience or malformed: never worth a refresh attempt.
            Err(e) => Err(AuthError::InvalidToken(e)),
        }
    }

    async fn token_request(
        &self,
        grant_type: &str,
        body: serde_json::Value,
    ) -> Result<SignedIn, AuthError> {
        let url = format!("{}/auth/v1/token?grant_type={}", self.base_url, grant_type);

        let response = self
            .http
            .post(url)
            .header("apikey", &self.anon_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<GoTrueError>()
                .await
                .ok()
                .and_then(GoTrueError::into_message)
                .unwrap_or_else(|| "Authentication failed.".to_string());
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let token = response.json::<TokenResponse>().await?;
        Ok(token.into())
    }
}

#[async_trait]
impl IdentityProvider for SupabaseAuthClient {
    /// validate_and_refresh
    ///
    /// Sliding refresh: a fresh access token is accepted as-is; an expired or soon-to-expire
    /// one (or a missing one with a refresh token still present) is exchanged for a new pair.
    async fn validate_and_refresh(
        &self,
        tokens: &SessionTokens,
    ) -> Result<SessionOutcome, AuthError> {
        let still_valid = match tokens.access_token.as_deref() {
            Some(token) => match self.inspect(token)? {
                AccessToken::Fresh(claims) => {
                    return Ok(SessionOutcome::authenticated(claims.into()));
                }
                AccessToken::ExpiringSoon(claims) => Some(Identity::from(claims)),
                AccessToken::Expired => None,
            },
            None => None,
        };

        let Some(refresh_token) = tokens.refresh_token.as_deref() else {
            return Ok(match still_valid {
                Some(identity) => SessionOutcome::authenticated(identity),
                None => SessionOutcome::anonymous(),
            });
        };

        let refreshed = self
            .token_request(
                "refresh_token",
                serde_json::json!({ "refresh_token": refresh_token }),
            )
            .await;

        match refreshed {
            Ok(signed_in) => Ok(SessionOutcome {
                identity: Some(signed_in.identity),
                cookies: CookieUpdate::Replace(signed_in.session),
            }),
            // The refresh token was revoked or already used: the session is over.
            Err(e) if e.is_rejection() => {
                tracing::debug!(error = %e, "refresh token rejected, clearing session");
                Ok(SessionOutcome {
                    identity: None,
                    cookies: CookieUpdate::Clear,
                })
            }
            // Provider trouble while the current token is still good: ride it out.
            Err(e) => match still_valid {
                Some(identity) => {
                    tracing::warn!(error = %e, "session refresh failed, keeping current token");
                    Ok(SessionOutcome::authenticated(identity))
                }
                None => Err(e),
            },
        }
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<SignedIn, AuthError> {
        self.token_request(
            "password",
            serde_json::json!({ "email": email, "password": password }),
        )
        .await
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
        let url = format!("{}/auth/v1/logout", self.base_url);

        let response = self
            .http
            .post(url)
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(AuthError::Rejected {
                status: status.as_u16(),
                message: "Sign-out failed.".to_string(),
            })
        }
    }
}
