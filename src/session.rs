//! Session cookie plumbing.
//!
//! The browser carries the Supabase token pair in two cookies. These helpers translate
//! between `tower_cookies::Cookies` and the provider-facing types in [`crate::auth`].

use cookie::SameSite;
use tower_cookies::{Cookie, Cookies};

use crate::auth::{CookieUpdate, IssuedSession, SessionTokens};

pub const ACCESS_COOKIE: &str = "sb-access-token";
pub const REFRESH_COOKIE: &str = "sb-refresh-token";

/// Reads whatever half of the token pair the request carries.
pub fn read_tokens(cookies: &Cookies) -> SessionTokens {
    SessionTokens {
        access_token: cookies
            .get(ACCESS_COOKIE)
            .map(|c| c.value().to_owned())
            .filter(|v| !v.is_empty()),
        refresh_token: cookies
            .get(REFRESH_COOKIE)
            .map(|c| c.value().to_owned())
            .filter(|v| !v.is_empty()),
    }
}

/// Writes the outcome of a validate-and-refresh exchange onto the outbound response.
pub fn apply(cookies: &Cookies, update: &CookieUpdate, secure: bool) {
    match update {
        CookieUpdate::Keep => {}
        CookieUpdate::Replace(session) => store(cookies, session, secure),
        CookieUpdate::Clear => clear(cookies),
    }
}

pub fn store(cookies: &Cookies, session: &IssuedSession, secure: bool) {
    cookies.add(session_cookie(ACCESS_COOKIE, session.access_token.clone(), secure));
    cookies.add(session_cookie(REFRESH_COOKIE, session.refresh_token.clone(), secure));
}

pub fn clear(cookies: &Cookies) {
    for name in [ACCESS_COOKIE, REFRESH_COOKIE] {
        // Removal only reaches the browser's cookie when the path matches the one it was set with.
        cookies.remove(Cookie::build((name, "")).path("/").build());
    }
}

fn session_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}
