//! Router Module Index
//!
//! Routes are split by audience. Access control is not applied here: the access guard wraps
//! the merged router and classifies every path by prefix.

/// Routes open to every caller (readers, crawlers, health checks).
pub mod public;

/// Routes under `/admin`. Reachable only by principals, except the login page.
pub mod admin;
