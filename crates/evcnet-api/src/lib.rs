//! Async client for the EVC-net charging station portal.
//!
//! - [`HttpTransport`] issues browser-shaped form posts with retry and backoff.
//! - [`PortalClient`] performs the form login, the ajax envelope, and
//!   session-expiry detection, and exposes one method per portal endpoint.
//! - [`Session`] holds the portal cookies with redacted `Debug` output.

pub mod auth;
pub mod client;
pub mod endpoints;
pub mod error;
pub mod models;
pub mod transport;

pub use auth::{Credentials, SESSION_COOKIE, Session, SessionCookie};
pub use client::{AjaxCall, PortalClient, Reply};
pub use endpoints::{PortalAction, StartIdentifiers};
pub use error::Error;
pub use models::{RawActionResult, RawLogRow, RawSpot, RawStatusRow, RawUsage, Scalar};
pub use transport::{
    HttpTransport, PortalRequest, PortalResponse, RetryPolicy, Transport, TransportConfig,
};
