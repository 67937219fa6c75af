//! Session cookies for [`tower`] services, scoped to a cookie domain picked per request.
//!
//! The [`SessionManagerLayer`] loads a [`Session`] for every request, hands it to the inner
//! service through the request extensions, and afterwards decides whether the session cookie
//! should be deleted, refreshed, or left alone. The `Domain` attribute of that cookie is
//! resolved from the request's host by a [`DomainResolver`]: an ordered list of
//! `(domain, pattern)` rules where the first pattern matching the start of the host wins.
//!
//! ```
//! use tower_host_sessions::{CookieOptions, DomainResolver, MemoryStore, SessionConfig, SessionManagerLayer};
//!
//! let domains = DomainResolver::from_rules(Some(".fallback.org"), [
//! 	(".example.com", r"[a-zA-Z0-9\-_.:]*\.example\.com"),
//! ])?;
//!
//! let config = SessionConfig::new(CookieOptions::default(), domains);
//! let layer = SessionManagerLayer::new(config, MemoryStore::new());
//! # let _ = layer;
//! # Ok::<(), tower_host_sessions::InvalidDomainPattern>(())
//! ```
//!
//! [`tower`]: https://docs.rs/tower

mod errors;
pub use errors::{SessionError, SessionManagerError};

mod domain;
pub use domain::{DomainResolver, DomainRule, InvalidDomainPattern};

mod cookie_options;
pub use cookie_options::CookieOptions;

mod config;
pub use config::SessionConfig;

mod key;
pub use key::{ParseSessionKeyError, SessionKey};

mod expiry;
pub use expiry::{Expiry, ExpiryPolicy};

mod session;
pub use session::{Session, SessionState};

pub mod store;
pub use store::{CreateError, Record, SaveError, SessionStore};

mod memory;
pub use memory::MemoryStore;

mod request;
pub use request::RequestInfo;

pub mod lifecycle;
pub use lifecycle::{Action, CookieDecision, Verdict, evaluate, process_response};

mod layer;
pub use layer::SessionManagerLayer;

mod service;
pub use service::SessionManager;

#[cfg(feature = "axum")]
mod axum;

#[cfg(feature = "axum")]
pub use axum::MissingSession;

pub use cookie::SameSite;
