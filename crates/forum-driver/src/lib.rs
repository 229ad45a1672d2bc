//! `forum-driver` — automation driver for the remote forum.
//!
//! Implements the two scrape workflows end-to-end over a SOCKS-proxied HTTP
//! session:
//!
//! ```text
//! SiteConfig + Credentials
//!     │
//!     ▼
//! GatewayClient   ← reqwest through socks5h://, cookie jar per run,
//!     │             rotated User-Agent/Referer, bounded retry
//!     ▼
//! general::collect_topics        (anonymous pagination walk)
//! activity::collect_activities   (login walk → members → activity log)
//!     │
//!     ▼
//! RunOutput       ← typed records handed back to the orchestrator
//! ```
//!
//! A run is all-or-nothing: any error surfaces as a [`DriverError`] and the
//! partially collected records for that run are discarded by the caller.

pub mod activity;
pub mod client;
pub mod config;
pub mod driver;
pub mod general;
pub mod session;

pub use config::{Credentials, SiteConfig};
pub use driver::ForumDriver;

pub use scrapeboard_core::driver::DriverError;

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, DriverError>;
