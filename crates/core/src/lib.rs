//! `nova-core`: foundation shared by the Nova admin client crates.
//!
//! Error taxonomy, client configuration and identifiers. No IO beyond reading
//! environment variables.

pub mod config;
pub mod error;
pub mod id;

pub use config::{ApiConfig, ClientConfig, RouteConfig, StorageConfig};
pub use error::{ApiError, AuthError, AuthResult};
pub use id::{MenuId, UserId};
