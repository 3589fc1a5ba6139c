//! `nova-session`: client-side session, navigation and backend access for
//! the Nova admin console.
//!
//! - [`storage`]: durable token/profile persistence
//! - [`gateway`]: HTTP calls to the admin backend
//! - [`session`]: the session state machine
//! - [`menu`]: the permission-filtered menu
//! - [`router`] and [`guard`]: guarded navigation
//! - [`plugin`]: extensions installed after start-up
//! - [`app`]: wiring

pub mod app;
pub mod gateway;
pub mod guard;
pub mod menu;
pub mod plugin;
pub mod router;
pub mod session;
pub mod storage;

pub use app::{App, AppError, admin_routes};
pub use gateway::{AuthContext, Envelope, HttpGateway, LoginPayload};
pub use guard::NavigationGuard;
pub use menu::{MenuService, MenuSource, admin_menu};
pub use plugin::{Plugin, PluginRegistry};
pub use router::{
    AfterHook, Decision, Guard, Location, MAX_REDIRECTS, Navigation, NavigationError, Route,
    RouteMeta, RouteRecord, Router,
};
pub use session::{Session, SessionManager, SessionPhase, SessionSnapshot};
pub use storage::{
    CredentialStore, FileStorage, KeyValueStorage, MemoryStorage, StorageError, StoredCredentials,
};
