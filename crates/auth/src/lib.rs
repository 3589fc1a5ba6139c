//! `nova-auth`: pure authorization for the admin client.
//!
//! Profiles, permission checks and the menu permission filter. No IO, no
//! async, no storage.

pub mod authorize;
pub mod menu;
pub mod permissions;
pub mod profile;
pub mod roles;

pub use authorize::{AuthzError, authorize, authorize_route};
pub use menu::{MenuNode, breadcrumbs_for, filter_menu, find_by_path, flatten};
pub use permissions::Permission;
pub use profile::{ProfilePatch, UserProfile};
pub use roles::Role;
