//! `nova-mock`: in-memory stand-in for the admin backend.
//!
//! Serves the auth and menu endpoints the client talks to, under `/api`.

pub mod app;
pub mod state;

pub use app::build_app;
pub use state::{MockState, MockUser, default_menu};
