pub mod archive;
pub mod auth;
pub mod catalog;
pub mod filters;
pub mod flash;
pub mod home;
pub mod package;
pub mod router;
pub mod state;
pub mod templates;
pub mod vocabulary;

pub use auth::{CurrentUser, SESSION_COOKIE};
pub use state::AppState;
