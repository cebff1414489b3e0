mod auth;
mod health_check;

pub use auth::{login, logout, profile, refresh};
pub use health_check::health_check;
