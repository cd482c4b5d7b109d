mod auth;
mod health_check;
mod webhook;

pub use auth::{get_current_user, login, logout, logout_all, refresh, register};
pub use health_check::health_check;
pub use webhook::payment_notification;
