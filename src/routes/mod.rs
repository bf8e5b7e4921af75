mod auth;
mod health_check;

pub use auth::{exchange_token, issue_token};
pub use health_check::health_check;
