pub mod auth;
pub mod health;
pub mod users;

use actix_web::web;
use serde::{Deserialize, Serialize};

pub use auth::{
    forgot_password, login, logout, refresh_tokens, register, reset_password,
    send_verification_email, verify_email,
};
pub use health::health_check;
pub use users::{create_user, delete_user, get_user, list_users, update_user};

/// Paths reachable without an access token.
pub const PUBLIC_PATHS: &[&str] = &[
    "/v1/health",
    "/v1/auth/register",
    "/v1/auth/login",
    "/v1/auth/logout",
    "/v1/auth/refresh-tokens",
    "/v1/auth/forgot-password",
    "/v1/auth/reset-password",
    "/v1/auth/verify-email",
];

#[derive(Debug, Serialize, Deserialize)]
pub struct SuccessResponse {
    pub success: bool,
    pub message: String,
}

impl SuccessResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/v1")
            .service(health_check)
            .service(
                web::scope("/auth")
                    .service(register)
                    .service(login)
                    .service(logout)
                    .service(refresh_tokens)
                    .service(forgot_password)
                    .service(reset_password)
                    .service(send_verification_email)
                    .service(verify_email),
            )
            .service(
                web::scope("/users")
                    .service(create_user)
                    .service(list_users)
                    .service(get_user)
                    .service(update_user)
                    .service(delete_user),
            ),
    );
}
