use actix_web::{post, web, HttpResponse};
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};

use crate::{
    auth_token::IssuedToken,
    error::Result,
    middleware::AuthenticatedUser,
    services::{AuthService, AuthSession, AuthTokens},
};

use super::users::UserResponse;
use super::SuccessResponse;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailRequest {
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenDetail {
    pub token: String,
    pub expires: String,
}

impl From<&IssuedToken> for TokenDetail {
    fn from(issued: &IssuedToken) -> Self {
        Self {
            token: issued.token.clone(),
            expires: issued.expires_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenPairResponse {
    pub access: TokenDetail,
    pub refresh: TokenDetail,
}

impl From<&AuthTokens> for TokenPairResponse {
    fn from(tokens: &AuthTokens) -> Self {
        Self {
            access: TokenDetail::from(&tokens.access),
            refresh: TokenDetail::from(&tokens.refresh),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub tokens: TokenPairResponse,
}

impl From<&AuthSession> for AuthResponse {
    fn from(session: &AuthSession) -> Self {
        Self {
            user: UserResponse::from(&session.user),
            tokens: TokenPairResponse::from(&session.tokens),
        }
    }
}

#[post("/register")]
pub async fn register(
    req: web::Json<RegisterRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse> {
    let session = auth.register(&req.name, &req.email, &req.password).await?;
    Ok(HttpResponse::Ok().json(AuthResponse::from(&session)))
}

#[post("/login")]
pub async fn login(
    req: web::Json<LoginRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse> {
    let session = auth.login(&req.email, &req.password).await?;
    Ok(HttpResponse::Ok().json(AuthResponse::from(&session)))
}

#[post("/logout")]
pub async fn logout(
    req: web::Json<RefreshTokenRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse> {
    auth.logout(&req.refresh_token).await?;
    Ok(HttpResponse::Ok().json(SuccessResponse::new("Logout successful")))
}

#[post("/refresh-tokens")]
pub async fn refresh_tokens(
    req: web::Json<RefreshTokenRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse> {
    let tokens = auth.refresh_auth(&req.refresh_token).await?;
    Ok(HttpResponse::Ok().json(TokenPairResponse::from(&tokens)))
}

#[post("/forgot-password")]
pub async fn forgot_password(
    req: web::Json<ForgotPasswordRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse> {
    auth.forgot_password(&req.email).await?;
    Ok(HttpResponse::Ok().json(SuccessResponse::new(
        "If email exists, reset instructions have been sent",
    )))
}

#[post("/reset-password")]
pub async fn reset_password(
    req: web::Json<ResetPasswordRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse> {
    auth.reset_password(&req.token, &req.password).await?;
    Ok(HttpResponse::Ok().json(SuccessResponse::new("Password reset successfully")))
}

#[post("/send-verification-email")]
pub async fn send_verification_email(
    user: AuthenticatedUser,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse> {
    auth.send_verification_email(&user.subject_id).await?;
    Ok(HttpResponse::Ok().json(SuccessResponse::new("Verification email sent")))
}

#[post("/verify-email")]
pub async fn verify_email(
    req: web::Json<VerifyEmailRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse> {
    auth.verify_email(&req.token).await?;
    Ok(HttpResponse::Ok().json(SuccessResponse::new("Email verified successfully")))
}
