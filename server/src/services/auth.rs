use std::sync::Arc;

use crate::auth_token::TokenPurpose;
use crate::db::{Role, StoreError, User, UserStore};
use crate::error::{AppError, Result};

use super::email::EmailService;
use super::token::{AuthTokens, TokenService};
use super::validation::{normalize_email, normalize_name, validate_password};

const PLEASE_AUTHENTICATE: &str = "Please authenticate";

#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user: User,
    pub tokens: AuthTokens,
}

/// Credential lifecycle: registration, login, rotation, logout, password
/// reset and email verification.
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    tokens: TokenService,
    email: EmailService,
    bcrypt_cost: u32,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        tokens: TokenService,
        email: EmailService,
        bcrypt_cost: u32,
    ) -> Self {
        Self {
            users,
            tokens,
            email,
            bcrypt_cost,
        }
    }

    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<AuthSession> {
        let name = normalize_name(name)?;
        let email = normalize_email(email)?;
        validate_password(password)?;

        if self.users.exists_by_email(&email).await? {
            return Err(AppError::EmailTaken);
        }

        let user = User::new(name, email, password, Role::User, self.bcrypt_cost)?;
        match self.users.create(&user).await {
            Err(StoreError::DuplicateEmail) => return Err(AppError::EmailTaken),
            other => other?,
        }

        let tokens = self.tokens.generate_auth_tokens(&user).await?;
        log::info!("Registered user {}", user.id);
        Ok(AuthSession { user, tokens })
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthSession> {
        let email = email.trim().to_lowercase();

        let Some(user) = self.users.find_by_email(&email).await? else {
            log::warn!("Failed login attempt for unknown email");
            return Err(AppError::InvalidCredentials);
        };

        // A corrupt hash is reported the same way as a wrong password.
        if !user.verify_password(password).unwrap_or(false) {
            log::warn!("Failed login attempt for user {}", user.id);
            return Err(AppError::InvalidCredentials);
        }

        let tokens = self.tokens.generate_auth_tokens(&user).await?;
        log::info!("Successful login for user {}", user.id);
        Ok(AuthSession { user, tokens })
    }

    pub async fn logout(&self, refresh_token: &str) -> Result<()> {
        let record = self
            .tokens
            .find_record(refresh_token, TokenPurpose::Refresh)
            .await?
            .ok_or_else(|| AppError::not_found("Token not found"))?;

        if !self.tokens.revoke(&record).await? {
            return Err(AppError::not_found("Token not found"));
        }
        Ok(())
    }

    /// Rotates a refresh credential into a new pair. Of concurrent callers
    /// presenting the same credential, only the one whose delete removed the
    /// record gets a pair.
    pub async fn refresh_auth(&self, refresh_token: &str) -> Result<AuthTokens> {
        let reject = || AppError::unauthenticated(PLEASE_AUTHENTICATE);

        let record = self
            .tokens
            .find_record(refresh_token, TokenPurpose::Refresh)
            .await?
            .ok_or_else(reject)?;

        let claims = self
            .tokens
            .verify(refresh_token, TokenPurpose::Refresh)
            .map_err(|err| {
                log::debug!("Refresh token rejected: {}", err);
                reject()
            })?;

        if claims.sub != record.user_id {
            return Err(reject());
        }

        let user = self
            .users
            .find_by_id(&record.user_id)
            .await?
            .ok_or_else(reject)?;

        if !self.tokens.revoke(&record).await? {
            log::warn!("Refresh token for user {} was already consumed", user.id);
            return Err(reject());
        }

        self.tokens.generate_auth_tokens(&user).await
    }

    /// Unknown addresses succeed silently.
    pub async fn forgot_password(&self, email: &str) -> Result<()> {
        let email = email.trim().to_lowercase();
        let Some(user) = self.users.find_by_email(&email).await? else {
            log::debug!("Password reset requested for unknown email");
            return Ok(());
        };

        let issued = self
            .tokens
            .issue_stored(&user, TokenPurpose::ResetPassword)
            .await?;
        self.email
            .send_reset_password_email(&user.email, &issued.token)
            .await?;

        log::info!("Password reset token issued for user {}", user.id);
        Ok(())
    }

    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<()> {
        validate_password(new_password)?;

        let record = self
            .tokens
            .find_record(token, TokenPurpose::ResetPassword)
            .await?
            .ok_or(AppError::PasswordResetFailed)?;

        let claims = self
            .tokens
            .verify(token, TokenPurpose::ResetPassword)
            .map_err(|_| AppError::PasswordResetFailed)?;
        if claims.sub != record.user_id {
            return Err(AppError::PasswordResetFailed);
        }

        let mut user = self
            .users
            .find_by_id(&record.user_id)
            .await?
            .ok_or(AppError::PasswordResetFailed)?;

        // Only the caller that removes the record may change the password.
        if !self.tokens.revoke(&record).await? {
            log::warn!("Reset token for user {} was already consumed", user.id);
            return Err(AppError::PasswordResetFailed);
        }

        user.set_password(new_password, self.bcrypt_cost)?;
        if !self.users.update(&user).await? {
            return Err(AppError::PasswordResetFailed);
        }
        self.tokens
            .revoke_all(&user.id, TokenPurpose::ResetPassword)
            .await?;

        log::info!("Password reset for user {}", user.id);
        Ok(())
    }

    pub async fn send_verification_email(&self, user_id: &str) -> Result<()> {
        let user = self
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))?;

        let issued = self
            .tokens
            .issue_stored(&user, TokenPurpose::VerifyEmail)
            .await?;
        self.email
            .send_verification_email(&user.email, &issued.token)
            .await?;

        log::info!("Verification token issued for user {}", user.id);
        Ok(())
    }

    pub async fn verify_email(&self, token: &str) -> Result<()> {
        let record = self
            .tokens
            .find_record(token, TokenPurpose::VerifyEmail)
            .await?
            .ok_or(AppError::EmailVerificationFailed)?;

        let claims = self
            .tokens
            .verify(token, TokenPurpose::VerifyEmail)
            .map_err(|_| AppError::EmailVerificationFailed)?;
        if claims.sub != record.user_id {
            return Err(AppError::EmailVerificationFailed);
        }

        let mut user = self
            .users
            .find_by_id(&record.user_id)
            .await?
            .ok_or(AppError::EmailVerificationFailed)?;

        if !self.tokens.revoke(&record).await? {
            log::warn!("Verification token for user {} was already consumed", user.id);
            return Err(AppError::EmailVerificationFailed);
        }

        user.mark_email_verified();
        if !self.users.update(&user).await? {
            return Err(AppError::EmailVerificationFailed);
        }
        self.tokens
            .revoke_all(&user.id, TokenPurpose::VerifyEmail)
            .await?;

        log::info!("Email verified for user {}", user.id);
        Ok(())
    }
}
