use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::auth_token::{IssuedToken, TokenClaims, TokenCodec, TokenError, TokenPurpose};
use crate::config::JwtConfig;
use crate::db::{TokenRecord, TokenStore, User};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct AuthTokens {
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

/// Issues credentials and keeps the server-side record of every non-access one.
#[derive(Clone)]
pub struct TokenService {
    codec: TokenCodec,
    store: Arc<dyn TokenStore>,
    jwt: JwtConfig,
}

impl TokenService {
    pub fn new(codec: TokenCodec, store: Arc<dyn TokenStore>, jwt: JwtConfig) -> Self {
        Self { codec, store, jwt }
    }

    pub fn ttl_for(&self, purpose: TokenPurpose) -> Duration {
        match purpose {
            TokenPurpose::Access => self.jwt.access_ttl(),
            TokenPurpose::Refresh => self.jwt.refresh_ttl(),
            TokenPurpose::ResetPassword => self.jwt.reset_password_ttl(),
            TokenPurpose::VerifyEmail => self.jwt.verify_email_ttl(),
        }
    }

    /// Access credential is returned only; the refresh credential is persisted.
    pub async fn generate_auth_tokens(&self, user: &User) -> Result<AuthTokens> {
        let now = Utc::now();
        let access = self.codec.issue(
            &user.id,
            user.role,
            TokenPurpose::Access,
            self.jwt.access_ttl(),
            now,
        )?;
        let refresh = self.issue_stored(user, TokenPurpose::Refresh).await?;

        log::info!("Issued access and refresh tokens for user {}", user.id);
        Ok(AuthTokens { access, refresh })
    }

    /// Issues a credential of `purpose` and stores its record.
    pub async fn issue_stored(&self, user: &User, purpose: TokenPurpose) -> Result<IssuedToken> {
        let issued = self
            .codec
            .issue(&user.id, user.role, purpose, self.ttl_for(purpose), Utc::now())?;
        self.save_token(&issued, &user.id, purpose).await?;
        Ok(issued)
    }

    pub async fn save_token(
        &self,
        issued: &IssuedToken,
        user_id: &str,
        purpose: TokenPurpose,
    ) -> Result<TokenRecord> {
        let record = TokenRecord::new(
            issued.token.clone(),
            user_id.to_string(),
            purpose,
            issued.expires_at,
        );
        self.store.create(&record).await?;
        Ok(record)
    }

    /// Live record for `token`; blacklisted records are treated as absent.
    pub async fn find_record(&self, token: &str, purpose: TokenPurpose) -> Result<Option<TokenRecord>> {
        let record = self.store.find(token, purpose).await?;
        Ok(record.filter(|r| !r.blacklisted))
    }

    pub fn verify(&self, token: &str, purpose: TokenPurpose) -> std::result::Result<TokenClaims, TokenError> {
        self.codec.verify_for(token, purpose, Utc::now())
    }

    /// Returns `true` only when this call removed the record.
    pub async fn revoke(&self, record: &TokenRecord) -> Result<bool> {
        let removed = self.store.delete(&record.id).await?;
        if removed {
            log::info!("Revoked {} token for user {}", record.purpose, record.user_id);
        }
        Ok(removed)
    }

    pub async fn revoke_all(&self, user_id: &str, purpose: TokenPurpose) -> Result<u64> {
        let removed = self.store.delete_by_user_and_purpose(user_id, purpose).await?;
        log::debug!("Removed {} {} tokens for user {}", removed, purpose, user_id);
        Ok(removed)
    }
}
