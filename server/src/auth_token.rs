use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use uuid::Uuid;

use crate::db::models::Role;

type HmacSha256 = Hmac<Sha256>;

const MIN_SECRET_LEN: usize = 32;
const ALGORITHM: &str = "HS256";

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("auth token secret is too short (min {MIN_SECRET_LEN} bytes)")]
    SecretTooShort,

    #[error("malformed auth token")]
    Malformed,

    #[error("auth token signature is invalid")]
    InvalidSignature,

    #[error("auth token is expired")]
    Expired,

    #[error("auth token cannot be used for this purpose")]
    WrongPurpose,

    #[error("auth token lifetime is out of range")]
    LifetimeOutOfRange,
}

/// What a credential may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenPurpose {
    Access,
    Refresh,
    ResetPassword,
    VerifyEmail,
}

impl TokenPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenPurpose::Access => "access",
            TokenPurpose::Refresh => "refresh",
            TokenPurpose::ResetPassword => "reset-password",
            TokenPurpose::VerifyEmail => "verify-email",
        }
    }
}

impl fmt::Display for TokenPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
struct TokenHeader {
    alg: String,
    typ: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    pub sub: String,
    pub role: Role,
    #[serde(rename = "type")]
    pub purpose: TokenPurpose,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

impl TokenClaims {
    pub fn is_expired(&self, reference: DateTime<Utc>) -> bool {
        reference.timestamp() >= self.exp
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0).single().unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// HS256 signer and verifier for self-contained credentials.
#[derive(Clone)]
pub struct TokenCodec {
    secret: Arc<[u8]>,
}

impl TokenCodec {
    pub fn new(secret: impl Into<Vec<u8>>) -> Result<Self, TokenError> {
        let secret = secret.into();
        if secret.len() < MIN_SECRET_LEN {
            return Err(TokenError::SecretTooShort);
        }

        Ok(Self {
            secret: Arc::<[u8]>::from(secret),
        })
    }

    pub fn issue(
        &self,
        subject_id: &str,
        role: Role,
        purpose: TokenPurpose,
        ttl: Duration,
        issued_at: DateTime<Utc>,
    ) -> Result<IssuedToken, TokenError> {
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| issued_at.checked_add_signed(ttl))
            .ok_or(TokenError::LifetimeOutOfRange)?;
        let claims = TokenClaims {
            sub: subject_id.to_string(),
            role,
            purpose,
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        Ok(IssuedToken {
            token: self.encode(&claims)?,
            expires_at: claims.expires_at(),
        })
    }

    pub fn encode(&self, claims: &TokenClaims) -> Result<String, TokenError> {
        let header = TokenHeader {
            alg: ALGORITHM.to_string(),
            typ: "JWT".to_string(),
        };
        let header_b64 = encode_segment(&header)?;
        let payload_b64 = encode_segment(claims)?;
        let signing_input = format!("{header_b64}.{payload_b64}");
        let signature_b64 = URL_SAFE_NO_PAD.encode(self.sign(signing_input.as_bytes())?);
        Ok(format!("{signing_input}.{signature_b64}"))
    }

    pub fn verify(
        &self,
        token: &str,
        reference: DateTime<Utc>,
    ) -> Result<TokenClaims, TokenError> {
        let mut segments = token.split('.');
        let (Some(header_b64), Some(payload_b64), Some(signature_b64), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(TokenError::Malformed);
        };

        // Only the configured MAC family is honoured; "none" and asymmetric
        // algorithms are refused before the signature is looked at.
        let header: TokenHeader = decode_segment(header_b64)?;
        if header.alg != ALGORITHM {
            return Err(TokenError::InvalidSignature);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature_b64)
            .map_err(|_| TokenError::Malformed)?;

        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| TokenError::InvalidSignature)?;
        mac.update(header_b64.as_bytes());
        mac.update(b".");
        mac.update(payload_b64.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::InvalidSignature)?;

        let claims: TokenClaims = decode_segment(payload_b64)?;
        if claims.is_expired(reference) {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }

    /// Verifies `token` and additionally requires its purpose tag to match.
    pub fn verify_for(
        &self,
        token: &str,
        purpose: TokenPurpose,
        reference: DateTime<Utc>,
    ) -> Result<TokenClaims, TokenError> {
        let claims = self.verify(token, reference)?;
        if claims.purpose != purpose {
            return Err(TokenError::WrongPurpose);
        }
        Ok(claims)
    }

    fn sign(&self, bytes: &[u8]) -> Result<Vec<u8>, TokenError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| TokenError::InvalidSignature)?;
        mac.update(bytes);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

fn encode_segment<T: Serialize>(value: &T) -> Result<String, TokenError> {
    let json = serde_json::to_vec(value).map_err(|_| TokenError::Malformed)?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

fn decode_segment<T: for<'de> Deserialize<'de>>(segment: &str) -> Result<T, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| TokenError::Malformed)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::Malformed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"01234567890123456789012345678901";

    fn test_codec() -> TokenCodec {
        TokenCodec::new(SECRET.to_vec()).expect("valid codec")
    }

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(seconds, 0).single().expect("valid timestamp")
    }

    #[test]
    fn issue_and_verify_roundtrip() {
        let codec = test_codec();
        let purposes = [
            TokenPurpose::Access,
            TokenPurpose::Refresh,
            TokenPurpose::ResetPassword,
            TokenPurpose::VerifyEmail,
        ];

        for purpose in purposes {
            let issued = codec
                .issue("user-1", Role::Admin, purpose, Duration::from_secs(60), at(1_000))
                .expect("issue token");
            assert_eq!(issued.expires_at, at(1_060));

            let claims = codec.verify(&issued.token, at(1_030)).expect("verify token");
            assert_eq!(claims.sub, "user-1");
            assert_eq!(claims.role, Role::Admin);
            assert_eq!(claims.purpose, purpose);
            assert_eq!(claims.iat, 1_000);
            assert_eq!(claims.exp, 1_060);
        }
    }

    #[test]
    fn rejects_expired_token() {
        let codec = test_codec();
        let issued = codec
            .issue("u", Role::User, TokenPurpose::Access, Duration::from_secs(30), at(1_000))
            .expect("issue token");

        assert!(matches!(
            codec.verify(&issued.token, at(1_030)),
            Err(TokenError::Expired)
        ));
        assert!(matches!(
            codec.verify(&issued.token, at(5_000)),
            Err(TokenError::Expired)
        ));
    }

    #[test]
    fn rejects_token_signed_with_other_secret() {
        let codec = test_codec();
        let other = TokenCodec::new(b"abcdefghijabcdefghijabcdefghij-other".to_vec())
            .expect("valid codec");
        let issued = other
            .issue("u", Role::User, TokenPurpose::Access, Duration::from_secs(30), at(10))
            .expect("issue token");

        assert!(matches!(
            codec.verify(&issued.token, at(20)),
            Err(TokenError::InvalidSignature)
        ));
    }

    #[test]
    fn rejects_tampered_payload() {
        let codec = test_codec();
        let issued = codec
            .issue("u", Role::User, TokenPurpose::Access, Duration::from_secs(30), at(10))
            .expect("issue token");
        let parts: Vec<&str> = issued.token.split('.').collect();
        let mut chars: Vec<char> = parts[1].chars().collect();
        chars[0] = if chars[0] == 'A' { 'B' } else { 'A' };
        let tampered_payload: String = chars.into_iter().collect();
        let tampered = format!("{}.{}.{}", parts[0], tampered_payload, parts[2]);

        assert!(matches!(
            codec.verify(&tampered, at(20)),
            Err(TokenError::InvalidSignature)
        ));
    }

    #[test]
    fn rejects_role_escalation_with_reused_signature() {
        let codec = test_codec();
        let issued = codec
            .issue("u", Role::User, TokenPurpose::Access, Duration::from_secs(30), at(10))
            .expect("issue token");
        let parts: Vec<&str> = issued.token.split('.').collect();
        let mut claims: TokenClaims = decode_segment(parts[1]).expect("claims");
        claims.role = Role::Admin;
        let forged = format!(
            "{}.{}.{}",
            parts[0],
            encode_segment(&claims).expect("encode"),
            parts[2]
        );

        assert!(matches!(
            codec.verify(&forged, at(20)),
            Err(TokenError::InvalidSignature)
        ));
    }

    #[test]
    fn rejects_none_algorithm() {
        let codec = test_codec();
        let issued = codec
            .issue("u", Role::Admin, TokenPurpose::Access, Duration::from_secs(30), at(10))
            .expect("issue token");
        let parts: Vec<&str> = issued.token.split('.').collect();
        let header = encode_segment(&TokenHeader {
            alg: "none".to_string(),
            typ: "JWT".to_string(),
        })
        .expect("encode");

        let unsigned = format!("{}.{}.", header, parts[1]);
        assert!(matches!(
            codec.verify(&unsigned, at(20)),
            Err(TokenError::InvalidSignature)
        ));

        let rs256 = encode_segment(&TokenHeader {
            alg: "RS256".to_string(),
            typ: "JWT".to_string(),
        })
        .expect("encode");
        let substituted = format!("{}.{}.{}", rs256, parts[1], parts[2]);
        assert!(matches!(
            codec.verify(&substituted, at(20)),
            Err(TokenError::InvalidSignature)
        ));
    }

    #[test]
    fn rejects_malformed_input() {
        let codec = test_codec();
        for token in ["", "abc", "a.b", "a.b.c.d", "!!!.???.***"] {
            assert!(
                matches!(codec.verify(token, at(0)), Err(TokenError::Malformed)),
                "token {token:?} should be malformed"
            );
        }
    }

    #[test]
    fn verify_for_enforces_purpose() {
        let codec = test_codec();
        let refresh = codec
            .issue("u", Role::User, TokenPurpose::Refresh, Duration::from_secs(30), at(10))
            .expect("issue token");

        assert!(codec
            .verify_for(&refresh.token, TokenPurpose::Refresh, at(20))
            .is_ok());
        assert!(matches!(
            codec.verify_for(&refresh.token, TokenPurpose::Access, at(20)),
            Err(TokenError::WrongPurpose)
        ));
    }

    #[test]
    fn rejects_short_secret() {
        assert!(matches!(
            TokenCodec::new(b"short".to_vec()),
            Err(TokenError::SecretTooShort)
        ));
    }

    #[test]
    fn rejects_lifetime_past_representable_time() {
        let codec = test_codec();
        let ttl = Duration::from_secs(100_000_000 * 24 * 3600);
        assert!(matches!(
            codec.issue("u", Role::User, TokenPurpose::Refresh, ttl, at(10)),
            Err(TokenError::LifetimeOutOfRange)
        ));
    }

    #[test]
    fn tokens_issued_in_same_second_differ() {
        let codec = test_codec();
        let a = codec
            .issue("u", Role::User, TokenPurpose::Refresh, Duration::from_secs(30), at(10))
            .expect("issue token");
        let b = codec
            .issue("u", Role::User, TokenPurpose::Refresh, Duration::from_secs(30), at(10))
            .expect("issue token");
        assert_ne!(a.token, b.token);
    }

    #[test]
    fn purpose_serializes_as_kebab_case() {
        assert_eq!(
            serde_json::to_string(&TokenPurpose::ResetPassword).unwrap(),
            "\"reset-password\""
        );
        assert_eq!(TokenPurpose::VerifyEmail.to_string(), "verify-email");
    }
}
