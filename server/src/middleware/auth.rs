use std::collections::HashSet;
use std::future::{ready, Ready};
use std::sync::Arc;

use actix_web::{
    body::MessageBody,
    dev::{Payload, ServiceRequest, ServiceResponse},
    http::header,
    middleware::Next,
    web, FromRequest, HttpMessage, HttpRequest,
};
use chrono::Utc;

use crate::auth_token::{TokenCodec, TokenError, TokenPurpose};
use crate::db::Role;
use crate::error::AppError;

/// Identity established by the authentication stage for the current call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub subject_id: String,
    pub role: Role,
}

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthenticatedUser>()
                .cloned()
                .ok_or_else(|| AppError::unauthenticated("Please authenticate")),
        )
    }
}

/// Paths that skip authentication. Matching is exact.
#[derive(Debug, Clone, Default)]
pub struct PublicRoutes {
    paths: Arc<HashSet<String>>,
}

impl PublicRoutes {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: Arc::new(paths.into_iter().map(Into::into).collect()),
        }
    }

    pub fn with(&self, path: impl Into<String>) -> Self {
        let mut paths = (*self.paths).clone();
        paths.insert(path.into());
        Self {
            paths: Arc::new(paths),
        }
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths.contains(path)
    }
}

fn bearer_token(req: &ServiceRequest) -> Result<&str, AppError> {
    let value = req
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or_else(|| AppError::unauthenticated("Please authenticate"))?
        .to_str()
        .map_err(|_| AppError::unauthenticated("Invalid authorization header format"))?;

    let mut parts = value.split(' ');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None) if scheme == "Bearer" && !token.is_empty() => Ok(token),
        _ => Err(AppError::unauthenticated("Invalid authorization header format")),
    }
}

fn authenticate(req: &ServiceRequest, codec: &TokenCodec) -> Result<AuthenticatedUser, AppError> {
    let token = bearer_token(req)?;
    let claims = codec
        .verify_for(token, TokenPurpose::Access, Utc::now())
        .map_err(|err| match err {
            TokenError::WrongPurpose => AppError::unauthenticated("Invalid token type"),
            _ => AppError::unauthenticated("Invalid or expired token"),
        })?;

    Ok(AuthenticatedUser {
        subject_id: claims.sub,
        role: claims.role,
    })
}

pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<impl MessageBody + 'static>,
) -> Result<ServiceResponse<impl MessageBody>, actix_web::Error> {
    let is_public = req
        .app_data::<web::Data<PublicRoutes>>()
        .is_some_and(|routes| routes.contains(req.path()));

    if is_public {
        return next.call(req).await.map(ServiceResponse::map_into_left_body);
    }

    let Some(codec) = req.app_data::<web::Data<TokenCodec>>().cloned() else {
        let err = AppError::Internal("token codec not available".to_string());
        return Ok(req.error_response(err).map_into_right_body());
    };

    match authenticate(&req, &codec) {
        Ok(user) => {
            req.extensions_mut().insert(user);
            next.call(req).await.map(ServiceResponse::map_into_left_body)
        }
        Err(err) => {
            log::debug!("Rejected unauthenticated call to {}: {}", req.path(), err);
            Ok(req.error_response(err).map_into_right_body())
        }
    }
}
