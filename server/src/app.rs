use std::sync::Arc;

use actix_web::{
    body::MessageBody,
    dev::{ServiceFactory, ServiceRequest, ServiceResponse},
    middleware::from_fn,
    web, App,
};

use crate::auth_token::TokenCodec;
use crate::config::AppConfig;
use crate::db::{TokenStore, UserStore};
use crate::error::{AppError, Result};
use crate::handlers::{self, PUBLIC_PATHS};
use crate::middleware::{
    auth_middleware, logging_middleware, rate_limit_middleware, recovery_middleware,
    status_hint_middleware, PublicRoutes, RateLimiter,
};
use crate::services::{AuthService, EmailService, TokenService, UserService};

/// Everything the HTTP layer shares across workers.
#[derive(Clone)]
pub struct AppState {
    pub auth: AuthService,
    pub users: UserService,
    pub codec: TokenCodec,
    pub rate_limiter: RateLimiter,
    pub public_routes: PublicRoutes,
}

impl AppState {
    pub fn new(
        config: &AppConfig,
        users: Arc<dyn UserStore>,
        tokens: Arc<dyn TokenStore>,
        email: EmailService,
    ) -> Result<Self> {
        let codec = TokenCodec::new(config.jwt.secret.as_bytes().to_vec())?;
        let token_service = TokenService::new(codec.clone(), tokens.clone(), config.jwt.clone());
        let cost = config.password.bcrypt_cost;

        Ok(Self {
            auth: AuthService::new(users.clone(), token_service, email, cost),
            users: UserService::new(users, tokens, cost),
            codec,
            rate_limiter: RateLimiter::from_config(&config.rate_limit),
            public_routes: PublicRoutes::new(PUBLIC_PATHS.iter().copied()),
        })
    }

    pub fn with_public_route(mut self, path: impl Into<String>) -> Self {
        self.public_routes = self.public_routes.with(path);
        self
    }
}

/// Builds the application with the call pipeline in its fixed order:
/// recovery, logging, admission control, authentication, then the status
/// hint rewrite closest to the handlers.
pub fn build_app(
    state: AppState,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let json_config = web::JsonConfig::default()
        .error_handler(|err, _req| AppError::invalid_argument(err.to_string()).into());
    let query_config = web::QueryConfig::default()
        .error_handler(|err, _req| AppError::invalid_argument(err.to_string()).into());

    // The last `wrap` runs first.
    App::new()
        .app_data(web::Data::new(state.auth))
        .app_data(web::Data::new(state.users))
        .app_data(web::Data::new(state.codec))
        .app_data(web::Data::new(state.rate_limiter))
        .app_data(web::Data::new(state.public_routes))
        .app_data(json_config)
        .app_data(query_config)
        .wrap(from_fn(status_hint_middleware))
        .wrap(from_fn(auth_middleware))
        .wrap(from_fn(rate_limit_middleware))
        .wrap(from_fn(logging_middleware))
        .wrap(from_fn(recovery_middleware))
        .configure(handlers::configure)
}
