use actix_web::{get, web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::{error::Result, middleware::RateLimiter};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub message: String,
    pub rate_limited_clients: usize,
}

#[get("/health")]
pub async fn health_check(rate_limiter: Option<web::Data<RateLimiter>>) -> Result<HttpResponse> {
    let rate_limited_clients = rate_limiter
        .map(|limiter| limiter.tracked_clients())
        .unwrap_or(0);

    let response = HealthCheckResponse {
        status: "healthy".to_string(),
        message: "Server is running".to_string(),
        rate_limited_clients,
    };

    Ok(HttpResponse::Ok().json(response))
}
