use actix_web::{
    body::MessageBody,
    dev::{ServiceRequest, ServiceResponse},
    middleware::Next,
};
use std::time::Instant;

/// Logs every call with its outcome and duration.
pub async fn logging_middleware(
    req: ServiceRequest,
    next: Next<impl MessageBody + 'static>,
) -> Result<ServiceResponse<impl MessageBody>, actix_web::Error> {
    let method = req.method().clone();
    let path = req.path().to_string();
    let started = Instant::now();

    let result = next.call(req).await;
    let elapsed = started.elapsed();

    match &result {
        Ok(res) if res.status().as_u16() < 400 => {
            log::info!("{} {} -> {} ({:?})", method, path, res.status().as_u16(), elapsed);
        }
        Ok(res) => {
            let reason = res
                .response()
                .error()
                .map(|err| err.to_string())
                .unwrap_or_default();
            log::error!(
                "{} {} -> {} ({:?}) {}",
                method,
                path,
                res.status().as_u16(),
                elapsed,
                reason
            );
        }
        Err(err) => {
            log::error!("{} {} -> error ({:?}) {}", method, path, elapsed, err);
        }
    }

    result
}
