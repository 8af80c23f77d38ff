use actix_web::{
    body::MessageBody,
    dev::{ServiceRequest, ServiceResponse},
    http::StatusCode,
    middleware::Next,
    HttpResponseBuilder,
};

/// Response header a handler sets to ask for a different success status.
pub const STATUS_HINT_HEADER: &str = "x-http-code";

/// Attaches a status hint to a response under construction.
pub fn hint_status(builder: &mut HttpResponseBuilder, status: StatusCode) -> &mut HttpResponseBuilder {
    builder.insert_header((STATUS_HINT_HEADER, status.as_str()))
}

/// Rewrites the response status to the handler's hint and strips the header.
/// Hints that are not valid status codes are dropped.
pub async fn status_hint_middleware(
    req: ServiceRequest,
    next: Next<impl MessageBody + 'static>,
) -> Result<ServiceResponse<impl MessageBody>, actix_web::Error> {
    let mut res = next.call(req).await?;

    let hint = res
        .headers_mut()
        .remove(STATUS_HINT_HEADER)
        .next()
        .and_then(|value| value.to_str().ok().and_then(|s| s.parse::<u16>().ok()))
        .and_then(|code| StatusCode::from_u16(code).ok());

    if let Some(status) = hint {
        *res.response_mut().status_mut() = status;
    }

    Ok(res)
}
