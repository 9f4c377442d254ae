use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

/// Tower-compatible middleware that stamps `X-Response-Time-Us` on every
/// response and logs the request at debug level.
pub async fn timing_middleware(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    let start = Instant::now();
    let mut response = next.run(req).await;
    let us = start.elapsed().as_micros();

    if let Ok(val) = us.to_string().parse() {
        response.headers_mut().insert("X-Response-Time-Us", val);
    }

    // SSE responses stay open; their elapsed time is meaningless
    if !path.ends_with("/stream") {
        tracing::debug!(
            %method,
            %path,
            status = response.status().as_u16(),
            us = us as u64,
            "status request",
        );
    }

    response
}
