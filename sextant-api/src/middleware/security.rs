//! Security response headers

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

const SECURITY_HEADERS: &[(&str, &str)] = &[
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("referrer-policy", "no-referrer"),
    ("x-xss-protection", "0"),
    ("cross-origin-resource-policy", "same-origin"),
];

/// Adds the standard hardening headers to every response without
/// overriding ones a handler already set.
pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    for (name, value) in SECURITY_HEADERS {
        if !headers.contains_key(*name) {
            headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
        }
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http;
    use axum::http::header;
    use axum::{body::Body, http::StatusCode, middleware::from_fn, routing::get, Router};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_headers_are_added() -> Result<(), String> {
        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .route(
                "/framed",
                get(|| async { ([(header::X_FRAME_OPTIONS, "SAMEORIGIN")], "ok") }),
            )
            .layer(from_fn(security_headers_middleware));

        let response = app
            .clone()
            .oneshot(http::Request::builder().uri("/").body(Body::empty()).map_err(|e| e.to_string())?)
            .await
            .map_err(|e| format!("Request failed: {:?}", e))?;
        assert_eq!(response.status(), StatusCode::OK);
        for (name, value) in SECURITY_HEADERS {
            assert_eq!(response.headers().get(*name).and_then(|v| v.to_str().ok()), Some(*value));
        }

        let response = app
            .oneshot(http::Request::builder().uri("/framed").body(Body::empty()).map_err(|e| e.to_string())?)
            .await
            .map_err(|e| format!("Request failed: {:?}", e))?;
        assert_eq!(
            response.headers().get(header::X_FRAME_OPTIONS).and_then(|v| v.to_str().ok()),
            Some("SAMEORIGIN")
        );
        Ok(())
    }
}
