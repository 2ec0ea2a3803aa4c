use axum::{
    extract::Request,
    http::Method,
    middleware::Next,
    response::Response,
};
use log::*;

/// Logs every request as it arrives and again once its response head is ready.
///
/// HEAD requests are only logged on the way out. For streaming endpoints the
/// response line is written when the stream opens, not when it ends.
pub async fn log_requests(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    if method != Method::HEAD {
        info!("request: {method} {uri}");
    }

    let response = next.run(request).await;

    info!("response: {method} {uri} {}", response.status().as_u16());
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::StatusCode, middleware::from_fn, routing::get, Router};
    use tower::ServiceExt;

    async fn teapot() -> StatusCode {
        StatusCode::IM_A_TEAPOT
    }

    #[tokio::test]
    async fn test_log_requests_passes_the_response_through() {
        let app = Router::new()
            .route("/brew", get(teapot))
            .layer(from_fn(log_requests));

        for method in [Method::GET, Method::HEAD] {
            let request = Request::builder()
                .method(method)
                .uri("/brew")
                .body(Body::empty())
                .unwrap();

            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        }
    }
}
