use axum::{
    extract::Request,
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

const DEFAULT_MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Request body limit in bytes: `LOCKERZ_MAX_BODY_SIZE`, clamped to 1..=50 MiB.
pub fn max_body_size() -> usize {
    std::env::var("LOCKERZ_MAX_BODY_SIZE")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(DEFAULT_MAX_BODY_SIZE)
        .clamp(1024 * 1024, 50 * 1024 * 1024)
}

/// Rejects requests whose URI tries to climb out of the route tree, and
/// POST bodies that announce more than [`max_body_size`] bytes.
pub async fn validate_request_middleware(req: Request, next: Next) -> Response {
    if contains_path_traversal(req.uri().path()) {
        tracing::warn!("Path traversal rejected: {}", req.uri().path());
        return reject(StatusCode::BAD_REQUEST, "INVALID_PATH", "Path traversal detected in request".into());
    }

    // Early rejection; DefaultBodyLimit still guards streamed bodies
    if req.method() == Method::POST {
        let announced = req
            .headers()
            .get(axum::http::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        let limit = max_body_size();
        if let Some(length) = announced.filter(|len| *len > limit) {
            tracing::warn!("Request body of {} bytes exceeds limit of {}", length, limit);
            return reject(
                StatusCode::PAYLOAD_TOO_LARGE,
                "PAYLOAD_TOO_LARGE",
                format!("Request body exceeds maximum size of {} bytes", limit),
            );
        }
    }

    next.run(req).await
}

fn reject(status: StatusCode, code: &str, message: String) -> Response {
    (
        status,
        Json(json!({
            "error": { "code": code, "message": message },
            "status": status.as_u16(),
        })),
    )
        .into_response()
}

/// Detects path segments made only of dots (`.`, `..`), including
/// percent-encoded and double-encoded forms, and NUL bytes. Dots inside a
/// file name are fine.
fn contains_path_traversal(path: &str) -> bool {
    if path.contains('\0') {
        return true;
    }

    let mut decoded = path.to_lowercase();
    for _ in 0..2 {
        decoded = decoded.replace("%25", "%").replace("%2e", ".").replace("%2f", "/").replace("%5c", "\\");
    }
    if decoded.contains("%00") {
        return true;
    }

    decoded.split(['/', '\\']).any(|segment| !segment.is_empty() && segment.chars().all(|c| c == '.'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request, middleware::from_fn, routing::get, routing::post, Router};
    use tower::ServiceExt;

    #[test]
    fn traversal_patterns() {
        assert!(contains_path_traversal("/images/../etc/passwd"));
        assert!(contains_path_traversal("/images/%2e%2e/secret"));
        assert!(contains_path_traversal("/images/%252e%252e/secret"));
        assert!(contains_path_traversal("/images/a/%2E%2E"));
        assert!(contains_path_traversal("/a/./b"));
        assert!(contains_path_traversal("/images/a/%2e"));
        assert!(contains_path_traversal("/images%2f..%2fsecret"));
        assert!(contains_path_traversal("..\\windows"));
        assert!(contains_path_traversal("/images/a/x%2500.png"));

        assert!(!contains_path_traversal("/images/holiday/beach.png"));
        assert!(!contains_path_traversal("/images/holiday/my.photo.png"));
        assert!(!contains_path_traversal("/files"));
    }

    #[test]
    fn dots_inside_names_are_allowed() {
        assert!(!contains_path_traversal("/images/a/..hidden.png"));
        assert!(!contains_path_traversal("/images/a/x....png"));
        assert!(!contains_path_traversal("/images/a/%2ehidden.png"));
        assert!(!contains_path_traversal("/images/a.b/c..d.png"));
    }

    fn app() -> Router {
        Router::new()
            .route("/images/{category}/{file}", get(|| async { "img" }))
            .route("/upload", post(|| async { "ok" }))
            .layer(from_fn(validate_request_middleware))
    }

    #[tokio::test]
    async fn encoded_traversal_is_rejected() {
        let req = Request::builder().uri("/images/%2e%2e/passwd").body(Body::empty()).unwrap();
        let res = app().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn dotted_file_names_reach_the_handler() {
        for uri in ["/images/a/..hidden.png", "/images/a/x....png"] {
            let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
            assert_eq!(app().oneshot(req).await.unwrap().status(), StatusCode::OK, "{}", uri);
        }
    }

    #[tokio::test]
    async fn oversized_announced_body_is_rejected() {
        let req = Request::builder()
            .method(Method::POST)
            .uri("/upload")
            .header("content-length", (60 * 1024 * 1024).to_string())
            .body(Body::empty())
            .unwrap();
        let res = app().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn ordinary_requests_pass() {
        let req = Request::builder().uri("/images/a/b.png").body(Body::empty()).unwrap();
        assert_eq!(app().oneshot(req).await.unwrap().status(), StatusCode::OK);
    }
}
