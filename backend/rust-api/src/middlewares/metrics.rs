use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

use crate::metrics::{HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION_SECONDS};

/// Records request count and latency per normalized route.
pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = normalize_path(req.uri().path());

    let response = next.run(req).await;

    let status = response.status().as_u16().to_string();
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &path, &status])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[&method, &path])
        .observe(start.elapsed().as_secs_f64());

    response
}

/// Replaces identifier segments with placeholders to keep label cardinality
/// bounded. The segment following `users`, `questions` or `attempts` is an id.
fn normalize_path(path: &str) -> String {
    let mut normalized = Vec::new();
    let mut previous = "";

    for segment in path.split('/') {
        let placeholder = match previous {
            "users" => Some("{user_id}"),
            "questions" => Some("{question_id}"),
            "attempts" if !segment.is_empty() && segment != "recent" => Some("{attempt_id}"),
            _ => None,
        };
        normalized.push(placeholder.unwrap_or(segment));
        previous = segment;
    }

    normalized.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path("/api/v1/users/alice/attempts/2026-10-18T09:00:12.500Z"),
            "/api/v1/users/{user_id}/attempts/{attempt_id}"
        );
        assert_eq!(
            normalize_path("/api/v1/users/alice/questions/q-17/attempts"),
            "/api/v1/users/{user_id}/questions/{question_id}/attempts"
        );
        assert_eq!(
            normalize_path("/api/v1/users/alice/attempts/recent"),
            "/api/v1/users/{user_id}/attempts/recent"
        );
        assert_eq!(normalize_path("/health"), "/health");
        assert_eq!(normalize_path("/metrics"), "/metrics");
    }
}
