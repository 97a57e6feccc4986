//! Metrics definitions for the NIL API.
//!
//! All metrics follow Prometheus naming conventions:
//! - `nil_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `method`: HTTP methods
//! - `endpoint`: known routes, everything else is `/other`
//! - `outcome`: authentication outcomes (`authenticated`, `bypassed` and one
//!   value per rejection kind)
//! - `status` / `operation`: fixed strings chosen by the caller

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the global Prometheus recorder.
///
/// # Errors
///
/// Returns a description of the failure if buckets are invalid or a
/// recorder is already installed.
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Prefix("nil_http_request".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.150, 0.200, 0.300, 0.500, 1.000, 2.000,
            ],
        )
        .map_err(|e| format!("Failed to set HTTP request buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

// ============================================================================
// HTTP Request Metrics
// ============================================================================

/// Record HTTP request completion
///
/// Metric: `nil_http_requests_total`, `nil_http_request_duration_seconds`
/// Labels: `method`, `endpoint`, `status` / `status_code`
pub fn record_http_request(method: &str, endpoint: &str, status_code: u16, duration: Duration) {
    let normalized_endpoint = normalize_endpoint(endpoint);
    let status = categorize_status_code(status_code);

    histogram!("nil_http_request_duration_seconds",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status" => status
    )
    .record(duration.as_secs_f64());

    counter!("nil_http_requests_total",
        "method" => method.to_string(),
        "endpoint" => normalized_endpoint,
        "status_code" => status_code.to_string()
    )
    .increment(1);
}

fn categorize_status_code(status_code: u16) -> &'static str {
    match status_code {
        200..=299 => "success",
        408 | 504 => "timeout",
        _ => "error",
    }
}

/// Map a request path onto a bounded set of route labels.
fn normalize_endpoint(path: &str) -> &'static str {
    match path {
        "/api/v1/health" => "/api/v1/health",
        "/metrics" => "/metrics",
        "/api/v1/users/me" => "/api/v1/users/me",
        _ => {
            let mut parts = path.split('/');
            let is_role_assignment = parts.next() == Some("")
                && parts.next() == Some("api")
                && parts.next() == Some("v1")
                && parts.next() == Some("admin")
                && parts.next() == Some("users")
                && parts.next().is_some_and(|id| !id.is_empty())
                && parts.next() == Some("roles")
                && parts.next().is_none();

            if is_role_assignment {
                "/api/v1/admin/users/{identity_id}/roles"
            } else {
                "/other"
            }
        }
    }
}

// ============================================================================
// Authentication Metrics
// ============================================================================

/// Record the outcome of one pass through the authentication gate
///
/// Metric: `nil_auth_attempts_total`
/// Labels: `outcome`
pub fn record_auth_attempt(outcome: &'static str) {
    counter!("nil_auth_attempts_total", "outcome" => outcome).increment(1);
}

/// Record a key-set refresh
///
/// Metric: `nil_jwks_refresh_total`
/// Labels: `status` (`success` or a fetch error label)
pub fn record_jwks_refresh(status: &'static str) {
    counter!("nil_jwks_refresh_total", "status" => status).increment(1);
}

// ============================================================================
// Identity Metrics
// ============================================================================

/// Record an identity synchronization operation
///
/// Metric: `nil_identity_sync_total`
/// Labels: `operation` (`sync`, `assign_role`), `status`
pub fn record_identity_sync(operation: &'static str, status: &'static str) {
    counter!("nil_identity_sync_total",
        "operation" => operation,
        "status" => status
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Recording without an installed recorder goes to the no-op recorder;
    // these calls only exercise the label paths.

    #[test]
    fn test_record_functions_do_not_panic() {
        record_http_request("GET", "/api/v1/health", 200, Duration::from_millis(3));
        record_http_request("GET", "/api/v1/users/me", 401, Duration::from_millis(8));
        record_http_request(
            "POST",
            "/api/v1/admin/users/user_abc123/roles",
            403,
            Duration::from_millis(12),
        );
        record_http_request("GET", "/api/v1/users/me", 504, Duration::from_secs(30));
        record_auth_attempt("authenticated");
        record_auth_attempt("unknown_key");
        record_jwks_refresh("success");
        record_jwks_refresh("status_error");
        record_identity_sync("sync", "created");
        record_identity_sync("assign_role", "not_found");
    }

    #[test]
    fn test_categorize_status_code() {
        assert_eq!(categorize_status_code(200), "success");
        assert_eq!(categorize_status_code(204), "success");
        assert_eq!(categorize_status_code(401), "error");
        assert_eq!(categorize_status_code(500), "error");
        assert_eq!(categorize_status_code(408), "timeout");
        assert_eq!(categorize_status_code(504), "timeout");
    }

    #[test]
    fn test_normalize_static_endpoints() {
        assert_eq!(normalize_endpoint("/api/v1/health"), "/api/v1/health");
        assert_eq!(normalize_endpoint("/metrics"), "/metrics");
        assert_eq!(normalize_endpoint("/api/v1/users/me"), "/api/v1/users/me");
    }

    #[test]
    fn test_normalize_role_assignment_endpoint() {
        assert_eq!(
            normalize_endpoint("/api/v1/admin/users/user_2abcDEF/roles"),
            "/api/v1/admin/users/{identity_id}/roles"
        );
        assert_eq!(normalize_endpoint("/api/v1/admin/users//roles"), "/other");
        assert_eq!(
            normalize_endpoint("/api/v1/admin/users/user_1/roles/extra"),
            "/other"
        );
    }

    #[test]
    fn test_normalize_unknown_endpoints() {
        assert_eq!(normalize_endpoint("/"), "/other");
        assert_eq!(normalize_endpoint("/api/v1/athletes/42"), "/other");
        assert_eq!(normalize_endpoint("/wp-admin"), "/other");
    }
}
