//! Client-side metrics
//!
//! Emitted through the `metrics` facade; without an installed recorder every
//! call is a no-op, so embedding applications opt in by installing one.
//!
//! - `api_client_requests_total` (counter): labels `method`, `status` (`0` for
//!   transport failures)
//! - `api_client_request_duration_seconds` (histogram): label `method`
//! - `api_client_refresh_total` (counter): label `outcome` (`success`/`failure`)
//! - `api_client_reauth_required_total` (counter)

/// Record one network attempt.
pub fn record_attempt(method: &str, status: u16, duration_secs: f64) {
    metrics::counter!(
        "api_client_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!("api_client_request_duration_seconds", "method" => method.to_string())
        .record(duration_secs);
}

/// Record a settled refresh cycle.
pub fn record_refresh(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    metrics::counter!("api_client_refresh_total", "outcome" => outcome).increment(1);
}

/// Record a logical call that ended in ReauthRequired.
pub fn record_reauth_required() {
    metrics::counter!("api_client_reauth_required_total").increment(1);
}
