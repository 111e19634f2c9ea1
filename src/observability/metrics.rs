//! Submission and confirmation counters.
//!
//! # Metrics
//! - `proxy_signer_submissions_total` (counter): by `outcome` (submitted, failed)
//! - `proxy_signer_confirmations_total` (counter): by `outcome`
//!   (confirmed, dispatch_failed, transport_failed, timed_out)
//! - `proxy_signer_nonce_overrides_total` (counter): by `raised` (true, false)

use metrics::counter;

pub fn record_submission(outcome: &'static str) {
    counter!("proxy_signer_submissions_total", "outcome" => outcome).increment(1);
}

pub fn record_confirmation(outcome: &'static str) {
    counter!("proxy_signer_confirmations_total", "outcome" => outcome).increment(1);
}

pub fn record_nonce_override(raised: bool) {
    let raised = if raised { "true" } else { "false" };
    counter!("proxy_signer_nonce_overrides_total", "raised" => raised).increment(1);
}
