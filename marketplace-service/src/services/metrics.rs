use metrics::counter;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the global Prometheus recorder. Safe to call more than once; only
/// the first call installs anything.
pub fn init_metrics() -> anyhow::Result<()> {
    if METRICS_HANDLE.get().is_some() {
        return Ok(());
    }
    let handle = PrometheusBuilder::new().install_recorder()?;
    // A concurrent initialiser may have won; its handle renders the same data.
    let _ = METRICS_HANDLE.set(handle);
    Ok(())
}

pub fn get_metrics() -> String {
    METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string())
}

/// Customer payment transaction created or settled.
pub fn record_payment(method: &str, status: &str) {
    counter!("marketplace_payments_total", "method" => method.to_string(), "status" => status.to_string())
        .increment(1);
}

/// Amount moved, in paise.
pub fn record_amount(kind: &'static str, amount_paise: i64) {
    if amount_paise > 0 {
        counter!("marketplace_amount_paise_total", "kind" => kind).increment(amount_paise as u64);
    }
}

pub fn record_withdrawal(status: &str) {
    counter!("marketplace_withdrawals_total", "status" => status.to_string()).increment(1);
}

pub fn record_feedback(action: &'static str) {
    counter!("marketplace_feedback_total", "action" => action).increment(1);
}

pub fn record_coupon_redemption(outcome: &'static str) {
    counter!("marketplace_coupon_redemptions_total", "outcome" => outcome).increment(1);
}

pub fn record_webhook(event: &str, outcome: &'static str) {
    counter!("razorpay_webhook_events_total", "event" => event.to_string(), "outcome" => outcome)
        .increment(1);
}
