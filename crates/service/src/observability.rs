use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, Encoder, IntCounterVec, TextEncoder};

// Prometheus metrics (default registry), labelled by list path
pub static STORE_WRITES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "list_api_store_writes_total",
        "Successful list writes",
        &["list"]
    )
    .expect("register store_writes_total")
});

pub static WRITE_CONFLICTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "list_api_write_conflicts_total",
        "List writes rejected because the revision was stale",
        &["list"]
    )
    .expect("register write_conflicts_total")
});

pub static RETRIES_EXHAUSTED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "list_api_retries_exhausted_total",
        "Submissions dropped after the last conflicting attempt",
        &["list"]
    )
    .expect("register retries_exhausted_total")
});

pub static TOLERANT_READS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "list_api_tolerant_reads_total",
        "Stored lists that could not be parsed and were treated as empty",
        &["list"]
    )
    .expect("register tolerant_reads_total")
});

/// Render the default registry in the text exposition format.
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_exposition() {
        TOLERANT_READS_TOTAL.with_label_values(&["metrics_probe.json"]).inc();
        let text = encode_metrics().unwrap();
        assert!(text.contains("list_api_tolerant_reads_total"));
        assert!(text.contains("metrics_probe.json"));
    }
}
