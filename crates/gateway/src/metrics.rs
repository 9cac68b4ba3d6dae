use std::sync::OnceLock;
use std::time::Duration;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

static REGISTRY: OnceLock<Registry> = OnceLock::new();
static HTTP_REQUESTS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
static HTTP_REQUEST_DURATION_SECONDS: OnceLock<HistogramVec> = OnceLock::new();
static AUTH_OUTCOMES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
static LISTING_PAGES_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

fn register_collector<T>(collector: T) -> T
where
    T: prometheus::core::Collector + Clone + 'static,
{
    let _ = registry().register(Box::new(collector.clone()));
    collector
}

fn http_requests_total() -> &'static IntCounterVec {
    HTTP_REQUESTS_TOTAL.get_or_init(|| {
        register_collector(
            IntCounterVec::new(
                Opts::new("workshop_http_requests_total", "HTTP request count."),
                &["route", "method", "status"],
            )
            .expect("create workshop_http_requests_total"),
        )
    })
}

fn http_request_duration_seconds() -> &'static HistogramVec {
    HTTP_REQUEST_DURATION_SECONDS.get_or_init(|| {
        register_collector(
            HistogramVec::new(
                HistogramOpts::new(
                    "workshop_http_request_duration_seconds",
                    "HTTP request duration in seconds.",
                )
                .buckets(vec![
                    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
                ]),
                &["route", "method", "outcome"],
            )
            .expect("create workshop_http_request_duration_seconds"),
        )
    })
}

fn auth_outcomes_total() -> &'static IntCounterVec {
    AUTH_OUTCOMES_TOTAL.get_or_init(|| {
        register_collector(
            IntCounterVec::new(
                Opts::new(
                    "workshop_auth_outcomes_total",
                    "Auth gate decisions by outcome.",
                ),
                &["outcome"],
            )
            .expect("create workshop_auth_outcomes_total"),
        )
    })
}

fn listing_pages_total() -> &'static IntCounterVec {
    LISTING_PAGES_TOTAL.get_or_init(|| {
        register_collector(
            IntCounterVec::new(
                Opts::new(
                    "workshop_listing_pages_total",
                    "Listing pages served per collection.",
                ),
                &["collection"],
            )
            .expect("create workshop_listing_pages_total"),
        )
    })
}

pub fn observe_http_request(route: &str, method: &str, status: u16, duration: Duration) {
    let status_str = status.to_string();
    http_requests_total()
        .with_label_values(&[route, method, status_str.as_str()])
        .inc();

    let outcome = if (200..400).contains(&status) {
        "success"
    } else {
        "error"
    };
    http_request_duration_seconds()
        .with_label_values(&[route, method, outcome])
        .observe(duration.as_secs_f64());
}

pub fn observe_auth_outcome(outcome: &str) {
    auth_outcomes_total().with_label_values(&[outcome]).inc();
}

pub fn observe_listing_page(collection: &str) {
    listing_pages_total().with_label_values(&[collection]).inc();
}

pub fn render() -> Result<(Vec<u8>, String), prometheus::Error> {
    let _ = auth_outcomes_total();
    let _ = listing_pages_total();

    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok((buffer, encoder.format_type().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_registered_families() {
        observe_auth_outcome("allowed");
        observe_listing_page("repairs");
        observe_http_request("/api/repairs", "GET", 200, Duration::from_millis(3));

        let (body, content_type) = render().expect("metrics render");
        let text = String::from_utf8(body).expect("utf8");
        assert!(content_type.starts_with("text/plain"));
        assert!(text.contains("workshop_auth_outcomes_total"));
        assert!(text.contains("workshop_listing_pages_total{collection=\"repairs\"}"));
        assert!(text.contains("workshop_http_requests_total"));
    }
}
