/// Prometheus metrics for the fan-out service
use actix_web::dev::ServiceRequest;
use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter_vec, register_int_gauge,
    Encoder, Histogram, HistogramVec, IntCounterVec, IntGauge, TextEncoder,
};
use std::time::Instant;

static HTTP_REQUESTS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "fanout_service_http_request_duration_seconds",
        "HTTP request latency by route pattern and status",
        &["method", "route", "status"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]
    )
    .expect("Failed to register HTTP request metric")
});

static FANOUT_PUBLISH_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "fanout_publish_total",
        "Fan-out events by publish result (ok, lookup_failed, bus_failed)",
        &["result"]
    )
    .expect("Failed to register fan-out publish metric")
});

static FANOUT_RECIPIENTS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "fanout_recipients_per_event",
        "Size of the follower snapshot carried by each fan-out event",
        vec![0.0, 1.0, 10.0, 100.0, 1_000.0, 10_000.0, 100_000.0]
    )
    .expect("Failed to register fan-out recipients metric")
});

static GATEWAY_DELIVERIES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "gateway_deliveries_total",
        "Per-connection delivery outcomes (queued, written, slow, closed, write_failed)",
        &["outcome"]
    )
    .expect("Failed to register gateway deliveries metric")
});

static GATEWAY_ACTIVE_CONNECTIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "gateway_active_connections",
        "Connections currently registered in the delivery directory"
    )
    .expect("Failed to register active connections metric")
});

static FEED_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "feed_requests_total",
        "Feed reads by kind and result",
        &["kind", "result"]
    )
    .expect("Failed to register feed requests metric")
});

/// Times one HTTP request. Labelled by route pattern so ids never become labels.
pub struct HttpTimer {
    method: String,
    route: String,
    start: Instant,
}

impl HttpTimer {
    pub fn start(req: &ServiceRequest) -> Self {
        Self {
            method: req.method().to_string(),
            route: req
                .match_pattern()
                .unwrap_or_else(|| "unmatched".to_string()),
            start: Instant::now(),
        }
    }

    pub fn finish(self, status: u16) {
        HTTP_REQUESTS
            .with_label_values(&[&self.method, &self.route, &status.to_string()])
            .observe(self.start.elapsed().as_secs_f64());
    }
}

pub fn record_fanout_publish(result: &str, recipients: usize) {
    FANOUT_PUBLISH_TOTAL.with_label_values(&[result]).inc();
    if result == "ok" {
        FANOUT_RECIPIENTS.observe(recipients as f64);
    }
}

pub fn record_delivery(outcome: &str) {
    GATEWAY_DELIVERIES_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn set_active_connections(count: usize) {
    GATEWAY_ACTIVE_CONNECTIONS.set(count as i64);
}

pub fn record_feed_request(kind: &str, result: &str) {
    FEED_REQUESTS_TOTAL.with_label_values(&[kind, result]).inc();
}

/// GET /metrics
pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&prometheus::gather(), &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}
