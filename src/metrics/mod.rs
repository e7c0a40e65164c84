//! Prometheus collectors for the dual writer and the watch fan-out, plus the
//! `/metrics` endpoint that exposes them.

use std::net::SocketAddr;

use lazy_static::lazy_static;
use prometheus::core::Collector;
use prometheus::exponential_buckets;
use prometheus::HistogramOpts;
use prometheus::HistogramVec;
use prometheus::IntCounterVec;
use prometheus::IntGauge;
use prometheus::Opts;
use prometheus::Registry;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing::warn;
use warp::Filter;
use warp::Rejection;
use warp::Reply;

use crate::constants::METRICS_NAMESPACE;


lazy_static! {
    pub static ref DUAL_WRITER_REQUESTS: IntCounterVec = IntCounterVec::new(
        Opts::new("dual_writer_requests", "Dual writer calls by mode, method and outcome"),
        &["mode", "method", "outcome"]
    )
    .expect("metric can not be created");

    pub static ref DUAL_WRITER_REQUEST_DURATION_MS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "dual_writer_request_duration_ms",
            "Histogram of dual writer call duration in ms"
        )
        .buckets(exponential_buckets(0.5, 2.0, 14).expect("valid buckets")),
        &["mode", "method"]
    )
    .expect("metric can not be created");

    pub static ref DUAL_WRITER_MIRROR_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "dual_writer_mirror_failures",
            "Failures of the non-authoritative backend"
        ),
        &["mode", "method"]
    )
    .expect("metric can not be created");

    pub static ref WATCH_EVENTS_SENT: IntCounterVec = IntCounterVec::new(
        Opts::new("watch_events_sent", "Events delivered to watch subscribers"),
        &["event_type"]
    )
    .expect("metric can not be created");

    pub static ref WATCH_ACTIVE_NODES: IntGauge =
        IntGauge::new("watch_active_nodes", "Registered watch nodes")
            .expect("metric can not be created");

    pub static ref REGISTRY: Registry = new_registry();
}

fn new_registry() -> Registry {
    let registry = Registry::new_custom(Some(METRICS_NAMESPACE.to_string()), None).unwrap_or_else(|e| {
        warn!("could not create prefixed registry, falling back to default: {}", e);
        Registry::new()
    });
    register_custom_metrics(&registry);
    registry
}

pub fn register_custom_metrics(registry: &Registry) {
    let collectors: Vec<Box<dyn Collector>> = vec![
        Box::new(DUAL_WRITER_REQUESTS.clone()),
        Box::new(DUAL_WRITER_REQUEST_DURATION_MS.clone()),
        Box::new(DUAL_WRITER_MIRROR_FAILURES.clone()),
        Box::new(WATCH_EVENTS_SENT.clone()),
        Box::new(WATCH_ACTIVE_NODES.clone()),
    ];
    for collector in collectors {
        if let Err(e) = registry.register(collector) {
            warn!("collector can not be registered: {}", e);
        }
    }
}

/// Serves `GET /metrics` on `addr` until `shutdown_signal` fires.
pub async fn start_server(
    addr: SocketAddr,
    mut shutdown_signal: watch::Receiver<()>,
) {
    let metrics_route = warp::path!("metrics").map(|| REGISTRY.clone()).and_then(metrics_handler);

    let (addr, server) =
        warp::serve(metrics_route).bind_with_graceful_shutdown(addr, async move {
            let _ = shutdown_signal.changed().await;
        });
    info!(%addr, "metrics server listening");
    server.await;
}

pub async fn metrics_handler(registry: Registry) -> std::result::Result<impl Reply, Rejection> {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&registry.gather(), &mut buffer) {
        error!("could not encode custom metrics: {}", e);
    };
    let res = String::from_utf8(buffer).unwrap_or_else(|e| {
        error!("custom metrics could not be from_utf8'd: {}", e);
        String::default()
    });
    Ok(res)
}
