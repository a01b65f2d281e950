//! Status HTTP endpoint
//!
//! - `GET /metrics`   Prometheus text exposition of the monotonic counters
//! - `GET /cooldowns` JSON list of held cooldowns
//! - `GET /health`    liveness
//!
//! Uses hyper for the HTTP server. Reads never reset the periodic counters
//! used by the log reporter.

use crate::infra::metrics::{Metrics, MetricsTotals};
use crate::services::cooldown::CooldownRegistry;
use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

/// Prometheus metric type
enum MetricType {
    Counter,
    Gauge,
}

impl MetricType {
    fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
        }
    }
}

fn write_metric(output: &mut String, name: &str, help: &str, typ: MetricType, val: u64) {
    let _ = writeln!(output, "# HELP {name} {help}");
    let _ = writeln!(output, "# TYPE {name} {}", typ.as_str());
    let _ = writeln!(output, "{name} {val}");
}

/// Escape a label value for the text exposition format
fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[derive(Debug, Serialize)]
struct CooldownEntry {
    zone: String,
    remaining_secs: f64,
}

fn cooldown_entries(cooldowns: &CooldownRegistry) -> Vec<CooldownEntry> {
    cooldowns
        .snapshot_at(Instant::now())
        .into_iter()
        .map(|(zone, remaining)| CooldownEntry { zone, remaining_secs: remaining.as_secs_f64() })
        .collect()
}

/// Format metrics in Prometheus text exposition format
fn format_prometheus_metrics(totals: &MetricsTotals, cooldowns: &CooldownRegistry) -> String {
    let mut output = String::with_capacity(2048);

    let counters = [
        ("zone_dispatch_frames_total", "Frames observed", totals.frames_total),
        (
            "zone_dispatch_frames_occupied_total",
            "Frames with at least one point inside a zone",
            totals.frames_occupied_total,
        ),
        ("zone_dispatch_triggers_total", "Debounce thresholds reached", totals.triggers_total),
        (
            "zone_dispatch_triggers_suppressed_total",
            "Triggers rejected by an active cooldown",
            totals.triggers_suppressed,
        ),
        ("zone_dispatch_enqueued_total", "Tasks accepted by the queue", totals.dispatch_enqueued),
        ("zone_dispatch_rejected_total", "Tasks refused by the queue", totals.dispatch_rejected),
        ("zone_dispatch_succeeded_total", "Remote actions completed", totals.dispatch_succeeded),
        (
            "zone_dispatch_auth_failed_total",
            "Dispatches that failed to authenticate",
            totals.dispatch_auth_failed,
        ),
        (
            "zone_dispatch_action_failed_total",
            "Dispatches whose action call failed",
            totals.dispatch_action_failed,
        ),
        ("zone_dispatch_worker_faults_total", "Panics caught in the worker", totals.worker_faults),
    ];
    for (name, help, val) in counters {
        write_metric(&mut output, name, help, MetricType::Counter, val);
    }

    write_metric(
        &mut output,
        "zone_dispatch_queue_depth",
        "Tasks waiting for the worker",
        MetricType::Gauge,
        totals.queue_depth,
    );

    let name = "zone_dispatch_cooldown_remaining_seconds";
    let _ = writeln!(output, "# HELP {name} Seconds until the zone can dispatch again");
    let _ = writeln!(output, "# TYPE {name} gauge");
    for entry in cooldown_entries(cooldowns) {
        let zone = escape_label_value(&entry.zone);
        let _ = writeln!(output, "{name}{{zone=\"{zone}\"}} {:.3}", entry.remaining_secs);
    }

    output
}

fn respond(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    metrics: Arc<Metrics>,
    cooldowns: Arc<CooldownRegistry>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => respond(
            StatusCode::OK,
            "text/plain; version=0.0.4; charset=utf-8",
            format_prometheus_metrics(&metrics.totals(), &cooldowns),
        ),
        (&Method::GET, "/cooldowns") => match serde_json::to_vec(&cooldown_entries(&cooldowns)) {
            Ok(body) => respond(StatusCode::OK, "application/json", body),
            Err(e) => {
                error!(error = %e, "cooldowns_serialize_failed");
                respond(StatusCode::INTERNAL_SERVER_ERROR, "text/plain", "serialize failed")
            }
        },
        (&Method::GET, "/health") => respond(StatusCode::OK, "text/plain", "ok"),
        _ => respond(StatusCode::NOT_FOUND, "text/plain", "Not Found"),
    };
    Ok(response)
}

/// Bind `0.0.0.0:port` and serve until `shutdown` flips to true
pub async fn start_status_server(
    port: u16,
    metrics: Arc<Metrics>,
    cooldowns: Arc<CooldownRegistry>,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!(port = %port, "status_server_started");
    serve_status(listener, metrics, cooldowns, shutdown).await
}

/// Serve on an already bound listener
pub async fn serve_status(
    listener: TcpListener,
    metrics: Arc<Metrics>,
    cooldowns: Arc<CooldownRegistry>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let metrics = metrics.clone();
                        let cooldowns = cooldowns.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                handle_request(req, metrics.clone(), cooldowns.clone())
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "status_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "status_accept_error");
                    }
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("status_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}
