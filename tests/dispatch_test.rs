//! End-to-end tests of the frame path through the dispatch worker
//!
//! HTTP cases run against an in-process hyper server standing in for the
//! remote player.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::AUTHORIZATION;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use std::convert::Infallible;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use tokio::net::TcpListener;
use zone_dispatch::domain::{Point, Resolution, ZoneDefinition};
use zone_dispatch::infra::{Config, DispatchFailure, Metrics};
use zone_dispatch::io::{ActionClient, FrameReader, ZoneFile};
use zone_dispatch::services::{
    CooldownRegistry, Dispatcher, GeometryStore, OccupancyVoter, ShutdownOutcome, TriggerOutcome,
    ZoneMonitor,
};

const HD: Resolution = Resolution::new(1920, 1080);
const IN_A: Point = Point::new(50, 50);
const IN_B: Point = Point::new(250, 50);

#[derive(Clone, Copy)]
enum LoginBehavior {
    Token,
    Unauthorized,
    NoToken,
}

struct MockRemote {
    base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockRemote {
    async fn start(login: LoginBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let server_requests = requests.clone();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let requests = server_requests.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        let requests = requests.clone();
                        async move { Ok::<_, Infallible>(handle(req, login, &requests).await) }
                    });
                    let _ = http1::Builder::new().serve_connection(TokioIo::new(stream), service).await;
                });
            }
        });

        Self { base_url: format!("http://{addr}"), requests }
    }

    fn count(&self, prefix: &str) -> usize {
        self.requests.lock().iter().filter(|r| r.starts_with(prefix)).count()
    }
}

fn reply(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response
}

async fn handle(
    req: Request<Incoming>,
    login: LoginBehavior,
    requests: &Mutex<Vec<String>>,
) -> Response<Full<Bytes>> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let auth = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let body = req.into_body().collect().await.unwrap().to_bytes();
    requests.lock().push(format!("{method} {path} {auth}"));

    match (method, path.as_str()) {
        (Method::POST, "/login") => {
            let creds: serde_json::Value = serde_json::from_slice(&body).unwrap();
            if creds["username"] != "admin" || creds["password"] != "admin" {
                return reply(StatusCode::FORBIDDEN, "");
            }
            match login {
                LoginBehavior::Token => reply(StatusCode::OK, r#"{"token": "abc123"}"#),
                LoginBehavior::Unauthorized => reply(StatusCode::UNAUTHORIZED, ""),
                LoginBehavior::NoToken => reply(StatusCode::OK, r#"{"status": "ok"}"#),
            }
        }
        (Method::GET, "/play/1.wav/1") if auth == "Bearer abc123" => reply(StatusCode::OK, "ok"),
        (Method::GET, _) => reply(StatusCode::UNAUTHORIZED, ""),
        _ => reply(StatusCode::NOT_FOUND, ""),
    }
}

fn square(id: &str, x0: i32, size: i32) -> ZoneDefinition {
    ZoneDefinition::new(
        id,
        [
            Point::new(x0, 0),
            Point::new(x0 + size, 0),
            Point::new(x0 + size, size),
            Point::new(x0, size),
        ],
    )
}

struct Pipeline {
    monitor: ZoneMonitor,
    dispatcher: Dispatcher,
    cooldowns: Arc<CooldownRegistry>,
    metrics: Arc<Metrics>,
}

impl Pipeline {
    fn new(config: &Config, geometry: GeometryStore) -> Self {
        let metrics = Arc::new(Metrics::new());
        let cooldowns = Arc::new(CooldownRegistry::new());
        let client = ActionClient::new(config).unwrap();
        let dispatcher =
            Dispatcher::spawn(Box::new(client), cooldowns.clone(), metrics.clone(), config);
        let monitor = ZoneMonitor::new(
            geometry,
            OccupancyVoter::new(config.window_size(), config.min_frames_in_zone()),
            dispatcher.queue(),
            cooldowns.clone(),
            metrics.clone(),
            config.cooldown(),
        );
        Self { monitor, dispatcher, cooldowns, metrics }
    }

    fn two_zones(config: &Config) -> Self {
        let geometry =
            GeometryStore::with_zones(vec![square("zoneA", 0, 100), square("zoneB", 200, 100)], HD)
                .unwrap();
        Self::new(config, geometry)
    }

    /// Feed `point` until the voter fires, returning the triggering outcome
    fn occupy(&mut self, point: Point) -> TriggerOutcome {
        for _ in 0..4 {
            assert_eq!(self.monitor.process_points(&[point]), TriggerOutcome::Idle);
        }
        self.monitor.process_points(&[point])
    }

    fn processed(&self) -> u64 {
        self.metrics.dispatch_succeeded()
            + self.metrics.dispatch_failed(DispatchFailure::Auth)
            + self.metrics.dispatch_failed(DispatchFailure::Action)
            + self.metrics.dispatch_failed(DispatchFailure::WorkerFault)
    }

    async fn wait_processed(&self, n: u64) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while self.processed() < n {
            assert!(Instant::now() < deadline, "processed {} of {n}", self.processed());
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

fn http_config(base_url: &str) -> Config {
    Config::default()
        .with_simulation(false)
        .with_endpoints(base_url, base_url)
        .with_retry(3, Duration::from_millis(10))
}

#[tokio::test]
async fn test_unreachable_login_releases_cooldown() {
    // Port 1 on loopback refuses connections
    let config = http_config("http://127.0.0.1:1");
    let mut p = Pipeline::two_zones(&config);

    assert_eq!(p.occupy(IN_A), TriggerOutcome::Dispatched { zone: "zoneA".to_string() });
    assert!(p.cooldowns.remaining_seconds("zoneA") > 0.0);

    p.wait_processed(1).await;
    assert_eq!(p.metrics.dispatch_failed(DispatchFailure::Auth), 1);
    assert_eq!(p.cooldowns.remaining_seconds("zoneA"), 0.0);

    // The next debounced trigger may retry right away
    assert_eq!(p.occupy(IN_A), TriggerOutcome::Dispatched { zone: "zoneA".to_string() });
    p.dispatcher.shutdown().await;
}

#[tokio::test]
async fn test_successful_dispatch_holds_cooldown_and_reuses_token() {
    let remote = MockRemote::start(LoginBehavior::Token).await;
    let config = http_config(&remote.base_url);
    let mut p = Pipeline::two_zones(&config);

    assert_eq!(p.occupy(IN_A), TriggerOutcome::Dispatched { zone: "zoneA".to_string() });
    p.wait_processed(1).await;
    assert_eq!(p.metrics.dispatch_succeeded(), 1);
    assert!(p.cooldowns.remaining_seconds("zoneA") > 19.0);

    // Same zone again inside the cooldown
    assert!(matches!(p.occupy(IN_A), TriggerOutcome::Suppressed { .. }));

    // The suppressed trigger kept the window, so one frame in zoneB fires
    assert_eq!(
        p.monitor.process_points(&[IN_B]),
        TriggerOutcome::Dispatched { zone: "zoneB".to_string() }
    );
    p.wait_processed(2).await;
    assert_eq!(p.metrics.dispatch_succeeded(), 2);

    assert_eq!(remote.count("POST /login"), 1);
    assert_eq!(remote.count("GET /play/1.wav/1 Bearer abc123"), 2);

    assert_eq!(p.dispatcher.shutdown().await, ShutdownOutcome::Clean);
    assert!(p.cooldowns.is_empty());
}

#[tokio::test]
async fn test_rejected_login_is_not_retried() {
    let remote = MockRemote::start(LoginBehavior::Unauthorized).await;
    let config = http_config(&remote.base_url);
    let mut p = Pipeline::two_zones(&config);

    p.occupy(IN_A);
    p.wait_processed(1).await;

    assert_eq!(p.metrics.dispatch_failed(DispatchFailure::Auth), 1);
    assert_eq!(remote.count("POST /login"), 1);
    assert_eq!(remote.count("GET"), 0);
    assert_eq!(p.cooldowns.remaining_seconds("zoneA"), 0.0);
}

#[tokio::test]
async fn test_login_without_token_is_auth_failure() {
    let remote = MockRemote::start(LoginBehavior::NoToken).await;
    let config = http_config(&remote.base_url);
    let mut p = Pipeline::two_zones(&config);

    p.occupy(IN_B);
    p.wait_processed(1).await;

    assert_eq!(p.metrics.dispatch_failed(DispatchFailure::Auth), 1);
    assert!(!p.cooldowns.is_locked("zoneB"));
}

#[tokio::test]
async fn test_simulated_run_from_zones_file_and_frames() {
    let mut zones = NamedTempFile::new().unwrap();
    zones
        .write_all(
            br#"{"metadata": {"resolution": [1920, 1080]},
                 "zones": [{"name": "lobby", "points": [[0, 0], [400, 0], [400, 400], [0, 400]]}]}"#,
        )
        .unwrap();

    let config = Config::default()
        .with_simulation(true)
        .with_simulation_delay(Duration::from_millis(10));
    let geometry = ZoneFile::load(zones.path()).unwrap().into_store().unwrap();
    let mut p = Pipeline::new(&config, geometry);

    // Frames at half resolution: lobby becomes 0..200
    let input: &[u8] = b"{\"resolution\": [960, 540], \"points\": [[100, 100]]}\n\
        {\"points\": [[100, 100]]}\n\
        not a frame\n\
        {\"points\": [[300, 300]]}\n\
        {\"points\": [[100, 100], [900, 500]]}\n\
        {\"points\": [[150, 20]]}\n\
        {\"points\": [[10, 190]]}\n";
    let mut frames = FrameReader::new(input);

    let mut outcomes = Vec::new();
    while let Some(record) = frames.next_frame().await.unwrap() {
        if let Some(resolution) = record.resolution() {
            p.monitor.set_resolution(resolution).unwrap();
        }
        outcomes.push(p.monitor.process_points(&record.points()));
    }

    assert_eq!(outcomes.len(), 6);
    assert_eq!(outcomes[5], TriggerOutcome::Dispatched { zone: "lobby".to_string() });
    assert!(outcomes[..5].iter().all(|o| *o == TriggerOutcome::Idle));

    assert_eq!(p.dispatcher.shutdown().await, ShutdownOutcome::Clean);
    assert_eq!(p.metrics.dispatch_succeeded(), 1);
    assert!(p.cooldowns.is_empty());
}
