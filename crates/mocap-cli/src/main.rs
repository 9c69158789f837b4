//! `mocap-bridge` – motion-capture pose bridge.
//!
//! This binary wires the stack together.  It:
//!
//! 1. Loads the bridge configuration (first argument, else
//!    `~/.mocap/config.toml`; a default file is written when none exists).
//! 2. Creates one [`TrackerHandler`] per configured tracked body, all sharing
//!    one [`TrackerConnection`], one [`TimeManager`] and one [`EventBus`].
//!    Each handler resolves time through its own `TimeStream`; transforms
//!    go to both the bus and a [`TfBuffer`].
//! 3. Serves the bus over WebSocket on `ws_port`.
//! 4. Feeds tracker report datagrams from `listen_addr` into the connection
//!    until **Ctrl-C**, then drops the handlers before the connection.

mod config;

use colored::Colorize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{error, info, warn};

use mocap_frames::{Convention, TfBuffer};
use mocap_middleware::{EventBus, WsBridge};
use mocap_tracker::{TimeManager, TrackerConnection, TrackerHandler};
use mocap_types::{PoseSink, TransformFanout, TransformSink};

/// Largest tracker report datagram accepted.
const MAX_DATAGRAM: usize = 2048;

/// How often the feed loop wakes up to check for shutdown.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[tokio::main]
async fn main() -> ExitCode {
    // ── Structured logging ────────────────────────────────────────────────
    // RUST_LOG selects the filter (default "info").  MOCAP_LOG_FORMAT=json
    // switches to newline-delimited JSON.
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    if std::env::var("MOCAP_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .compact()
            .init();
    }

    // ── Configuration ─────────────────────────────────────────────────────
    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(config::config_path);
    let cfg = load_config(&path);

    print_banner(&cfg, &path);

    // ── Shared shutdown flag ──────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – shutting down …".yellow().bold());
        shutdown_clone.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler; graceful shutdown on Ctrl-C will not be available");
    }

    // ── Pipeline ──────────────────────────────────────────────────────────
    let bus = Arc::new(EventBus::default());
    let tf_buffer = Arc::new(TfBuffer::new());
    let transforms: Arc<dyn TransformSink> = Arc::new(TransformFanout::new(vec![
        Arc::clone(&bus) as Arc<dyn TransformSink>,
        Arc::clone(&tf_buffer) as Arc<dyn TransformSink>,
    ]));
    let time = Arc::new(TimeManager::new(cfg.time_policy));
    let connection = Arc::new(TrackerConnection::new());

    let options = cfg.handler_options();
    let handlers: Vec<TrackerHandler> = cfg
        .trackers
        .iter()
        .filter_map(|name| {
            TrackerHandler::new(
                name,
                options.clone(),
                Arc::clone(&connection),
                Arc::new(time.stream()),
                Arc::clone(&bus) as Arc<dyn PoseSink>,
                Arc::clone(&transforms),
            )
            .map_err(|e| warn!(tracker = %name, error = %e, "skipping tracker"))
            .ok()
        })
        .collect();

    if handlers.is_empty() {
        warn!(config = %path.display(), "no trackers configured; reports will be dropped");
    }

    // ── WebSocket bridge ──────────────────────────────────────────────────
    let ws_addr = SocketAddr::from(([0, 0, 0, 0], cfg.ws_port));
    let bridge = WsBridge::new(Arc::clone(&bus));
    tokio::spawn(async move {
        if let Err(e) = bridge.run_ws_server(ws_addr).await {
            error!(error = %e, "ws bridge stopped");
        }
    });

    // ── Tracker feed ──────────────────────────────────────────────────────
    let socket = match UdpSocket::bind(cfg.listen_addr.as_str()).await {
        Ok(socket) => socket,
        Err(e) => {
            error!(addr = %cfg.listen_addr, error = %e, "failed to bind tracker feed");
            return ExitCode::FAILURE;
        }
    };
    info!(addr = %cfg.listen_addr, trackers = handlers.len(), "listening for tracker reports");

    let mut buf = [0u8; MAX_DATAGRAM];
    while !shutdown.load(Ordering::SeqCst) {
        match tokio::time::timeout(POLL_INTERVAL, socket.recv_from(&mut buf)).await {
            Ok(Ok((len, peer))) => {
                if let Err(e) = connection.ingest_datagram(&buf[..len]) {
                    warn!(peer = %peer, error = %e, "malformed tracker datagram");
                }
            }
            Ok(Err(e)) => warn!(error = %e, "tracker feed receive error"),
            Err(_) => {}
        }
    }

    for handler in &handlers {
        log_last_transform(&tf_buffer, &cfg.frame, handler);
    }

    // Handlers deregister on drop; they must go before the connection.
    drop(handlers);
    info!(remaining = connection.handler_count(), "tracker handlers released");
    println!("{}", "  ✓ Exiting mocap-bridge.".green());
    ExitCode::SUCCESS
}

/// Load `path`, falling back to defaults.  A missing file is created with
/// the default configuration so it can be edited.
fn load_config(path: &Path) -> config::Config {
    match config::load_from(path) {
        Ok(Some(cfg)) => {
            info!(path = %path.display(), "config loaded");
            cfg
        }
        Ok(None) => {
            let mut cfg = config::Config::default();
            match config::save_to(&cfg, path) {
                Ok(()) => info!(path = %path.display(), "wrote default config"),
                Err(e) => warn!(error = %e, "could not write default config"),
            }
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            error!(error = %e, "config error; using default configuration");
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
    }
}

/// Log the most recent ENU transform buffered for `handler`'s body.
fn log_last_transform(tf_buffer: &TfBuffer, frame: &str, handler: &TrackerHandler) {
    let child = handler.identity().child_frame(Convention::Enu);
    match (tf_buffer.lookup(frame, child), tf_buffer.latest_stamp(child)) {
        (Some(tf), Some(stamp)) => info!(
            tracker = handler.identity().name(),
            x = tf.translation.x,
            y = tf.translation.y,
            z = tf.translation.z,
            stamp = %stamp,
            "last ENU pose"
        ),
        _ => info!(tracker = handler.identity().name(), "no reports received"),
    }
}

fn print_banner(cfg: &config::Config, path: &Path) {
    println!();
    println!("{}", "  mocap-bridge".bold().cyan());
    println!("  config   {}", path.display().to_string().bold());
    println!("  host     {}", cfg.host.bold());
    println!(
        "  frames   {} (ENU) / {} (NED)",
        cfg.frame.bold(),
        cfg.ned_frame.bold()
    );
    println!("  feed     udp://{}", cfg.listen_addr.dimmed());
    println!("  bridge   ws://0.0.0.0:{}", cfg.ws_port.to_string().dimmed());
    println!("  time     {}", cfg.time_policy.to_string().dimmed());
    println!();
}
