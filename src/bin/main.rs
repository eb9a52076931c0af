//! Process entry point: load config, wire up logging, start the reactor,
//! block until a shutdown signal, drain gracefully.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use edgehttpd::config::{self, ServerConfig};
use edgehttpd::credential::InMemoryStore;
use edgehttpd::error::Result;
use edgehttpd::reactor::Server;
use edgehttpd::telemetry::{Sink, TracingSink};

fn main() {
    if let Err(e) = run() {
        eprintln!("edgehttpd: fatal: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from).unwrap_or_else(|| PathBuf::from("edgehttpd.conf"));

    // The config file decides the log level, but we need a sink to report
    // config warnings as we load it; start permissive and re-init once the
    // real level is known.
    init_tracing(edgehttpd::telemetry::Level::Info);
    let sink: Arc<dyn Sink> = Arc::new(TracingSink { min_level: edgehttpd::telemetry::Level::Info });

    let cfg = load_config(&config_path, &sink)?;
    init_tracing(cfg.log_level);
    let sink: Arc<dyn Sink> = Arc::new(TracingSink { min_level: cfg.log_level });

    edgehttpd::info!(sink, "{}", cfg);

    let credentials = Arc::new(InMemoryStore::new());
    let server = Server::new(cfg, sink.clone(), credentials);
    let handle = server.start()?;

    wait_for_shutdown_signal();
    edgehttpd::info!(sink, "shutdown signal received, draining connections");
    handle.shutdown(Duration::from_secs(5))
}

fn load_config(path: &PathBuf, sink: &Arc<dyn Sink>) -> Result<ServerConfig> {
    if path.exists() {
        config::load(path, sink.as_ref())
    } else {
        edgehttpd::warn!(sink, "{} not found, using built-in defaults", path.display());
        Ok(ServerConfig::default())
    }
}

fn init_tracing(level: edgehttpd::telemetry::Level) {
    use tracing_subscriber::EnvFilter;
    let default_directive = match level {
        edgehttpd::telemetry::Level::Trace => "trace",
        edgehttpd::telemetry::Level::Debug => "debug",
        edgehttpd::telemetry::Level::Info => "info",
        edgehttpd::telemetry::Level::Warn => "warn",
        edgehttpd::telemetry::Level::Error => "error",
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive)))
        .try_init();
}

/// Block until SIGINT/SIGTERM, or indefinitely on platforms without signal
/// support — the reactor thread still answers traffic either way.
#[cfg(unix)]
fn wait_for_shutdown_signal() {
    use std::sync::atomic::{AtomicBool, Ordering};

    static RECEIVED: AtomicBool = AtomicBool::new(false);

    extern "C" fn handler(_sig: i32) {
        RECEIVED.store(true, Ordering::SeqCst);
    }

    unsafe {
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handler as libc::sighandler_t);
    }

    while !RECEIVED.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(200));
    }
}

#[cfg(not(unix))]
fn wait_for_shutdown_signal() {
    loop {
        std::thread::sleep(Duration::from_secs(3600));
    }
}
