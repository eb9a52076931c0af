//! Single-threaded edge-triggered reactor: accept loop, readiness dispatch,
//! admission control, graceful shutdown (spec §3 "Event reactor", §4.6).
//!
//! Ported from the original `zener::v0::Server` (`include/core/server.h`):
//! one mio `Poll` on the reactor thread, a wakeup handle so shutdown
//! doesn't block in `poll.poll()`, and fd-keyed connection bookkeeping —
//! reimagined here as [`crate::registry::Registry`] with generational ids
//! instead of the original's bare `unordered_map<int, ConnInfo>`. File
//! serving and the response write path farm out to the worker pool the
//! way `Server::onProcess` dispatches work, rather than running on the
//! reactor thread itself.

use std::net::SocketAddr;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token, Waker};

use crate::config::ServerConfig;
use crate::credential::CredentialStore;
use crate::error::{CoreError, Result};
use crate::file_cache::FileCache;
use crate::http::connection::{Connection, Phase};
use crate::http::request::Method;
use crate::http::response::{inline_error_body, mime_type_for, HttpResponse, StatusCode};
use crate::pool::ThreadPool;
use crate::registry::{ConnId, Registry};
use crate::telemetry::Sink;
use crate::timer::TimerService;

/// Registry cap (spec §4.6 "default 65,536").
const MAX_CONNECTIONS: usize = 65_536;
const LISTENER_TOKEN: Token = Token(0);
const WAKER_TOKEN: Token = Token(1);
/// Reactor-loop max events drained per `poll()` call.
const MAX_EVENTS: usize = 1024;

/// Process-wide count of live connections, incremented exactly once in
/// `Connection::init` (here: registry insertion) and decremented exactly
/// once in `Connection::close` (spec §8 invariant: `Σ inits - Σ closes =
/// live`).
static ACTIVE_CONNECTIONS: AtomicUsize = AtomicUsize::new(0);

pub fn active_connections() -> usize {
    ACTIVE_CONNECTIONS.load(Ordering::SeqCst)
}

/// Caller-facing handle returned by [`Server::start`]: the only way the
/// external harness interacts with a running reactor (spec §6 "the core
/// returns a handle supporting graceful shutdown").
pub struct ServerHandle {
    waker: Arc<Waker>,
    shutdown: Arc<std::sync::atomic::AtomicBool>,
    join: Option<std::thread::JoinHandle<Result<()>>>,
    local_addr: SocketAddr,
}

impl ServerHandle {
    /// Address the listener actually bound to, useful when `port` was 0
    /// and the OS picked one (as the integration tests do).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Request shutdown and block until the reactor thread exits or
    /// `deadline` elapses.
    pub fn shutdown(mut self, deadline: Duration) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = self.waker.wake();
        if let Some(join) = self.join.take() {
            let start = std::time::Instant::now();
            while !join.is_finished() && start.elapsed() < deadline {
                std::thread::sleep(Duration::from_millis(10));
            }
            if join.is_finished() {
                return join.join().unwrap_or(Err(CoreError::Internal("reactor thread panicked".into())));
            }
        }
        Ok(())
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        let _ = self.waker.wake();
    }
}

pub struct Server {
    config: ServerConfig,
    sink: Arc<dyn Sink>,
    credentials: Arc<dyn CredentialStore>,
    file_cache: Arc<FileCache>,
    pool: Arc<ThreadPool>,
}

impl Server {
    pub fn new(config: ServerConfig, sink: Arc<dyn Sink>, credentials: Arc<dyn CredentialStore>) -> Self {
        let file_cache = Arc::new(FileCache::new(config.timeout));
        let pool = Arc::new(ThreadPool::new(config.pool_threads));
        Self { config, sink, credentials, file_cache, pool }
    }

    /// Bind the listener and spawn the reactor thread; returns immediately
    /// with a [`ServerHandle`] (spec §6 "the external harness calls start").
    pub fn start(self) -> Result<ServerHandle> {
        let addr = SocketAddr::new(self.config.bind_addr, self.config.port);
        let mut listener = TcpListener::bind(addr).map_err(CoreError::Transport)?;
        let local_addr = listener.local_addr().map_err(CoreError::Transport)?;

        let poll = Poll::new().map_err(CoreError::Transport)?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)
            .map_err(CoreError::Transport)?;
        let waker = Arc::new(Waker::new(poll.registry(), WAKER_TOKEN).map_err(CoreError::Transport)?);
        let shutdown = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let config = self.config.clone();
        let sink = self.sink.clone();
        let credentials = self.credentials.clone();
        let file_cache = self.file_cache.clone();
        let pool = self.pool.clone();
        let shutdown_flag = shutdown.clone();
        let run_waker = waker.clone();

        let join = std::thread::Builder::new()
            .name("edgehttpd-reactor".into())
            .spawn(move || {
                run_loop(RunState {
                    listener,
                    poll,
                    config,
                    sink,
                    credentials,
                    file_cache,
                    pool,
                    shutdown: shutdown_flag,
                    waker: run_waker,
                })
            })
            .map_err(CoreError::Transport)?;

        Ok(ServerHandle { waker, shutdown, join: Some(join), local_addr })
    }
}

struct RunState {
    listener: TcpListener,
    poll: Poll,
    config: ServerConfig,
    sink: Arc<dyn Sink>,
    credentials: Arc<dyn CredentialStore>,
    file_cache: Arc<FileCache>,
    pool: Arc<ThreadPool>,
    shutdown: Arc<std::sync::atomic::AtomicBool>,
    waker: Arc<Waker>,
}

/// A PROCESSING-phase job handed to the worker pool: a plain-data snapshot
/// of whatever `build_response` needs, carrying `(fd, conn_id)` so the
/// completion handler can tell a finished job apart from a connection that
/// has since closed or been replaced by a reused fd (REDESIGN FLAG "every
/// callback and queued task carries (fd, conn_id)").
struct ProcessingJob {
    fd: i32,
    conn_id: u64,
    method: Option<Method>,
    path: String,
    keep_alive: bool,
    form: std::collections::HashMap<String, String>,
}

type Completed = Arc<Mutex<Vec<(i32, u64, HttpResponse)>>>;

fn run_loop(mut state: RunState) -> Result<()> {
    let mut events = Events::with_capacity(MAX_EVENTS);
    let mut registry: Registry<Connection> = Registry::new(MAX_CONNECTIONS);
    let mut timers = TimerService::new();
    let next_conn_id = AtomicU64::new(1);
    // Timer callbacks only carry a `Key`; the fd of whoever timed out lands
    // here and the reactor loop closes it after `timers.update()` returns,
    // since closing needs the registry and poll handle the callback
    // doesn't have access to (spec §9 "Back-references without cycles").
    let to_expire: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
    // PROCESSING-phase jobs complete on a worker thread; the reactor picks
    // the finished responses up here and resumes each connection's write
    // path (spec §4.8 "response write path farms out to the worker pool").
    let completed: Completed = Arc::new(Mutex::new(Vec::new()));

    // Reserved key, distinct from any fd, driving the file cache's idle
    // sweep off the same timer store rather than a dedicated thread.
    const CACHE_SWEEP_KEY: u64 = u64::MAX;
    let cache_for_sweep = state.file_cache.clone();
    let sink_for_sweep = state.sink.clone();
    timers.schedule(CACHE_SWEEP_KEY, state.config.timeout, -1, move |_| {
        let evicted = cache_for_sweep.sweep_idle();
        if evicted > 0 {
            crate::trace!(sink_for_sweep, "file cache sweep evicted {evicted} idle entries");
        }
    });

    crate::info!(state.sink, "listening on {:?}", state.listener.local_addr());
    if state.config.trig_mode != 0b11 {
        crate::warn!(
            state.sink,
            "trig_mode {:#04b} requests level-triggered polling, but this core always runs edge-triggered; overriding",
            state.config.trig_mode
        );
    }

    loop {
        if state.shutdown.load(Ordering::SeqCst) {
            break;
        }

        let timeout = match timers.next_tick_ms() {
            -1 => Some(Duration::from_secs(1)),
            ms => Some(Duration::from_millis(ms as u64)),
        };
        if let Err(e) = state.poll.poll(&mut events, timeout) {
            if e.kind() == std::io::ErrorKind::Interrupted {
                continue;
            }
            return Err(CoreError::Transport(e));
        }

        for event in events.iter() {
            match event.token() {
                WAKER_TOKEN => continue,
                LISTENER_TOKEN => {
                    accept_all(&mut state, &mut registry, &next_conn_id, &mut timers, &to_expire)?;
                }
                Token(fd) => {
                    let fd = fd as i32;
                    handle_io(&mut state, &mut registry, &mut timers, &to_expire, &completed, fd);
                }
            }
        }

        // Pick up responses PROCESSING jobs finished on a worker thread and
        // resume each connection's write path. The completion may be the
        // reason this `poll()` call returned (the waker fired).
        for (fd, conn_id, response) in completed.lock().unwrap().drain(..).collect::<Vec<_>>() {
            let Some((id, conn)) = registry.get_by_fd_mut(fd) else { continue };
            if conn.conn_id != conn_id || conn.phase != Phase::Processing {
                // stale: the fd was closed and reused, or the connection
                // moved on some other way since the job was dispatched.
                continue;
            }
            conn.queue_response(response);
            if let Err(e) = drive_connection(conn, fd, &state.config, &state.file_cache, &state.credentials, &state.sink, &state.pool, &completed, &state.waker) {
                crate::debug!(state.sink, "connection {} error: {e}", conn.conn_id);
                close_connection(&mut registry, &mut timers, id, &state.sink);
                continue;
            }
            if conn.is_closed() {
                close_connection(&mut registry, &mut timers, id, &state.sink);
                continue;
            }
            arm_idle_timer(&mut timers, fd, state.config.timeout, &to_expire);
        }

        let fired = timers.update();
        if fired >= 100 {
            crate::warn!(state.sink, "timer tick hit the per-update cap (100 fired)");
        }
        for fd in to_expire.lock().unwrap().drain(..).collect::<Vec<_>>() {
            if let Some((id, _)) = registry.get_by_fd(fd as i32) {
                crate::debug!(state.sink, "idle timeout on fd {fd}");
                close_connection(&mut registry, &mut timers, id, &state.sink);
            }
        }
    }

    crate::info!(state.sink, "shutting down, draining {} live connections", registry.len());
    let live_ids: Vec<ConnId> = registry.iter().map(|(id, _)| id).collect();
    for id in live_ids {
        close_connection(&mut registry, &mut timers, id, &state.sink);
    }
    Ok(())
}

fn arm_idle_timer(timers: &mut TimerService, fd: i32, timeout: Duration, to_expire: &Arc<Mutex<Vec<u64>>>) {
    let to_expire = to_expire.clone();
    timers.schedule(fd as u64, timeout, 0, move |key| {
        to_expire.lock().unwrap().push(key);
    });
}

fn accept_all(
    state: &mut RunState,
    registry: &mut Registry<Connection>,
    next_conn_id: &AtomicU64,
    timers: &mut TimerService,
    to_expire: &Arc<Mutex<Vec<u64>>>,
) -> Result<()> {
    loop {
        match state.listener.accept() {
            Ok((mut stream, peer_addr)) => {
                let fd = stream.as_raw_fd();
                if let Err(e) = socket2::SockRef::from(&stream).set_nodelay(true) {
                    crate::warn!(state.sink, "failed to set TCP_NODELAY on fd {fd}: {e}");
                }
                if state.config.linger {
                    let _ = socket2::SockRef::from(&stream).set_linger(Some(Duration::from_secs(1)));
                }

                if registry.len() >= MAX_CONNECTIONS {
                    crate::warn!(state.sink, "registry full, rejecting fd {fd}");
                    reject_busy(&mut stream);
                    continue;
                }

                state
                    .poll
                    .registry()
                    .register(&mut stream, Token(fd as usize), Interest::READABLE | Interest::WRITABLE)
                    .map_err(CoreError::Transport)?;

                let conn_id = next_conn_id.fetch_add(1, Ordering::SeqCst);
                let conn = Connection::new(stream, peer_addr, conn_id);
                match registry.insert(fd, conn) {
                    Ok(_id) => {
                        ACTIVE_CONNECTIONS.fetch_add(1, Ordering::SeqCst);
                        arm_idle_timer(timers, fd, state.config.timeout, to_expire);
                    }
                    Err(e) => crate::error!(state.sink, "registry insert failed after capacity check: {e}"),
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(()),
            Err(e) => return Err(CoreError::Transport(e)),
        }
    }
}

/// Spec §4.6's literal "busy" diagnostic: a bare status line plus a short
/// plaintext body, written synchronously before closing (SPEC_FULL §2).
fn reject_busy(stream: &mut TcpStream) {
    use std::io::Write;
    let _ = stream.write_all(b"HTTP/1.1 503 Service Unavailable\r\nConnection: close\r\nContent-Length: 14\r\n\r\nserver is busy");
}

fn handle_io(
    state: &mut RunState,
    registry: &mut Registry<Connection>,
    timers: &mut TimerService,
    to_expire: &Arc<Mutex<Vec<u64>>>,
    completed: &Completed,
    fd: i32,
) {
    let Some((conn_id, conn)) = registry.get_by_fd_mut(fd) else {
        return;
    };

    if let Err(e) = drive_connection(conn, fd, &state.config, &state.file_cache, &state.credentials, &state.sink, &state.pool, completed, &state.waker) {
        crate::debug!(state.sink, "connection {} error: {e}", conn.conn_id);
        close_connection(registry, timers, conn_id, &state.sink);
        return;
    }

    if conn.is_closed() {
        close_connection(registry, timers, conn_id, &state.sink);
        return;
    }

    arm_idle_timer(timers, fd, state.config.timeout, to_expire);
}

/// Drive `conn` through as many phase transitions as the current call can
/// make progress on. PROCESSING hands off to the worker pool and returns
/// immediately rather than blocking the reactor thread on file I/O or a
/// credential check; the response comes back through `completed` and
/// re-enters this same function from WRITING.
#[allow(clippy::too_many_arguments)]
fn drive_connection(
    conn: &mut Connection,
    fd: i32,
    config: &ServerConfig,
    file_cache: &Arc<FileCache>,
    credentials: &Arc<dyn CredentialStore>,
    sink: &Arc<dyn Sink>,
    pool: &Arc<ThreadPool>,
    completed: &Completed,
    waker: &Arc<Waker>,
) -> Result<()> {
    loop {
        match conn.phase {
            Phase::Reading => {
                let peer_closed = conn.drain_readable()?;
                match conn.advance_parse() {
                    Ok(true) => conn.phase = Phase::Processing,
                    Ok(false) => {
                        if peer_closed {
                            conn.close();
                        }
                        return Ok(());
                    }
                    Err(CoreError::Protocol(msg)) => {
                        crate::debug!(sink, "protocol error on conn {}: {msg}", conn.conn_id);
                        let mut res = HttpResponse::new(StatusCode::BadRequest);
                        res.set_body_owned(inline_error_body(StatusCode::BadRequest), "text/plain");
                        res.set_keep_alive(false);
                        conn.queue_response(res);
                        return Ok(());
                    }
                    Err(e) => return Err(e),
                }
            }
            Phase::Processing => {
                if !conn.dispatched {
                    conn.dispatched = true;
                    dispatch_processing(conn, fd, config, file_cache, credentials, pool, completed, waker);
                }
                // response arrives asynchronously; nothing more to do now.
                return Ok(());
            }
            Phase::Writing => {
                let done = conn.drain_writable()?;
                if !done {
                    return Ok(());
                }
                let keep_alive = conn
                    .response
                    .as_ref()
                    .and_then(|r| r.headers.get("connection"))
                    .map(|v| v == "keep-alive")
                    .unwrap_or(false);
                if keep_alive {
                    conn.prepare_for_next_request();
                } else {
                    conn.close();
                    return Ok(());
                }
            }
            Phase::Closed => return Ok(()),
        }
    }
}

/// Submit a PROCESSING-phase job to the worker pool: the credential check
/// and static file resolution both do blocking I/O, so neither runs on the
/// reactor thread (spec §4.8 "the response write path farms out to the
/// worker pool").
#[allow(clippy::too_many_arguments)]
fn dispatch_processing(
    conn: &Connection,
    fd: i32,
    config: &ServerConfig,
    file_cache: &Arc<FileCache>,
    credentials: &Arc<dyn CredentialStore>,
    pool: &Arc<ThreadPool>,
    completed: &Completed,
    waker: &Arc<Waker>,
) {
    let keep_alive = conn.request.version == "HTTP/1.1"
        && conn.request.headers.get("connection").is_some_and(|v| v.eq_ignore_ascii_case("keep-alive"));
    let job = ProcessingJob {
        fd,
        conn_id: conn.conn_id,
        method: conn.request.method,
        path: conn.request.path.clone(),
        keep_alive,
        form: conn.request.form.clone(),
    };
    let config = config.clone();
    let file_cache = file_cache.clone();
    let credentials = credentials.clone();
    let completed = completed.clone();
    let waker = waker.clone();

    pool.submit(move || {
        let response = build_response(&job, &config, &file_cache, &credentials);
        completed.lock().unwrap().push((job.fd, job.conn_id, response));
        let _ = waker.wake();
    });
}

fn build_response(job: &ProcessingJob, config: &ServerConfig, file_cache: &Arc<FileCache>, credentials: &Arc<dyn CredentialStore>) -> HttpResponse {
    let mut path = job.path.clone();

    if job.method == Some(Method::Post) && (path == "/login.html" || path == "/register.html") {
        let is_login = path == "/login.html";
        let username = job.form.get("username").cloned().unwrap_or_default();
        let password = job.form.get("password").cloned().unwrap_or_default();
        path = if credentials.verify(&username, &password, is_login) {
            "/welcome.html".to_string()
        } else {
            "/error.html".to_string()
        };
    }

    let mut response = match resolve_static_file(&path, config, file_cache) {
        Ok(mapped) => {
            let mut res = HttpResponse::new(StatusCode::Ok);
            res.set_body_mapped(mapped, mime_type_for(&path));
            res
        }
        Err(status) => {
            let mut res = HttpResponse::new(status);
            match resolve_static_file(&error_page_for(status), config, file_cache) {
                Ok(mapped) => {
                    res.set_body_mapped(mapped, "text/html");
                }
                Err(_) => {
                    res.set_body_owned(inline_error_body(status), "text/plain");
                }
            }
            res
        }
    };

    response.set_keep_alive(job.keep_alive);
    response
}

fn error_page_for(status: StatusCode) -> String {
    format!("/{}.html", status.code())
}

/// Resolve a request path to a mapped file, guarding against directory
/// traversal outside `static_dir` the way the teacher's `DataProvider`
/// does (`http_provider.rs`'s `sanitize_path`/`starts_with` check).
fn resolve_static_file(
    path: &str,
    config: &ServerConfig,
    file_cache: &Arc<FileCache>,
) -> std::result::Result<Arc<crate::file_cache::Mapped>, StatusCode> {
    let relative = path.trim_start_matches('/');
    let full_path: PathBuf = config.static_dir.join(relative);

    let canonical_root = config.static_dir.canonicalize().unwrap_or_else(|_| config.static_dir.clone());
    let canonical_target = full_path.canonicalize();
    match &canonical_target {
        Ok(p) if !p.starts_with(&canonical_root) => return Err(StatusCode::Forbidden),
        Err(_) => return Err(StatusCode::NotFound),
        Ok(_) => {}
    }

    file_cache.get(&full_path).map_err(|_| StatusCode::NotFound)
}

fn close_connection(registry: &mut Registry<Connection>, timers: &mut TimerService, id: ConnId, sink: &Arc<dyn Sink>) {
    timers.cancel(id.fd as u64);
    if let Some(mut conn) = registry.remove(id) {
        if !conn.is_closed() {
            conn.close();
        }
        ACTIVE_CONNECTIONS.fetch_sub(1, Ordering::SeqCst);
        crate::trace!(sink, "closed connection {}", conn.conn_id);
    }
}

pub fn default_static_dir() -> &'static Path {
    Path::new("./resources")
}
