//! End-to-end scenarios driven against a real bound socket: the reactor,
//! connection state machine, parser, file cache and credential store all
//! wired together the way the binary wires them, minus config-file loading.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use edgehttpd::config::ServerConfig;
use edgehttpd::credential::InMemoryStore;
use edgehttpd::reactor::Server;
use edgehttpd::telemetry::NullSink;

fn start_server(static_dir: std::path::PathBuf, credentials: Arc<InMemoryStore>) -> edgehttpd::reactor::ServerHandle {
    let mut config = ServerConfig::default();
    config.port = 0; // let the OS pick a free port
    config.bind_addr = std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST);
    config.static_dir = static_dir;
    config.pool_threads = 2;
    config.timeout = Duration::from_millis(300);

    let server = Server::new(config, Arc::new(NullSink), credentials);
    server.start().expect("server should bind and start")
}

fn read_response(stream: &mut TcpStream) -> (String, Vec<u8>) {
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let header_end = buf.windows(4).position(|w| w == b"\r\n\r\n");
        if let Some(pos) = header_end {
            let header_text = String::from_utf8_lossy(&buf[..pos]).into_owned();
            let content_length: usize = header_text
                .lines()
                .find_map(|l| l.to_ascii_lowercase().strip_prefix("content-length:").map(|v| v.trim().to_string()))
                .and_then(|v| v.parse().ok())
                .unwrap_or(0);
            let body_start = pos + 4;
            while buf.len() - body_start < content_length {
                let n = stream.read(&mut chunk).expect("reading body");
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            let body = buf[body_start..(body_start + content_length).min(buf.len())].to_vec();
            return (header_text, body);
        }
        let n = stream.read(&mut chunk).expect("reading headers");
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    (String::from_utf8_lossy(&buf).into_owned(), Vec::new())
}

#[test]
fn get_index_then_reuses_the_connection_for_a_second_request() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), b"<h1>hello</h1>").unwrap();

    let handle = start_server(dir.path().to_path_buf(), Arc::new(InMemoryStore::new()));
    let mut stream = TcpStream::connect(handle.local_addr()).unwrap();

    stream.write_all(b"GET / HTTP/1.1\r\nHost: x\r\nConnection: keep-alive\r\n\r\n").unwrap();
    let (headers, body) = read_response(&mut stream);
    assert!(headers.starts_with("HTTP/1.1 200 OK"));
    assert!(headers.to_ascii_lowercase().contains("connection: keep-alive"));
    assert_eq!(body, b"<h1>hello</h1>");

    // same socket, second request: the server must still be serving it.
    stream.write_all(b"GET / HTTP/1.1\r\nHost: x\r\nConnection: keep-alive\r\n\r\n").unwrap();
    let (headers2, body2) = read_response(&mut stream);
    assert!(headers2.starts_with("HTTP/1.1 200 OK"));
    assert_eq!(body2, b"<h1>hello</h1>");

    handle.shutdown(Duration::from_secs(2)).unwrap();
}

#[test]
fn missing_file_returns_404_and_closes() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), b"ok").unwrap();

    let handle = start_server(dir.path().to_path_buf(), Arc::new(InMemoryStore::new()));
    let mut stream = TcpStream::connect(handle.local_addr()).unwrap();
    stream.write_all(b"GET /nope.html HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
    let (headers, _) = read_response(&mut stream);
    assert!(headers.starts_with("HTTP/1.1 404 Not Found"));

    handle.shutdown(Duration::from_secs(2)).unwrap();
}

#[test]
fn malformed_request_line_gets_a_400_and_the_connection_closes() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), b"ok").unwrap();

    let handle = start_server(dir.path().to_path_buf(), Arc::new(InMemoryStore::new()));
    let mut stream = TcpStream::connect(handle.local_addr()).unwrap();
    stream.write_all(b"NOTAVERB / HTTP/1.1\r\n\r\n").unwrap();
    let (headers, _) = read_response(&mut stream);
    assert!(headers.starts_with("HTTP/1.1 400 Bad Request"));
    assert!(headers.to_ascii_lowercase().contains("connection: close"));

    // peer is expected to close after writing: a further read observes EOF.
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    let mut trailing = [0u8; 16];
    let n = stream.read(&mut trailing).unwrap_or(0);
    assert_eq!(n, 0);

    handle.shutdown(Duration::from_secs(2)).unwrap();
}

#[test]
fn login_with_valid_credentials_redirects_to_welcome() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("welcome.html"), b"<h1>welcome</h1>").unwrap();
    std::fs::write(dir.path().join("error.html"), b"<h1>denied</h1>").unwrap();

    let credentials = Arc::new(InMemoryStore::seeded([("alice".to_string(), "hunter2".to_string())]));
    let handle = start_server(dir.path().to_path_buf(), credentials);
    let mut stream = TcpStream::connect(handle.local_addr()).unwrap();

    let body = b"username=alice&password=hunter2";
    let request = format!(
        "POST /login.html HTTP/1.1\r\nHost: x\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\n\r\n",
        body.len()
    );
    stream.write_all(request.as_bytes()).unwrap();
    stream.write_all(body).unwrap();
    let (headers, resp_body) = read_response(&mut stream);
    assert!(headers.starts_with("HTTP/1.1 200 OK"));
    assert_eq!(resp_body, b"<h1>welcome</h1>");

    handle.shutdown(Duration::from_secs(2)).unwrap();
}

#[test]
fn login_with_wrong_password_redirects_to_error_page() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("welcome.html"), b"<h1>welcome</h1>").unwrap();
    std::fs::write(dir.path().join("error.html"), b"<h1>denied</h1>").unwrap();

    let credentials = Arc::new(InMemoryStore::seeded([("alice".to_string(), "hunter2".to_string())]));
    let handle = start_server(dir.path().to_path_buf(), credentials);
    let mut stream = TcpStream::connect(handle.local_addr()).unwrap();

    let body = b"username=alice&password=wrong";
    let request = format!(
        "POST /login.html HTTP/1.1\r\nHost: x\r\nContent-Type: application/x-www-form-urlencoded\r\nContent-Length: {}\r\n\r\n",
        body.len()
    );
    stream.write_all(request.as_bytes()).unwrap();
    stream.write_all(body).unwrap();
    let (headers, resp_body) = read_response(&mut stream);
    assert!(headers.starts_with("HTTP/1.1 200 OK"));
    assert_eq!(resp_body, b"<h1>denied</h1>");

    handle.shutdown(Duration::from_secs(2)).unwrap();
}

#[test]
fn idle_connection_is_closed_after_the_configured_timeout() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), b"ok").unwrap();

    let handle = start_server(dir.path().to_path_buf(), Arc::new(InMemoryStore::new()));
    let mut stream = TcpStream::connect(handle.local_addr()).unwrap();
    stream.write_all(b"GET / HTTP/1.1\r\nHost: x\r\nConnection: keep-alive\r\n\r\n").unwrap();
    let _ = read_response(&mut stream);

    // configured timeout is 300ms; give the reactor enough ticks to evict.
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    let mut trailing = [0u8; 16];
    let n = stream.read(&mut trailing).unwrap_or(0);
    assert_eq!(n, 0, "idle connection should have been closed by the reactor");

    handle.shutdown(Duration::from_secs(2)).unwrap();
}

#[test]
fn two_concurrent_clients_fetch_the_same_static_file_independently() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("shared.html"), b"shared-bytes").unwrap();

    let handle = start_server(dir.path().to_path_buf(), Arc::new(InMemoryStore::new()));
    let addr = handle.local_addr();

    let threads: Vec<_> = (0..4)
        .map(|_| {
            std::thread::spawn(move || {
                let mut stream = TcpStream::connect(addr).unwrap();
                stream.write_all(b"GET /shared.html HTTP/1.1\r\nHost: x\r\n\r\n").unwrap();
                let (headers, body) = read_response(&mut stream);
                assert!(headers.starts_with("HTTP/1.1 200 OK"));
                assert_eq!(body, b"shared-bytes");
            })
        })
        .collect();
    for t in threads {
        t.join().unwrap();
    }

    handle.shutdown(Duration::from_secs(2)).unwrap();
}
