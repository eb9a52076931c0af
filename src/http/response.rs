//! Response assembly: status line + headers + mmap-backed body span (spec
//! §3 "Response Builder", §4.3, §6 "iovec pair").
//!
//! Trimmed from the teacher's `HttpResponse` (`src/http/response.rs`):
//! the mime-by-suffix table, pascal-cased header rendering and canonical-
//! error-page lookup pattern are kept; autoindex generation and the
//! generic redirect builder are dropped (no routing surface calls for
//! them here).

use std::collections::HashMap;
use std::sync::Arc;

use crate::file_cache::Mapped;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    BadRequest,
    Forbidden,
    NotFound,
    ServiceUnavailable,
}

impl StatusCode {
    pub fn code(self) -> u16 {
        match self {
            StatusCode::Ok => 200,
            StatusCode::BadRequest => 400,
            StatusCode::Forbidden => 403,
            StatusCode::NotFound => 404,
            StatusCode::ServiceUnavailable => 503,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::ServiceUnavailable => "Service Unavailable",
        }
    }
}

/// Either an in-memory body (small generated pages, canonical errors) or a
/// handle into the shared file cache (static files) — the "iovec pair" of
/// header bytes + body bytes the glossary names, without committing to a
/// real `iovec`/`writev` type at this layer.
pub enum Body {
    Owned(Vec<u8>),
    Mapped(Arc<Mapped>),
}

impl Body {
    pub fn bytes(&self) -> &[u8] {
        match self {
            Body::Owned(b) => b,
            Body::Mapped(m) => m.bytes(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes().is_empty()
    }
}

pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HashMap<String, String>,
    pub body: Body,
}

impl HttpResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Body::Owned(Vec::new()),
        }
    }

    pub fn set_header(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        self.headers.insert(key.to_ascii_lowercase(), value.into());
        self
    }

    pub fn set_body_owned(&mut self, body: Vec<u8>, content_type: &str) -> &mut Self {
        self.set_header("content-length", body.len().to_string());
        self.set_header("content-type", content_type);
        self.body = Body::Owned(body);
        self
    }

    pub fn set_body_mapped(&mut self, mapped: Arc<Mapped>, content_type: &str) -> &mut Self {
        self.set_header("content-length", mapped.len().to_string());
        self.set_header("content-type", content_type);
        self.body = Body::Mapped(mapped);
        self
    }

    /// Apply the keep-alive headers spec §4.2 mandates when the connection
    /// is staying open: `Connection: keep-alive` plus the advisory
    /// `max`/`timeout` pair.
    pub fn set_keep_alive(&mut self, keep_alive: bool) -> &mut Self {
        if keep_alive {
            self.set_header("connection", "keep-alive");
            self.set_header("keep-alive", "max=6, timeout=120");
        } else {
            self.set_header("connection", "close");
        }
        self
    }

    /// Render the status line and headers; the body is written separately
    /// so the reactor can scatter-write header bytes and the mmap span in
    /// one `writev` instead of copying the body into this buffer.
    pub fn header_bytes(&self) -> Vec<u8> {
        let mut out = format!("HTTP/1.1 {} {}\r\n", self.status.code(), self.status.reason()).into_bytes();
        for (key, value) in &self.headers {
            out.extend_from_slice(format!("{}: {}\r\n", to_header_case(key), value).as_bytes());
        }
        out.extend_from_slice(b"\r\n");
        out
    }
}

fn to_header_case(s: &str) -> String {
    s.split('-')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                None => String::new(),
                Some(c) => c.to_ascii_uppercase().to_string() + chars.as_str(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

pub fn mime_type_for(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or("");
    match ext {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "application/javascript",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "json" => "application/json",
        "txt" => "text/plain",
        "ico" => "image/x-icon",
        _ => "application/octet-stream",
    }
}

/// Canonical error page body for a given status, used when the
/// corresponding `/4xx.html` file could not be mapped from disk (spec §4.3
/// "appropriate 4xx with canonical body or inline error").
pub fn inline_error_body(status: StatusCode) -> Vec<u8> {
    format!("{} {}", status.code(), status.reason()).into_bytes()
}
