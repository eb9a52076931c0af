//! Incremental HTTP/1.1 request parser: REQUEST_LINE -> HEADERS -> BODY ->
//! FINISH (spec §3 "HTTP Parser", §4.2).
//!
//! Trimmed from the teacher's `HttpRequest`/`ParsingState` machine
//! (`src/http/request.rs`): the method set, chunked-body state machine,
//! CGI dispatch and multipart parsing are gone (Non-goals), but the
//! incremental request-line/header/body states, the `ParseError` taxonomy
//! and the path-rewrite table are kept in the teacher's own shape.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::buffer::Buffer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

impl FromStr for Method {
    type Err = ParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(Method::Get),
            "POST" => Ok(Method::Post),
            _ => Err(ParseError::InvalidMethod),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ParsingState {
    RequestLine,
    Headers,
    Body,
    Finish,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    MalformedRequestLine,
    InvalidMethod,
    UnsupportedVersion,
    HeaderTooLong,
    TooManyHeaders,
    InvalidHeaderLine,
    PayloadTooLarge,
    InvalidUtf8,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ParseError::MalformedRequestLine => "malformed request line",
            ParseError::InvalidMethod => "invalid or unsupported HTTP method",
            ParseError::UnsupportedVersion => "unsupported HTTP version",
            ParseError::HeaderTooLong => "header line too long",
            ParseError::TooManyHeaders => "too many headers",
            ParseError::InvalidHeaderLine => "invalid header line",
            ParseError::PayloadTooLarge => "payload too large",
            ParseError::InvalidUtf8 => "invalid utf-8 in request",
        };
        write!(f, "{s}")
    }
}

impl std::error::Error for ParseError {}

const MAX_HEADER_LINE: usize = 8 * 1024;
const MAX_HEADERS: usize = 100;
const MAX_BODY: usize = 1024 * 1024;

#[derive(Debug, Default)]
pub struct HttpRequest {
    pub method: Option<Method>,
    pub path: String,
    pub version: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub form: HashMap<String, String>,
    state: ParsingStateInternal,
    content_length: usize,
}

#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
enum ParsingStateInternal {
    #[default]
    RequestLine,
    Headers,
    Body,
    Finish,
}

impl From<ParsingStateInternal> for ParsingState {
    fn from(s: ParsingStateInternal) -> Self {
        match s {
            ParsingStateInternal::RequestLine => ParsingState::RequestLine,
            ParsingStateInternal::Headers => ParsingState::Headers,
            ParsingStateInternal::Body => ParsingState::Body,
            ParsingStateInternal::Finish => ParsingState::Finish,
        }
    }
}

impl HttpRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ParsingState {
        self.state.into()
    }

    pub fn is_finished(&self) -> bool {
        self.state == ParsingStateInternal::Finish
    }

    /// Reset to the initial state for the next request on a keep-alive
    /// connection (spec §8 "after a successful full write with keep-alive,
    /// the same Connection's next request is parsed starting from
    /// REQUEST_LINE state with empty header and form maps").
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Drive the state machine as far as the bytes in `buf` allow,
    /// consuming whatever was parsed. Returns `Ok(true)` once FINISH is
    /// reached, `Ok(false)` if more bytes are needed.
    pub fn parse(&mut self, buf: &mut Buffer) -> Result<bool, ParseError> {
        loop {
            match self.state {
                ParsingStateInternal::RequestLine => {
                    let Some(line_end) = find_crlf(buf.peek()) else {
                        if buf.readable_bytes() > MAX_HEADER_LINE {
                            return Err(ParseError::MalformedRequestLine);
                        }
                        return Ok(false);
                    };
                    let line = std::str::from_utf8(&buf.peek()[..line_end]).map_err(|_| ParseError::InvalidUtf8)?;
                    self.parse_request_line(line)?;
                    buf.consume(line_end + 2);
                    self.state = ParsingStateInternal::Headers;
                }
                ParsingStateInternal::Headers => {
                    let Some(line_end) = find_crlf(buf.peek()) else {
                        if buf.readable_bytes() > MAX_HEADER_LINE {
                            return Err(ParseError::HeaderTooLong);
                        }
                        return Ok(false);
                    };
                    if line_end == 0 {
                        // blank line: end of headers.
                        buf.consume(2);
                        self.content_length = self
                            .headers
                            .get("content-length")
                            .and_then(|v| v.parse().ok())
                            .unwrap_or(0);
                        if self.content_length > MAX_BODY {
                            return Err(ParseError::PayloadTooLarge);
                        }
                        self.state = if self.content_length == 0 {
                            ParsingStateInternal::Finish
                        } else {
                            ParsingStateInternal::Body
                        };
                        if self.state == ParsingStateInternal::Finish {
                            self.finish_body();
                        }
                        continue;
                    }
                    if self.headers.len() >= MAX_HEADERS {
                        return Err(ParseError::TooManyHeaders);
                    }
                    let line = std::str::from_utf8(&buf.peek()[..line_end]).map_err(|_| ParseError::InvalidUtf8)?;
                    let (name, value) = line.split_once(':').ok_or(ParseError::InvalidHeaderLine)?;
                    self.headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
                    buf.consume(line_end + 2);
                }
                ParsingStateInternal::Body => {
                    if buf.readable_bytes() < self.content_length {
                        return Ok(false);
                    }
                    self.body = buf.peek()[..self.content_length].to_vec();
                    buf.consume(self.content_length);
                    self.state = ParsingStateInternal::Finish;
                    self.finish_body();
                }
                ParsingStateInternal::Finish => return Ok(true),
            }
        }
    }

    fn parse_request_line(&mut self, line: &str) -> Result<(), ParseError> {
        let mut parts = line.split(' ');
        let method = parts.next().ok_or(ParseError::MalformedRequestLine)?;
        let path = parts.next().ok_or(ParseError::MalformedRequestLine)?;
        let version = parts.next().ok_or(ParseError::MalformedRequestLine)?;
        if parts.next().is_some() {
            return Err(ParseError::MalformedRequestLine);
        }
        if version != "HTTP/1.1" && version != "HTTP/1.0" {
            return Err(ParseError::UnsupportedVersion);
        }
        self.method = Some(method.parse()?);
        self.version = version.to_string();
        self.path = rewrite_path(path);
        Ok(())
    }

    /// Decode `application/x-www-form-urlencoded` bodies and, for the two
    /// hard-coded credential endpoints, leave `form["username"]`/
    /// `form["password"]` populated for the reactor's credential check
    /// (spec §4.2 "the two form endpoints").
    fn finish_body(&mut self) {
        if self.headers.get("content-type").map(|s| s.as_str()) == Some("application/x-www-form-urlencoded") && !self.body.is_empty() {
            if let Ok(text) = std::str::from_utf8(&self.body) {
                self.form = decode_form(text);
            }
        }
    }
}

/// `/` -> `/index.html`; a handful of recognized bare stems gain `.html`
/// (spec §4.2's path-rewrite rule, ported from the teacher's routing
/// table but reduced to the handful of pages this crate actually serves).
fn rewrite_path(path: &str) -> String {
    let path = path.split('?').next().unwrap_or(path);
    if path == "/" {
        return "/index.html".to_string();
    }
    const BARE_STEMS: &[&str] = &["register", "login", "welcome", "error", "index"];
    let stem = path.trim_start_matches('/');
    if !stem.contains('.') && BARE_STEMS.contains(&stem) {
        return format!("/{stem}.html");
    }
    path.to_string()
}

fn decode_form(body: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for pair in body.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        out.insert(urldecode(k), urldecode(v));
    }
    out
}

fn urldecode(s: &str) -> String {
    let mut out = Vec::with_capacity(s.len());
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                if let Ok(byte) = u8::from_str_radix(std::str::from_utf8(&bytes[i + 1..i + 3]).unwrap_or(""), 16) {
                    out.push(byte);
                    i += 3;
                } else {
                    out.push(bytes[i]);
                    i += 1;
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn find_crlf(data: &[u8]) -> Option<usize> {
    data.windows(2).position(|w| w == b"\r\n")
}
