//! Typed, validated configuration decoded from a [`super::parser::Document`]
//! (spec §6's recognized-options table).

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use super::parser::Document;
use crate::telemetry::Level;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub bind_addr: IpAddr,
    pub trig_mode: u8,
    pub timeout: Duration,
    pub linger: bool,
    pub static_dir: PathBuf,
    pub pool_threads: usize,
    pub pool_conns: usize,
    pub log_level: Level,
    pub log_queue_size: usize,
    pub log_enable: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 1316,
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            trig_mode: 3,
            timeout: Duration::from_millis(120_000),
            linger: false,
            static_dir: PathBuf::from("./resources"),
            pool_threads: 6,
            pool_conns: 8,
            log_level: Level::Info,
            log_queue_size: 1024,
            log_enable: true,
        }
    }
}

/// Keys spec.md §6 does not name; noticing one is a warned-and-skipped
/// event (§1.2), not a hard parse failure.
const RECOGNIZED_KEYS: &[&str] = &[
    "port",
    "trig_mode",
    "timeout_ms",
    "linger",
    "static_dir",
    "threads",
    "conns",
    "level",
    "queue_size",
    "enable",
];

impl ServerConfig {
    pub fn from_document(doc: &Document) -> Result<(Self, Vec<String>), crate::error::CoreError> {
        let mut cfg = ServerConfig::default();
        let mut warnings = Vec::new();

        if let Some(server) = doc.get("server") {
            for (key, value) in server {
                match key.as_str() {
                    "port" => cfg.port = parse_num(key, value)?,
                    "trig_mode" => cfg.trig_mode = parse_num::<u8>(key, value)? & 0b11,
                    "timeout_ms" => cfg.timeout = Duration::from_millis(parse_num(key, value)?),
                    "linger" => cfg.linger = parse_bool(key, value)?,
                    "static_dir" => cfg.static_dir = PathBuf::from(value),
                    other if !RECOGNIZED_KEYS.contains(&other) => {
                        warnings.push(format!("unrecognized key 'server.{other}', ignored"));
                    }
                    _ => {}
                }
            }
        }

        if let Some(pool) = doc.get("pool") {
            for (key, value) in pool {
                match key.as_str() {
                    "threads" => cfg.pool_threads = parse_num(key, value)?,
                    "conns" => cfg.pool_conns = parse_num(key, value)?,
                    other if !RECOGNIZED_KEYS.contains(&other) => {
                        warnings.push(format!("unrecognized key 'pool.{other}', ignored"));
                    }
                    _ => {}
                }
            }
        }

        if let Some(log) = doc.get("log") {
            for (key, value) in log {
                match key.as_str() {
                    "level" => cfg.log_level = parse_level(key, value)?,
                    "queue_size" => cfg.log_queue_size = parse_num(key, value)?,
                    "enable" => cfg.log_enable = parse_bool(key, value)?,
                    other if !RECOGNIZED_KEYS.contains(&other) => {
                        warnings.push(format!("unrecognized key 'log.{other}', ignored"));
                    }
                    _ => {}
                }
            }
        }

        for section in doc.keys() {
            if !section.is_empty() && !["server", "pool", "log"].contains(&section.as_str()) {
                return Err(crate::error::CoreError::Config(format!("unrecognized section '[{section}]'")));
            }
        }

        Ok((cfg, warnings))
    }
}

fn parse_num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, crate::error::CoreError> {
    value
        .parse()
        .map_err(|_| crate::error::CoreError::Config(format!("key '{key}' expects a number, got '{value}'")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, crate::error::CoreError> {
    match value {
        "true" | "yes" | "1" | "on" => Ok(true),
        "false" | "no" | "0" | "off" => Ok(false),
        other => Err(crate::error::CoreError::Config(format!("key '{key}' expects a boolean, got '{other}'"))),
    }
}

fn parse_level(key: &str, value: &str) -> Result<Level, crate::error::CoreError> {
    match value.to_ascii_lowercase().as_str() {
        "trace" => Ok(Level::Trace),
        "debug" => Ok(Level::Debug),
        "info" => Ok(Level::Info),
        "warn" | "warning" => Ok(Level::Warn),
        "error" => Ok(Level::Error),
        other => Err(crate::error::CoreError::Config(format!("key '{key}' expects a log level, got '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parser::Parser;

    #[test]
    fn defaults_apply_when_a_section_is_absent() {
        let doc = Parser::parse("[pool]\nthreads = 12\n").unwrap();
        let (cfg, warnings) = ServerConfig::from_document(&doc).unwrap();
        assert_eq!(cfg.port, 1316);
        assert_eq!(cfg.pool_threads, 12);
        assert!(warnings.is_empty());
    }

    #[test]
    fn trig_mode_is_masked_to_two_bits() {
        let doc = Parser::parse("[server]\ntrig_mode = 255\n").unwrap();
        let (cfg, _) = ServerConfig::from_document(&doc).unwrap();
        assert_eq!(cfg.trig_mode, 0b11);
    }

    #[test]
    fn unrecognized_key_is_a_warning_not_an_error() {
        let doc = Parser::parse("[server]\nbogus = 1\n").unwrap();
        let (_, warnings) = ServerConfig::from_document(&doc).unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("bogus"));
    }

    #[test]
    fn unrecognized_section_is_a_hard_error() {
        let doc = Parser::parse("[bogus]\nx = 1\n").unwrap();
        assert!(ServerConfig::from_document(&doc).is_err());
    }

    #[test]
    fn bad_number_is_a_config_error() {
        let doc = Parser::parse("[server]\nport = notanumber\n").unwrap();
        assert!(ServerConfig::from_document(&doc).is_err());
    }
}
