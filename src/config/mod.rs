//! Configuration loading: file -> tokens -> document -> validated
//! [`ServerConfig`] (spec §6).

pub mod display;
pub mod lexer;
pub mod parser;
pub mod types;
pub mod validate;

pub use parser::{ConfigError, Document};
pub use types::ServerConfig;

use std::path::Path;

use crate::error::{CoreError, Result};
use crate::telemetry::Sink;

/// Parse, decode and validate a config file in one call. Parse errors and
/// unrecognized sections are hard failures; unrecognized keys and hygiene
/// issues are warned through `sink` and otherwise ignored.
pub fn load(path: &Path, sink: &dyn Sink) -> Result<ServerConfig> {
    let source = std::fs::read_to_string(path)
        .map_err(|e| CoreError::Config(format!("reading {}: {e}", path.display())))?;
    load_str(&source, sink)
}

pub fn load_str(source: &str, sink: &dyn Sink) -> Result<ServerConfig> {
    let doc = parser::Parser::parse(source).map_err(|e| CoreError::Config(e.to_string()))?;
    let (cfg, warnings) = types::ServerConfig::from_document(&doc)?;
    for warning in warnings {
        crate::warn!(sink, "{warning}");
    }
    validate::validate(&cfg, sink);
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::NullSink;

    #[test]
    fn loads_a_well_formed_file() {
        let cfg = load_str(
            "\
[server]
port = 8080
static_dir = .
timeout_ms = 30000

[pool]
threads = 4
",
            &NullSink,
        )
        .unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.pool_threads, 4);
    }

    #[test]
    fn rejects_malformed_syntax() {
        assert!(load_str("[server\nport = 1\n", &NullSink).is_err());
    }
}
