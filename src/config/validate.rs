//! Config hygiene diagnostics (SPEC_FULL §2 "Config hygiene diagnostics"),
//! ported from the teacher's `config::validate`. The teacher validated a
//! multi-server-block config for bind conflicts; this crate's config
//! describes a single listener, so what survives is the part that still
//! applies: dangling `static_dir` and missing canonical error pages are
//! reported through the telemetry sink as warnings rather than aborting
//! startup, matching the teacher's resilience posture.

use crate::config::types::ServerConfig;
use crate::telemetry::Sink;

pub fn validate(cfg: &ServerConfig, sink: &dyn Sink) {
    if !cfg.static_dir.is_dir() {
        crate::warn!(sink, "server.static_dir '{}' does not exist or is not a directory", cfg.static_dir.display());
    }

    for page in ["400.html", "403.html", "404.html"] {
        let path = cfg.static_dir.join(page);
        if !path.is_file() {
            crate::warn!(sink, "canonical error page '{}' is missing; a built-in fallback body is used instead", path.display());
        }
    }

    for page in ["register.html", "login.html", "welcome.html", "error.html"] {
        let path = cfg.static_dir.join(page);
        if !path.is_file() {
            crate::warn!(sink, "form endpoint page '{}' is missing", path.display());
        }
    }

    if cfg.pool_threads == 0 {
        crate::warn!(sink, "pool.threads is 0; coerced to 1 worker");
    }
}
