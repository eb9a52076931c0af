//! Common imports pulled together for the crate's own modules, the way the
//! teacher's `prelude.rs` did for its (much larger) module set.

pub use crate::config::ServerConfig;
pub use crate::credential::CredentialStore;
pub use crate::error::{CoreError, Result};
pub use crate::http::{Connection, HttpRequest, HttpResponse, Method, StatusCode};
pub use crate::telemetry::Sink;

pub use std::collections::HashMap;
pub use std::path::{Path, PathBuf};
pub use std::sync::Arc;
pub use std::time::{Duration, Instant};
