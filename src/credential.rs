//! Pluggable credential verification for the two hard-coded form endpoints
//! (spec §3 "Credential store", §9 Open Question: "a synchronous trait, no
//! connection pool mandated").
//!
//! The original serves these two endpoints off a MySQL-backed connection
//! pool (`zws::db::SqlConnector`, `include/database/sql_connector.h`) that
//! this crate does not reproduce: a live database is an external
//! collaborator, not part of the serving-engine core. [`CredentialStore`]
//! is the seam a real implementation plugs into; [`InMemoryStore`] below is
//! the one shipped by default, good enough for the tests and for running
//! the binary with a small fixed user list from config.

use std::collections::HashMap;

use parking_lot::RwLock;

/// Synchronous lookup, deliberately blocking: callers run it from a worker
/// pool task, never on the reactor thread (spec §4.8).
pub trait CredentialStore: Send + Sync {
    /// `is_login == true` for `/login.html` (check existing credentials);
    /// `is_login == false` for `/register.html` (the name must not already
    /// exist, then it is created with `pwd`).
    fn verify(&self, name: &str, pwd: &str, is_login: bool) -> bool;
}

/// Simple in-process user table. Not persisted across restarts; sufficient
/// for the two form endpoints the spec names and for tests.
#[derive(Default)]
pub struct InMemoryStore {
    users: RwLock<HashMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            users: RwLock::new(pairs.into_iter().collect()),
        }
    }
}

impl CredentialStore for InMemoryStore {
    fn verify(&self, name: &str, pwd: &str, is_login: bool) -> bool {
        if name.is_empty() || pwd.is_empty() {
            return false;
        }
        if is_login {
            self.users.read().get(name).is_some_and(|stored| stored == pwd)
        } else {
            let mut users = self.users.write();
            if users.contains_key(name) {
                false
            } else {
                users.insert(name.to_string(), pwd.to_string());
                true
            }
        }
    }
}
