//! Pre-navigation interceptor.
//!
//! Unauthenticated users heading for a protected page are sent to account
//! creation (not login), carrying the requested path so they can resume once
//! signed up. Authenticated users are kept out of the auth pages.

use std::collections::BTreeMap;

use tracing::debug;

use crate::guard::routes::{Resolution, RouteTable};
use crate::state::credential_store::Credential;

pub const SIGNUP_PATH: &str = "/signup";
pub const LOGIN_PATH: &str = "/login";
pub const HOME_PATH: &str = "/explore";
pub const REDIRECT_PARAM: &str = "redirect";

/// A resolved navigation target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub path: String,
    pub full_path: String,
    pub requires_auth: bool,
    pub params: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub path: String,
    pub query: BTreeMap<String, String>,
}

impl Redirect {
    pub fn to(path: &str) -> Self {
        Self {
            path: path.to_string(),
            query: BTreeMap::new(),
        }
    }

    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.insert(key.to_string(), value.to_string());
        self
    }

    /// Path plus percent-encoded query string.
    pub fn location(&self) -> String {
        if self.query.is_empty() {
            return self.path.clone();
        }
        let query = self
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", self.path, query)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Redirect(Redirect),
}

/// Decide a single navigation against a credential snapshot.
pub fn decide(destination: &Destination, credential: &Credential) -> Decision {
    let authenticated = credential.is_authenticated();

    if destination.requires_auth && !authenticated {
        return Decision::Redirect(
            Redirect::to(SIGNUP_PATH).with_query(REDIRECT_PARAM, &destination.full_path),
        );
    }

    if authenticated && (destination.path == LOGIN_PATH || destination.path == SIGNUP_PATH) {
        return Decision::Redirect(Redirect::to(HOME_PATH));
    }

    Decision::Allow
}

/// Guard bound to a route table.
#[derive(Debug, Clone, Default)]
pub struct SessionGuard {
    routes: RouteTable,
}

impl SessionGuard {
    pub fn new(routes: RouteTable) -> Self {
        Self { routes }
    }

    /// Evaluate a navigation to `full_path`.
    ///
    /// Alias routes redirect without consulting the session; the router runs
    /// the guard again for the alias target.
    pub fn check(&self, full_path: &str, credential: &Credential) -> Decision {
        let decision = match self.routes.resolve(full_path) {
            Resolution::Alias { to } => Decision::Redirect(Redirect::to(&to)),
            Resolution::Page(destination) => decide(&destination, credential),
        };
        debug!(
            full_path,
            authenticated = credential.is_authenticated(),
            ?decision,
            "[GUARD] navigation"
        );
        decision
    }
}
