//! Route table consumed by the guard.
//!
//! Patterns are `/`-separated segments where `:name` matches any single
//! non-empty segment. The first matching route wins.

use std::collections::BTreeMap;

use crate::guard::session_guard::Destination;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDef {
    pub pattern: String,
    pub requires_auth: bool,
    /// Alias target; the route renders nothing itself.
    pub redirect: Option<String>,
}

impl RouteDef {
    pub fn page(pattern: &str, requires_auth: bool) -> Self {
        Self {
            pattern: pattern.to_string(),
            requires_auth,
            redirect: None,
        }
    }

    pub fn alias(pattern: &str, target: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            requires_auth: false,
            redirect: Some(target.to_string()),
        }
    }

    fn matches(&self, path: &str) -> Option<BTreeMap<String, String>> {
        let pattern: Vec<&str> = split_segments(&self.pattern);
        let actual: Vec<&str> = split_segments(path);
        if pattern.len() != actual.len() {
            return None;
        }

        let mut params = BTreeMap::new();
        for (expected, got) in pattern.iter().zip(actual.iter()) {
            match expected.strip_prefix(':') {
                Some(name) => {
                    params.insert(name.to_string(), (*got).to_string());
                }
                None if expected == got => {}
                None => return None,
            }
        }
        Some(params)
    }
}

/// Outcome of matching a path against the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Page(Destination),
    Alias { to: String },
}

#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<RouteDef>,
}

impl RouteTable {
    pub fn new(routes: Vec<RouteDef>) -> Self {
        Self { routes }
    }

    /// Resolve a full path (query and fragment included).
    ///
    /// Paths no route claims resolve to an unprotected destination: the
    /// not-found page exposes nothing that needs a session.
    pub fn resolve(&self, full_path: &str) -> Resolution {
        let path = path_only(full_path);

        for route in &self.routes {
            if let Some(params) = route.matches(path) {
                if let Some(target) = &route.redirect {
                    return Resolution::Alias { to: target.clone() };
                }
                return Resolution::Page(Destination {
                    path: path.to_string(),
                    full_path: full_path.to_string(),
                    requires_auth: route.requires_auth,
                    params,
                });
            }
        }

        Resolution::Page(Destination {
            path: path.to_string(),
            full_path: full_path.to_string(),
            requires_auth: false,
            params: BTreeMap::new(),
        })
    }
}

impl Default for RouteTable {
    /// The moodboard application's routes.
    fn default() -> Self {
        Self::new(vec![
            RouteDef::alias("/", "/explore"),
            RouteDef::page("/login", false),
            RouteDef::page("/signup", false),
            RouteDef::page("/profile", true),
            RouteDef::page("/profile/:id", true),
            RouteDef::page("/board/:id", false),
            RouteDef::page("/board/:id/edit", true),
            RouteDef::page("/explore", true),
            RouteDef::page("/search", true),
        ])
    }
}

fn path_only(full_path: &str) -> &str {
    let end = full_path.find(['?', '#']).unwrap_or(full_path.len());
    match &full_path[..end] {
        "" => "/",
        path => path,
    }
}

fn split_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}
