//! Navigation gating on the session lifecycle.

pub mod routes;
pub mod session_guard;

pub use routes::{Resolution, RouteDef, RouteTable};
pub use session_guard::{decide, Decision, Destination, Redirect, SessionGuard};
