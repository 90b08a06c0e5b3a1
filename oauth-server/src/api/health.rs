//! Liveness and readiness checks

mod checkers;
pub(crate) mod handlers;
mod models;

pub(crate) use handlers::router;
