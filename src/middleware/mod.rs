//! Middleware shared by all routes.

mod infallible;
pub(crate) use infallible::InfallibleLayer;

pub(crate) mod trace;
