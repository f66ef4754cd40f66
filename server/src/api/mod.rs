//! API server and routes

pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod routes;
mod server;
#[cfg(test)]
pub(crate) mod testing;
pub mod types;

pub use server::{ApiServer, router};
