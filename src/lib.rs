pub mod auth;
pub mod clock;
pub mod config;
pub mod directory;
pub mod error;
pub mod limiter;
pub mod lockout;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_support;
