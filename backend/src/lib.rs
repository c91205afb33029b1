//! Authentication and account-security core of the storefront platform.
//!
//! Credential storage, password hashing, brute-force lockout, JWT session
//! tokens and role checks, plus a thin axum surface over them.

pub mod api;
pub mod auth;
pub mod config;
pub mod database;
pub mod errors;
pub mod repositories;
pub mod services;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;
