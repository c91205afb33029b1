//! Shared pieces of the HTTP API: the response envelope and the mapping
//! from auth errors to status codes.

pub mod common;
