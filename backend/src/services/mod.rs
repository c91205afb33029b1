//! Module for core business logic services.
//!
//! The building blocks of the auth core (hashing, lockout, tokens, session
//! verification, authorization) and the [`auth_service::AuthService`] that
//! orchestrates them.

pub mod auth_service;
pub mod authorization;
pub mod lockout;
pub mod mailer;
pub mod one_time_token;
pub mod password;
pub mod revocation;
pub mod session;
pub mod token;
pub mod validation;

pub use auth_service::{AuthService, ClientContext, LoginOutcome};
pub use authorization::RoleSet;
