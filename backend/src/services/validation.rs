//! Typed input constructors for registration.
//!
//! Each wrapper can only be built through its `parse` function, so code
//! further in never re-validates.

use crate::database::models::{ConsentFlags, Role};
use crate::errors::{AuthError, AuthResult};
use crate::services::password::StrongPassword;
use std::fmt;
use validator::ValidateEmail;

pub const EMAIL_MAX_LEN: usize = 100;
pub const NAME_MIN_LEN: usize = 2;
pub const NAME_MAX_LEN: usize = 50;

/// A trimmed, lowercased email address of the form `local@domain.tld`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EmailAddress(String);

impl EmailAddress {
    pub fn parse(raw: &str) -> AuthResult<Self> {
        let email = raw.trim().to_lowercase();
        if email.is_empty() {
            return Err(AuthError::validation("Email is required"));
        }
        if email.chars().count() > EMAIL_MAX_LEN {
            return Err(AuthError::validation("Email cannot exceed 100 characters"));
        }

        let has_tld = email
            .rsplit_once('@')
            .and_then(|(_, domain)| domain.rsplit_once('.'))
            .is_some_and(|(host, tld)| !host.is_empty() && tld.len() >= 2);
        if !has_tld || !email.validate_email() {
            return Err(AuthError::validation("Please provide a valid email"));
        }
        Ok(Self(email))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 2 to 50 characters, letters and spaces only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayName(String);

impl DisplayName {
    pub fn parse(raw: &str) -> AuthResult<Self> {
        let name = raw.trim();
        let len = name.chars().count();
        if len < NAME_MIN_LEN || len > NAME_MAX_LEN {
            return Err(AuthError::validation(
                "Name must be between 2 and 50 characters",
            ));
        }
        if !name.chars().all(|c| c.is_alphabetic() || c == ' ') {
            return Err(AuthError::validation(
                "Name can only contain letters and spaces",
            ));
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Parses a self-registration role. Missing means `user`; `admin` is never
/// self-assignable.
pub fn parse_registration_role(raw: Option<&str>) -> AuthResult<Role> {
    let role = match raw.map(str::trim).filter(|r| !r.is_empty()) {
        None => Role::User,
        Some(raw) => raw
            .parse::<Role>()
            .map_err(|_| AuthError::validation("Role must be either user or vendor"))?,
    };
    match role {
        Role::User | Role::Vendor => Ok(role),
        Role::Admin => Err(AuthError::validation("Role must be either user or vendor")),
    }
}

pub fn check_consent(consent: &ConsentFlags) -> AuthResult<()> {
    if !consent.terms_accepted {
        return Err(AuthError::validation(
            "You must accept the terms and conditions",
        ));
    }
    if !consent.privacy_policy_accepted {
        return Err(AuthError::validation("You must accept the privacy policy"));
    }
    Ok(())
}

/// Fully validated registration input.
#[derive(Debug, Clone)]
pub struct NewRegistration {
    pub name: DisplayName,
    pub email: EmailAddress,
    pub password: StrongPassword,
    pub role: Role,
    pub consent: ConsentFlags,
}

impl NewRegistration {
    /// Validates every field, reporting the first failure.
    pub fn parse(
        name: &str,
        email: &str,
        password: &str,
        role: Option<&str>,
        consent: ConsentFlags,
    ) -> AuthResult<Self> {
        Ok(Self {
            name: DisplayName::parse(name)?,
            email: EmailAddress::parse(email)?,
            password: StrongPassword::parse(password)?,
            role: parse_registration_role(role)?,
            consent: {
                check_consent(&consent)?;
                consent
            },
        })
    }
}
