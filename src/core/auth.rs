// src/core/auth.rs

//! The credential check behind `/login`.
//!
//! The relay only needs a yes/no answer for a username/password pair, so the
//! check sits behind the [`Authenticator`] trait. The default implementation,
//! [`CredentialStore`], verifies Argon2 hashes taken from the configuration.

use crate::config::UserEntry;
use crate::core::RelayError;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand::rngs::OsRng;
use std::collections::HashMap;

/// An opaque credential predicate.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, username: &str, password: &str) -> bool;
}

/// Username -> Argon2 password hash.
#[derive(Debug, Default, Clone)]
pub struct CredentialStore {
    users: HashMap<String, String>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the store from the `[auth]` section of the configuration.
    pub fn from_users(users: &[UserEntry]) -> Self {
        Self {
            users: users
                .iter()
                .map(|u| (u.username.clone(), u.password_hash.clone()))
                .collect(),
        }
    }

    /// Adds a user with an already hashed password.
    pub fn insert_hashed(&mut self, username: impl Into<String>, password_hash: impl Into<String>) {
        self.users.insert(username.into(), password_hash.into());
    }

    /// Hashes `password` and adds the user.
    pub fn insert(&mut self, username: impl Into<String>, password: &str) -> Result<(), RelayError> {
        let hash = hash_password(password)?;
        self.insert_hashed(username, hash);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl Authenticator for CredentialStore {
    fn authenticate(&self, username: &str, password: &str) -> bool {
        let Some(stored) = self.users.get(username) else {
            return false;
        };
        // A malformed stored hash never authenticates.
        match PasswordHash::new(stored) {
            Ok(parsed_hash) => Argon2::default()
                .verify_password(password.as_bytes(), &parsed_hash)
                .is_ok(),
            Err(_) => false,
        }
    }
}

/// Produces an Argon2 PHC string for `password` with a random salt.
pub fn hash_password(password: &str) -> Result<String, RelayError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|_| RelayError::Internal("Password hashing failed".to_string()))
}
