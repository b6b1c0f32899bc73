//! # alifa-auth-simple
//!
//! Argon2-based implementation of `IdentityProvider`.
//! Accounts live in memory; one session per process feeds `current_actor()`.

use alifa_core::{Actor, FieldError, IdentityProvider};
use alifa_guard::{validate, SchemaName};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::json;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The credentials form failed validation. Carries every violation.
    #[error("{}", first_message(.0))]
    Invalid(Vec<FieldError>),

    #[error("Un compte existe déjà avec cet email")]
    EmailTaken,

    #[error("Email ou mot de passe incorrect")]
    InvalidCredentials,

    #[error("Une erreur est survenue, veuillez réessayer")]
    Hashing,
}

fn first_message(errors: &[FieldError]) -> &str {
    errors.first().map(|e| e.message.as_str()).unwrap_or("Données invalides")
}

struct Account {
    actor: Actor,
    password_hash: String,
}

#[derive(Default)]
pub struct LocalAuthProvider {
    /// Keyed by lowercased email.
    accounts: DashMap<String, Account>,
    session: RwLock<Option<Actor>>,
}

impl LocalAuthProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an account and signs it in.
    pub fn sign_up(&self, email: &str, password: &str, display_name: &str) -> Result<Actor, AuthError> {
        let email = email.trim();
        validate(
            SchemaName::Signup,
            &json!({ "email": email, "password": password, "display_name": display_name.trim() }),
        )
        .map_err(AuthError::Invalid)?;

        let key = email.to_lowercase();
        if self.accounts.contains_key(&key) {
            return Err(AuthError::EmailTaken);
        }
        let password_hash = hash_password(password)?;

        let actor = match self.accounts.entry(key) {
            Entry::Occupied(_) => return Err(AuthError::EmailTaken),
            Entry::Vacant(slot) => {
                let actor = Actor {
                    id: uuid::Uuid::new_v4().to_string(),
                    email: email.to_string(),
                };
                slot.insert(Account {
                    actor: actor.clone(),
                    password_hash,
                });
                actor
            }
        };

        tracing::info!(user_id = %actor.id, "account created");
        self.start_session(actor.clone());
        Ok(actor)
    }

    pub fn sign_in(&self, email: &str, password: &str) -> Result<Actor, AuthError> {
        let email = email.trim();
        validate(SchemaName::Login, &json!({ "email": email, "password": password })).map_err(AuthError::Invalid)?;

        let actor = {
            let account = self
                .accounts
                .get(&email.to_lowercase())
                .ok_or(AuthError::InvalidCredentials)?;
            if !verify_password(password, &account.password_hash) {
                tracing::warn!(user_id = %account.actor.id, "wrong password");
                return Err(AuthError::InvalidCredentials);
            }
            account.actor.clone()
        };

        self.start_session(actor.clone());
        Ok(actor)
    }

    pub fn sign_out(&self) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn start_session(&self, actor: Actor) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = Some(actor);
    }
}

impl IdentityProvider for LocalAuthProvider {
    fn current_actor(&self) -> Option<Actor> {
        self.session.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

fn hash_password(password: &str) -> Result<String, AuthError> {
    let mut salt_bytes = [0u8; 16];
    getrandom::getrandom(&mut salt_bytes).map_err(|_| AuthError::Hashing)?;
    let salt = SaltString::encode_b64(&salt_bytes).map_err(|_| AuthError::Hashing)?;

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::Hashing)
}

/// Verifies a password against a stored Argon2 hash.
fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(p) => p,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}
