//! Account registration and password checks.
//!
//! Passwords are hashed with Argon2 (PHC string format, random salt per
//! account).  Hashing and verification run on the blocking pool.
//!
//! A login for an unknown email still verifies the password, against a
//! throwaway hash, so both failure paths cost the same.

use std::sync::Arc;

use argon2::password_hash::{Encoding, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::Utc;
use rand::rngs::OsRng;
use thiserror::Error;
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::metadata::store::{MetadataStore, StoreError, UserRecord};

#[derive(Debug, Error)]
pub enum CredentialError {
    /// The email or username is already registered.
    #[error("a user with this {field} already exists")]
    DuplicateIdentity { field: &'static str },

    /// Unknown email or wrong password.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error(transparent)]
    StoreUnavailable(anyhow::Error),

    #[error("hashing failed: {0}")]
    HashFailure(String),
}

impl From<StoreError> for CredentialError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { field, .. } => CredentialError::DuplicateIdentity { field },
            StoreError::Missing { entity, id } => {
                CredentialError::StoreUnavailable(anyhow::anyhow!("{entity} {id} vanished"))
            }
            StoreError::Internal(e) => CredentialError::StoreUnavailable(e),
        }
    }
}

/// Registration input, already validated for shape.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Emails compare case-insensitively and without surrounding whitespace.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub struct CredentialStore {
    metadata: Arc<dyn MetadataStore>,
    /// Hash checked when no account matches the email.
    dummy_hash: OnceCell<String>,
}

impl CredentialStore {
    pub fn new(metadata: Arc<dyn MetadataStore>) -> Self {
        Self {
            metadata,
            dummy_hash: OnceCell::new(),
        }
    }

    /// Create an account and return its id.
    pub async fn register(&self, account: NewAccount) -> Result<Uuid, CredentialError> {
        let username = account.username.trim().to_string();
        let email = normalize_email(&account.email);

        if self.metadata.get_user_by_email(&email).await?.is_some() {
            return Err(CredentialError::DuplicateIdentity { field: "email" });
        }
        if self.metadata.get_user_by_username(&username).await?.is_some() {
            return Err(CredentialError::DuplicateIdentity { field: "username" });
        }

        let password_hash = hash_password(account.password).await?;
        let now = Utc::now();
        let record = UserRecord {
            id: Uuid::new_v4(),
            username,
            email,
            password_hash,
            created_at: now,
            updated_at: now,
        };
        let id = record.id;
        // A concurrent registration can still win the race; the store's
        // uniqueness check reports it as a conflict.
        self.metadata.create_user(record).await?;
        tracing::info!(user_id = %id, "Account registered");
        Ok(id)
    }

    /// Check an email/password pair and return the account id.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<Uuid, CredentialError> {
        let email = normalize_email(email);
        let Some(user) = self.metadata.get_user_by_email(&email).await? else {
            let dummy = self
                .dummy_hash
                .get_or_try_init(|| hash_password(Uuid::new_v4().to_string()))
                .await?;
            verify_password(password.to_string(), dummy.clone()).await?;
            return Err(CredentialError::InvalidCredentials);
        };

        if !verify_password(password.to_string(), user.password_hash).await? {
            return Err(CredentialError::InvalidCredentials);
        }
        Ok(user.id)
    }
}

async fn hash_password(password: String) -> Result<String, CredentialError> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| CredentialError::HashFailure(e.to_string()))
    })
    .await
    .map_err(|e| CredentialError::HashFailure(e.to_string()))?
}

async fn verify_password(password: String, stored: String) -> Result<bool, CredentialError> {
    tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::parse(&stored, Encoding::default())
            .map_err(|e| CredentialError::HashFailure(e.to_string()))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    })
    .await
    .map_err(|e| CredentialError::HashFailure(e.to_string()))?
}
