//! Argon2id password hashing.

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{
        PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString, rand_core::OsRng,
    },
};
use thiserror::Error;
use tokio::task;

use crate::config::SecurityConfig;

#[derive(Debug, Error)]
pub enum HashError {
    #[error("Invalid Argon2 params: {0}")]
    Params(String),

    #[error("Failed to hash password: {0}")]
    Hash(String),

    #[error("Password hashing task panicked: {0}")]
    Task(String),
}

/// Produces self-contained PHC strings (`$argon2id$v=19$...`) with a fresh
/// random salt per call. Verification reads the parameters back from the hash,
/// so changing the configured cost does not invalidate existing hashes.
#[derive(Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl PasswordHasher {
    pub fn new(config: &SecurityConfig) -> Result<Self, HashError> {
        let params = Params::new(
            config.argon2_memory_cost_kib,
            config.argon2_time_cost,
            config.argon2_parallelism,
            None,
        )
        .map_err(|e| HashError::Params(e.to_string()))?;

        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    pub fn hash(&self, plaintext: &str) -> Result<String, HashError> {
        let salt = SaltString::generate(&mut OsRng);

        self.argon2()
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| HashError::Hash(e.to_string()))
    }

    /// Returns `false` for a wrong password and for anything that is not a
    /// parseable hash.
    #[must_use]
    pub fn verify(&self, plaintext: &str, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };

        self.argon2()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    }

    /// Hashes on the blocking pool; Argon2 is CPU- and memory-heavy.
    pub async fn hash_blocking(&self, plaintext: &str) -> Result<String, HashError> {
        let hasher = self.clone();
        let plaintext = plaintext.to_string();

        task::spawn_blocking(move || hasher.hash(&plaintext))
            .await
            .map_err(|e| HashError::Task(e.to_string()))?
    }

    pub async fn verify_blocking(&self, plaintext: &str, hash: &str) -> bool {
        let hasher = self.clone();
        let plaintext = plaintext.to_string();
        let hash = hash.to_string();

        task::spawn_blocking(move || hasher.verify(&plaintext, &hash))
            .await
            .unwrap_or(false)
    }
}
