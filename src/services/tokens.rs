//! Opaque secret generation and at-rest digests.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};

use crate::error::AppError;

const TOKEN_BYTES: usize = 32;

/// Generate a URL-safe random secret (session token or exchange code).
pub fn generate_secret() -> Result<String, AppError> {
    let mut bytes = [0u8; TOKEN_BYTES];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("System RNG unavailable")))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// SHA-256 digest used as the storage key of a secret.
///
/// A single pass is enough: the input already carries 256 bits of entropy.
pub fn digest(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}
