//! Digital-ID verification seam.
//!
//! Issuing and validating tourist IDs happens elsewhere; the engine only asks
//! a yes/no question of an [`IdentityVerifier`] and keeps a fingerprint.

use sha2::{Digest, Sha256};

/// External oracle deciding whether a digital-ID token is valid.
pub trait IdentityVerifier: Send + Sync {
  fn verify(&self, token: &str) -> bool;
}

impl<F> IdentityVerifier for F
where
  F: Fn(&str) -> bool + Send + Sync,
{
  fn verify(&self, token: &str) -> bool { self(token) }
}

/// Accepts any token made of ASCII alphanumerics, `-` and `_` that is at
/// least `min_len` characters long. Used when no external oracle is wired.
#[derive(Debug, Clone)]
pub struct FormatVerifier {
  pub min_len: usize,
}

impl Default for FormatVerifier {
  fn default() -> Self { Self { min_len: 8 } }
}

impl IdentityVerifier for FormatVerifier {
  fn verify(&self, token: &str) -> bool {
    token.len() >= self.min_len
      && token
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
  }
}

/// SHA-256 hex digest of a token; the only form in which IDs are retained.
pub fn fingerprint(token: &str) -> String { hex::encode(Sha256::digest(token.as_bytes())) }
