//! Operator HTTP Basic auth.
//!
//! Every authority console logs in as an operator bound to one
//! [`Department`]; the department decides what the operator sees.

use std::collections::HashMap;

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, header, request::Parts},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use serde::Deserialize;
use tourshield_core::{authority::Department, store::AlertArchive};
use tracing::debug;

use crate::{ApiState, error::ApiError};

/// One configured operator account.
#[derive(Debug, Clone, Deserialize)]
pub struct OperatorAccount {
  pub username:      String,
  /// PHC string produced by argon2, e.g. `$argon2id$v=19$…`
  pub password_hash: String,
  pub department:    Department,
}

/// Operator accounts keyed by username.
#[derive(Debug, Clone, Default)]
pub struct OperatorDirectory {
  accounts: HashMap<String, OperatorAccount>,
}

impl OperatorDirectory {
  pub fn new(accounts: impl IntoIterator<Item = OperatorAccount>) -> Self {
    Self {
      accounts: accounts.into_iter().map(|a| (a.username.clone(), a)).collect(),
    }
  }

  pub fn len(&self) -> usize { self.accounts.len() }

  pub fn is_empty(&self) -> bool { self.accounts.is_empty() }

  /// Check the `Authorization: Basic` header against the directory.
  pub fn verify(&self, headers: &HeaderMap) -> Result<Operator, ApiError> {
    let header_val = headers
      .get(header::AUTHORIZATION)
      .and_then(|v| v.to_str().ok())
      .ok_or(ApiError::Unauthorized)?;

    let encoded = header_val
      .strip_prefix("Basic ")
      .ok_or(ApiError::Unauthorized)?;

    let decoded = B64.decode(encoded).map_err(|_| ApiError::Unauthorized)?;
    let creds   = std::str::from_utf8(&decoded).map_err(|_| ApiError::Unauthorized)?;

    let (username, password) = creds.split_once(':').ok_or(ApiError::Unauthorized)?;

    let account = self.accounts.get(username).ok_or_else(|| {
      debug!(username, "unknown operator");
      ApiError::Unauthorized
    })?;

    let parsed_hash = PasswordHash::new(&account.password_hash)
      .map_err(|_| ApiError::Unauthorized)?;

    Argon2::default()
      .verify_password(password.as_bytes(), &parsed_hash)
      .map_err(|_| ApiError::Unauthorized)?;

    Ok(Operator {
      username:   account.username.clone(),
      department: account.department,
    })
  }
}

/// An authenticated operator. Present in a handler means the request
/// carried valid credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operator {
  pub username:   String,
  pub department: Department,
}

impl Operator {
  /// Reject unless the operator belongs to one of `allowed`.
  pub fn require(&self, allowed: &[Department]) -> Result<(), ApiError> {
    if allowed.contains(&self.department) {
      Ok(())
    } else {
      Err(ApiError::Forbidden(format!(
        "{} operators may not do this",
        self.department
      )))
    }
  }
}

impl<A> FromRequestParts<ApiState<A>> for Operator
where
  A: AlertArchive + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &ApiState<A>,
  ) -> Result<Self, Self::Rejection> {
    state.operators.verify(&parts.headers)
  }
}
