/*
* Copyright (C) 2025 Pedro Henrique / phkaiser13
*
* File: src/auth.rs
*
* This file implements bearer-token authorization for the management API.
* Tokens are HS256 JWTs signed with a shared secret; the `roles` claim
* decides what the caller may do. Verification is transport-agnostic (it
* takes the raw Authorization header value), so the rules are testable
* without spinning up the HTTP server.
*
* Architecture:
* - Reads need the "viewer" or "operator" role; mutations need "operator".
* - A missing, malformed, or expired token is an authorization failure, not
*   a server error: callers get 401 and the request never reaches a client.
* - When no secret is configured the verifier allows everything. That mode
*   exists for local development and is announced loudly at startup.
*
* SPDX-License-Identifier: Apache-2.0
*/

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Role allowed to create, update, and delete canaries (implies read).
pub const ROLE_OPERATOR: &str = "operator";
/// Role allowed to read canary state.
pub const ROLE_VIEWER: &str = "viewer";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    pub exp: usize,
}

/// Verifies bearer tokens for the management API.
#[derive(Clone)]
pub struct AuthVerifier {
    secret: Option<String>,
}

impl AuthVerifier {
    pub fn new(secret: Option<String>) -> Self {
        Self { secret }
    }

    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }

    /// Checks the Authorization header against the required roles. Any one
    /// of `required_roles` grants access.
    pub fn authorize(&self, header: Option<&str>, required_roles: &[&str]) -> Result<()> {
        let Some(secret) = self.secret.as_deref() else {
            return Ok(());
        };

        let header = header.ok_or_else(|| Error::Unauthorized("missing bearer token".into()))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| Error::Unauthorized("authorization header is not a bearer token".into()))?;

        let claims = self.decode_hs256(token, secret)?;
        if claims
            .roles
            .iter()
            .any(|role| required_roles.contains(&role.as_str()))
        {
            Ok(())
        } else {
            Err(Error::Unauthorized(format!(
                "token lacks a required role (needs one of: {})",
                required_roles.join(", ")
            )))
        }
    }

    fn decode_hs256(&self, token: &str, secret: &str) -> Result<Claims> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
            .map(|data| data.claims)
            .map_err(|_| Error::Unauthorized("invalid or expired token".into()))
    }
}

// --- Tests ---
