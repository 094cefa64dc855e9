//! Password hashing and bearer-token authentication.
//!
//! Handlers never inspect the Authorization header themselves; they take a
//! [`Principal`], [`AdminPrincipal`] or [`StudentPrincipal`] argument and the
//! extractor rejects the request before the handler body runs.

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, SaltString};
use argon2::{Argon2, PasswordVerifier};
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts, StatusCode};
use axum::response::Json;
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use model::entities::user;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::schemas::{AppState, ErrorResponse};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Password hashing failed: {0}")]
    Hash(String),
    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

/// Hash a password with argon2id and a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AuthError::Hash(e.to_string()))?;
    Ok(hash.to_string())
}

/// Check a password against a stored argon2 hash. A malformed stored hash
/// counts as a mismatch.
pub fn verify_password(stored_hash: &str, password: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!("Stored password hash is malformed: {}", e);
            false
        }
    }
}

/// JWT claims carried by every bearer token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: i32,
    pub username: String,
    pub admin: bool,
    /// Expiry as a unix timestamp.
    pub exp: i64,
}

/// Issue a signed bearer token for a user.
pub fn issue_token(user: &user::Model, secret: &str, ttl_secs: i64) -> Result<String, AuthError> {
    let claims = Claims {
        sub: user.id,
        username: user.username.clone(),
        admin: user.is_admin,
        exp: Utc::now().timestamp() + ttl_secs,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}

fn decode_token(token: &str, secret: &str) -> Result<Claims, AuthError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

fn unauthorized(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: message.to_string(),
            code: "UNAUTHORIZED".to_string(),
            success: false,
        }),
    )
}

fn forbidden(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::FORBIDDEN,
        Json(ErrorResponse {
            error: message.to_string(),
            code: "FORBIDDEN".to_string(),
            success: false,
        }),
    )
}

/// An authenticated caller, extracted from the `Authorization: Bearer` header.
#[derive(Debug, Clone)]
pub struct Principal {
    pub id: i32,
    pub username: String,
    pub is_admin: bool,
}

#[async_trait]
impl FromRequestParts<AppState> for Principal {
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header_value = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| unauthorized("Missing Authorization header"))?;

        let token = header_value
            .strip_prefix("Bearer ")
            .ok_or_else(|| unauthorized("Authorization header is not a bearer token"))?;

        let claims = decode_token(token, &state.config.jwt_secret).map_err(|e| {
            warn!("Rejected bearer token: {}", e);
            unauthorized("Invalid or expired token")
        })?;

        Ok(Principal {
            id: claims.sub,
            username: claims.username,
            is_admin: claims.admin,
        })
    }
}

/// A [`Principal`] that is guaranteed to be an administrator.
#[derive(Debug, Clone)]
pub struct AdminPrincipal(pub Principal);

#[async_trait]
impl FromRequestParts<AppState> for AdminPrincipal {
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let principal = Principal::from_request_parts(parts, state).await?;
        if !principal.is_admin {
            return Err(forbidden("Administrator access required"));
        }
        Ok(AdminPrincipal(principal))
    }
}

/// A [`Principal`] that is guaranteed to be a student. Administrators do not
/// enroll, carry carts or pay for courses.
#[derive(Debug, Clone)]
pub struct StudentPrincipal(pub Principal);

#[async_trait]
impl FromRequestParts<AppState> for StudentPrincipal {
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let principal = Principal::from_request_parts(parts, state).await?;
        if principal.is_admin {
            return Err(forbidden("This operation is for student accounts"));
        }
        Ok(StudentPrincipal(principal))
    }
}
