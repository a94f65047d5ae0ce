//! Authentication and tenant scoping.
//!
//! Credentials are salted SHA-256 hashes; sessions are opaque UUID tokens
//! stored server-side. Two extractors gate the API:
//!
//! - [`AuthUser`] — resolves the bearer token to a user, or 401.
//! - [`Tenant`] — `AuthUser` plus the `X-Inventory-Id` header resolved to a
//!   membership role. Requests without the header, or from non-members of
//!   the named inventory, never reach a handler. Cross-tenant lookups that
//!   get past this (a member probing another inventory's ids) fall out as
//!   404 from the store's tenant-scoped queries, so existence is not leaked.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::api::{ApiError, SharedState};
use crate::models::{Role, User};

/// The header carrying the active inventory (tenant) id.
pub const INVENTORY_HEADER: &str = "x-inventory-id";

pub fn new_salt() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn new_token() -> String {
    Uuid::new_v4().to_string()
}

pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn verify_password(password: &str, salt: &str, expected_hash: &str) -> bool {
    hash_password(password, salt) == expected_hash
}

/// An authenticated caller.
pub struct AuthUser(pub User);

impl FromRequestParts<SharedState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".into()))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::Unauthorized("Malformed Authorization header".into()))?
            .to_string();

        let user = state
            .db
            .call(move |db| db.user_for_token(&token))
            .await?
            .ok_or_else(|| ApiError::Unauthorized("Invalid or expired token".into()))?;
        Ok(AuthUser(user))
    }
}

/// An authenticated caller scoped to one inventory, with their role in it.
pub struct Tenant {
    pub user: User,
    pub inventory_id: i64,
    pub role: Role,
}

impl Tenant {
    /// Admin-only operations (item create/delete, member management).
    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(ApiError::Forbidden(
                "This operation requires the admin role".into(),
            ))
        }
    }
}

impl FromRequestParts<SharedState> for Tenant {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser(user) = AuthUser::from_request_parts(parts, state).await?;

        let inventory_id: i64 = parts
            .headers
            .get(INVENTORY_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("Missing X-Inventory-Id header".into()))?
            .parse()
            .map_err(|_| ApiError::Unauthorized("Malformed X-Inventory-Id header".into()))?;

        let user_id = user.id;
        let role = state
            .db
            .call(move |db| db.membership_role(inventory_id, user_id))
            .await?
            .ok_or_else(|| ApiError::Forbidden("Not a member of this inventory".into()))?;

        Ok(Tenant {
            user,
            inventory_id,
            role,
        })
    }
}
