//! NIL API models.
//!
//! Local identity records, role and status enumerations, and the request
//! and response bodies of the HTTP surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Prefix turning a role name into an authority string.
pub const ROLE_AUTHORITY_PREFIX: &str = "ROLE_";

/// Role held by a local identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleName {
    Athlete,
    Brand,
    Admin,
}

impl RoleName {
    /// All recognized roles, in declaration order.
    pub const ALL: [RoleName; 3] = [RoleName::Athlete, RoleName::Brand, RoleName::Admin];

    /// Returns the stored representation of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleName::Athlete => "ATHLETE",
            RoleName::Brand => "BRAND",
            RoleName::Admin => "ADMIN",
        }
    }

    /// Authority string granted for this role (e.g. `ROLE_ADMIN`).
    pub fn authority(&self) -> String {
        format!("{ROLE_AUTHORITY_PREFIX}{}", self.as_str())
    }
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a known role or status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown value: {0}")]
pub struct UnknownVariant(pub String);

impl FromStr for RoleName {
    type Err = UnknownVariant;

    /// Case-insensitive; surrounding whitespace is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        RoleName::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| UnknownVariant(trimmed.to_string()))
    }
}

/// Lifecycle status of a local identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdentityStatus {
    Active,
    Suspended,
    Deleted,
}

impl IdentityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityStatus::Active => "ACTIVE",
            IdentityStatus::Suspended => "SUSPENDED",
            IdentityStatus::Deleted => "DELETED",
        }
    }
}

impl FromStr for IdentityStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(IdentityStatus::Active),
            "SUSPENDED" => Ok(IdentityStatus::Suspended),
            "DELETED" => Ok(IdentityStatus::Deleted),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// Local record of an identity issued by the external provider.
///
/// Keyed by `identity_id` (the token's `sub`), which is unique.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct LocalIdentity {
    /// Internal surrogate key.
    pub id: Uuid,

    /// External identity id from the provider.
    pub identity_id: String,

    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,

    /// Locally assigned roles (set semantics).
    pub roles: BTreeSet<RoleName>,

    pub status: IdentityStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LocalIdentity {
    /// Display name built from whichever name parts are present.
    pub fn full_name(&self) -> Option<String> {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }

    pub fn has_role(&self, role: RoleName) -> bool {
        self.roles.contains(&role)
    }
}

/// Email is redacted in Debug output.
impl fmt::Debug for LocalIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalIdentity")
            .field("id", &self.id)
            .field("identity_id", &self.identity_id)
            .field("email", &self.email.as_ref().map(|_| "[REDACTED]"))
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .field("roles", &self.roles)
            .field("status", &self.status)
            .field("created_at", &self.created_at)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Profile fields copied from verified claims into the local identity.
///
/// `None` means "leave the stored value unchanged".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Health check response.
///
/// Returned by the `/api/v1/health` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// "UP" or "DOWN".
    pub status: String,

    /// "healthy", "unhealthy" or "not_configured" (in-memory store).
    pub database: String,
}

/// Identity representation returned by the HTTP surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityResponse {
    pub id: Uuid,
    pub identity_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    pub roles: Vec<RoleName>,
    pub status: IdentityStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<LocalIdentity> for IdentityResponse {
    fn from(identity: LocalIdentity) -> Self {
        let full_name = identity.full_name();
        Self {
            id: identity.id,
            identity_id: identity.identity_id,
            email: identity.email,
            full_name,
            roles: identity.roles.into_iter().collect(),
            status: identity.status,
            created_at: identity.created_at,
            updated_at: identity.updated_at,
        }
    }
}

/// Response body of `GET /api/v1/users/me`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeResponse {
    pub identity_id: String,
    pub authorities: Vec<String>,
    pub identity: IdentityResponse,
}

/// Request body of `POST /api/v1/admin/users/{identity_id}/roles`.
#[derive(Debug, Clone, Deserialize)]
pub struct AssignRoleRequest {
    pub role: String,
}
