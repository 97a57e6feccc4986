//! Identity store: persistence of local identities and their roles.
//!
//! [`PgIdentityStore`] keeps identities in the `users` and `user_roles`
//! tables. Profile synchronization is a single upsert keyed by the unique
//! `identity_id`, so concurrent first sightings of the same identity
//! converge on one row.

use crate::errors::ApiError;
use crate::models::{IdentityStatus, LocalIdentity, ProfileUpdate, RoleName};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Result of a profile upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// No record existed; one was created with the default role.
    Created(LocalIdentity),

    /// An existing record was updated.
    Updated(LocalIdentity),
}

#[cfg(test)]
impl UpsertOutcome {
    pub(crate) fn is_created(&self) -> bool {
        matches!(self, UpsertOutcome::Created(_))
    }

    pub(crate) fn into_identity(self) -> LocalIdentity {
        match self {
            UpsertOutcome::Created(identity) | UpsertOutcome::Updated(identity) => identity,
        }
    }
}

/// Storage seam for local identities.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_by_identity_id(&self, identity_id: &str)
        -> Result<Option<LocalIdentity>, ApiError>;

    /// Create the identity with `default_role` and status `ACTIVE`, or merge
    /// the non-`None` profile fields into the existing record.
    async fn upsert_profile(
        &self,
        identity_id: &str,
        profile: &ProfileUpdate,
        default_role: RoleName,
    ) -> Result<UpsertOutcome, ApiError>;

    /// Add `role` to the identity's role set. `Ok(None)` if the identity
    /// does not exist.
    async fn add_role(
        &self,
        identity_id: &str,
        role: RoleName,
    ) -> Result<Option<LocalIdentity>, ApiError>;
}

/// Row of the `users` table.
#[derive(Debug, Clone, sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    identity_id: String,
    email: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Row returned by the profile upsert.
#[derive(Debug, Clone, sqlx::FromRow)]
struct UpsertRow {
    #[sqlx(flatten)]
    user: UserRow,
    inserted: bool,
}

impl UserRow {
    fn into_identity(self, roles: BTreeSet<RoleName>) -> Result<LocalIdentity, ApiError> {
        let status = self.status.parse::<IdentityStatus>().map_err(|e| {
            ApiError::Database(format!("Unexpected identity status in users table: {}", e))
        })?;

        Ok(LocalIdentity {
            id: self.id,
            identity_id: self.identity_id,
            email: self.email,
            first_name: self.first_name,
            last_name: self.last_name,
            roles,
            status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// PostgreSQL-backed identity store.
#[derive(Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_roles(
        tx: &mut Transaction<'_, Postgres>,
        user_id: Uuid,
    ) -> Result<BTreeSet<RoleName>, ApiError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT role
            FROM user_roles
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| ApiError::Database(format!("Failed to fetch user roles: {}", e)))?;

        let roles = rows
            .into_iter()
            .filter_map(|(role,)| match role.parse::<RoleName>() {
                Ok(role) => Some(role),
                Err(e) => {
                    tracing::warn!(target: "nil.repositories.users", error = %e, "Ignoring unrecognized stored role");
                    None
                }
            })
            .collect();

        Ok(roles)
    }

    async fn find_row(
        tx: &mut Transaction<'_, Postgres>,
        identity_id: &str,
    ) -> Result<Option<UserRow>, ApiError> {
        sqlx::query_as::<_, UserRow>(
            r#"
            SELECT
                id, identity_id, email, first_name, last_name,
                status, created_at, updated_at
            FROM users
            WHERE identity_id = $1
            "#,
        )
        .bind(identity_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| ApiError::Database(format!("Failed to fetch identity: {}", e)))
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, ApiError> {
        self.pool
            .begin()
            .await
            .map_err(|e| ApiError::Database(format!("Failed to begin transaction: {}", e)))
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn find_by_identity_id(
        &self,
        identity_id: &str,
    ) -> Result<Option<LocalIdentity>, ApiError> {
        let mut tx = self.begin().await?;

        let identity = match Self::find_row(&mut tx, identity_id).await? {
            Some(row) => {
                let roles = Self::load_roles(&mut tx, row.id).await?;
                Some(row.into_identity(roles)?)
            }
            None => None,
        };

        tx.commit()
            .await
            .map_err(|e| ApiError::Database(format!("Failed to commit transaction: {}", e)))?;

        Ok(identity)
    }

    async fn upsert_profile(
        &self,
        identity_id: &str,
        profile: &ProfileUpdate,
        default_role: RoleName,
    ) -> Result<UpsertOutcome, ApiError> {
        let mut tx = self.begin().await?;

        // xmax is zero only for a freshly inserted tuple
        let upserted = sqlx::query_as::<_, UpsertRow>(
            r#"
            INSERT INTO users (identity_id, email, first_name, last_name, status)
            VALUES ($1, $2, $3, $4, 'ACTIVE')
            ON CONFLICT (identity_id) DO UPDATE SET
                email = COALESCE(EXCLUDED.email, users.email),
                first_name = COALESCE(EXCLUDED.first_name, users.first_name),
                last_name = COALESCE(EXCLUDED.last_name, users.last_name),
                updated_at = NOW()
            RETURNING
                id, identity_id, email, first_name, last_name,
                status, created_at, updated_at,
                (xmax = 0) AS inserted
            "#,
        )
        .bind(identity_id)
        .bind(profile.email.as_deref())
        .bind(profile.first_name.as_deref())
        .bind(profile.last_name.as_deref())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| ApiError::Database(format!("Failed to upsert identity: {}", e)))?;

        if upserted.inserted {
            sqlx::query(
                r#"
                INSERT INTO user_roles (user_id, role)
                VALUES ($1, $2)
                ON CONFLICT (user_id, role) DO NOTHING
                "#,
            )
            .bind(upserted.user.id)
            .bind(default_role.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| ApiError::Database(format!("Failed to assign default role: {}", e)))?;
        }

        let roles = Self::load_roles(&mut tx, upserted.user.id).await?;
        let identity = upserted.user.into_identity(roles)?;

        tx.commit()
            .await
            .map_err(|e| ApiError::Database(format!("Failed to commit transaction: {}", e)))?;

        if upserted.inserted {
            Ok(UpsertOutcome::Created(identity))
        } else {
            Ok(UpsertOutcome::Updated(identity))
        }
    }

    async fn add_role(
        &self,
        identity_id: &str,
        role: RoleName,
    ) -> Result<Option<LocalIdentity>, ApiError> {
        let mut tx = self.begin().await?;

        let Some(row) = Self::find_row(&mut tx, identity_id).await? else {
            return Ok(None);
        };

        sqlx::query(
            r#"
            INSERT INTO user_roles (user_id, role)
            VALUES ($1, $2)
            ON CONFLICT (user_id, role) DO NOTHING
            "#,
        )
        .bind(row.id)
        .bind(role.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| ApiError::Database(format!("Failed to add role: {}", e)))?;

        sqlx::query(
            r#"
            UPDATE users
            SET updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(row.id)
        .execute(&mut *tx)
        .await
        .map_err(|e| ApiError::Database(format!("Failed to touch identity: {}", e)))?;

        let roles = Self::load_roles(&mut tx, row.id).await?;
        let identity = row.into_identity(roles)?;

        tx.commit()
            .await
            .map_err(|e| ApiError::Database(format!("Failed to commit transaction: {}", e)))?;

        Ok(Some(identity))
    }
}
