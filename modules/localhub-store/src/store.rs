// Postgres persistence for accounts, profiles, and linked social identities.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{Result, StoreError};

/// A row from the accounts table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Account {
    pub id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// A row from the profiles table. Zero-or-one per account, created lazily.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Profile {
    pub id: Uuid,
    pub account_id: Uuid,
    pub screen_name: String,
    pub avatar_url: Option<String>,
}

#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run the embedded SQL migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.into()))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Accounts
    // -----------------------------------------------------------------------

    pub async fn account_by_username(&self, username: &str) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, Account>(
            "SELECT id, username, created_at FROM accounts WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Look up an account by username, failing with `AccountNotFound` if absent.
    pub async fn require_account(&self, username: &str) -> Result<Account> {
        self.account_by_username(username)
            .await?
            .ok_or_else(|| StoreError::AccountNotFound(username.to_string()))
    }

    pub async fn create_account(&self, username: &str) -> Result<Account> {
        let row = sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (username)
            VALUES ($1)
            RETURNING id, username, created_at
            "#,
        )
        .bind(username)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    /// Fetch the account for a username, creating it if it does not exist.
    pub async fn get_or_create_account(&self, username: &str) -> Result<Account> {
        if let Some(account) = self.account_by_username(username).await? {
            return Ok(account);
        }
        self.create_account(username).await
    }

    /// Delete an account. Profiles, changesets, and the changesets'
    /// locality and archive rows all cascade.
    pub async fn delete_account(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Profiles
    // -----------------------------------------------------------------------

    pub async fn profile_for_account(&self, account_id: Uuid) -> Result<Option<Profile>> {
        let row = sqlx::query_as::<_, Profile>(
            "SELECT id, account_id, screen_name, avatar_url FROM profiles WHERE account_id = $1",
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Fetch the profile for an account, creating one if absent. The screen
    /// name defaults to the account's username on first creation.
    pub async fn get_or_create_profile(&self, account: &Account) -> Result<Profile> {
        if let Some(profile) = self.profile_for_account(account.id).await? {
            return Ok(profile);
        }

        let row = sqlx::query_as::<_, Profile>(
            r#"
            INSERT INTO profiles (account_id, screen_name)
            VALUES ($1, $2)
            ON CONFLICT (account_id) DO UPDATE SET account_id = EXCLUDED.account_id
            RETURNING id, account_id, screen_name, avatar_url
            "#,
        )
        .bind(account.id)
        .bind(&account.username)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    pub async fn set_avatar(&self, profile_id: Uuid, avatar_url: &str) -> Result<()> {
        sqlx::query("UPDATE profiles SET avatar_url = $2 WHERE id = $1")
            .bind(profile_id)
            .bind(avatar_url)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Social identities
    // -----------------------------------------------------------------------

    /// Record a (provider, provider_uid) pair for an account. Idempotent; a
    /// re-login with the same identity re-points it at the given account.
    pub async fn link_identity(
        &self,
        account_id: Uuid,
        provider: &str,
        provider_uid: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO social_identities (account_id, provider, provider_uid)
            VALUES ($1, $2, $3)
            ON CONFLICT (provider, provider_uid)
            DO UPDATE SET account_id = EXCLUDED.account_id
            "#,
        )
        .bind(account_id)
        .bind(provider)
        .bind(provider_uid)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Provider names linked to an account, for the authenticated profile page.
    pub async fn linked_providers(&self, account_id: Uuid) -> Result<Vec<String>> {
        let rows = sqlx::query_scalar::<_, String>(
            r#"
            SELECT provider FROM social_identities
            WHERE account_id = $1
            ORDER BY provider
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
