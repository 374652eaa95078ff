//! SQLite storage layer for Sonae.
//!
//! This is the document-store boundary: teams (with their settings stored as a
//! JSON document), team rosters, linked push identities, inventory items and
//! item history. The recommendation engine only reads through here; the one
//! write it issues is the batched notification watermark in
//! [`Storage::mark_notified`].

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use tracing::warn;

use crate::catalog::Category;
use crate::model::{InventoryItem, MemberRole, Team, TeamStockSettings};

/// History action written when the system archives an item on its own.
pub const ACTION_AUTO_ARCHIVED: &str = "auto_archived";

/// Actor recorded on history rows written by the system.
pub const ACTOR_SYSTEM: &str = "system";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    /// Create a new storage instance and initialize the schema.
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite connection string (e.g., "sqlite:sonae.db" or "sqlite::memory:")
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        let storage = Self { pool };
        storage.initialize_schema().await?;

        Ok(storage)
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn initialize_schema(&self) -> anyhow::Result<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS teams (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                settings TEXT NOT NULL DEFAULT '{}',
                last_notified_at INTEGER
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS team_members (
                team_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                role TEXT NOT NULL,
                PRIMARY KEY (team_id, user_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS push_links (
                user_id TEXT PRIMARY KEY,
                recipient_id TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS items (
                id TEXT PRIMARY KEY,
                team_id TEXT NOT NULL,
                name TEXT NOT NULL,
                category TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                unit TEXT NOT NULL,
                expiry_date TEXT,
                archived INTEGER NOT NULL DEFAULT 0
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_items_team_archived
            ON items(team_id, archived)
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS item_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                team_id TEXT NOT NULL,
                item_id TEXT NOT NULL,
                action TEXT NOT NULL,
                actor TEXT NOT NULL,
                recorded_at INTEGER NOT NULL
            )
            "#,
            r#"
            CREATE INDEX IF NOT EXISTS idx_item_history_team_ts
            ON item_history(team_id, recorded_at)
            "#,
        ];

        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        Ok(())
    }

    /// Insert or replace a team record.
    pub async fn insert_team(&self, team: &Team) -> anyhow::Result<()> {
        let settings = serde_json::to_string(&team.settings)?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO teams (id, name, settings, last_notified_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&team.id)
        .bind(&team.name)
        .bind(settings)
        .bind(team.last_notified_at.map(|ts| ts.timestamp()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Fetch a single team, or `None` if it does not exist.
    pub async fn get_team(&self, team_id: &str) -> anyhow::Result<Option<Team>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, settings, last_notified_at
            FROM teams
            WHERE id = ?
            "#,
        )
        .bind(team_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(team_from_row).transpose()
    }

    /// Every team, ordered by id.
    ///
    /// A team whose record cannot be decoded is logged and left out, so one
    /// bad settings document never hides the other teams.
    pub async fn list_teams(&self) -> anyhow::Result<Vec<Team>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, settings, last_notified_at
            FROM teams
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let teams = rows
            .iter()
            .filter_map(|row| match team_from_row(row) {
                Ok(team) => Some(team),
                Err(e) => {
                    let team_id: String = row.get("id");
                    warn!(team_id = %team_id, error = %e, "Skipping unreadable team record");
                    None
                }
            })
            .collect();

        Ok(teams)
    }

    /// Replace a team's settings document. Returns `false` if the team does not exist.
    pub async fn update_settings(
        &self,
        team_id: &str,
        settings: &TeamStockSettings,
    ) -> anyhow::Result<bool> {
        let result = sqlx::query("UPDATE teams SET settings = ? WHERE id = ?")
            .bind(serde_json::to_string(settings)?)
            .bind(team_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Write the notification watermark for many teams in one transaction.
    pub async fn mark_notified(&self, team_ids: &[String], at: DateTime<Utc>) -> anyhow::Result<()> {
        if team_ids.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for team_id in team_ids {
            sqlx::query("UPDATE teams SET last_notified_at = ? WHERE id = ?")
                .bind(at.timestamp())
                .bind(team_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(())
    }

    /// Add a user to a team's roster.
    pub async fn add_member(
        &self,
        team_id: &str,
        user_id: &str,
        role: MemberRole,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO team_members (team_id, user_id, role)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(team_id)
        .bind(user_id)
        .bind(role.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Link a user to their push-provider recipient id.
    pub async fn link_push_recipient(&self, user_id: &str, recipient_id: &str) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO push_links (user_id, recipient_id)
            VALUES (?, ?)
            "#,
        )
        .bind(user_id)
        .bind(recipient_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Push recipients for every team member that has linked one.
    ///
    /// Members without a link are left out. Duplicates are collapsed.
    pub async fn recipients_for_team(&self, team_id: &str) -> anyhow::Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT p.recipient_id AS recipient_id
            FROM team_members m
            JOIN push_links p ON p.user_id = m.user_id
            WHERE m.team_id = ?
            ORDER BY p.recipient_id
            "#,
        )
        .bind(team_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|r| r.get("recipient_id")).collect())
    }

    /// Insert or replace an inventory item.
    pub async fn insert_item(&self, item: &InventoryItem) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO items
                (id, team_id, name, category, quantity, unit, expiry_date, archived)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&item.id)
        .bind(&item.team_id)
        .bind(&item.name)
        .bind(item.category.key())
        .bind(i64::from(item.quantity))
        .bind(&item.unit)
        .bind(item.expiry_date.map(|d| d.format(DATE_FORMAT).to_string()))
        .bind(item.archived)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// All non-archived items of a team.
    pub async fn list_active_items(&self, team_id: &str) -> anyhow::Result<Vec<InventoryItem>> {
        let rows = sqlx::query(
            r#"
            SELECT id, team_id, name, category, quantity, unit, expiry_date, archived
            FROM items
            WHERE team_id = ? AND archived = 0
            ORDER BY id
            "#,
        )
        .bind(team_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(item_from_row).collect()
    }

    /// Append a history record for an item.
    pub async fn record_history(
        &self,
        team_id: &str,
        item_id: &str,
        action: &str,
        actor: &str,
        at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO item_history (team_id, item_id, action, actor, recorded_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(team_id)
        .bind(item_id)
        .bind(action)
        .bind(actor)
        .bind(at.timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Number of items the system auto-archived for a team since `since`.
    pub async fn count_auto_archived_since(
        &self,
        team_id: &str,
        since: DateTime<Utc>,
    ) -> anyhow::Result<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total
            FROM item_history
            WHERE team_id = ? AND action = ? AND actor = ? AND recorded_at >= ?
            "#,
        )
        .bind(team_id)
        .bind(ACTION_AUTO_ARCHIVED)
        .bind(ACTOR_SYSTEM)
        .bind(since.timestamp())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("total"))
    }
}

fn team_from_row(row: &SqliteRow) -> anyhow::Result<Team> {
    let settings: String = row.get("settings");
    let last_notified_at: Option<i64> = row.get("last_notified_at");

    Ok(Team {
        id: row.get("id"),
        name: row.get("name"),
        settings: serde_json::from_str(&settings)?,
        last_notified_at: last_notified_at.and_then(|ts| Utc.timestamp_opt(ts, 0).single()),
    })
}

fn item_from_row(row: &SqliteRow) -> anyhow::Result<InventoryItem> {
    let category: String = row.get("category");
    let quantity: i64 = row.get("quantity");
    let expiry_date: Option<String> = row.get("expiry_date");

    Ok(InventoryItem {
        id: row.get("id"),
        team_id: row.get("team_id"),
        name: row.get("name"),
        category: Category::from_key(&category),
        quantity: u32::try_from(quantity.max(0))?,
        unit: row.get("unit"),
        expiry_date: expiry_date
            .map(|d| NaiveDate::parse_from_str(&d, DATE_FORMAT))
            .transpose()?,
        archived: row.get("archived"),
    })
}
