//! Repository for persisted scheme records
//!
//! Upserts are keyed by business identity: `external_id` when the source
//! assigned one, else a case-insensitive match on the scheme name. Unique
//! indexes back both identity paths, so overlapping runs upserting the same
//! identity converge to one row: the loser of an insert race retries as an
//! update, and the store resolves to last-write-wins.

#![allow(clippy::uninlined_format_args)]

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use tracing::debug;

use crate::domain::scheme::{IdentityKey, PersistedScheme, SchemeLevel, SchemeRecord};
use crate::infrastructure::errors::ExtractionError;

/// Result of one upsert: whether a new row was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub created: bool,
}

/// Document-store contract consumed by the ingestor.
#[async_trait]
pub trait SchemeStore: Send + Sync {
    async fn find_by_identity(
        &self,
        key: &IdentityKey,
    ) -> Result<Option<PersistedScheme>, ExtractionError>;

    /// Insert or update by the record's identity. Never hard-deletes.
    async fn upsert(&self, record: &SchemeRecord) -> Result<UpsertOutcome, ExtractionError>;
}

/// SQLite-backed [`SchemeStore`].
#[derive(Clone)]
pub struct SqliteSchemeRepository {
    pool: Arc<SqlitePool>,
}

impl SqliteSchemeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Create the schema if it does not exist. Call once at startup.
    pub async fn initialize(&self) -> Result<(), ExtractionError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schemes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                external_id TEXT,
                name TEXT NOT NULL,
                name_key TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                ministry TEXT NOT NULL DEFAULT '',
                department TEXT NOT NULL DEFAULT '',
                category TEXT NOT NULL DEFAULT '',
                sub_category TEXT NOT NULL DEFAULT '',
                target_audience TEXT NOT NULL DEFAULT '',
                level TEXT NOT NULL DEFAULT 'Unknown',
                region_scope TEXT NOT NULL DEFAULT '',
                launch_date TEXT,
                source_label TEXT NOT NULL DEFAULT '',
                source_url TEXT NOT NULL DEFAULT '',
                extracted_at TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1
            )
            "#,
        )
        .execute(&*self.pool)
        .await?;

        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_schemes_external_id \
             ON schemes(external_id) WHERE external_id IS NOT NULL",
        )
        .execute(&*self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_schemes_name_key ON schemes(name_key)")
            .execute(&*self.pool)
            .await?;

        // Name-keyed identities get the same uniqueness guarantee as
        // external ids, so two overlapping runs cannot both insert the
        // same scheme.
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_schemes_name_identity \
             ON schemes(name_key) WHERE external_id IS NULL",
        )
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    /// Number of active schemes currently persisted.
    pub async fn count_active(&self) -> Result<i64, ExtractionError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM schemes WHERE is_active = 1")
            .fetch_one(&*self.pool)
            .await?;
        Ok(row.get("count"))
    }

    /// Page through persisted schemes, most recently updated first.
    pub async fn get_schemes_paginated(
        &self,
        page: i64,
        limit: i64,
    ) -> Result<Vec<PersistedScheme>, ExtractionError> {
        let offset = (page.max(1) - 1) * limit;
        let rows = sqlx::query(
            "SELECT * FROM schemes WHERE is_active = 1 \
             ORDER BY updated_at DESC LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&*self.pool)
        .await?;

        Ok(rows.iter().map(Self::row_to_persisted).collect())
    }

    fn row_to_persisted(row: &sqlx::sqlite::SqliteRow) -> PersistedScheme {
        PersistedScheme {
            record: SchemeRecord {
                external_id: row.get("external_id"),
                name: row.get("name"),
                description: row.get("description"),
                ministry: row.get("ministry"),
                department: row.get("department"),
                category: row.get("category"),
                sub_category: row.get("sub_category"),
                target_audience: row.get("target_audience"),
                level: SchemeLevel::parse(row.get::<String, _>("level").as_str()),
                region_scope: row.get("region_scope"),
                launch_date: row.get("launch_date"),
                source_label: row.get("source_label"),
                source_url: row.get("source_url"),
                extracted_at: row.get("extracted_at"),
            },
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            is_active: row.get::<i64, _>("is_active") != 0,
        }
    }

    async fn find_row_for(
        &self,
        record: &SchemeRecord,
    ) -> Result<Option<i64>, ExtractionError> {
        // external_id is authoritative when the source assigned one;
        // otherwise match case-insensitively on the name.
        let row = match &record.external_id {
            Some(id) if !id.trim().is_empty() => {
                sqlx::query("SELECT id FROM schemes WHERE external_id = ?")
                    .bind(id.trim())
                    .fetch_optional(&*self.pool)
                    .await?
            }
            _ => {
                sqlx::query("SELECT id FROM schemes WHERE name_key = ?")
                    .bind(record.name.trim().to_lowercase())
                    .fetch_optional(&*self.pool)
                    .await?
            }
        };
        Ok(row.map(|r| r.get("id")))
    }

    async fn update_row(
        &self,
        record: &SchemeRecord,
        row_id: i64,
        now: chrono::DateTime<Utc>,
    ) -> Result<(), ExtractionError> {
        sqlx::query(
            r#"
            UPDATE schemes SET
                external_id = COALESCE(?, external_id),
                name = ?, name_key = ?, description = ?, ministry = ?,
                department = ?, category = ?, sub_category = ?,
                target_audience = ?, level = ?, region_scope = ?,
                launch_date = ?, source_label = ?, source_url = ?,
                extracted_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(trimmed_external_id(record))
        .bind(record.name.trim())
        .bind(record.name.trim().to_lowercase())
        .bind(&record.description)
        .bind(&record.ministry)
        .bind(&record.department)
        .bind(&record.category)
        .bind(&record.sub_category)
        .bind(&record.target_audience)
        .bind(record.level.as_str())
        .bind(&record.region_scope)
        .bind(record.launch_date)
        .bind(&record.source_label)
        .bind(&record.source_url)
        .bind(record.extracted_at)
        .bind(now)
        .bind(row_id)
        .execute(&*self.pool)
        .await?;
        debug!("Updated scheme '{}'", record.name);
        Ok(())
    }

    async fn insert_row(
        &self,
        record: &SchemeRecord,
        now: chrono::DateTime<Utc>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO schemes
                (external_id, name, name_key, description, ministry,
                 department, category, sub_category, target_audience,
                 level, region_scope, launch_date, source_label,
                 source_url, extracted_at, created_at, updated_at,
                 is_active)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1)
            "#,
        )
        .bind(trimmed_external_id(record))
        .bind(record.name.trim())
        .bind(record.name.trim().to_lowercase())
        .bind(&record.description)
        .bind(&record.ministry)
        .bind(&record.department)
        .bind(&record.category)
        .bind(&record.sub_category)
        .bind(&record.target_audience)
        .bind(record.level.as_str())
        .bind(&record.region_scope)
        .bind(record.launch_date)
        .bind(&record.source_label)
        .bind(&record.source_url)
        .bind(record.extracted_at)
        .bind(now)
        .bind(now)
        .execute(&*self.pool)
        .await?;
        Ok(())
    }
}

fn trimmed_external_id(record: &SchemeRecord) -> Option<&str> {
    record
        .external_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
}

#[async_trait]
impl SchemeStore for SqliteSchemeRepository {
    async fn find_by_identity(
        &self,
        key: &IdentityKey,
    ) -> Result<Option<PersistedScheme>, ExtractionError> {
        let row = sqlx::query("SELECT * FROM schemes WHERE external_id = ?1 OR name_key = ?1")
            .bind(key.as_str())
            .fetch_optional(&*self.pool)
            .await?;
        Ok(row.as_ref().map(Self::row_to_persisted))
    }

    async fn upsert(&self, record: &SchemeRecord) -> Result<UpsertOutcome, ExtractionError> {
        let now = Utc::now();

        if let Some(row_id) = self.find_row_for(record).await? {
            self.update_row(record, row_id, now).await?;
            return Ok(UpsertOutcome { created: false });
        }

        match self.insert_row(record, now).await {
            Ok(()) => {
                debug!("Created scheme '{}'", record.name);
                Ok(UpsertOutcome { created: true })
            }
            // Lost an insert race against an overlapping run: the unique
            // indexes rejected the duplicate identity. Converge on the row
            // the winner created.
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                match self.find_row_for(record).await? {
                    Some(row_id) => {
                        self.update_row(record, row_id, now).await?;
                        Ok(UpsertOutcome { created: false })
                    }
                    None => Err(ExtractionError::Store(sqlx::Error::Database(db))),
                }
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_repository() -> SqliteSchemeRepository {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let repository = SqliteSchemeRepository::new(pool);
        repository.initialize().await.unwrap();
        repository
    }

    #[tokio::test]
    async fn upsert_creates_then_updates_by_external_id() {
        let repository = memory_repository().await;

        let mut record = SchemeRecord::named("Test Yojana");
        record.external_id = Some("S1".to_string());
        record.ministry = "M1".to_string();

        assert!(repository.upsert(&record).await.unwrap().created);
        record.ministry = "M2".to_string();
        assert!(!repository.upsert(&record).await.unwrap().created);

        let persisted = repository
            .find_by_identity(&record.identity_key())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(persisted.record.ministry, "M2");
        assert_eq!(repository.count_active().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn name_match_is_case_insensitive() {
        let repository = memory_repository().await;

        let record = SchemeRecord::named("Kisan Credit Card");
        assert!(repository.upsert(&record).await.unwrap().created);

        let renamed = SchemeRecord::named("KISAN CREDIT CARD");
        assert!(!repository.upsert(&renamed).await.unwrap().created);
        assert_eq!(repository.count_active().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn update_never_clears_external_id() {
        let repository = memory_repository().await;

        let mut first = SchemeRecord::named("Awas Yojana");
        first.external_id = Some("S9".to_string());
        repository.upsert(&first).await.unwrap();

        // Later strategy found the same scheme by name only.
        let second = SchemeRecord::named("Awas Yojana");
        repository.upsert(&second).await.unwrap();

        let persisted = repository
            .find_by_identity(&IdentityKey("S9".to_string()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(persisted.record.external_id.as_deref(), Some("S9"));
    }

    #[tokio::test]
    async fn duplicate_name_identity_inserts_are_rejected() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let repository = SqliteSchemeRepository::new(pool.clone());
        repository.initialize().await.unwrap();

        let insert = "INSERT INTO schemes \
             (external_id, name, name_key, extracted_at, created_at, updated_at) \
             VALUES (NULL, 'Awas Yojana', 'awas yojana', ?1, ?1, ?1)";
        sqlx::query(insert).bind(Utc::now()).execute(&pool).await.unwrap();

        let err = sqlx::query(insert).bind(Utc::now()).execute(&pool).await.unwrap_err();
        match err {
            sqlx::Error::Database(db) => assert!(db.is_unique_violation()),
            other => panic!("expected unique violation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn overlapping_upserts_of_one_name_converge_to_one_row() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("schemes.db").display());
        let pool = SqlitePoolOptions::new().max_connections(2).connect(&url).await.unwrap();
        let repository = SqliteSchemeRepository::new(pool);
        repository.initialize().await.unwrap();

        let record = SchemeRecord::named("Awas Yojana");
        let (first, second) = tokio::join!(
            repository.upsert(&record),
            repository.upsert(&record),
        );

        // Whichever interleaving occurred, both calls succeed and exactly
        // one of them created the row.
        let first = first.unwrap();
        let second = second.unwrap();
        assert!(first.created ^ second.created);
        assert_eq!(repository.count_active().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn pagination_orders_by_recency() {
        let repository = memory_repository().await;
        for name in ["A", "B", "C"] {
            repository.upsert(&SchemeRecord::named(name)).await.unwrap();
        }
        let page = repository.get_schemes_paginated(1, 2).await.unwrap();
        assert_eq!(page.len(), 2);
    }
}
