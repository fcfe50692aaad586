//! SQLite document backend.
//!
//! Each keyed collection is a `(key, version, document)` table; invites
//! live in an append-only table. Documents are stored as JSON text and
//! filtered with `json_extract`.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;

use super::{Collection, DocumentBackend, Filter, Versioned, WriteBatch};
use crate::error::{DocumentError, StoreError};

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

fn table(collection: Collection) -> &'static str {
    match collection {
        Collection::Profiles => "profiles",
        Collection::Families => "families",
        Collection::Invites => "invites",
        Collection::ApprovalRequests => "approval_requests",
    }
}

fn parse_document(collection: Collection, key: &str, text: &str) -> Result<Value, StoreError> {
    serde_json::from_str(text).map_err(|source| {
        StoreError::Document(DocumentError::Malformed {
            kind: collection.kind(),
            key: key.to_string(),
            source,
        })
    })
}

fn conflict(collection: Collection, key: &str) -> StoreError {
    StoreError::Conflict {
        kind: collection.kind(),
        key: key.to_string(),
    }
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `path` and runs migrations.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::Database(e.into()))?;
            }
        }

        let db_url = format!("sqlite:{}?mode=rwc", path.display());
        let options = SqliteConnectOptions::from_str(&db_url)?.create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Self::from_pool(pool).await
    }

    /// Wraps an existing pool and runs migrations.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl DocumentBackend for SqliteStore {
    async fn get(
        &self,
        collection: Collection,
        key: &str,
    ) -> Result<Option<Versioned>, StoreError> {
        let sql = format!(
            "SELECT version, document FROM {} WHERE key = ?",
            table(collection)
        );
        let row = sqlx::query(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let version: i64 = row.try_get("version")?;
                let text: String = row.try_get("document")?;
                Ok(Some(Versioned {
                    version: version as u64,
                    document: parse_document(collection, key, &text)?,
                }))
            }
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        collection: Collection,
        key: &str,
        document: Value,
    ) -> Result<(), StoreError> {
        let sql = format!(
            r#"
            INSERT INTO {} (key, version, document) VALUES (?, 1, ?)
            ON CONFLICT(key) DO UPDATE SET version = version + 1, document = excluded.document
            "#,
            table(collection)
        );
        sqlx::query(&sql)
            .bind(key)
            .bind(document.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn append(&self, collection: Collection, document: Value) -> Result<(), StoreError> {
        let sql = format!("INSERT INTO {} (document) VALUES (?)", table(collection));
        sqlx::query(&sql)
            .bind(document.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn query(
        &self,
        collection: Collection,
        filters: &[Filter<'_>],
    ) -> Result<Vec<Value>, StoreError> {
        let order = match collection {
            Collection::Invites => "seq",
            _ => "rowid",
        };
        let mut sql = format!("SELECT document FROM {}", table(collection));
        for (i, _) in filters.iter().enumerate() {
            sql.push_str(if i == 0 { " WHERE " } else { " AND " });
            sql.push_str("json_extract(document, ?) = ?");
        }
        sql.push_str(&format!(" ORDER BY {}", order));

        let mut query = sqlx::query(&sql);
        for filter in filters {
            query = query
                .bind(format!("$.{}", filter.field))
                .bind(filter.value);
        }

        let rows = query.fetch_all(&self.pool).await?;
        let mut documents = Vec::with_capacity(rows.len());
        for row in rows {
            let text: String = row.try_get("document")?;
            documents.push(parse_document(collection, "", &text)?);
        }
        Ok(documents)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        // Reads that are not followed by a write still guard the batch.
        for p in &batch.preconditions {
            let written = batch
                .writes
                .iter()
                .any(|w| w.collection == p.collection && w.key == p.key);
            if written {
                continue;
            }
            let sql = format!("SELECT version FROM {} WHERE key = ?", table(p.collection));
            let current: Option<i64> = sqlx::query_scalar(&sql)
                .bind(&p.key)
                .fetch_optional(&mut *tx)
                .await?;
            if current.map(|v| v as u64) != p.expected_version {
                return Err(conflict(p.collection, &p.key));
            }
        }

        for w in &batch.writes {
            let name = table(w.collection);
            let text = w.document.to_string();

            let affected = match batch.precondition_for(w.collection, &w.key) {
                Some(p) => match p.expected_version {
                    Some(version) => {
                        let sql = format!(
                            "UPDATE {} SET version = version + 1, document = ? WHERE key = ? AND version = ?",
                            name
                        );
                        sqlx::query(&sql)
                            .bind(&text)
                            .bind(&w.key)
                            .bind(version as i64)
                            .execute(&mut *tx)
                            .await?
                            .rows_affected()
                    }
                    None => {
                        let sql = format!(
                            "INSERT INTO {} (key, version, document) VALUES (?, 1, ?) ON CONFLICT(key) DO NOTHING",
                            name
                        );
                        sqlx::query(&sql)
                            .bind(&w.key)
                            .bind(&text)
                            .execute(&mut *tx)
                            .await?
                            .rows_affected()
                    }
                },
                None => {
                    let sql = format!(
                        r#"
                        INSERT INTO {} (key, version, document) VALUES (?, 1, ?)
                        ON CONFLICT(key) DO UPDATE SET version = version + 1, document = excluded.document
                        "#,
                        name
                    );
                    sqlx::query(&sql)
                        .bind(&w.key)
                        .bind(&text)
                        .execute(&mut *tx)
                        .await?
                        .rows_affected()
                }
            };

            if affected != 1 {
                // Dropping `tx` rolls back everything staged so far.
                return Err(conflict(w.collection, &w.key));
            }
        }

        tx.commit().await?;
        Ok(())
    }
}
